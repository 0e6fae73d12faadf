//! Outbound notifications.
//!
//! The scheduler only sees the [`VideoSink`] trait. [`TelegramSink`] is the
//! production implementation; tests plug in in-memory sinks.
//!
//! # Example
//!
//! ```ignore
//! use dvr_sentinel::notification::{TelegramConfig, TelegramSink};
//!
//! let sink = TelegramSink::new(TelegramConfig {
//!     bot_token: "123:ABC".to_string(),
//!     chat_id: "456".to_string(),
//!     ..Default::default()
//! }, chrono_tz::Europe::Berlin)?;
//! ```

pub mod message;
mod telegram;

pub use telegram::{TelegramConfig, TelegramSink};

use async_trait::async_trait;

use crate::Result;
use crate::database::models::VideoDbModel;
use crate::domain::TimeWindow;

/// Destination for recordings and digest reports.
#[async_trait]
pub trait VideoSink: Send + Sync {
    /// Name used in logs.
    fn sink_type(&self) -> &'static str;

    /// Deliver the digest of one window. An empty list still produces a
    /// "no events" message.
    async fn send_report(&self, videos: &[VideoDbModel], window: &TimeWindow) -> Result<()>;

    /// Forward a single recording as soon as it is registered.
    async fn send_video(&self, video: &VideoDbModel) -> Result<()>;
}
