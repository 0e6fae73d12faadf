//! Database models for dvr-sentinel.
//!
//! These models map directly to the database schema. Timestamps are epoch
//! milliseconds; accessors convert them to `DateTime<Utc>`.

pub mod report;
pub mod video;

pub use report::*;
pub use video::*;
