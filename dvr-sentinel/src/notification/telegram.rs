//! Telegram Bot API sink.
//!
//! Sends messages via the Telegram Bot API (`POST /bot<token>/sendMessage`).
//! Handles 429 rate limits by respecting the `parameters.retry_after` field
//! returned in the JSON response body.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::VideoSink;
use super::message::{build_report, build_video_notice, truncate_message};
use crate::config::mask_secret;
use crate::database::models::VideoDbModel;
use crate::domain::TimeWindow;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

/// Maximum number of retries for rate-limited requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Telegram sink configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &mask_secret(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Sends digests and recording notices to a Telegram chat.
pub struct TelegramSink {
    config: TelegramConfig,
    client: Client,
    tz: Tz,
}

impl TelegramSink {
    pub fn new(config: TelegramConfig, tz: Tz) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(Error::config("Telegram bot token is empty"));
        }
        if config.chat_id.trim().is_empty() {
            return Err(Error::config("Telegram chat id is empty"));
        }

        let client = build_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self { config, client, tz })
    }

    fn send_message_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token
        )
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": self.config.chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
        });
        self.send_with_retry(&payload).await
    }

    /// Send request with rate limit handling.
    async fn send_with_retry(&self, payload: &serde_json::Value) -> Result<()> {
        let url = self.send_message_url();
        let mut attempts = 0;

        loop {
            attempts += 1;

            // The URL carries the bot token; keep it out of error messages.
            let response = self
                .client
                .post(&url)
                .json(payload)
                .send()
                .await
                .map_err(|e| Error::sink(format!("Telegram request failed: {}", e.without_url())))?;

            let status = response.status();

            if status.is_success() {
                return Ok(());
            }

            if status.as_u16() == 429 {
                let body: serde_json::Value = response.json().await.unwrap_or_default();

                let retry_after = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs);

                if attempts >= MAX_RATE_LIMIT_RETRIES {
                    warn!(
                        "Telegram rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                        MAX_RATE_LIMIT_RETRIES, retry_after
                    );
                    return Err(Error::sink(format!(
                        "Telegram rate limit exceeded after {} retries",
                        MAX_RATE_LIMIT_RETRIES
                    )));
                }

                let wait_duration = retry_after.unwrap_or(Duration::from_secs(1));
                debug!(
                    "Telegram rate limited (429), waiting {:?} before retry (attempt {}/{})",
                    wait_duration, attempts, MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(wait_duration).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(Error::sink(format!(
                "Telegram sendMessage failed: {} - {}",
                status, body
            )));
        }
    }
}

#[async_trait]
impl VideoSink for TelegramSink {
    fn sink_type(&self) -> &'static str {
        "telegram"
    }

    async fn send_report(&self, videos: &[VideoDbModel], window: &TimeWindow) -> Result<()> {
        let text = build_report(videos, window, self.tz);
        self.send_text(&text).await?;
        debug!(window = %window, videos = videos.len(), "Telegram report sent");
        Ok(())
    }

    async fn send_video(&self, video: &VideoDbModel) -> Result<()> {
        let text = build_video_notice(video, self.tz);
        self.send_text(&text).await?;
        debug!(path = %video.path, "Telegram recording notice sent");
        Ok(())
    }
}
