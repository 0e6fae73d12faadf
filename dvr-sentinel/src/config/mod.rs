//! Application configuration.
//!
//! Loaded from a JSON file when `SENTINEL_CONFIG` points at one, otherwise
//! from environment variables (a `.env` file is read first by `main`).
//! [`AppConfig::validate`] runs before anything is started; every error here
//! is fatal at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actuator::AgentDvrConfig;
use crate::domain::{ReportMode, RetryBackoff};
use crate::notification::TelegramConfig;
use crate::schedule::TimeWindowCalculator;
use crate::{Error, Result};

pub const ENV_CONFIG_FILE: &str = "SENTINEL_CONFIG";

/// Mask a secret for logging: keep two characters at each end.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => "[empty]".to_string(),
        1..=4 => "****".to_string(),
        n => {
            let head: String = chars[..2].iter().collect();
            let tail: String = chars[n - 2..].iter().collect();
            format!("{head}{}{tail}", "*".repeat(n - 4))
        }
    }
}

/// Parse a boundary time given as `HH:MM` or `HH:MM:SS`.
pub fn parse_boundary(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| Error::config(format!("invalid time of day '{value}', expected HH:MM")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::config(format!("{key}: invalid boolean '{other}'"))),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{key}: invalid number '{value}'")))
}

/// Parse a number of seconds into milliseconds.
fn parse_secs_as_ms(key: &str, value: &str) -> Result<u64> {
    parse_u64(key, value)?
        .checked_mul(1000)
        .ok_or_else(|| Error::config(format!("{key}: value '{value}' is too large")))
}

mod boundary_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_boundary(&s).map_err(serde::de::Error::custom)
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_main_tick_interval_secs() -> u64 {
    60
}

fn default_retry_tick_interval_secs() -> u64 {
    600
}

fn default_database_url() -> String {
    "sqlite:sentinel.db?mode=rwc".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_settle_delay_secs() -> u64 {
    20
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Local time the day window starts.
    #[serde(with = "boundary_format")]
    pub day_boundary: NaiveTime,
    /// Local time the night window starts.
    #[serde(with = "boundary_format")]
    pub night_boundary: NaiveTime,
    /// IANA zone name the boundaries are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub force_armed_at_day: bool,
    #[serde(default)]
    pub force_armed_at_night: bool,
    #[serde(default)]
    pub report_mode: ReportMode,
    #[serde(default = "default_main_tick_interval_secs")]
    pub main_tick_interval_secs: u64,
    #[serde(default = "default_retry_tick_interval_secs")]
    pub retry_tick_interval_secs: u64,
    #[serde(default)]
    pub retry_backoff: RetryBackoff,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    pub telegram: TelegramConfig,
    /// Arming policy is disabled when absent.
    #[serde(default)]
    pub dvr: Option<AgentDvrConfig>,
    #[serde(default)]
    pub watch_folders: Vec<PathBuf>,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
}

impl AppConfig {
    /// Load from `SENTINEL_CONFIG` if set, otherwise from the environment.
    pub fn load() -> Result<Self> {
        let config = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) if !path.trim().is_empty() => Self::from_json_file(Path::new(path.trim()))?,
            _ => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from a key lookup using the environment variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| Error::config(format!("{key} is required")))
        };

        let dvr = match get("AGENTDVR_URL") {
            Some(url) => Some(AgentDvrConfig {
                url,
                user: require("AGENTDVR_USER")?,
                password: require("AGENTDVR_PASSWORD")?,
                request_timeout_secs: 10,
            }),
            None => None,
        };

        let telegram = TelegramConfig {
            bot_token: require("TELEGRAM_BOT_TOKEN")?,
            chat_id: require("TELEGRAM_CHAT_ID")?,
            ..Default::default()
        };

        let mut retry_backoff = RetryBackoff::default();
        if let Some(v) = get("SENTINEL_RETRY_INITIAL_DELAY_SECS") {
            retry_backoff.initial_delay_ms =
                parse_secs_as_ms("SENTINEL_RETRY_INITIAL_DELAY_SECS", &v)?;
        }
        if let Some(v) = get("SENTINEL_RETRY_MAX_DELAY_SECS") {
            retry_backoff.max_delay_ms = parse_secs_as_ms("SENTINEL_RETRY_MAX_DELAY_SECS", &v)?;
        }

        Ok(Self {
            day_boundary: parse_boundary(&require("SENTINEL_DAY_BOUNDARY")?)?,
            night_boundary: parse_boundary(&require("SENTINEL_NIGHT_BOUNDARY")?)?,
            timezone: get("SENTINEL_TIMEZONE").unwrap_or_else(default_timezone),
            force_armed_at_day: get("SENTINEL_FORCE_ARMED_AT_DAY")
                .map(|v| parse_bool("SENTINEL_FORCE_ARMED_AT_DAY", &v))
                .transpose()?
                .unwrap_or(false),
            force_armed_at_night: get("SENTINEL_FORCE_ARMED_AT_NIGHT")
                .map(|v| parse_bool("SENTINEL_FORCE_ARMED_AT_NIGHT", &v))
                .transpose()?
                .unwrap_or(false),
            report_mode: get("SENTINEL_REPORT_MODE")
                .map(|v| v.parse::<ReportMode>())
                .transpose()?
                .unwrap_or_default(),
            main_tick_interval_secs: get("SENTINEL_MAIN_TICK_SECS")
                .map(|v| parse_u64("SENTINEL_MAIN_TICK_SECS", &v))
                .transpose()?
                .unwrap_or_else(default_main_tick_interval_secs),
            retry_tick_interval_secs: get("SENTINEL_RETRY_TICK_SECS")
                .map(|v| parse_u64("SENTINEL_RETRY_TICK_SECS", &v))
                .transpose()?
                .unwrap_or_else(default_retry_tick_interval_secs),
            retry_backoff,
            database_url: get("DATABASE_URL").unwrap_or_else(default_database_url),
            log_dir: get("SENTINEL_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_log_dir),
            telegram,
            dvr,
            watch_folders: get("SENTINEL_WATCH_FOLDERS")
                .map(|v| {
                    v.split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            settle_delay_secs: get("SENTINEL_SETTLE_DELAY_SECS")
                .map(|v| parse_u64("SENTINEL_SETTLE_DELAY_SECS", &v))
                .transpose()?
                .unwrap_or_else(default_settle_delay_secs),
        })
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| Error::config(format!("unknown timezone '{}'", self.timezone)))
    }

    pub fn calculator(&self) -> Result<TimeWindowCalculator> {
        TimeWindowCalculator::new(self.day_boundary, self.night_boundary, self.tz()?)
    }

    pub fn main_tick_interval(&self) -> Duration {
        Duration::from_secs(self.main_tick_interval_secs)
    }

    pub fn retry_tick_interval(&self) -> Duration {
        Duration::from_secs(self.retry_tick_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// How long after a window ends its digest waits for late recordings:
    /// the settle delay plus two main ticks of scanner latency.
    pub fn ingest_grace(&self) -> Duration {
        self.settle_delay()
            .saturating_add(self.main_tick_interval().saturating_mul(2))
    }

    pub fn validate(&self) -> Result<()> {
        self.calculator()?;

        if self.main_tick_interval_secs == 0 {
            return Err(Error::config("main tick interval must be positive"));
        }
        if self.retry_tick_interval_secs == 0 {
            return Err(Error::config("retry tick interval must be positive"));
        }
        if self.retry_tick_interval_secs < self.main_tick_interval_secs {
            return Err(Error::config(format!(
                "retry tick interval ({}s) must not be shorter than the main tick interval ({}s)",
                self.retry_tick_interval_secs, self.main_tick_interval_secs
            )));
        }
        if self.telegram.bot_token.trim().is_empty() {
            return Err(Error::config("Telegram bot token is required"));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(Error::config("Telegram chat id is required"));
        }
        if self.retry_backoff.backoff_multiplier < 1.0 {
            return Err(Error::config("retry backoff multiplier must be at least 1.0"));
        }
        Ok(())
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_summary(&self) {
        info!(
            day_boundary = %self.day_boundary.format("%H:%M"),
            night_boundary = %self.night_boundary.format("%H:%M"),
            timezone = %self.timezone,
            report_mode = %self.report_mode,
            force_armed_at_day = self.force_armed_at_day,
            force_armed_at_night = self.force_armed_at_night,
            main_tick_secs = self.main_tick_interval_secs,
            retry_tick_secs = self.retry_tick_interval_secs,
            bot_token = %mask_secret(&self.telegram.bot_token),
            dvr = self.dvr.as_ref().map(|d| d.url.as_str()).unwrap_or("disabled"),
            watch_folders = self.watch_folders.len(),
            "Configuration loaded"
        );
    }
}
