//! Retry backoff value object for undelivered reports.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff between delivery attempts of one report.
///
/// There is no attempt limit: a report is retried until it is delivered.
/// The backoff only spaces attempts out so a dead sink is not hammered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryBackoff {
    /// Delay after the first failed attempt in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Backoff multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_initial_delay_ms() -> u64 {
    10 * 60 * 1000
}

fn default_max_delay_ms() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl RetryBackoff {
    /// A backoff that lets every retry cycle attempt every record.
    pub fn disabled() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay to wait after `attempts` failed attempts before the next one.
    pub fn delay_after(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempts - 1).min(32) as i32;
        let base_delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(base_delay.min(self.max_delay_ms as f64) as u64)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_waits() {
        let backoff = RetryBackoff::disabled();
        for attempts in 0..10 {
            assert_eq!(backoff.delay_after(attempts), Duration::ZERO);
        }
    }

    #[test]
    fn test_exponential_growth() {
        let backoff = RetryBackoff {
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        };

        assert_eq!(backoff.delay_after(0), Duration::ZERO);
        assert_eq!(backoff.delay_after(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay_after(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay_after(3), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let backoff = RetryBackoff {
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        };
        assert_eq!(backoff.delay_after(6), Duration::from_millis(5000));
        assert_eq!(backoff.delay_after(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn test_serialization_defaults() {
        let parsed: RetryBackoff = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, RetryBackoff::default());
    }
}
