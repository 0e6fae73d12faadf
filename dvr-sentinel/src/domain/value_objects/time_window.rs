//! Report window value object.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::database::time::datetime_to_ms;
use crate::{Error, Result};

/// A half-open interval `[start, end)` for which one report is owed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Storage identity of a window: its bounds in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeWindow {
    /// Create a window, rejecting empty or inverted intervals.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::validation(format!(
                "window start {} must be before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Window between two boundary instants known to be ordered.
    ///
    /// Degenerate input collapses to a one-second window at `start` rather
    /// than failing, so boundary arithmetic stays infallible.
    pub(crate) fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start < end {
            Self { start, end }
        } else {
            Self {
                start,
                end: start + chrono::Duration::seconds(1),
            }
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Whether `instant` lies inside `[start, end)`.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Whether the window has fully elapsed at `now`.
    pub fn is_complete_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.end
    }

    pub fn key(&self) -> WindowKey {
        WindowKey {
            start_ms: datetime_to_ms(self.start),
            end_ms: datetime_to_ms(self.end),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}
