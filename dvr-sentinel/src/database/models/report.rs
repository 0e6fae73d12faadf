//! Report delivery record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{ms_to_datetime, opt_ms_to_datetime};
use crate::domain::{TimeWindow, WindowKey};
use crate::{Error, Result};

/// Delivery record of one report window.
///
/// At most one row exists per `(window_start, window_end)`. A missing row means
/// the window was never attempted; `delivered = false` means pending or failed.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReportRecordDbModel {
    pub id: i64,
    pub window_start: i64,
    pub window_end: i64,
    pub delivered: bool,
    /// Number of sink calls that have finished (either way) for this record.
    pub attempt_count: i64,
    /// When the last attempt started (creation time for a fresh pending record).
    pub attempted_at: i64,
    pub delivered_at: Option<i64>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
}

impl ReportRecordDbModel {
    pub fn key(&self) -> WindowKey {
        WindowKey {
            start_ms: self.window_start,
            end_ms: self.window_end,
        }
    }

    /// The window this record reports on.
    pub fn window(&self) -> Result<TimeWindow> {
        TimeWindow::new(
            ms_to_datetime(self.window_start),
            ms_to_datetime(self.window_end),
        )
    }

    pub fn attempted_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.attempted_at)
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        opt_ms_to_datetime(self.delivered_at)
    }

    /// A record that has never been handed to the sink.
    pub fn is_pending(&self) -> bool {
        !self.delivered && self.attempt_count == 0 && self.failure_reason.is_none()
    }

    /// Check the delivered-record invariant.
    ///
    /// A delivered record must carry `delivered_at` and no failure reason.
    pub fn check_invariants(&self) -> Result<()> {
        if self.delivered && self.delivered_at.is_none() {
            return Err(Error::CorruptedRecord {
                id: self.id,
                reason: "delivered without delivered_at".to_string(),
            });
        }
        if self.delivered && self.failure_reason.is_some() {
            return Err(Error::CorruptedRecord {
                id: self.id,
                reason: "delivered with a failure reason".to_string(),
            });
        }
        Ok(())
    }
}
