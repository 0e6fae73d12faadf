//! Exactly-once-per-window report delivery.
//!
//! The store holds at most one record per window. A record is created pending
//! before the sink is called, so a crash mid-send leaves something the retry
//! worker can pick up. Inside one process a claim set keeps a single task
//! working on a given window at a time.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::database::models::ReportRecordDbModel;
use crate::database::repositories::{ReportRepository, VideoRepository};
use crate::domain::{TimeWindow, WindowKey};
use crate::notification::VideoSink;

/// Result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The window was delivered earlier; nothing was sent.
    AlreadyDelivered,
    /// Delivered by this call.
    Delivered,
    /// The sink failed; the record stays undelivered with this reason.
    Failed(String),
    /// The window has not ended yet.
    NotYetDue,
    /// Another task in this process is delivering the window right now.
    InFlight,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyDelivered => "already_delivered",
            Self::Delivered => "delivered",
            Self::Failed(_) => "failed",
            Self::NotYetDue => "not_yet_due",
            Self::InFlight => "in_flight",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Releases a window claim when dropped.
struct Claim<'a> {
    claims: &'a DashSet<WindowKey>,
    key: WindowKey,
}

impl<'a> Claim<'a> {
    fn acquire(claims: &'a DashSet<WindowKey>, key: WindowKey) -> Option<Self> {
        // Build the guard only on success: a losing guard would release the
        // holder's key when dropped.
        if claims.insert(key) {
            Some(Self { claims, key })
        } else {
            None
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claims.remove(&self.key);
    }
}

/// Delivers window reports through a [`VideoSink`], recording each outcome.
pub struct ReportDispatcher {
    reports: Arc<dyn ReportRepository>,
    videos: Arc<dyn VideoRepository>,
    sink: Arc<dyn VideoSink>,
    claims: DashSet<WindowKey>,
}

impl ReportDispatcher {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        videos: Arc<dyn VideoRepository>,
        sink: Arc<dyn VideoSink>,
    ) -> Self {
        Self {
            reports,
            videos,
            sink,
            claims: DashSet::new(),
        }
    }

    /// Deliver the report for `window` unless it is not due or already done.
    ///
    /// Store failures are returned as `Err`; in that case nothing was sent.
    pub async fn check_and_dispatch(
        &self,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        if !window.is_complete_at(now) {
            return Ok(DispatchOutcome::NotYetDue);
        }

        let Some(_claim) = Claim::acquire(&self.claims, window.key()) else {
            debug!(window = %window, "Report delivery already in flight");
            return Ok(DispatchOutcome::InFlight);
        };

        let record = match self.reports.get_record(window).await? {
            Some(record) => record,
            None => {
                let record = self.reports.create_pending(window, now).await?;
                debug!(id = record.id, window = %window, "Created pending report record");
                record
            }
        };

        if record.delivered {
            log_if_corrupted(&record);
            return Ok(DispatchOutcome::AlreadyDelivered);
        }

        self.deliver(&record, window, now).await
    }

    /// Retry an existing undelivered record. Never creates records.
    pub async fn redeliver(
        &self,
        record: &ReportRecordDbModel,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let window = match record.window() {
            Ok(window) => window,
            Err(e) => {
                error!(id = record.id, "Report record has an invalid window: {}", e);
                return Ok(DispatchOutcome::Failed(e.to_string()));
            }
        };

        let Some(_claim) = Claim::acquire(&self.claims, window.key()) else {
            debug!(window = %window, "Report delivery already in flight");
            return Ok(DispatchOutcome::InFlight);
        };

        // Re-read under the claim; the main tick may have delivered it since
        // the caller listed it.
        let current = match self.reports.get_record(&window).await? {
            Some(current) => current,
            None => {
                warn!(id = record.id, window = %window, "Undelivered report record vanished");
                return Ok(DispatchOutcome::Failed("record not found".to_string()));
            }
        };

        if current.delivered {
            log_if_corrupted(&current);
            return Ok(DispatchOutcome::AlreadyDelivered);
        }

        self.deliver(&current, &window, now).await
    }

    async fn deliver(
        &self,
        record: &ReportRecordDbModel,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<DispatchOutcome> {
        let videos = self.videos.list_videos(window).await?;

        match self.sink.send_report(&videos, window).await {
            Ok(()) => {
                self.reports.mark_delivered(record.id, now).await?;
                info!(
                    id = record.id,
                    window = %window,
                    videos = videos.len(),
                    sink = self.sink.sink_type(),
                    "Report delivered"
                );
                Ok(DispatchOutcome::Delivered)
            }
            Err(e) => {
                let reason = e.to_string();
                if e.is_transient() {
                    warn!(
                        id = record.id,
                        window = %window,
                        attempt = record.attempt_count + 1,
                        "Report delivery failed: {}", reason
                    );
                } else {
                    error!(
                        id = record.id,
                        window = %window,
                        attempt = record.attempt_count + 1,
                        "Report delivery failed: {}", reason
                    );
                }
                self.reports.mark_failed(record.id, &reason, now).await?;
                Ok(DispatchOutcome::Failed(reason))
            }
        }
    }
}

fn log_if_corrupted(record: &ReportRecordDbModel) {
    if let Err(e) = record.check_invariants() {
        error!(id = record.id, "Treating corrupted report record as delivered: {}", e);
    }
}
