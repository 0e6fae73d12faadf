//! Background retry of undelivered reports.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use super::dispatcher::{DispatchOutcome, ReportDispatcher};
use crate::Result;
use crate::database::models::ReportRecordDbModel;
use crate::database::repositories::ReportRepository;
use crate::domain::RetryBackoff;

/// Counts from one retry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetrySummary {
    pub examined: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Still inside their backoff delay.
    pub deferred: usize,
    /// Delivered or claimed elsewhere in the meantime.
    pub skipped: usize,
}

/// Re-sends every pending or failed report until it is delivered.
pub struct UnsentRetryWorker {
    reports: Arc<dyn ReportRepository>,
    dispatcher: Arc<ReportDispatcher>,
    backoff: RetryBackoff,
}

impl UnsentRetryWorker {
    pub fn new(
        reports: Arc<dyn ReportRepository>,
        dispatcher: Arc<ReportDispatcher>,
        backoff: RetryBackoff,
    ) -> Self {
        Self {
            reports,
            dispatcher,
            backoff,
        }
    }

    fn is_due(&self, record: &ReportRecordDbModel, now: DateTime<Utc>) -> bool {
        if record.is_pending() {
            return true;
        }
        let attempts = u32::try_from(record.attempt_count).unwrap_or(u32::MAX);
        let wait =
            TimeDelta::from_std(self.backoff.delay_after(attempts)).unwrap_or(TimeDelta::MAX);
        record
            .attempted_at()
            .checked_add_signed(wait)
            .is_none_or(|next| now >= next)
    }

    /// Attempt every undelivered record whose backoff has elapsed.
    ///
    /// A store failure ends the pass early; the remaining records are picked
    /// up by the next one.
    pub async fn retry_pending(&self, now: DateTime<Utc>) -> Result<RetrySummary> {
        let records = self.reports.list_undelivered().await?;
        let mut summary = RetrySummary::default();

        for record in &records {
            summary.examined += 1;

            if !self.is_due(record, now) {
                summary.deferred += 1;
                continue;
            }

            match self.dispatcher.redeliver(record, now).await? {
                DispatchOutcome::Delivered => summary.delivered += 1,
                DispatchOutcome::Failed(_) => summary.failed += 1,
                DispatchOutcome::AlreadyDelivered
                | DispatchOutcome::InFlight
                | DispatchOutcome::NotYetDue => summary.skipped += 1,
            }
        }

        if summary.examined > 0 {
            info!(
                examined = summary.examined,
                delivered = summary.delivered,
                failed = summary.failed,
                deferred = summary.deferred,
                skipped = summary.skipped,
                "Retry pass finished"
            );
        } else {
            debug!("No undelivered reports");
        }
        Ok(summary)
    }
}
