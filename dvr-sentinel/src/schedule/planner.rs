//! Which windows are owed a digest, and the tick actions that act on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use super::dispatcher::{DispatchOutcome, ReportDispatcher};
use super::policy::ArmingPolicy;
use super::retry::UnsentRetryWorker;
use super::ticker::TickAction;
use super::window::{Period, TimeWindowCalculator};
use crate::Result;
use crate::domain::{ReportMode, TimeWindow};

/// Maps the report mode onto completed windows.
///
/// A window only becomes due once the ingest grace has passed after its end,
/// so recordings finished just before the boundary are registered before the
/// digest is compiled.
#[derive(Debug, Clone)]
pub struct ReportPlanner {
    calculator: TimeWindowCalculator,
    mode: ReportMode,
    grace: TimeDelta,
}

impl ReportPlanner {
    pub fn new(calculator: TimeWindowCalculator, mode: ReportMode) -> Self {
        Self {
            calculator,
            mode,
            grace: TimeDelta::zero(),
        }
    }

    pub fn with_ingest_grace(mut self, grace: Duration) -> Self {
        self.grace = TimeDelta::from_std(grace).unwrap_or(TimeDelta::zero());
        self
    }

    pub fn mode(&self) -> ReportMode {
        self.mode
    }

    /// The instant whose completed windows are owed at `now`.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.grace).unwrap_or(now)
    }

    /// Windows whose digest should exist at `now`, oldest first.
    pub fn due_windows(&self, now: DateTime<Utc>) -> Vec<TimeWindow> {
        let cutoff = self.cutoff(now);
        match self.mode {
            ReportMode::Immediate => Vec::new(),
            ReportMode::MorningOnly => {
                vec![self.calculator.last_completed(Period::Night, cutoff)]
            }
            ReportMode::MorningAndEvening => {
                let mut windows = vec![
                    self.calculator.last_completed(Period::Day, cutoff),
                    self.calculator.last_completed(Period::Night, cutoff),
                ];
                windows.sort();
                windows
            }
        }
    }

    /// When the next digest becomes due, if digests are enabled.
    pub fn next_report_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let cutoff = self.cutoff(now);
        let boundary = match self.mode {
            ReportMode::Immediate => return None,
            ReportMode::MorningOnly => self.calculator.next_morning_report_time(cutoff),
            ReportMode::MorningAndEvening => self.calculator.next_evening_report_time(cutoff),
        };
        Some(boundary + self.grace)
    }
}

/// Dispatches every due digest on the main ticker.
pub struct ReportTickAction {
    planner: ReportPlanner,
    dispatcher: Arc<ReportDispatcher>,
}

impl ReportTickAction {
    pub fn new(planner: ReportPlanner, dispatcher: Arc<ReportDispatcher>) -> Self {
        Self {
            planner,
            dispatcher,
        }
    }

    /// One evaluation pass with a single snapshot of `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<Vec<DispatchOutcome>> {
        let mut outcomes = Vec::new();
        for window in self.planner.due_windows(now) {
            let outcome = self.dispatcher.check_and_dispatch(&window, now).await?;
            match &outcome {
                DispatchOutcome::Delivered | DispatchOutcome::Failed(_) => {
                    info!(window = %window, %outcome, "Digest dispatch finished")
                }
                _ => debug!(window = %window, %outcome, "Digest dispatch checked"),
            }
            outcomes.push(outcome);
        }

        if let Some(next) = self.planner.next_report_time(now) {
            debug!(mode = %self.planner.mode(), next = %next, "Next digest boundary");
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl TickAction for ReportTickAction {
    fn name(&self) -> &str {
        "report"
    }

    async fn run(&self) -> Result<()> {
        self.run_at(Utc::now()).await.map(|_| ())
    }
}

/// Drives the arming policy on the main ticker.
pub struct PolicyTickAction {
    policy: Arc<ArmingPolicy>,
}

impl PolicyTickAction {
    pub fn new(policy: Arc<ArmingPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl TickAction for PolicyTickAction {
    fn name(&self) -> &str {
        "arming-policy"
    }

    async fn run(&self) -> Result<()> {
        let decision = self.policy.evaluate(Utc::now()).await;
        debug!(?decision, "Arming policy evaluated");
        Ok(())
    }
}

/// Drives the retry worker on the retry ticker.
pub struct RetryTickAction {
    worker: Arc<UnsentRetryWorker>,
}

impl RetryTickAction {
    pub fn new(worker: Arc<UnsentRetryWorker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl TickAction for RetryTickAction {
    fn name(&self) -> &str {
        "unsent-retry"
    }

    async fn run(&self) -> Result<()> {
        self.worker.retry_pending(Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::test_support::{RecordingSink, sqlite_repos};
    use chrono::{NaiveTime, TimeZone};
    use chrono_tz::Tz;

    fn calculator() -> TimeWindowCalculator {
        TimeWindowCalculator::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            Tz::UTC,
        )
        .unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, h, m, 0).unwrap()
    }

    #[test]
    fn test_immediate_has_no_digests() {
        let planner = ReportPlanner::new(calculator(), ReportMode::Immediate);
        assert!(planner.due_windows(at(2, 9, 0)).is_empty());
        assert!(planner.next_report_time(at(2, 9, 0)).is_none());
    }

    #[test]
    fn test_morning_only_owes_last_night() {
        let planner = ReportPlanner::new(calculator(), ReportMode::MorningOnly);
        let windows = planner.due_windows(at(2, 9, 0));
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start(), at(1, 23, 0));
        assert_eq!(windows[0].end(), at(2, 8, 0));
        assert_eq!(planner.next_report_time(at(2, 9, 0)), Some(at(3, 8, 0)));
    }

    #[test]
    fn test_morning_and_evening_owes_both() {
        let planner = ReportPlanner::new(calculator(), ReportMode::MorningAndEvening);
        let windows = planner.due_windows(at(2, 23, 30));
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start(), at(1, 23, 0));
        assert_eq!(windows[1].start(), at(2, 8, 0));
        assert_eq!(windows[1].end(), at(2, 23, 0));
        assert_eq!(planner.next_report_time(at(2, 23, 30)), Some(at(3, 8, 0)));
    }

    #[test]
    fn test_grace_delays_due_windows() {
        let planner = ReportPlanner::new(calculator(), ReportMode::MorningOnly)
            .with_ingest_grace(Duration::from_secs(140));

        // Inside the grace the previous night is still the one owed.
        let early = planner.due_windows(at(2, 8, 2));
        assert_eq!(early[0].end(), at(1, 8, 0));

        let due = planner.due_windows(at(2, 8, 3));
        assert_eq!(due[0].end(), at(2, 8, 0));

        let next = planner.next_report_time(at(2, 9, 0)).unwrap();
        assert_eq!(next, at(3, 8, 0) + TimeDelta::seconds(140));
    }

    #[tokio::test]
    async fn test_recording_ending_at_boundary_is_in_digest() {
        let (reports, videos) = sqlite_repos().await;
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(ReportDispatcher::new(
            reports,
            videos.clone(),
            sink.clone(),
        ));
        let action = ReportTickAction::new(
            ReportPlanner::new(calculator(), ReportMode::MorningOnly)
                .with_ingest_grace(Duration::from_secs(140)),
            dispatcher,
        );
        let boundary = at(2, 8, 0);
        let previous_night = TimeWindow::new(
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap(),
            at(1, 8, 0),
        )
        .unwrap();
        let last_night = TimeWindow::new(at(1, 23, 0), boundary).unwrap();

        // Ticks right after the boundary still only owe the previous night.
        let tick = action.run_at(boundary + TimeDelta::seconds(5)).await.unwrap();
        assert_eq!(tick, vec![DispatchOutcome::Delivered]);
        let tick = action.run_at(boundary + TimeDelta::seconds(60)).await.unwrap();
        assert_eq!(tick, vec![DispatchOutcome::AlreadyDelivered]);

        // The scanner registers a clip written 10 s before the boundary once
        // it has settled.
        videos
            .add_video(
                "/cam/late.mp4",
                Some("/cam/grabs/late.jpg"),
                boundary - TimeDelta::seconds(10),
            )
            .await
            .unwrap();

        let tick = action.run_at(boundary + TimeDelta::seconds(140)).await.unwrap();
        assert_eq!(tick, vec![DispatchOutcome::Delivered]);
        assert_eq!(
            sink.reports(),
            vec![(previous_night.key(), 0), (last_night.key(), 1)]
        );
    }

    #[tokio::test]
    async fn test_report_action_is_idempotent_across_ticks() {
        let (reports, videos) = sqlite_repos().await;
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(ReportDispatcher::new(reports, videos, sink.clone()));
        let action = ReportTickAction::new(
            ReportPlanner::new(calculator(), ReportMode::MorningOnly),
            dispatcher,
        );

        let first = action.run_at(at(2, 8, 1)).await.unwrap();
        assert_eq!(first, vec![DispatchOutcome::Delivered]);

        for minute in 2..30 {
            let again = action.run_at(at(2, 8, minute)).await.unwrap();
            assert_eq!(again, vec![DispatchOutcome::AlreadyDelivered]);
        }
        assert_eq!(sink.report_count(), 1);
    }
}
