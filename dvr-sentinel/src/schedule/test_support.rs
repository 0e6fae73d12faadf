//! In-memory collaborators for scheduler unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::actuator::Actuator;
use crate::database::models::{ReportRecordDbModel, VideoDbModel};
use crate::database::repositories::{
    ReportRepository, SqlxReportRepository, SqlxVideoRepository, VideoRepository,
};
use crate::database::time::datetime_to_ms;
use crate::database::{init_pool, run_migrations};
use crate::domain::{TimeWindow, WindowKey};
use crate::notification::VideoSink;
use crate::{Error, Result};

pub async fn sqlite_repos() -> (Arc<dyn ReportRepository>, Arc<dyn VideoRepository>) {
    let pool = init_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    (
        Arc::new(SqlxReportRepository::new(pool.clone())),
        Arc::new(SqlxVideoRepository::new(pool)),
    )
}

/// Sink that records calls and can fail a set number of times.
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(WindowKey, usize)>>,
    videos: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    delay: Option<Duration>,
}

impl RecordingSink {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reports(&self) -> Vec<(WindowKey, usize)> {
        self.reports.lock().clone()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn videos(&self) -> Vec<String> {
        self.videos.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VideoSink for RecordingSink {
    fn sink_type(&self) -> &'static str {
        "recording"
    }

    async fn send_report(&self, videos: &[VideoDbModel], window: &TimeWindow) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.take_failure() {
            return Err(Error::sink("injected failure"));
        }
        self.reports.lock().push((window.key(), videos.len()));
        Ok(())
    }

    async fn send_video(&self, video: &VideoDbModel) -> Result<()> {
        if self.take_failure() {
            return Err(Error::sink("injected failure"));
        }
        self.videos.lock().push(video.path.clone());
        Ok(())
    }
}

/// Report store kept in a vector, able to simulate outages and bad rows.
#[derive(Default)]
pub struct MemoryReportRepository {
    records: Mutex<Vec<ReportRecordDbModel>>,
    unavailable: AtomicBool,
}

impl MemoryReportRepository {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// A delivered row without `delivered_at`.
    pub fn insert_corrupted_delivered(&self, window: &TimeWindow) {
        let key = window.key();
        let mut records = self.records.lock();
        let id = records.len() as i64 + 1;
        records.push(ReportRecordDbModel {
            id,
            window_start: key.start_ms,
            window_end: key.end_ms,
            delivered: true,
            attempt_count: 1,
            attempted_at: key.end_ms,
            delivered_at: None,
            failure_reason: None,
            created_at: key.end_ms,
        });
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Database("store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn get_record(&self, window: &TimeWindow) -> Result<Option<ReportRecordDbModel>> {
        self.check_available()?;
        let key = window.key();
        Ok(self.records.lock().iter().find(|r| r.key() == key).cloned())
    }

    async fn create_pending(
        &self,
        window: &TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<ReportRecordDbModel> {
        self.check_available()?;
        let key = window.key();
        let mut records = self.records.lock();
        if let Some(existing) = records.iter().find(|r| r.key() == key) {
            return Ok(existing.clone());
        }
        let record = ReportRecordDbModel {
            id: records.len() as i64 + 1,
            window_start: key.start_ms,
            window_end: key.end_ms,
            delivered: false,
            attempt_count: 0,
            attempted_at: datetime_to_ms(now),
            delivered_at: None,
            failure_reason: None,
            created_at: datetime_to_ms(now),
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn mark_delivered(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("ReportRecord", id.to_string()))?;
        if !record.delivered {
            record.delivered = true;
            record.delivered_at = Some(datetime_to_ms(at));
            record.attempted_at = datetime_to_ms(at);
            record.failure_reason = None;
            record.attempt_count += 1;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, reason: &str, at: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::not_found("ReportRecord", id.to_string()))?;
        if !record.delivered {
            record.failure_reason = Some(reason.to_string());
            record.attempted_at = datetime_to_ms(at);
            record.attempt_count += 1;
        }
        Ok(())
    }

    async fn list_undelivered(&self) -> Result<Vec<ReportRecordDbModel>> {
        self.check_available()?;
        let mut pending: Vec<_> = self
            .records
            .lock()
            .iter()
            .filter(|r| !r.delivered)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.window_start, r.id));
        Ok(pending)
    }
}

/// Actuator with a settable arm state that records every command.
pub struct FakeActuator {
    reachable: AtomicBool,
    armed: AtomicBool,
    fail_commands: AtomicBool,
    commands: Mutex<Vec<bool>>,
}

impl FakeActuator {
    pub fn new(armed: bool) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            armed: AtomicBool::new(armed),
            fail_commands: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn set_fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Simulate a manual change on the device.
    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<bool> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl Actuator for FakeActuator {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn get_arm_state(&self) -> Result<bool> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::actuator("unreachable"));
        }
        Ok(self.armed.load(Ordering::SeqCst))
    }

    async fn set_arm_state(&self, armed: bool) -> Result<()> {
        self.commands.lock().push(armed);
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(Error::actuator("command rejected"));
        }
        self.armed.store(armed, Ordering::SeqCst);
        Ok(())
    }
}
