//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use dvr_sentinel::actuator::Actuator;
use dvr_sentinel::database::models::VideoDbModel;
use dvr_sentinel::database::repositories::{
    ReportRepository, SqlxReportRepository, SqlxVideoRepository, VideoRepository,
};
use dvr_sentinel::database::{DbPool, init_pool, run_migrations};
use dvr_sentinel::domain::{TimeWindow, WindowKey};
use dvr_sentinel::notification::VideoSink;
use dvr_sentinel::{Error, Result};

/// Helper to create a test database pool with migrations applied.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

pub fn repos(pool: &DbPool) -> (Arc<dyn ReportRepository>, Arc<dyn VideoRepository>) {
    (
        Arc::new(SqlxReportRepository::new(pool.clone())),
        Arc::new(SqlxVideoRepository::new(pool.clone())),
    )
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// [2024-01-01T23:00, 2024-01-02T08:00)
pub fn night_of_jan_1() -> TimeWindow {
    TimeWindow::new(utc(2024, 1, 1, 23, 0), utc(2024, 1, 2, 8, 0)).unwrap()
}

/// Sink that records every call and fails a configurable number of times.
#[derive(Default)]
pub struct FakeSink {
    pub reports: Mutex<Vec<(WindowKey, Vec<String>)>>,
    pub videos: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
}

impl FakeSink {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(times),
            ..Default::default()
        }
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().len()
    }
}

#[async_trait]
impl VideoSink for FakeSink {
    fn sink_type(&self) -> &'static str {
        "fake"
    }

    async fn send_report(&self, videos: &[VideoDbModel], window: &TimeWindow) -> Result<()> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::sink("sink offline"));
        }
        self.reports.lock().push((
            window.key(),
            videos.iter().map(|v| v.file_name().to_string()).collect(),
        ));
        Ok(())
    }

    async fn send_video(&self, video: &VideoDbModel) -> Result<()> {
        self.videos.lock().push(video.path.clone());
        Ok(())
    }
}

/// Actuator that records arm/disarm commands.
pub struct FakeActuator {
    pub armed: AtomicBool,
    pub reachable: AtomicBool,
    pub commands: Mutex<Vec<bool>>,
}

impl FakeActuator {
    pub fn new(armed: bool) -> Self {
        Self {
            armed: AtomicBool::new(armed),
            reachable: AtomicBool::new(true),
            commands: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Actuator for FakeActuator {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn get_arm_state(&self) -> Result<bool> {
        Ok(self.armed.load(Ordering::SeqCst))
    }

    async fn set_arm_state(&self, armed: bool) -> Result<()> {
        self.commands.lock().push(armed);
        self.armed.store(armed, Ordering::SeqCst);
        Ok(())
    }
}
