//! Service container for dependency injection.
//!
//! The ServiceContainer builds every collaborator from the configuration,
//! registers the tick actions and manages the lifecycle of both tickers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::actuator::{Actuator, AgentDvrClient};
use crate::config::AppConfig;
use crate::database::repositories::{
    ReportRepository, SqlxReportRepository, SqlxVideoRepository, VideoRepository,
};
use crate::ingest::{FolderScanner, VideoIngest};
use crate::notification::{TelegramSink, VideoSink};
use crate::schedule::{
    ArmingPolicy, PeriodicTicker, PolicyTickAction, ReportDispatcher, ReportPlanner,
    ReportTickAction, RetryTickAction, UnsentRetryWorker,
};

/// Default shutdown timeout.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool.
    pub pool: SqlitePool,
    pub reports: Arc<dyn ReportRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub dispatcher: Arc<ReportDispatcher>,
    pub retry_worker: Arc<UnsentRetryWorker>,
    pub ingest: Arc<VideoIngest>,
    /// Present only when an actuator is configured.
    pub policy: Option<Arc<ArmingPolicy>>,
    main_ticker: PeriodicTicker,
    retry_ticker: PeriodicTicker,
    main_interval: Duration,
    retry_interval: Duration,
    /// Cancellation token for graceful shutdown.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Create a container with the Telegram sink and, if configured, the
    /// AgentDVR actuator.
    pub fn new(pool: SqlitePool, config: &AppConfig) -> Result<Self> {
        let sink: Arc<dyn VideoSink> =
            Arc::new(TelegramSink::new(config.telegram.clone(), config.tz()?)?);
        let actuator: Option<Arc<dyn Actuator>> = match &config.dvr {
            Some(dvr) => Some(Arc::new(AgentDvrClient::new(dvr.clone())?)),
            None => None,
        };
        Self::with_collaborators(pool, config, sink, actuator)
    }

    /// Create a container around the given sink and actuator.
    pub fn with_collaborators(
        pool: SqlitePool,
        config: &AppConfig,
        sink: Arc<dyn VideoSink>,
        actuator: Option<Arc<dyn Actuator>>,
    ) -> Result<Self> {
        info!("Initializing service container");

        let calculator = config.calculator()?;
        let cancellation_token = CancellationToken::new();

        let reports: Arc<dyn ReportRepository> = Arc::new(SqlxReportRepository::new(pool.clone()));
        let videos: Arc<dyn VideoRepository> = Arc::new(SqlxVideoRepository::new(pool.clone()));

        let dispatcher = Arc::new(ReportDispatcher::new(
            reports.clone(),
            videos.clone(),
            sink.clone(),
        ));
        let retry_worker = Arc::new(UnsentRetryWorker::new(
            reports.clone(),
            dispatcher.clone(),
            config.retry_backoff.clone(),
        ));
        let ingest = Arc::new(VideoIngest::new(
            videos.clone(),
            sink.clone(),
            config.report_mode,
        ));

        let policy = actuator.map(|actuator| {
            Arc::new(ArmingPolicy::new(
                actuator,
                calculator.clone(),
                config.force_armed_at_day,
                config.force_armed_at_night,
            ))
        });

        let main_ticker = PeriodicTicker::with_cancellation("main", cancellation_token.clone())
            .with_shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT);
        let retry_ticker = PeriodicTicker::with_cancellation("retry", cancellation_token.clone())
            .with_shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT);

        let planner = ReportPlanner::new(calculator, config.report_mode)
            .with_ingest_grace(config.ingest_grace());
        main_ticker.register(Arc::new(ReportTickAction::new(planner, dispatcher.clone())))?;

        match &policy {
            Some(policy) => main_ticker.register(Arc::new(PolicyTickAction::new(policy.clone())))?,
            None => info!("No actuator configured, arming policy disabled"),
        }

        if !config.watch_folders.is_empty() {
            let scanner = FolderScanner::new(config.watch_folders.clone(), ingest.clone())
                .with_settle_delay(config.settle_delay());
            main_ticker.register(Arc::new(scanner))?;
        }

        retry_ticker.register(Arc::new(RetryTickAction::new(retry_worker.clone())))?;

        info!(
            report_mode = %config.report_mode,
            watch_folders = config.watch_folders.len(),
            "Service container initialized"
        );

        Ok(Self {
            pool,
            reports,
            videos,
            dispatcher,
            retry_worker,
            ingest,
            policy,
            main_ticker,
            retry_ticker,
            main_interval: config.main_tick_interval(),
            retry_interval: config.retry_tick_interval(),
            cancellation_token,
        })
    }

    /// Send anything left unsent by a previous run, then start both tickers.
    pub async fn start(&self) -> Result<()> {
        info!("Starting services");

        match self.retry_worker.retry_pending(Utc::now()).await {
            Ok(summary) => info!(
                delivered = summary.delivered,
                failed = summary.failed,
                "Startup retry pass finished"
            ),
            Err(e) => warn!("Startup retry pass failed: {}", e),
        }

        self.main_ticker.start(Duration::ZERO, self.main_interval)?;
        self.retry_ticker.start(self.retry_interval, self.retry_interval)?;

        info!("Services started");
        Ok(())
    }

    /// Shutdown all services gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down services");

        // Signal all background tasks to stop
        self.cancellation_token.cancel();

        self.main_ticker.stop().await;
        self.retry_ticker.stop().await;

        info!("Closing database pool...");
        self.pool.close().await;

        info!("Services shut down");
        Ok(())
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
