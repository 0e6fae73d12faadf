//! Fixed-interval action runner.
//!
//! A [`PeriodicTicker`] owns a list of actions and a tick loop. On every tick
//! each action is spawned as its own task. An action whose previous run has not
//! finished yet is skipped for that tick, so no action ever overlaps with
//! itself, and a slow action never holds back the others.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use crate::{Error, Result};

/// Default time `stop` waits for in-flight actions.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Work executed on every tick.
#[async_trait]
pub trait TickAction: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// A [`TickAction`] backed by an async closure.
pub struct FnAction<F> {
    name: String,
    f: F,
}

impl<F, Fut> FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> TickAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        (self.f)().await
    }
}

#[derive(Clone)]
struct RegisteredAction {
    action: Arc<dyn TickAction>,
    in_flight: Arc<AtomicBool>,
}

/// Runs registered actions at a fixed interval until stopped.
pub struct PeriodicTicker {
    name: String,
    actions: Mutex<Vec<RegisteredAction>>,
    cancellation_token: CancellationToken,
    tracker: TaskTracker,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl PeriodicTicker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_cancellation(name, CancellationToken::new())
    }

    /// Create a ticker that also stops when `parent` is cancelled.
    pub fn with_cancellation(name: impl Into<String>, parent: CancellationToken) -> Self {
        Self {
            name: name.into(),
            actions: Mutex::new(Vec::new()),
            cancellation_token: parent.child_token(),
            tracker: TaskTracker::new(),
            loop_handle: Mutex::new(None),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add an action. Only actions registered before `start` are run.
    pub fn register(&self, action: Arc<dyn TickAction>) -> Result<()> {
        if self.loop_handle.lock().is_some() {
            return Err(Error::validation(format!(
                "ticker '{}' already started, cannot register '{}'",
                self.name,
                action.name()
            )));
        }

        debug!(ticker = %self.name, action = %action.name(), "Registered tick action");
        self.actions.lock().push(RegisteredAction {
            action,
            in_flight: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.loop_handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Start the tick loop. The first tick fires after `initial_delay`.
    pub fn start(&self, initial_delay: Duration, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::validation(format!(
                "ticker '{}' interval must be positive",
                self.name
            )));
        }

        let mut loop_handle = self.loop_handle.lock();
        if loop_handle.is_some() {
            return Err(Error::validation(format!(
                "ticker '{}' already started",
                self.name
            )));
        }

        let actions = self.actions.lock().clone();
        let name = self.name.clone();
        let token = self.cancellation_token.clone();
        let tracker = self.tracker.clone();

        info!(
            ticker = %name,
            actions = actions.len(),
            initial_delay_ms = initial_delay.as_millis() as u64,
            interval_ms = interval.as_millis() as u64,
            "Starting ticker"
        );

        *loop_handle = Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        for registered in &actions {
                            spawn_action(&name, &tracker, registered);
                        }
                    }
                }
            }

            debug!(ticker = %name, "Tick loop exited");
        }));

        Ok(())
    }

    /// Stop ticking and wait for in-flight actions, up to the shutdown timeout.
    pub async fn stop(&self) {
        self.cancellation_token.cancel();

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(ticker = %self.name, "Tick loop ended abnormally: {}", e);
        }

        self.tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                ticker = %self.name,
                in_flight = self.tracker.len(),
                "Abandoning tick actions still running after shutdown timeout"
            );
        }

        info!(ticker = %self.name, "Ticker stopped");
    }
}

fn spawn_action(ticker: &str, tracker: &TaskTracker, registered: &RegisteredAction) {
    if registered
        .in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        debug!(
            ticker,
            action = %registered.action.name(),
            "Previous run still in flight, skipping tick"
        );
        return;
    }

    let ticker = ticker.to_string();
    let action = registered.action.clone();
    let in_flight = registered.in_flight.clone();

    tracker.spawn(async move {
        let result = AssertUnwindSafe(action.run()).catch_unwind().await;
        match result {
            Ok(Ok(())) => {
                trace!(ticker = %ticker, action = %action.name(), "Tick action completed")
            }
            Ok(Err(e)) => warn!(
                ticker = %ticker,
                action = %action.name(),
                "Tick action failed: {}", e
            ),
            Err(payload) => error!(
                ticker = %ticker,
                action = %action.name(),
                "Tick action panicked: {}", panic_message(payload.as_ref())
            ),
        }
        in_flight.store(false, Ordering::Release);
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "<non-string panic payload>".to_string()
}
