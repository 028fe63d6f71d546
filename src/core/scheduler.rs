//! Periodic driver of tracking cycles.
//!
//! The scheduler only knows how to call `run_cycle` at a fixed cadence and
//! how to stop doing so. What a cycle does lives in the tracker; a platform
//! adapter that owns its own wake-ups can skip the scheduler entirely and
//! call `AttendanceTracker::tick()` instead.

use super::containment::ContainmentEvent;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A sample was evaluated.
    Evaluated(ContainmentEvent),
    /// No usable fix arrived within the sample timeout.
    NoFix,
    /// Another cycle was still running.
    Skipped,
    /// Tracking stopped while waiting for a fix.
    Cancelled,
}

#[async_trait]
pub trait CycleDriver: Clone + Send + Sync + 'static {
    async fn run_cycle(&self, cancel: &CancellationToken) -> AppResult<TickOutcome>;

    /// The loop ended on its own (location permission revoked).
    async fn tracking_disabled(&self, reason: &str);
}

struct RunningLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BackgroundScheduler {
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl BackgroundScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.handle.is_finished())
    }

    /// Start cycling. Returns false when a loop is already running and an
    /// error when there is no tokio runtime to run it on.
    pub fn start<D: CycleDriver>(&self, driver: D) -> AppResult<bool> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AppError::Other(format!("cannot start tracking: {e}")))?;
        let mut running = self.running.lock().unwrap_or_else(|p| p.into_inner());
        if running
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.handle.is_finished())
        {
            debug!("scheduler already running");
            return Ok(false);
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_loop(driver, self.interval, cancel.clone()));
        *running = Some(RunningLoop { cancel, handle });
        info!("location tracking started (every {:?})", self.interval);
        Ok(true)
    }

    /// Stop cycling. A cycle already past its sample wait finishes on its
    /// own; nothing is aborted mid-request. Returns false when not running.
    pub fn stop(&self) -> bool {
        let taken = self
            .running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();

        match taken {
            Some(r) if !r.cancel.is_cancelled() && !r.handle.is_finished() => {
                r.cancel.cancel();
                info!("location tracking stopped");
                true
            }
            _ => false,
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        if let Some(r) = self.running.get_mut().unwrap_or_else(|p| p.into_inner()).take() {
            r.cancel.cancel();
        }
    }
}

async fn run_loop<D: CycleDriver>(driver: D, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = driver.run_cycle(&cancel) => res,
        };

        match result {
            Ok(outcome) => debug!("cycle finished: {outcome:?}"),
            Err(AppError::PermissionDenied(reason)) => {
                warn!("location permission denied, tracking disabled: {reason}");
                driver.tracking_disabled(&reason).await;
                break;
            }
            Err(e) => error!("tracking cycle failed: {e}"),
        }
    }

    debug!("scheduler loop exited");
}
