//! Location sampling.
//!
//! `LocationSource` is the seam to the platform adapter (GPS / fused
//! provider). `LocationSampler` wraps a source with a timeout and liveness
//! tracking. `ReplaySource` feeds a recorded track, used by the `replay`
//! command and by tests.

use crate::errors::{AppError, AppResult};
use crate::models::LocationSample;
use crate::utils::clock::ManualClock;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Wait for the next fix.
    ///
    /// `PermissionDenied` when location access is refused,
    /// `SignalUnavailable` when no fix can be produced right now.
    async fn next_sample(&self) -> AppResult<LocationSample>;

    /// Release OS location resources. Called when tracking stops.
    async fn release(&self) {}
}

pub struct LocationSampler {
    source: Arc<dyn LocationSource>,
    timeout: Duration,
    last_fix_at: Mutex<Option<DateTime<Local>>>,
}

impl LocationSampler {
    pub fn new(source: Arc<dyn LocationSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            last_fix_at: Mutex::new(None),
        }
    }

    /// `Ok(None)` when no fix arrived in time; only permission problems are errors.
    /// Every fix, accurate or not, advances liveness.
    pub async fn sample(&self) -> AppResult<Option<LocationSample>> {
        match tokio::time::timeout(self.timeout, self.source.next_sample()).await {
            Err(_) => {
                debug!("no location fix within {:?}", self.timeout);
                Ok(None)
            }
            Ok(Err(AppError::SignalUnavailable(reason))) => {
                debug!("location unavailable: {reason}");
                Ok(None)
            }
            Ok(Err(e @ AppError::PermissionDenied(_))) => Err(e),
            Ok(Err(e)) => {
                warn!("location source error: {e}");
                Ok(None)
            }
            Ok(Ok(sample)) => {
                let mut guard = self.last_fix_at.lock().unwrap_or_else(|p| p.into_inner());
                *guard = Some(sample.captured_at);
                Ok(Some(sample))
            }
        }
    }

    /// Capture time of the most recent fix, usable or not.
    pub fn last_fix_at(&self) -> Option<DateTime<Local>> {
        *self.last_fix_at.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub async fn release(&self) {
        self.source.release().await;
    }
}

/// Replays a recorded track, one sample per call.
///
/// When a clock is attached it is moved to each sample's `captured_at`,
/// so cooldowns and day boundaries follow the recording.
pub struct ReplaySource {
    samples: Mutex<VecDeque<LocationSample>>,
    clock: Option<Arc<ManualClock>>,
    released: Mutex<bool>,
}

impl ReplaySource {
    pub fn new(samples: Vec<LocationSample>) -> Self {
        Self {
            samples: Mutex::new(samples.into()),
            clock: None,
            released: Mutex::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<ManualClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn remaining(&self) -> usize {
        self.samples.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl LocationSource for ReplaySource {
    async fn next_sample(&self) -> AppResult<LocationSample> {
        let next = self
            .samples
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front();

        match next {
            Some(sample) => {
                if let Some(clock) = &self.clock {
                    clock.set(sample.captured_at);
                }
                Ok(sample)
            }
            None => Err(AppError::SignalUnavailable("replay track exhausted".into())),
        }
    }

    async fn release(&self) {
        *self.released.lock().unwrap_or_else(|p| p.into_inner()) = true;
    }
}
