pub mod checkout;
pub mod config;
pub mod geofences;
pub mod init;
pub mod log;
pub mod replay;
pub mod select;
pub mod status;

use crate::api::StaticToken;
use crate::api::http::HttpBackend;
use crate::config::Config;
use crate::core::sampler::LocationSource;
use crate::core::sync::RetryPolicy;
use crate::core::{AttendanceTracker, TrackerDeps};
use crate::db::StateStore;
use crate::errors::{AppError, AppResult};
use crate::models::LocationSample;
use crate::utils::SystemClock;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The CLI has no positioning hardware; commands built on this never sample.
struct NoLocationProvider;

#[async_trait]
impl LocationSource for NoLocationProvider {
    async fn next_sample(&self) -> AppResult<LocationSample> {
        Err(AppError::SignalUnavailable(
            "no location provider in CLI mode".into(),
        ))
    }
}

pub(crate) fn open_store(cfg: &Config) -> AppResult<Arc<StateStore>> {
    Ok(Arc::new(StateStore::open(&cfg.database, &cfg.user_key)?))
}

/// Tracker wired to the configured HTTP backend.
pub(crate) fn online_tracker(cfg: &Config) -> AppResult<AttendanceTracker> {
    let backend = HttpBackend::new(
        &cfg.api_base_url,
        Arc::new(StaticToken(cfg.api_token.clone())),
        Duration::from_secs(cfg.sync.request_timeout_secs),
    )?;

    let deps = TrackerDeps {
        backend: Arc::new(backend),
        source: Arc::new(NoLocationProvider),
        store: open_store(cfg)?,
        clock: Arc::new(SystemClock),
    };

    Ok(AttendanceTracker::new(
        deps,
        cfg.tracker.clone(),
        RetryPolicy::from(&cfg.sync),
    ))
}
