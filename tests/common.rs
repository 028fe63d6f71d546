#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use rgeoattend::api::offline::OfflineBackend;
use rgeoattend::api::{AttendanceBackend, CheckInRequest, CheckOutRequest, Confirmation};
use rgeoattend::config::TrackerSettings;
use rgeoattend::core::sampler::LocationSource;
use rgeoattend::core::sync::RetryPolicy;
use rgeoattend::core::{AttendanceTracker, TickOutcome, TrackerDeps};
use rgeoattend::db::StateStore;
use rgeoattend::errors::{AppError, AppResult};
use rgeoattend::models::{AttendanceStatus, GeofenceRecord, LocationSample};
use rgeoattend::utils::ManualClock;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn rti() -> Command {
    cargo_bin_cmd!("rgeoattend")
}

/// Create a unique test DB path inside the system temp dir and remove any existing file
pub fn setup_test_db(name: &str) -> String {
    let mut path: PathBuf = env::temp_dir();
    path.push(format!("{}_rgeoattend.sqlite", name));
    let db_path = path.to_string_lossy().to_string();
    fs::remove_file(&db_path).ok();
    db_path
}

pub fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
        .to_string_lossy()
        .to_string()
}

pub fn office_geofences() -> Vec<GeofenceRecord> {
    serde_json::from_str(include_str!("data/office_geofences.json")).expect("geofence fixture")
}

// ---------------------------------------------------------------
// Positions
// ---------------------------------------------------------------

pub const HQ_INSIDE: (f64, f64) = (1.3000, 103.8000);
pub const HQ_OUTSIDE: (f64, f64) = (1.3100, 103.8100);
pub const WAREHOUSE_INSIDE: (f64, f64) = (1.3500, 103.8500);

pub fn morning() -> DateTime<Local> {
    Local.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap()
}

// ---------------------------------------------------------------
// Location source fed by the test
// ---------------------------------------------------------------

pub struct ChannelSource {
    tx: mpsc::UnboundedSender<LocationSample>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<LocationSample>>,
    denied: AtomicBool,
    releases: AtomicUsize,
}

impl ChannelSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            denied: AtomicBool::new(false),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, sample: LocationSample) {
        self.tx.send(sample).expect("receiver alive");
    }

    pub fn deny(&self) {
        self.denied.store(true, Ordering::SeqCst);
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for ChannelSource {
    async fn next_sample(&self) -> AppResult<LocationSample> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(AppError::PermissionDenied("revoked in settings".into()));
        }
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| AppError::SignalUnavailable("source closed".into()))
    }

    async fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------
// Backend with failure injection
// ---------------------------------------------------------------

/// `OfflineBackend` plus switches for the failure modes the tracker has to
/// survive. Counters of the inner backend only see requests that got through.
pub struct ScriptedBackend {
    pub inner: OfflineBackend,
    offline: AtomicBool,
    check_in_conflicts: AtomicUsize,
    check_out_delay: Mutex<Option<Duration>>,
    check_in_delay: Mutex<Option<Duration>>,
    status_delay: Mutex<Option<Duration>>,
    status_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(records: Vec<GeofenceRecord>, clock: Arc<ManualClock>) -> Self {
        Self {
            inner: OfflineBackend::new(records, chrono::Duration::hours(6), clock),
            offline: AtomicBool::new(false),
            check_in_conflicts: AtomicUsize::new(0),
            check_out_delay: Mutex::new(None),
            check_in_delay: Mutex::new(None),
            status_delay: Mutex::new(None),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reject_next_check_ins(&self, n: usize) {
        self.check_in_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn delay_check_out(&self, by: Duration) {
        *self.check_out_delay.lock().unwrap() = Some(by);
    }

    pub fn delay_check_in(&self, by: Duration) {
        *self.check_in_delay.lock().unwrap() = Some(by);
    }

    pub fn delay_status(&self, by: Duration) {
        *self.status_delay.lock().unwrap() = Some(by);
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn reachable(&self) -> AppResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::NetworkFailure("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttendanceBackend for ScriptedBackend {
    async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>> {
        self.reachable()?;
        self.inner.fetch_geofences().await
    }

    async fn check_in(&self, request: &CheckInRequest) -> AppResult<Confirmation> {
        self.reachable()?;
        let delay = *self.check_in_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let pending = self.check_in_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.check_in_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::ServerConflict("check-in refused".into()));
        }
        self.inner.check_in(request).await
    }

    async fn check_out(&self, request: &CheckOutRequest) -> AppResult<Confirmation> {
        self.reachable()?;
        let delay = *self.check_out_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.inner.check_out(request).await
    }

    async fn attendance_status(&self) -> AppResult<AttendanceStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.reachable()?;
        let delay = *self.status_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        self.inner.attendance_status().await
    }
}

// ---------------------------------------------------------------
// Tracker harness
// ---------------------------------------------------------------

pub struct Harness {
    pub tracker: AttendanceTracker,
    pub backend: Arc<ScriptedBackend>,
    pub clock: Arc<ManualClock>,
    pub source: Arc<ChannelSource>,
    pub store: Arc<StateStore>,
}

pub fn retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_backoff_ms: 10,
    }
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(morning()));
        let backend = Arc::new(ScriptedBackend::new(office_geofences(), clock.clone()));
        let store = Arc::new(StateStore::open_in_memory("alice@hq").unwrap());
        Self::build(backend, clock, store, TrackerSettings::default())
    }

    pub fn with_settings(settings: TrackerSettings) -> Self {
        let clock = Arc::new(ManualClock::new(morning()));
        let backend = Arc::new(ScriptedBackend::new(office_geofences(), clock.clone()));
        let store = Arc::new(StateStore::open_in_memory("alice@hq").unwrap());
        Self::build(backend, clock, store, settings)
    }

    pub fn build(
        backend: Arc<ScriptedBackend>,
        clock: Arc<ManualClock>,
        store: Arc<StateStore>,
        settings: TrackerSettings,
    ) -> Self {
        let source = Arc::new(ChannelSource::new());
        let deps = TrackerDeps {
            backend: backend.clone(),
            source: source.clone(),
            store: store.clone(),
            clock: clock.clone(),
        };
        let tracker = AttendanceTracker::new(deps, settings, retry());
        Self {
            tracker,
            backend,
            clock,
            source,
            store,
        }
    }

    /// Same database, backend and clock: what the next process would see.
    pub fn restart(&self) -> Self {
        Self::build(
            self.backend.clone(),
            self.clock.clone(),
            self.store.clone(),
            TrackerSettings::default(),
        )
    }

    pub fn push_at(&self, (lat, lon): (f64, f64), accuracy: f64) {
        self.source
            .push(LocationSample::new(lat, lon, accuracy, self.clock.now_local()));
    }

    /// One sample at the current clock time, then one cycle.
    pub async fn feed(&self, position: (f64, f64), accuracy: f64) -> TickOutcome {
        self.push_at(position, accuracy);
        self.tracker.tick().await.expect("tick")
    }

    pub async fn feed_n(&self, n: usize, position: (f64, f64)) -> TickOutcome {
        let mut last = TickOutcome::NoFix;
        for _ in 0..n {
            self.clock.advance(chrono::Duration::seconds(30));
            last = self.feed(position, 10.0).await;
        }
        last
    }
}

/// Let every other ready task run until it blocks again.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// `Clock::now` without importing the trait in every test file.
pub trait NowLocal {
    fn now_local(&self) -> DateTime<Local>;
}

impl NowLocal for ManualClock {
    fn now_local(&self) -> DateTime<Local> {
        use rgeoattend::utils::Clock;
        self.now()
    }
}
