//! `AttendanceTracker`: the handle UI code and platform adapters talk to.
//!
//! One engine (geofences, containment, state machine, sync queue) sits behind
//! an async mutex; every mutation goes through it, so a background cycle and
//! a manual checkout never interleave their effects. Readers never touch the
//! engine: they get the last published `TrackerSnapshot` from a watch channel.
//!
//! Cycle flow:
//!   1. make sure local state was rehydrated and geofences are fresh
//!   2. wait for a fix (engine unlocked, cancellable)
//!   3. evaluate → transition → sync
//!
//! Steps 1 and 3 run detached from the scheduler, so a stop never aborts a
//! request already in flight.

use super::containment::{ContainmentEvent, ContainmentTracker, HysteresisPolicy};
use super::geometry;
use super::machine::AttendanceStateMachine;
use super::sampler::{LocationSampler, LocationSource};
use super::scheduler::{BackgroundScheduler, CycleDriver, TickOutcome};
use super::store::GeofenceStore;
use super::sync::{RetryPolicy, SyncOutcome, SyncService};
use crate::api::AttendanceBackend;
use crate::config::TrackerSettings;
use crate::db::StateStore;
use crate::errors::{AppError, AppResult};
use crate::models::{AttendanceStatus, Geofence, GeofenceId, LocationSample, TransitionIntent};
use crate::utils::clock::Clock;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio_util::sync::CancellationToken;

/// Conflicts in a row before the user is told something is off.
const CONFLICT_ALERT_THRESHOLD: u32 = 2;

pub struct TrackerDeps {
    pub backend: Arc<dyn AttendanceBackend>,
    pub source: Arc<dyn LocationSource>,
    pub store: Arc<StateStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerAlert {
    PermissionDenied(String),
    RepeatedConflict(String),
}

/// Read-only view published after every state change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerSnapshot {
    pub status: AttendanceStatus,
    pub current_geofence: Option<Geofence>,
    pub selected_geofence: Option<GeofenceId>,
    pub tracking: bool,
    pub alert: Option<TrackerAlert>,
}

struct Engine {
    geofences: GeofenceStore,
    containment: ContainmentTracker,
    machine: AttendanceStateMachine,
    sync: SyncService,
    selected: Option<GeofenceId>,
    rehydrated: bool,
    /// Backend truth adopted at least once since start.
    verified: bool,
    conflicts: u32,
    alert: Option<TrackerAlert>,
}

struct Shared {
    engine: Mutex<Engine>,
    view: watch::Sender<TrackerSnapshot>,
    sampler: LocationSampler,
    scheduler: BackgroundScheduler,
    store: Arc<StateStore>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    cycle_gate: Arc<Mutex<()>>,
    // manual checkout bookkeeping
    manual_waiting: AtomicUsize,
    manual_generation: AtomicU64,
    last_manual: StdMutex<Option<Result<AttendanceStatus, String>>>,
}

#[derive(Clone)]
pub struct AttendanceTracker {
    inner: Arc<Shared>,
}

/// Marks a manual checkout as waiting for the engine while alive.
struct ManualWaiting<'a>(&'a AtomicUsize);

impl<'a> ManualWaiting<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for ManualWaiting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AttendanceTracker {
    pub fn new(deps: TrackerDeps, settings: TrackerSettings, retry: RetryPolicy) -> Self {
        let policy = HysteresisPolicy {
            required_samples: settings.hysteresis_samples.max(1),
            accuracy_ceiling_m: settings.accuracy_ceiling_m,
        };
        let engine = Engine {
            geofences: GeofenceStore::new(),
            containment: ContainmentTracker::new(policy),
            machine: AttendanceStateMachine::new(settings.cooldown())
                .with_reentry_after_exit(settings.reentry_after_exit),
            sync: SyncService::new(deps.backend, Arc::clone(&deps.store), retry),
            selected: None,
            rehydrated: false,
            verified: false,
            conflicts: 0,
            alert: None,
        };
        let (view, _) = watch::channel(TrackerSnapshot::default());

        Self {
            inner: Arc::new(Shared {
                engine: Mutex::new(engine),
                view,
                sampler: LocationSampler::new(deps.source, settings.sample_timeout()),
                scheduler: BackgroundScheduler::new(settings.tick_interval()),
                store: deps.store,
                clock: deps.clock,
                settings,
                cycle_gate: Arc::new(Mutex::new(())),
                manual_waiting: AtomicUsize::new(0),
                manual_generation: AtomicU64::new(0),
                last_manual: StdMutex::new(None),
            }),
        }
    }

    // ---------------------------------------------------------------
    // Accessors (never block on the engine)
    // ---------------------------------------------------------------

    pub fn attendance_status(&self) -> AttendanceStatus {
        self.inner.view.borrow().status.clone()
    }

    pub fn current_geofence(&self) -> Option<Geofence> {
        self.inner.view.borrow().current_geofence.clone()
    }

    pub fn selected_geofence(&self) -> Option<GeofenceId> {
        self.inner.view.borrow().selected_geofence
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.inner.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.inner.view.subscribe()
    }

    pub fn is_tracking(&self) -> bool {
        self.inner.scheduler.is_running()
    }

    pub fn last_fix_at(&self) -> Option<chrono::DateTime<chrono::Local>> {
        self.inner.sampler.last_fix_at()
    }

    /// Geofences currently used for evaluation.
    pub async fn geofences(&self) -> Vec<Geofence> {
        self.inner.engine.lock().await.geofences.snapshot().to_vec()
    }

    // ---------------------------------------------------------------
    // Commands
    // ---------------------------------------------------------------

    /// Begin periodic tracking. Calling it again while running does nothing.
    /// Fails outside a tokio runtime.
    pub fn start_location_tracking(&self) -> AppResult<bool> {
        let started = self.inner.scheduler.start(self.clone())?;
        if started {
            self.inner.store.audit("tracking_start", "location tracking started");
        }
        self.inner.view.send_modify(|s| s.tracking = true);
        Ok(started)
    }

    /// Stop periodic tracking and release the location source. Idempotent.
    pub async fn stop_location_tracking(&self) -> bool {
        let stopped = self.inner.scheduler.stop();
        if stopped {
            self.inner.sampler.release().await;
            self.inner.store.audit("tracking_stop", "location tracking stopped");
        }
        self.inner.view.send_modify(|s| s.tracking = false);
        stopped
    }

    /// Load the locally persisted state without contacting the backend.
    pub async fn restore(&self) -> AppResult<AttendanceStatus> {
        let mut engine = self.lock_engine(false).await;
        if !engine.rehydrated {
            self.restore_local(&mut engine)?;
        }
        let now = self.inner.clock.now();
        if engine.machine.roll_over(now) {
            self.persist(&engine);
            self.publish(&engine);
        }
        Ok(engine.machine.status(now))
    }

    /// Fetch the backend's view and adopt it. Pending intents are delivered
    /// first; whatever the server says afterwards wins.
    pub async fn verify_attendance_status(&self) -> AppResult<AttendanceStatus> {
        let mut engine = self.lock_engine(false).await;
        if !engine.rehydrated {
            self.restore_local(&mut engine)?;
        }
        self.reconcile(&mut engine).await
    }

    pub async fn refresh_geofences(&self) -> AppResult<usize> {
        let mut engine = self.lock_engine(false).await;
        let res = self.refresh_locked(&mut engine).await;
        self.publish(&engine);
        res
    }

    /// Pin a geofence for display. `None` clears the selection.
    pub async fn select_geofence(&self, id: Option<GeofenceId>) -> AppResult<()> {
        let mut engine = self.lock_engine(false).await;
        if !engine.rehydrated {
            self.restore_local(&mut engine)?;
        }
        if let Some(id) = id
            && !engine.geofences.is_empty()
            && engine.geofences.get(id).is_none()
        {
            return Err(AppError::UnknownGeofence(id));
        }

        self.inner.store.save_selected_geofence(id)?;
        engine.selected = id;
        self.publish(&engine);
        Ok(())
    }

    /// User-initiated checkout.
    ///
    /// Concurrent calls issue a single backend request: callers that arrive
    /// while one is in progress get its result. It also takes precedence over
    /// a cycle waiting to apply its own transition.
    pub async fn manual_check_out(&self) -> AppResult<AttendanceStatus> {
        let ticket = self.inner.manual_generation.load(Ordering::SeqCst);
        let mut engine = {
            let _waiting = ManualWaiting::enter(&self.inner.manual_waiting);
            self.inner.engine.lock().await
        };

        if self.inner.manual_generation.load(Ordering::SeqCst) != ticket {
            debug!("manual checkout coalesced with the one just completed");
            let last = self
                .inner
                .last_manual
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone();
            if let Some(result) = last {
                return result.map_err(AppError::CommandFailed);
            }
        }

        let result = self.manual_check_out_locked(&mut engine).await;
        {
            let mut last = self.inner.last_manual.lock().unwrap_or_else(|p| p.into_inner());
            *last = Some(result.as_ref().map(Clone::clone).map_err(ToString::to_string));
        }
        self.inner.manual_generation.fetch_add(1, Ordering::SeqCst);
        result
    }

    /// Run one cycle now. Returns `Skipped` if a cycle is already running.
    pub async fn tick(&self) -> AppResult<TickOutcome> {
        self.cycle(&CancellationToken::new()).await
    }

    // ---------------------------------------------------------------
    // Cycle
    // ---------------------------------------------------------------

    async fn cycle(&self, cancel: &CancellationToken) -> AppResult<TickOutcome> {
        let Ok(gate) = Arc::clone(&self.inner.cycle_gate).try_lock_owned() else {
            debug!("previous cycle still running, skipping tick");
            return Ok(TickOutcome::Skipped);
        };

        // Rehydration may flush pending intents; those requests finish even if
        // tracking stops while they are in flight.
        let this = self.clone();
        let gate = tokio::spawn(async move {
            {
                let mut engine = this.lock_engine(true).await;
                this.prepare(&mut engine).await;
            }
            gate
        })
        .await
        .map_err(|e| AppError::Other(format!("tracking cycle task failed: {e}")))?;

        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TickOutcome::Cancelled),
            res = self.inner.sampler.sample() => res,
        };

        let sample = match sample {
            Ok(Some(sample)) => sample,
            Ok(None) => return Ok(TickOutcome::NoFix),
            Err(e @ AppError::PermissionDenied(_)) => {
                self.raise_alert(TrackerAlert::PermissionDenied(e.to_string()))
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        // From here on the cycle completes even if tracking is stopped.
        let this = self.clone();
        let task = tokio::spawn(async move {
            let _gate = gate;
            this.process_sample(sample).await
        });
        task.await
            .map_err(|e| AppError::Other(format!("tracking cycle task failed: {e}")))
    }

    /// Rehydrate and verify once, then keep the geofence set fresh. Failures
    /// only log: the cycle can still run on whatever is already loaded.
    async fn prepare(&self, engine: &mut Engine) {
        if (!engine.rehydrated || !engine.verified)
            && let Err(e) = self.rehydrate(engine).await
        {
            warn!("could not restore local state: {e}");
        }

        let now = self.inner.clock.now();
        if engine
            .geofences
            .is_stale(now, self.inner.settings.geofence_max_age())
            && let Err(e) = self.refresh_locked(engine).await
        {
            warn!("geofence refresh failed: {e}");
        }
    }

    async fn process_sample(&self, sample: LocationSample) -> TickOutcome {
        let mut engine = self.lock_engine(true).await;
        let now = self.inner.clock.now();

        if engine.machine.roll_over(now) {
            self.inner.store.audit("rollover", "new day, previous checkout cleared");
            self.persist(&engine);
        }

        if engine.sync.has_pending()
            && self.flush_pending(&mut engine).await
            && let Err(e) = self.reconcile(&mut engine).await
        {
            warn!("reconciliation after conflict failed: {e}");
        }

        let snapshot = engine.geofences.snapshot();
        let mut event = engine.containment.evaluate(&sample, &snapshot);

        // Still inside a geofence the machine would accept again (cooldown
        // over, new day): treat it as a fresh entry. The confirmed state may
        // lag behind the device, so this sample must itself be inside `g`.
        if event == ContainmentEvent::NoChange
            && let Some(g) = engine.containment.current_geofence()
            && engine.machine.accepts_entry(now)
            && self.sample_inside(&sample, &snapshot, g)
        {
            debug!("still inside geofence {g}, re-entering");
            event = ContainmentEvent::Enter(g);
        }

        let intent = {
            let Engine {
                machine, geofences, ..
            } = &mut *engine;
            machine.handle(event.clone(), geofences, now, Some(sample.point()))
        };

        match intent {
            Some(intent) => {
                let message = format!("{:?} geofence={:?}", intent.kind, intent.geofence_id);
                self.inner
                    .store
                    .audit(intent.kind.to_db_str(), &message);
                self.sync_intent(&mut engine, intent).await;
            }
            None => self.publish(&engine),
        }

        TickOutcome::Evaluated(event)
    }

    fn sample_inside(&self, sample: &LocationSample, geofences: &[Geofence], id: GeofenceId) -> bool {
        sample.is_usable(self.inner.settings.accuracy_ceiling_m)
            && geometry::best_match(geofences, sample.point()).is_some_and(|g| g.id == id)
    }

    // ---------------------------------------------------------------
    // Engine helpers (engine lock held)
    // ---------------------------------------------------------------

    /// Lock the engine. Background work steps aside while a manual checkout
    /// is waiting for the same lock.
    async fn lock_engine(&self, yield_to_manual: bool) -> MutexGuard<'_, Engine> {
        loop {
            let guard = self.inner.engine.lock().await;
            if !yield_to_manual || self.inner.manual_waiting.load(Ordering::SeqCst) == 0 {
                return guard;
            }
            drop(guard);
            tokio::task::yield_now().await;
        }
    }

    /// Load everything the previous process left behind, then check it
    /// against the backend. An unreachable backend is not an error here.
    async fn rehydrate(&self, engine: &mut Engine) -> AppResult<()> {
        if !engine.rehydrated {
            self.restore_local(engine)?;
        }
        if let Err(e) = self.reconcile(engine).await {
            warn!("could not verify restored state with the backend: {e}");
        }
        Ok(())
    }

    fn restore_local(&self, engine: &mut Engine) -> AppResult<()> {
        let store = &self.inner.store;

        if let Some(snapshot) = store.load_attendance()? {
            engine.machine.restore(snapshot);
        }
        engine.selected = store.load_selected_geofence()?;
        let pending = engine.sync.load_pending()?;
        if let Some((records, refreshed_at)) = store.load_geofence_cache()? {
            engine.geofences.replace_records(records, refreshed_at);
        }
        engine
            .containment
            .assume_inside(engine.machine.checked_in_geofence());
        engine.rehydrated = true;

        info!(
            "local state restored: {} ({} geofence(s) cached, {pending} pending intent(s))",
            engine.machine.state().to_db_str(),
            engine.geofences.len()
        );
        self.publish(engine);
        Ok(())
    }

    async fn refresh_locked(&self, engine: &mut Engine) -> AppResult<usize> {
        match engine.sync.fetch_geofences().await {
            Ok(records) => {
                let now = self.inner.clock.now();
                let rejected = engine.geofences.replace_records(records, now);
                if let Err(e) = self
                    .inner
                    .store
                    .save_geofence_cache(&engine.geofences.records(), now)
                {
                    warn!("failed to cache geofences: {e}");
                }
                if let Some(selected) = engine.selected
                    && engine.geofences.get(selected).is_none()
                {
                    warn!("selected geofence {selected} no longer exists");
                }
                let message = format!("{} active, {rejected} rejected", engine.geofences.len());
                self.inner.store.audit("geofences_refresh", &message);
                Ok(engine.geofences.len())
            }
            Err(e) => {
                if engine.geofences.is_empty()
                    && let Some((records, refreshed_at)) = self.inner.store.load_geofence_cache()?
                {
                    engine.geofences.replace_records(records, refreshed_at);
                    warn!(
                        "using cached geofences from {refreshed_at} ({} active)",
                        engine.geofences.len()
                    );
                }
                Err(e)
            }
        }
    }

    async fn flush_pending(&self, engine: &mut Engine) -> bool {
        let mut rejected = false;
        for (intent, outcome) in engine.sync.flush().await {
            rejected |= self.apply_outcome(engine, &intent, outcome);
        }
        engine.machine.set_pending_sync(engine.sync.has_pending());
        self.persist(engine);
        rejected
    }

    /// Apply the result of a delivery. Returns true when the backend refused it.
    fn apply_outcome(&self, engine: &mut Engine, intent: &TransitionIntent, outcome: SyncOutcome) -> bool {
        match outcome {
            SyncOutcome::Confirmed(confirmation) => {
                engine.machine.confirm(intent, confirmation.status.as_ref());
                engine.conflicts = 0;
                if matches!(engine.alert, Some(TrackerAlert::RepeatedConflict(_))) {
                    engine.alert = None;
                }
                false
            }
            SyncOutcome::Deferred { attempts, reason } => {
                info!("{:?} deferred after {attempts} attempt(s): {reason}", intent.kind);
                false
            }
            SyncOutcome::Rejected(reason) => {
                engine.conflicts += 1;
                self.inner
                    .store
                    .audit("sync_conflict", &format!("{:?}: {reason}", intent.kind));
                if engine.conflicts >= CONFLICT_ALERT_THRESHOLD {
                    warn!("{} conflicts in a row: {reason}", engine.conflicts);
                    engine.alert = Some(TrackerAlert::RepeatedConflict(reason));
                }
                true
            }
        }
    }

    /// Deliver one intent. Returns the backend's reason when it refused it;
    /// local state has been reconciled by then.
    async fn sync_intent(&self, engine: &mut Engine, intent: TransitionIntent) -> Option<String> {
        // optimistic local state first
        engine.machine.set_pending_sync(true);
        self.persist(engine);
        self.publish(engine);

        let outcome = engine.sync.submit(intent.clone()).await;
        let rejection = match &outcome {
            SyncOutcome::Rejected(reason) => Some(reason.clone()),
            _ => None,
        };
        self.apply_outcome(engine, &intent, outcome);
        engine.machine.set_pending_sync(engine.sync.has_pending());

        if rejection.is_some()
            && let Err(e) = self.reconcile(engine).await
        {
            warn!("reconciliation after conflict failed: {e}");
        }

        self.persist(engine);
        self.publish(engine);
        rejection
    }

    async fn reconcile(&self, engine: &mut Engine) -> AppResult<AttendanceStatus> {
        if engine.sync.has_pending() {
            self.flush_pending(engine).await;
        }

        let server = match engine.sync.verify_attendance_status().await {
            Ok(server) => server,
            Err(e) => {
                engine.machine.set_pending_sync(engine.sync.has_pending());
                self.publish(engine);
                return Err(e);
            }
        };

        let now = self.inner.clock.now();
        {
            let Engine {
                machine, geofences, ..
            } = &mut *engine;
            machine.reconcile(&server, geofences, now);
        }
        if let Err(e) = engine.sync.discard_pending() {
            warn!("failed to clear pending intents: {e}");
        }
        if let Some(g) = engine.machine.checked_in_geofence() {
            engine.containment.assume_inside(Some(g));
        }
        engine.verified = true;

        self.persist(engine);
        self.inner
            .store
            .audit("reconcile", engine.machine.state().to_db_str());
        self.publish(engine);
        Ok(engine.machine.status(now))
    }

    async fn manual_check_out_locked(&self, engine: &mut Engine) -> AppResult<AttendanceStatus> {
        if !engine.rehydrated {
            self.restore_local(engine)?;
        }

        let now = self.inner.clock.now();
        engine.machine.roll_over(now);
        let intent = engine.machine.manual_check_out(now)?;
        self.inner
            .store
            .audit("manual_checkout", &format!("geofence={:?}", intent.geofence_id));
        if let Some(reason) = self.sync_intent(engine, intent).await {
            return Err(AppError::ServerConflict(reason));
        }

        Ok(engine.machine.status(self.inner.clock.now()))
    }

    async fn raise_alert(&self, alert: TrackerAlert) {
        let mut engine = self.inner.engine.lock().await;
        engine.alert = Some(alert);
        self.publish(&engine);
    }

    fn persist(&self, engine: &Engine) {
        if let Err(e) = self.inner.store.save_attendance(&engine.machine.snapshot()) {
            warn!("failed to persist attendance state: {e}");
        }
    }

    fn publish(&self, engine: &Engine) {
        let now = self.inner.clock.now();
        let current_geofence = engine
            .containment
            .current_geofence()
            .and_then(|g| engine.geofences.get(g))
            .cloned();

        let snapshot = TrackerSnapshot {
            status: engine.machine.status(now),
            current_geofence,
            selected_geofence: engine.selected,
            tracking: self.inner.scheduler.is_running(),
            alert: engine.alert.clone(),
        };
        self.inner.view.send_replace(snapshot);
    }
}

#[async_trait]
impl CycleDriver for AttendanceTracker {
    async fn run_cycle(&self, cancel: &CancellationToken) -> AppResult<TickOutcome> {
        self.cycle(cancel).await
    }

    async fn tracking_disabled(&self, reason: &str) {
        self.inner.sampler.release().await;
        self.inner
            .store
            .audit("tracking_stop", &format!("permission denied: {reason}"));
        self.inner.view.send_modify(|s| s.tracking = false);
    }
}
