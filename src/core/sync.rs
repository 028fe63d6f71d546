//! Delivery of transition intents to the backend.
//!
//! At most one intent per kind is pending; a newer intent of the same kind
//! supersedes an unsent older one. Transient failures are retried with
//! exponential backoff and then left pending (persisted) for the next
//! cycle. Hard rejections are handed back so the caller can reconcile.

use crate::api::{AttendanceBackend, CheckInRequest, CheckOutRequest, Confirmation};
use crate::config::SyncSettings;
use crate::db::StateStore;
use crate::errors::{AppError, AppResult};
use crate::models::{AttendanceStatus, GeofenceRecord, IntentKind, TransitionIntent};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

pub trait BackoffPolicy {
    fn delay_for_attempt(&self, attempt: usize) -> Duration;
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff_ms: 500,
        }
    }
}

impl From<&SyncSettings> for RetryPolicy {
    fn from(s: &SyncSettings) -> Self {
        Self {
            max_attempts: s.max_attempts.max(1),
            base_backoff_ms: s.base_backoff_ms,
        }
    }
}

impl BackoffPolicy for RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): base, 2×base, 4×base, …
    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        let ms = self.base_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(ms).min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Confirmed(Confirmation),
    /// Still pending after `attempts` transient failures.
    Deferred { attempts: usize, reason: String },
    /// The backend refused the transition; local state needs reconciling.
    Rejected(String),
}

pub struct SyncService {
    backend: Arc<dyn AttendanceBackend>,
    store: Arc<StateStore>,
    policy: RetryPolicy,
    pending: BTreeMap<IntentKind, TransitionIntent>,
}

impl SyncService {
    pub fn new(backend: Arc<dyn AttendanceBackend>, store: Arc<StateStore>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            store,
            policy,
            pending: BTreeMap::new(),
        }
    }

    /// Reload intents left pending by a previous process.
    pub fn load_pending(&mut self) -> AppResult<usize> {
        self.pending.clear();
        for intent in self.store.load_pending_intents()? {
            self.pending.insert(intent.kind, intent);
        }
        Ok(self.pending.len())
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &TransitionIntent> {
        self.pending.values()
    }

    /// Drop everything queued; used once server truth has been adopted.
    pub fn discard_pending(&mut self) -> AppResult<()> {
        if !self.pending.is_empty() {
            info!("discarding {} pending intent(s) after reconciliation", self.pending.len());
        }
        self.pending.clear();
        self.store.clear_pending_intents()
    }

    fn enqueue(&mut self, intent: TransitionIntent) -> AppResult<()> {
        if let Some(old) = self.pending.get(&intent.kind) {
            debug!(
                "{:?} from {} superseded by {}",
                intent.kind, old.timestamp, intent.timestamp
            );
        }
        self.store.save_pending_intent(&intent)?;
        self.pending.insert(intent.kind, intent);
        Ok(())
    }

    fn settle(&mut self, kind: IntentKind) {
        self.pending.remove(&kind);
        if let Err(e) = self.store.delete_pending_intent(kind) {
            warn!("failed to clear pending {kind:?}: {e}");
        }
    }

    /// Queue `intent` and try to deliver it right away.
    pub async fn submit(&mut self, intent: TransitionIntent) -> SyncOutcome {
        let kind = intent.kind;
        if let Err(e) = self.enqueue(intent.clone()) {
            // not durable, but still worth sending
            warn!("failed to persist pending {kind:?}: {e}");
            self.pending.insert(kind, intent);
        }
        self.deliver(kind).await
    }

    /// Retry everything pending, oldest first. Stops at the first intent that
    /// is still deferred: later ones depend on it.
    pub async fn flush(&mut self) -> Vec<(TransitionIntent, SyncOutcome)> {
        let mut order: Vec<_> = self.pending.values().cloned().collect();
        order.sort_by_key(|i| i.timestamp);

        let mut results = Vec::new();
        for intent in order {
            let outcome = self.deliver(intent.kind).await;
            let deferred = matches!(outcome, SyncOutcome::Deferred { .. });
            results.push((intent, outcome));
            if deferred {
                break;
            }
        }
        results
    }

    async fn deliver(&mut self, kind: IntentKind) -> SyncOutcome {
        let Some(intent) = self.pending.get(&kind).cloned() else {
            return SyncOutcome::Rejected(format!("no pending {kind:?}"));
        };

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.send(&intent).await {
                Ok(confirmation) => {
                    debug!("{kind:?} confirmed after {attempt} attempt(s)");
                    self.settle(kind);
                    return SyncOutcome::Confirmed(confirmation);
                }
                Err(e) if e.is_transient() => {
                    last_error = e.to_string();
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for_attempt(attempt);
                        debug!("{kind:?} attempt {attempt} failed ({e}), retrying in {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e @ AppError::Unauthorized(_)) => {
                    // the session has to be renewed first; keep the intent
                    warn!("{kind:?} not sent: {e}");
                    return SyncOutcome::Deferred {
                        attempts: attempt,
                        reason: e.to_string(),
                    };
                }
                Err(e) => {
                    warn!("{kind:?} rejected by backend: {e}");
                    self.settle(kind);
                    return SyncOutcome::Rejected(e.to_string());
                }
            }
        }

        warn!(
            "{kind:?} still pending after {} attempts: {last_error}",
            self.policy.max_attempts
        );
        if let Err(e) = self
            .store
            .record_pending_attempts(kind, self.policy.max_attempts)
        {
            warn!("failed to record attempts for {kind:?}: {e}");
        }
        SyncOutcome::Deferred {
            attempts: self.policy.max_attempts,
            reason: last_error,
        }
    }

    async fn send(&self, intent: &TransitionIntent) -> AppResult<Confirmation> {
        match intent.kind {
            IntentKind::CheckIn => self.backend.check_in(&CheckInRequest::from(intent)).await,
            IntentKind::CheckOut => self.backend.check_out(&CheckOutRequest::from(intent)).await,
        }
    }

    /// Authoritative status from the backend, retried like intents.
    pub async fn verify_attendance_status(&self) -> AppResult<AttendanceStatus> {
        self.with_retry(|| self.backend.attendance_status()).await
    }

    pub async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>> {
        self.with_retry(|| self.backend.fetch_geofences()).await
    }

    async fn with_retry<T, F, Fut>(&self, call: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt < self.policy.max_attempts => {
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls with a network error.
    struct FlakyBackend {
        failures: AtomicUsize,
        conflict: bool,
        calls: AtomicUsize,
    }

    impl FlakyBackend {
        fn new(failures: usize, conflict: bool) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                conflict,
                calls: AtomicUsize::new(0),
            })
        }

        fn answer(&self) -> AppResult<Confirmation> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.conflict {
                return Err(AppError::ServerConflict("already checked in".into()));
            }
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(AppError::NetworkFailure("connection reset".into()));
            }
            Ok(Confirmation::default())
        }
    }

    #[async_trait]
    impl AttendanceBackend for FlakyBackend {
        async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>> {
            Ok(Vec::new())
        }
        async fn check_in(&self, _: &CheckInRequest) -> AppResult<Confirmation> {
            self.answer()
        }
        async fn check_out(&self, _: &CheckOutRequest) -> AppResult<Confirmation> {
            self.answer()
        }
        async fn attendance_status(&self) -> AppResult<AttendanceStatus> {
            self.answer().map(|_| AttendanceStatus::default())
        }
    }

    fn service(backend: Arc<FlakyBackend>) -> (SyncService, Arc<StateStore>) {
        let store = Arc::new(StateStore::open_in_memory("alice@hq").unwrap());
        let policy = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 100,
        };
        (SyncService::new(backend, Arc::clone(&store), policy), store)
    }

    fn check_in_at(minute: u32) -> TransitionIntent {
        let at = Local.with_ymd_and_hms(2025, 10, 1, 9, minute, 0).unwrap();
        TransitionIntent::check_in(1, at, None)
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let p = RetryPolicy {
            max_attempts: 5,
            base_backoff_ms: 500,
        };
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(p.delay_for_attempt(40), MAX_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_confirmed() {
        let backend = FlakyBackend::new(2, false);
        let (mut sync, store) = service(Arc::clone(&backend));

        let outcome = sync.submit(check_in_at(0)).await;
        assert!(matches!(outcome, SyncOutcome::Confirmed(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(!sync.has_pending());
        assert!(store.load_pending_intents().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_intent_pending_across_restarts() {
        let backend = FlakyBackend::new(10, false);
        let (mut sync, store) = service(Arc::clone(&backend));

        let outcome = sync.submit(check_in_at(0)).await;
        assert!(matches!(outcome, SyncOutcome::Deferred { attempts: 3, .. }));
        assert!(sync.has_pending());

        let mut restarted = SyncService::new(backend, store, RetryPolicy::default());
        assert_eq!(restarted.load_pending().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_intent_supersedes_pending_one_of_same_kind() {
        let backend = FlakyBackend::new(100, false);
        let (mut sync, store) = service(backend);

        sync.submit(check_in_at(0)).await;
        sync.submit(check_in_at(5)).await;

        let pending: Vec<_> = sync.pending().cloned().collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].timestamp, check_in_at(5).timestamp);
        assert_eq!(store.load_pending_intents().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_is_not_retried() {
        let backend = FlakyBackend::new(0, true);
        let (mut sync, _store) = service(Arc::clone(&backend));

        let outcome = sync.submit(check_in_at(0)).await;
        assert!(matches!(outcome, SyncOutcome::Rejected(_)));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(!sync.has_pending());
    }
}
