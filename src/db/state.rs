//! Durable local state of one user/site, shared between the background
//! cycle and the UI-facing commands.

use super::initialize::init_db;
use super::log::{LogEntry, load_log, write_log};
use super::pool::DbPool;
use super::queries;
use crate::core::machine::MachineSnapshot;
use crate::errors::AppResult;
use crate::models::{GeofenceId, GeofenceRecord, IntentKind, TransitionIntent};
use chrono::{DateTime, Local};
use log::warn;
use rusqlite::Connection;
use std::sync::Mutex;

pub struct StateStore {
    pool: Mutex<DbPool>,
    user_key: String,
}

impl StateStore {
    pub fn open(path: &str, user_key: &str) -> AppResult<Self> {
        Self::from_pool(DbPool::new(path)?, user_key)
    }

    pub fn open_in_memory(user_key: &str) -> AppResult<Self> {
        Self::from_pool(DbPool::in_memory()?, user_key)
    }

    fn from_pool(pool: DbPool, user_key: &str) -> AppResult<Self> {
        init_db(&pool.conn)?;
        Ok(Self {
            pool: Mutex::new(pool),
            user_key: user_key.to_string(),
        })
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection, &str) -> AppResult<T>) -> AppResult<T> {
        let pool = self.pool.lock().unwrap_or_else(|p| p.into_inner());
        f(&pool.conn, &self.user_key)
    }

    pub fn load_attendance(&self) -> AppResult<Option<MachineSnapshot>> {
        self.with_conn(queries::load_attendance)
    }

    pub fn save_attendance(&self, snapshot: &MachineSnapshot) -> AppResult<()> {
        self.with_conn(|conn, user| queries::save_attendance(conn, user, snapshot))
    }

    pub fn load_selected_geofence(&self) -> AppResult<Option<GeofenceId>> {
        self.with_conn(queries::load_selected_geofence)
    }

    pub fn save_selected_geofence(&self, id: Option<GeofenceId>) -> AppResult<()> {
        self.with_conn(|conn, user| queries::save_selected_geofence(conn, user, id))
    }

    pub fn load_pending_intents(&self) -> AppResult<Vec<TransitionIntent>> {
        self.with_conn(queries::load_pending_intents)
    }

    pub fn save_pending_intent(&self, intent: &TransitionIntent) -> AppResult<()> {
        self.with_conn(|conn, user| queries::upsert_pending_intent(conn, user, intent))
    }

    pub fn record_pending_attempts(&self, kind: IntentKind, attempts: usize) -> AppResult<()> {
        self.with_conn(|conn, user| queries::record_pending_attempts(conn, user, kind, attempts))
    }

    pub fn delete_pending_intent(&self, kind: IntentKind) -> AppResult<()> {
        self.with_conn(|conn, user| queries::delete_pending_intent(conn, user, kind))
    }

    pub fn clear_pending_intents(&self) -> AppResult<()> {
        self.with_conn(queries::clear_pending_intents)
    }

    pub fn load_geofence_cache(&self) -> AppResult<Option<(Vec<GeofenceRecord>, DateTime<Local>)>> {
        self.with_conn(queries::load_geofence_cache)
    }

    pub fn save_geofence_cache(&self, records: &[GeofenceRecord], at: DateTime<Local>) -> AppResult<()> {
        self.with_conn(|conn, user| queries::save_geofence_cache(conn, user, records, at))
    }

    /// Audit line in the `log` table. Failures are only reported, never fatal.
    pub fn audit(&self, operation: &str, message: &str) {
        let res = self.with_conn(|conn, user| write_log(conn, operation, user, message));
        if let Err(e) = res {
            warn!("failed to write internal log: {e}");
        }
    }

    pub fn load_log(&self, limit: Option<usize>) -> AppResult<Vec<LogEntry>> {
        self.with_conn(|conn, _| load_log(conn, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::AttendanceState;
    use chrono::{Duration, TimeZone};

    #[test]
    fn attendance_round_trips_through_sqlite() {
        let store = StateStore::open_in_memory("alice@hq").unwrap();
        assert!(store.load_attendance().unwrap().is_none());

        let at = Local.with_ymd_and_hms(2025, 10, 1, 10, 0, 0).unwrap();
        let snap = MachineSnapshot {
            state: AttendanceState::CheckedOutManual {
                at,
                cooldown_until: at + Duration::hours(6),
            },
            location_name: Some("Office HQ".into()),
            check_in_time: Some(at - Duration::hours(1)),
            pending_sync: true,
        };
        store.save_attendance(&snap).unwrap();
        assert_eq!(store.load_attendance().unwrap(), Some(snap));
    }

    #[test]
    fn pending_intents_keep_one_per_kind() {
        let store = StateStore::open_in_memory("alice@hq").unwrap();
        let t0 = Local.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();

        store
            .save_pending_intent(&TransitionIntent::check_in(1, t0, None))
            .unwrap();
        store
            .save_pending_intent(&TransitionIntent::check_in(2, t0 + Duration::minutes(5), None))
            .unwrap();
        store
            .save_pending_intent(&TransitionIntent::check_out(Some(2), t0 + Duration::hours(1), false))
            .unwrap();

        let pending = store.load_pending_intents().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].geofence_id, Some(2));
        assert_eq!(pending[1].kind, IntentKind::CheckOut);

        store.delete_pending_intent(IntentKind::CheckIn).unwrap();
        assert_eq!(store.load_pending_intents().unwrap().len(), 1);
    }

    #[test]
    fn selected_geofence_can_be_cleared() {
        let store = StateStore::open_in_memory("alice@hq").unwrap();
        store.save_selected_geofence(Some(4)).unwrap();
        assert_eq!(store.load_selected_geofence().unwrap(), Some(4));
        store.save_selected_geofence(None).unwrap();
        assert_eq!(store.load_selected_geofence().unwrap(), None);
    }
}
