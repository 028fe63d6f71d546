//! Attendance state machine.
//!
//! Owns the authoritative local attendance state between sync points. Every
//! accepted transition yields a `TransitionIntent` for the sync layer; local
//! state is updated before the backend answers and corrected afterwards by
//! `confirm` or `reconcile`.

use super::containment::ContainmentEvent;
use super::store::GeofenceStore;
use crate::errors::{AppError, AppResult};
use crate::models::{AttendanceStatus, GeoPoint, GeofenceId, IntentKind, TransitionIntent};
use chrono::{DateTime, Duration, Local};
use log::info;

#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceState {
    NotCheckedIn,
    /// `geofence_id` is `None` when the backend reported a check-in whose
    /// geofence is not in the local store.
    CheckedIn {
        geofence_id: Option<GeofenceId>,
        since: DateTime<Local>,
    },
    CheckedOutAutomatic {
        at: DateTime<Local>,
    },
    CheckedOutManual {
        at: DateTime<Local>,
        cooldown_until: DateTime<Local>,
    },
}

impl AttendanceState {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AttendanceState::NotCheckedIn => "not_checked_in",
            AttendanceState::CheckedIn { .. } => "checked_in",
            AttendanceState::CheckedOutAutomatic { .. } => "checked_out_auto",
            AttendanceState::CheckedOutManual { .. } => "checked_out_manual",
        }
    }
}

/// Everything needed to rebuild the machine after a process restart.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineSnapshot {
    pub state: AttendanceState,
    pub location_name: Option<String>,
    pub check_in_time: Option<DateTime<Local>>,
    pub pending_sync: bool,
}

#[derive(Debug, Clone)]
pub struct AttendanceStateMachine {
    state: AttendanceState,
    location_name: Option<String>,
    check_in_time: Option<DateTime<Local>>,
    pending_sync: bool,
    cooldown: Duration,
    reentry_after_exit: bool,
}

impl AttendanceStateMachine {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: AttendanceState::NotCheckedIn,
            location_name: None,
            check_in_time: None,
            pending_sync: false,
            cooldown,
            reentry_after_exit: false,
        }
    }

    pub fn with_reentry_after_exit(mut self, allowed: bool) -> Self {
        self.reentry_after_exit = allowed;
        self
    }

    pub fn state(&self) -> &AttendanceState {
        &self.state
    }

    pub fn checked_in_geofence(&self) -> Option<GeofenceId> {
        match self.state {
            AttendanceState::CheckedIn { geofence_id, .. } => geofence_id,
            _ => None,
        }
    }

    pub fn set_pending_sync(&mut self, pending: bool) {
        self.pending_sync = pending;
    }

    /// Whether an `Enter` at `now` would produce a check-in.
    pub fn accepts_entry(&self, now: DateTime<Local>) -> bool {
        match &self.state {
            AttendanceState::NotCheckedIn => true,
            AttendanceState::CheckedIn { .. } => false,
            AttendanceState::CheckedOutAutomatic { .. } => self.reentry_after_exit,
            AttendanceState::CheckedOutManual { cooldown_until, .. } => now >= *cooldown_until,
        }
    }

    /// Forget a checkout once the local calendar day it happened on is over.
    /// Returns true when the state changed.
    pub fn roll_over(&mut self, now: DateTime<Local>) -> bool {
        let checkout_day = match &self.state {
            AttendanceState::CheckedOutAutomatic { at } => at.date_naive(),
            AttendanceState::CheckedOutManual { at, .. } => at.date_naive(),
            _ => return false,
        };

        if now.date_naive() > checkout_day {
            info!("day rollover: clearing checkout of {checkout_day}");
            self.state = AttendanceState::NotCheckedIn;
            self.location_name = None;
            self.check_in_time = None;
            return true;
        }
        false
    }

    /// Apply a geofence event. Events that do not concern the tracked
    /// geofence, or that arrive during a cooldown, are ignored.
    pub fn handle(
        &mut self,
        event: ContainmentEvent,
        store: &GeofenceStore,
        now: DateTime<Local>,
        position: Option<GeoPoint>,
    ) -> Option<TransitionIntent> {
        match (event, &self.state) {
            (ContainmentEvent::Enter(g), _) if self.accepts_entry(now) => {
                self.state = AttendanceState::CheckedIn {
                    geofence_id: Some(g),
                    since: now,
                };
                self.location_name = store.get(g).map(|f| f.name.clone());
                self.check_in_time = Some(now);
                info!(
                    "check-in at {} (geofence {g})",
                    self.location_name.as_deref().unwrap_or("?")
                );
                Some(TransitionIntent::check_in(g, now, position))
            }
            (ContainmentEvent::Exit(g), AttendanceState::CheckedIn { geofence_id, .. })
                if geofence_id.is_none_or(|tracked| tracked == g) =>
            {
                self.state = AttendanceState::CheckedOutAutomatic { at: now };
                info!("automatic checkout after leaving geofence {g}");
                Some(TransitionIntent::check_out(Some(g), now, false))
            }
            _ => None,
        }
    }

    /// User-initiated checkout; only valid while checked in.
    pub fn manual_check_out(&mut self, now: DateTime<Local>) -> AppResult<TransitionIntent> {
        let AttendanceState::CheckedIn { geofence_id, .. } = self.state else {
            return Err(AppError::InvalidTransition(format!(
                "manual checkout requires a check-in (state: {})",
                self.state.to_db_str()
            )));
        };

        self.state = AttendanceState::CheckedOutManual {
            at: now,
            cooldown_until: now + self.cooldown,
        };
        info!("manual checkout, cooldown until {}", now + self.cooldown);
        Ok(TransitionIntent::check_out(geofence_id, now, true))
    }

    /// Adopt the details the backend attached to a confirmation.
    pub fn confirm(&mut self, intent: &TransitionIntent, server: Option<&AttendanceStatus>) {
        let Some(server) = server else { return };

        match (intent.kind, &mut self.state) {
            (IntentKind::CheckIn, AttendanceState::CheckedIn { since, .. }) => {
                if let Some(t) = server.check_in_time {
                    *since = t;
                    self.check_in_time = Some(t);
                }
                if server.location_name.is_some() {
                    self.location_name = server.location_name.clone();
                }
            }
            (
                IntentKind::CheckOut,
                AttendanceState::CheckedOutManual {
                    at, cooldown_until, ..
                },
            ) => {
                if let Some(t) = server.check_out_time {
                    *at = t;
                }
                if let Some(next) = server.next_check_in_time {
                    *cooldown_until = next;
                }
            }
            (IntentKind::CheckOut, AttendanceState::CheckedOutAutomatic { at }) => {
                if let Some(t) = server.check_out_time {
                    *at = t;
                }
            }
            // state moved on since the intent was issued
            _ => {}
        }
    }

    /// Overwrite local state with the backend's snapshot.
    pub fn reconcile(&mut self, server: &AttendanceStatus, store: &GeofenceStore, now: DateTime<Local>) {
        let geofence_id = server.geofence_id.or_else(|| {
            server
                .location_name
                .as_deref()
                .and_then(|name| store.find_by_name(name))
                .map(|g| g.id)
        });

        self.state = if server.is_checked_in {
            AttendanceState::CheckedIn {
                geofence_id,
                since: server.check_in_time.unwrap_or(now),
            }
        } else if server.is_checked_out && server.is_manual_checkout {
            let at = server.check_out_time.unwrap_or(now);
            AttendanceState::CheckedOutManual {
                at,
                cooldown_until: server.next_check_in_time.unwrap_or(at + self.cooldown),
            }
        } else if server.is_checked_out {
            AttendanceState::CheckedOutAutomatic {
                at: server.check_out_time.unwrap_or(now),
            }
        } else {
            AttendanceState::NotCheckedIn
        };

        self.location_name = server.location_name.clone();
        self.check_in_time = server.check_in_time;
        self.pending_sync = false;
        self.roll_over(now);
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        MachineSnapshot {
            state: self.state.clone(),
            location_name: self.location_name.clone(),
            check_in_time: self.check_in_time,
            pending_sync: self.pending_sync,
        }
    }

    pub fn restore(&mut self, snapshot: MachineSnapshot) {
        self.state = snapshot.state;
        self.location_name = snapshot.location_name;
        self.check_in_time = snapshot.check_in_time;
        self.pending_sync = snapshot.pending_sync;
    }

    /// UI view of the current state.
    pub fn status(&self, now: DateTime<Local>) -> AttendanceStatus {
        let mut status = AttendanceStatus {
            location_name: self.location_name.clone(),
            check_in_time: self.check_in_time,
            pending_sync: self.pending_sync,
            ..AttendanceStatus::default()
        };

        match &self.state {
            AttendanceState::NotCheckedIn => {
                status.check_in_time = None;
                status.location_name = None;
            }
            AttendanceState::CheckedIn { geofence_id, since } => {
                status.is_checked_in = true;
                status.check_in_time = Some(*since);
                status.geofence_id = *geofence_id;
                status.elapsed_time = Some((now - *since).num_seconds().max(0));
            }
            AttendanceState::CheckedOutAutomatic { at } => {
                status.is_checked_out = true;
                status.check_out_time = Some(*at);
                status.elapsed_time = self.check_in_time.map(|t| (*at - t).num_seconds().max(0));
            }
            AttendanceState::CheckedOutManual { at, cooldown_until } => {
                status.is_checked_out = true;
                status.is_manual_checkout = true;
                status.check_out_time = Some(*at);
                status.next_check_in_time = Some(*cooldown_until);
                status.elapsed_time = self.check_in_time.map(|t| (*at - t).num_seconds().max(0));
            }
        }

        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Geofence;
    use chrono::TimeZone;

    fn store() -> GeofenceStore {
        let mut s = GeofenceStore::new();
        s.replace(
            vec![
                Geofence::circle(1, "Office HQ", GeoPoint::new(1.30, 103.80), 200.0),
                Geofence::circle(2, "Warehouse", GeoPoint::new(1.35, 103.85), 200.0),
            ],
            t(8, 0),
        );
        s
    }

    fn t(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 10, 1, h, m, 0).unwrap()
    }

    fn checked_in_machine() -> AttendanceStateMachine {
        let mut m = AttendanceStateMachine::new(Duration::hours(6));
        m.handle(ContainmentEvent::Enter(1), &store(), t(9, 0), None);
        m
    }

    #[test]
    fn enter_checks_in_with_location_name() {
        let m = checked_in_machine();
        let status = m.status(t(10, 0));
        assert!(status.is_checked_in);
        assert_eq!(status.location_name.as_deref(), Some("Office HQ"));
        assert_eq!(status.elapsed_time, Some(3600));
    }

    #[test]
    fn only_tracked_geofence_exit_counts() {
        let mut m = checked_in_machine();
        assert!(m.handle(ContainmentEvent::Enter(2), &store(), t(10, 0), None).is_none());
        assert!(m.handle(ContainmentEvent::Exit(2), &store(), t(10, 5), None).is_none());
        assert_eq!(m.checked_in_geofence(), Some(1));

        let intent = m.handle(ContainmentEvent::Exit(1), &store(), t(17, 0), None).unwrap();
        assert_eq!(intent.kind, IntentKind::CheckOut);
        assert!(!intent.manual);
        assert!(matches!(m.state(), AttendanceState::CheckedOutAutomatic { .. }));
    }

    #[test]
    fn manual_cooldown_blocks_until_exact_deadline() {
        let mut m = checked_in_machine();
        let intent = m.manual_check_out(t(10, 0)).unwrap();
        assert!(intent.manual);

        let status = m.status(t(10, 0));
        assert!(status.is_checked_out && status.is_manual_checkout);
        assert_eq!(status.next_check_in_time, Some(t(16, 0)));

        assert!(m.handle(ContainmentEvent::Enter(1), &store(), t(11, 0), None).is_none());
        assert!(m.handle(ContainmentEvent::Enter(1), &store(), t(15, 59), None).is_none());
        assert!(m.handle(ContainmentEvent::Enter(1), &store(), t(16, 0), None).is_some());
        assert!(m.status(t(16, 0)).is_checked_in);
    }

    #[test]
    fn manual_checkout_requires_check_in() {
        let mut m = AttendanceStateMachine::new(Duration::hours(6));
        assert!(matches!(
            m.manual_check_out(t(9, 0)),
            Err(AppError::InvalidTransition(_))
        ));
    }

    #[test]
    fn automatic_checkout_is_remembered_until_midnight() {
        let mut m = checked_in_machine();
        m.handle(ContainmentEvent::Exit(1), &store(), t(12, 0), None);
        assert!(m.handle(ContainmentEvent::Enter(1), &store(), t(13, 0), None).is_none());

        assert!(!m.roll_over(t(23, 59)));
        let next_day = Local.with_ymd_and_hms(2025, 10, 2, 0, 0, 1).unwrap();
        assert!(m.roll_over(next_day));
        assert_eq!(m.state(), &AttendanceState::NotCheckedIn);
        assert!(m.handle(ContainmentEvent::Enter(1), &store(), next_day, None).is_some());
    }

    #[test]
    fn reentry_after_exit_can_be_enabled() {
        let mut m = AttendanceStateMachine::new(Duration::hours(6)).with_reentry_after_exit(true);
        m.handle(ContainmentEvent::Enter(1), &store(), t(9, 0), None);
        m.handle(ContainmentEvent::Exit(1), &store(), t(12, 0), None);
        assert!(m.handle(ContainmentEvent::Enter(1), &store(), t(13, 0), None).is_some());
    }

    #[test]
    fn reconcile_overwrites_local_state() {
        let mut m = checked_in_machine();
        m.set_pending_sync(true);
        let server = AttendanceStatus {
            is_checked_out: true,
            is_manual_checkout: true,
            check_out_time: Some(t(9, 30)),
            next_check_in_time: Some(t(15, 30)),
            location_name: Some("Warehouse".into()),
            ..AttendanceStatus::default()
        };
        m.reconcile(&server, &store(), t(9, 45));

        assert_eq!(
            m.state(),
            &AttendanceState::CheckedOutManual {
                at: t(9, 30),
                cooldown_until: t(15, 30)
            }
        );
        assert!(!m.status(t(9, 45)).pending_sync);
    }

    #[test]
    fn reconcile_resolves_geofence_by_name() {
        let mut m = AttendanceStateMachine::new(Duration::hours(6));
        let server = AttendanceStatus {
            is_checked_in: true,
            check_in_time: Some(t(8, 30)),
            location_name: Some("Warehouse".into()),
            ..AttendanceStatus::default()
        };
        m.reconcile(&server, &store(), t(9, 0));
        assert_eq!(m.checked_in_geofence(), Some(2));
    }
}
