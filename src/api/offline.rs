//! In-process stand-in for the attendance backend.
//!
//! Applies the same rules as the server (single open check-in, cooldown
//! after a manual checkout, local-midnight rollover) so the tracker can be
//! exercised without a network: the `replay` command and the test suite
//! both run against it.

use super::{AttendanceBackend, CheckInRequest, CheckOutRequest, Confirmation};
use crate::errors::{AppError, AppResult};
use crate::models::{AttendanceStatus, GeofenceRecord};
use crate::utils::clock::Clock;
use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub struct OfflineBackend {
    geofences: Mutex<Vec<GeofenceRecord>>,
    status: Mutex<AttendanceStatus>,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
    check_ins: AtomicUsize,
    check_outs: AtomicUsize,
}

impl OfflineBackend {
    pub fn new(geofences: Vec<GeofenceRecord>, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            geofences: Mutex::new(geofences),
            status: Mutex::new(AttendanceStatus::default()),
            cooldown,
            clock,
            check_ins: AtomicUsize::new(0),
            check_outs: AtomicUsize::new(0),
        }
    }

    pub fn set_geofences(&self, geofences: Vec<GeofenceRecord>) {
        *self.geofences.lock().unwrap_or_else(|p| p.into_inner()) = geofences;
    }

    /// Overwrite the server-side truth, e.g. a change made from another device.
    pub fn set_status(&self, status: AttendanceStatus) {
        *self.status.lock().unwrap_or_else(|p| p.into_inner()) = status;
    }

    pub fn check_in_calls(&self) -> usize {
        self.check_ins.load(Ordering::SeqCst)
    }

    pub fn check_out_calls(&self) -> usize {
        self.check_outs.load(Ordering::SeqCst)
    }

    fn location_name(&self, request: &CheckInRequest) -> Option<String> {
        let id = request.geofence_id?;
        self.geofences
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|g| g.id == id)
            .map(|g| g.name.clone())
    }

    fn current(&self) -> std::sync::MutexGuard<'_, AttendanceStatus> {
        let now = self.clock.now();
        let mut status = self.status.lock().unwrap_or_else(|p| p.into_inner());
        let stale_checkout = status.is_checked_out
            && status
                .check_out_time
                .is_some_and(|t| t.date_naive() < now.date_naive());
        if stale_checkout {
            *status = AttendanceStatus::default();
        }
        status
    }
}

#[async_trait]
impl AttendanceBackend for OfflineBackend {
    async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>> {
        Ok(self
            .geofences
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone())
    }

    async fn check_in(&self, request: &CheckInRequest) -> AppResult<Confirmation> {
        self.check_ins.fetch_add(1, Ordering::SeqCst);
        let location_name = self.location_name(request);
        let mut status = self.current();

        if status.is_checked_in {
            return Err(AppError::ServerConflict("already checked in".into()));
        }
        if status.is_manual_checkout
            && status
                .next_check_in_time
                .is_some_and(|next| request.timestamp < next)
        {
            return Err(AppError::ServerConflict(
                "check-in not allowed before cooldown ends".into(),
            ));
        }

        *status = AttendanceStatus {
            is_checked_in: true,
            check_in_time: Some(request.timestamp),
            location_name,
            geofence_id: request.geofence_id,
            elapsed_time: Some(0),
            ..AttendanceStatus::default()
        };

        Ok(Confirmation {
            status: Some(status.clone()),
        })
    }

    async fn check_out(&self, request: &CheckOutRequest) -> AppResult<Confirmation> {
        self.check_outs.fetch_add(1, Ordering::SeqCst);
        let mut status = self.current();

        if !status.is_checked_in {
            return Err(AppError::ServerConflict("not checked in".into()));
        }

        let at = request.timestamp;
        status.is_checked_in = false;
        status.is_checked_out = true;
        status.is_manual_checkout = request.manual;
        status.check_out_time = Some(at);
        status.elapsed_time = status.check_in_time.map(|t| (at - t).num_seconds());
        status.next_check_in_time = request.manual.then(|| at + self.cooldown);

        Ok(Confirmation {
            status: Some(status.clone()),
        })
    }

    async fn attendance_status(&self) -> AppResult<AttendanceStatus> {
        let now = self.clock.now();
        let mut status = self.current().clone();
        if status.is_checked_in {
            status.elapsed_time = status.check_in_time.map(|t| (now - t).num_seconds());
        }
        Ok(status)
    }
}
