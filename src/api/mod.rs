//! Backend of record.
//!
//! `AttendanceBackend` is the REST surface the tracker depends on:
//!
//! - `GET  /api/locations/geofences`
//! - `POST /api/attendance/checkin`
//! - `POST /api/attendance/checkout`
//! - `GET  /api/attendance/status`

pub mod http;
pub mod offline;

use crate::errors::AppResult;
use crate::models::{AttendanceStatus, GeofenceId, GeofenceRecord, TransitionIntent};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub geofence_id: Option<GeofenceId>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckOutRequest {
    pub manual: bool,
    pub geofence_id: Option<GeofenceId>,
    pub timestamp: DateTime<Local>,
}

impl From<&TransitionIntent> for CheckInRequest {
    fn from(intent: &TransitionIntent) -> Self {
        Self {
            geofence_id: intent.geofence_id,
            latitude: intent.position.map(|p| p.latitude),
            longitude: intent.position.map(|p| p.longitude),
            timestamp: intent.timestamp,
        }
    }
}

impl From<&TransitionIntent> for CheckOutRequest {
    fn from(intent: &TransitionIntent) -> Self {
        Self {
            manual: intent.manual,
            geofence_id: intent.geofence_id,
            timestamp: intent.timestamp,
        }
    }
}

/// What the backend returned when it accepted a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Confirmation {
    pub status: Option<AttendanceStatus>,
}

/// Supplies the bearer token of the authenticated session.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, e.g. from the configuration file.
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[async_trait]
pub trait AttendanceBackend: Send + Sync {
    async fn fetch_geofences(&self) -> AppResult<Vec<GeofenceRecord>>;

    async fn check_in(&self, request: &CheckInRequest) -> AppResult<Confirmation>;

    async fn check_out(&self, request: &CheckOutRequest) -> AppResult<Confirmation>;

    async fn attendance_status(&self) -> AppResult<AttendanceStatus>;
}
