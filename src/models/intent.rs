use super::geofence::{GeoPoint, GeofenceId};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    CheckIn,
    CheckOut,
}

impl IntentKind {
    /// Convert enum → DB string
    pub fn to_db_str(&self) -> &'static str {
        match self {
            IntentKind::CheckIn => "check_in",
            IntentKind::CheckOut => "check_out",
        }
    }

    /// Convert DB string → enum
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "check_in" => Some(IntentKind::CheckIn),
            "check_out" => Some(IntentKind::CheckOut),
            _ => None,
        }
    }
}

/// A local transition that still has to be confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionIntent {
    pub kind: IntentKind,
    pub timestamp: DateTime<Local>,
    pub geofence_id: Option<GeofenceId>,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub position: Option<GeoPoint>,
}

impl TransitionIntent {
    pub fn check_in(geofence_id: GeofenceId, at: DateTime<Local>, position: Option<GeoPoint>) -> Self {
        Self {
            kind: IntentKind::CheckIn,
            timestamp: at,
            geofence_id: Some(geofence_id),
            manual: false,
            position,
        }
    }

    pub fn check_out(geofence_id: Option<GeofenceId>, at: DateTime<Local>, manual: bool) -> Self {
        Self {
            kind: IntentKind::CheckOut,
            timestamp: at,
            geofence_id,
            manual,
            position: None,
        }
    }
}
