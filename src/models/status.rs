use super::geofence::GeofenceId;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Attendance view shared with the UI layer and exchanged with
/// `GET /api/attendance/status`.
///
/// `elapsed_time` is in seconds: time since check-in while checked in,
/// worked time once checked out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttendanceStatus {
    pub is_checked_in: bool,
    pub is_checked_out: bool,
    pub check_in_time: Option<DateTime<Local>>,
    pub check_out_time: Option<DateTime<Local>>,
    pub elapsed_time: Option<i64>,
    pub location_name: Option<String>,
    pub is_manual_checkout: bool,
    pub next_check_in_time: Option<DateTime<Local>>,
    pub geofence_id: Option<GeofenceId>,
    /// Local-only: a transition is waiting for backend confirmation.
    #[serde(skip_deserializing)]
    pub pending_sync: bool,
}

impl AttendanceStatus {
    pub fn label(&self) -> &'static str {
        if self.is_checked_in {
            "checked in"
        } else if self.is_checked_out && self.is_manual_checkout {
            "checked out (manual)"
        } else if self.is_checked_out {
            "checked out"
        } else {
            "not checked in"
        }
    }
}
