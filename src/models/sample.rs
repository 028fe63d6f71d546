use super::geofence::GeoPoint;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One position fix from the device. Never persisted individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Local>,
}

impl LocationSample {
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        captured_at: DateTime<Local>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// A fix without a finite position or accuracy cannot be evaluated.
    pub fn is_usable(&self, accuracy_ceiling_m: f64) -> bool {
        self.point().is_finite()
            && self.accuracy_meters.is_finite()
            && self.accuracy_meters >= 0.0
            && self.accuracy_meters <= accuracy_ceiling_m
    }
}
