//! Debounced containment tracking.
//!
//! Raw samples are reduced to at most one `Enter`/`Exit` per cycle. A new
//! containment state (inside geofence `g`, or outside everything) is only
//! confirmed once it has been observed on `required_samples` consecutive
//! usable samples. Samples above the accuracy ceiling are ignored and do
//! not break a streak.

use super::geometry;
use crate::models::{Geofence, GeofenceId, LocationSample};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainmentEvent {
    Enter(GeofenceId),
    Exit(GeofenceId),
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HysteresisPolicy {
    pub required_samples: u32,
    pub accuracy_ceiling_m: f64,
}

impl Default for HysteresisPolicy {
    fn default() -> Self {
        Self {
            required_samples: 3,
            accuracy_ceiling_m: 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContainmentTracker {
    policy: HysteresisPolicy,
    confirmed: Option<GeofenceId>,
    candidate: Option<Option<GeofenceId>>,
    streak: u32,
}

impl ContainmentTracker {
    pub fn new(policy: HysteresisPolicy) -> Self {
        Self {
            policy,
            confirmed: None,
            candidate: None,
            streak: 0,
        }
    }

    pub fn policy(&self) -> HysteresisPolicy {
        self.policy
    }

    /// Geofence the device is confirmed to be inside.
    pub fn current_geofence(&self) -> Option<GeofenceId> {
        self.confirmed
    }

    /// Seed the confirmed state, e.g. after restoring a check-in from storage,
    /// so that leaving that geofence is still detected.
    pub fn assume_inside(&mut self, geofence: Option<GeofenceId>) {
        if self.confirmed != geofence {
            self.confirmed = geofence;
            self.clear_candidate();
        }
    }

    pub fn reset(&mut self) {
        self.confirmed = None;
        self.clear_candidate();
    }

    fn clear_candidate(&mut self) {
        self.candidate = None;
        self.streak = 0;
    }

    pub fn evaluate(&mut self, sample: &LocationSample, geofences: &[Geofence]) -> ContainmentEvent {
        if geofences.is_empty() {
            self.clear_candidate();
            return ContainmentEvent::NoChange;
        }

        if !sample.is_usable(self.policy.accuracy_ceiling_m) {
            debug!(
                "discarding sample with accuracy {:.0}m (ceiling {:.0}m)",
                sample.accuracy_meters, self.policy.accuracy_ceiling_m
            );
            return ContainmentEvent::NoChange;
        }

        let observed = geometry::best_match(geofences, sample.point()).map(|g| g.id);

        if observed == self.confirmed {
            self.clear_candidate();
            return ContainmentEvent::NoChange;
        }

        if self.candidate == Some(observed) {
            self.streak = self.streak.saturating_add(1);
        } else {
            self.candidate = Some(observed);
            self.streak = 1;
        }

        if self.streak < self.policy.required_samples.max(1) {
            return ContainmentEvent::NoChange;
        }

        match (self.confirmed, observed) {
            (Some(left), _) => {
                // Leaving is reported first. When the device moved straight
                // into another geofence the candidate keeps its full streak,
                // so the Enter follows on the next sample still inside it.
                self.confirmed = None;
                if observed.is_none() {
                    self.clear_candidate();
                }
                ContainmentEvent::Exit(left)
            }
            (None, Some(entered)) => {
                self.confirmed = Some(entered);
                self.clear_candidate();
                ContainmentEvent::Enter(entered)
            }
            (None, None) => ContainmentEvent::NoChange,
        }
    }
}
