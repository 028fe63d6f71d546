//! Read-mostly cache of the active geofences of the current site.

use crate::errors::AppError;
use crate::models::{Geofence, GeofenceId, GeofenceRecord};
use chrono::{DateTime, Duration, Local};
use log::warn;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct GeofenceStore {
    geofences: Arc<[Geofence]>,
    refreshed_at: Option<DateTime<Local>>,
}

impl GeofenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content with backend records. Inactive and malformed
    /// geofences are dropped; returns how many records were rejected.
    pub fn replace_records(&mut self, records: Vec<GeofenceRecord>, at: DateTime<Local>) -> usize {
        let total = records.len();
        let mut kept = Vec::with_capacity(total);

        for rec in records {
            match Geofence::try_from(rec) {
                Ok(g) if g.is_active => kept.push(g),
                Ok(_) => {}
                Err(AppError::GeometryInputInvalid { id, reason }) => {
                    warn!("ignoring geofence {id}: {reason}");
                }
                Err(e) => warn!("ignoring geofence: {e}"),
            }
        }

        let accepted = kept.len();
        self.replace(kept, at);
        total - accepted
    }

    /// Install an already validated list.
    pub fn replace(&mut self, mut geofences: Vec<Geofence>, at: DateTime<Local>) {
        geofences.retain(|g| g.is_active && g.validate().is_ok());
        geofences.sort_by_key(|g| g.id);
        self.geofences = geofences.into();
        self.refreshed_at = Some(at);
    }

    /// Cheap shared handle to the current set.
    pub fn snapshot(&self) -> Arc<[Geofence]> {
        Arc::clone(&self.geofences)
    }

    pub fn is_empty(&self) -> bool {
        self.geofences.is_empty()
    }

    pub fn len(&self) -> usize {
        self.geofences.len()
    }

    pub fn get(&self, id: GeofenceId) -> Option<&Geofence> {
        self.geofences.iter().find(|g| g.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Geofence> {
        self.geofences.iter().find(|g| g.name == name)
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Local>> {
        self.refreshed_at
    }

    /// Never refreshed, or older than `max_age`.
    pub fn is_stale(&self, now: DateTime<Local>, max_age: Duration) -> bool {
        match self.refreshed_at {
            None => true,
            Some(at) => now - at > max_age,
        }
    }

    pub fn records(&self) -> Vec<GeofenceRecord> {
        self.geofences.iter().map(GeofenceRecord::from).collect()
    }
}
