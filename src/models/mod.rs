pub mod geofence;
pub mod intent;
pub mod sample;
pub mod status;

pub use geofence::{GeoPoint, Geofence, GeofenceId, GeofenceRecord, GeofenceShape};
pub use intent::{IntentKind, TransitionIntent};
pub use sample::LocationSample;
pub use status::AttendanceStatus;
