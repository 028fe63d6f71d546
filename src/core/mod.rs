pub mod containment;
pub mod geometry;
pub mod machine;
pub mod sampler;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod tracker;

pub use scheduler::TickOutcome;
pub use tracker::{AttendanceTracker, TrackerAlert, TrackerDeps, TrackerSnapshot};
