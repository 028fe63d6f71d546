//! `replay`: run a recorded track through the full tracking pipeline with an
//! in-process backend and a clock that follows the recording.

use crate::cli::parser::Commands;
use crate::config::Config;
use crate::core::containment::ContainmentEvent;
use crate::core::sampler::ReplaySource;
use crate::core::sync::RetryPolicy;
use crate::core::{AttendanceTracker, TickOutcome, TrackerDeps};
use crate::api::offline::OfflineBackend;
use crate::db::StateStore;
use crate::errors::{AppError, AppResult};
use crate::models::{GeofenceRecord, LocationSample};
use crate::ui::messages::{attendance, header, info, success, transition};
use crate::utils::ManualClock;
use chrono::Duration;
use std::fs;
use std::sync::Arc;

fn describe_event(event: &ContainmentEvent) -> String {
    match event {
        ContainmentEvent::Enter(id) => format!("enter #{id}"),
        ContainmentEvent::Exit(id) => format!("exit #{id}"),
        ContainmentEvent::NoChange => "-".to_string(),
    }
}

pub async fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Replay { track, geofences } = cmd else {
        return Ok(());
    };

    let records: Vec<GeofenceRecord> = serde_json::from_str(&fs::read_to_string(geofences)?)?;
    let samples: Vec<LocationSample> = serde_json::from_str(&fs::read_to_string(track)?)?;
    let Some(first) = samples.first() else {
        return Err(AppError::Other(format!("{} contains no samples", track.display())));
    };

    let clock = Arc::new(ManualClock::new(first.captured_at - Duration::seconds(1)));
    let source = Arc::new(ReplaySource::new(samples.clone()).with_clock(Arc::clone(&clock)));
    let backend = Arc::new(OfflineBackend::new(
        records,
        cfg.tracker.cooldown(),
        clock.clone(),
    ));

    let deps = TrackerDeps {
        backend: backend.clone(),
        source: source.clone(),
        store: Arc::new(StateStore::open_in_memory(&cfg.user_key)?),
        clock,
    };
    let tracker = AttendanceTracker::new(deps, cfg.tracker.clone(), RetryPolicy::from(&cfg.sync));

    header(format!("Replaying {} sample(s)", samples.len()));

    let mut last_label = tracker.attendance_status().label();
    for sample in &samples {
        let outcome = tracker.tick().await?;
        let event = match &outcome {
            TickOutcome::Evaluated(e) => describe_event(e),
            other => format!("{other:?}"),
        };

        println!(
            "{}  {:>10.5}, {:>10.5}  ±{:>5.0} m  {}",
            sample.captured_at.format("%Y-%m-%d %H:%M:%S"),
            sample.latitude,
            sample.longitude,
            sample.accuracy_meters,
            event
        );

        let status = tracker.attendance_status();
        if status.label() != last_label {
            last_label = status.label();
            transition(&status);
        }
    }

    println!();
    attendance(&tracker.attendance_status());
    info(format!(
        "Backend requests: {} check-in, {} check-out",
        backend.check_in_calls(),
        backend.check_out_calls()
    ));
    success("Replay completed");
    Ok(())
}
