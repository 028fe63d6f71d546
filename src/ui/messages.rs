//! Console output of the CLI commands.

use crate::models::{AttendanceStatus, GeofenceId};
use crate::utils::formatting::{bold, describe_status, pad_right};
use crate::utils::time::{format_seconds, format_timestamp};
use std::fmt;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

const FG_BLUE: &str = "\x1b[34m";
const FG_GREEN: &str = "\x1b[32m";
const FG_YELLOW: &str = "\x1b[33m";

const ICON_INFO: &str = "ℹ️";
const ICON_OK: &str = "✅";
const ICON_WARN: &str = "⚠️";
const ICON_PENDING: &str = "⏳";
const ICON_PIN: &str = "📌";

/// Width of the label column in the status block.
const LABEL_WIDTH: usize = 15;

pub fn info<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", FG_BLUE, BOLD, ICON_INFO, RESET, msg);
}

pub fn success<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", FG_GREEN, BOLD, ICON_OK, RESET, msg);
}

pub fn warning<T: fmt::Display>(msg: T) {
    println!("{}{}{} {}{}", FG_YELLOW, BOLD, ICON_WARN, RESET, msg);
}

pub fn header<T: fmt::Display>(msg: T) {
    println!(
        "{}{}====================== {}\n{}",
        FG_BLUE, BOLD, msg, RESET
    );
}

fn field<T: fmt::Display>(label: &str, value: T) {
    println!("{} {}", pad_right(label, LABEL_WIDTH), value);
}

/// Colored attendance label, e.g. `checked in` in green.
fn colored_label(label: &str) -> String {
    format!("{}{}{}", describe_status(label), bold(label), RESET)
}

/// Multi-line summary of an attendance status. Times the status does not
/// carry are left out, except the check-in which is always shown.
pub fn attendance(status: &AttendanceStatus) {
    field("State:", colored_label(status.label()));
    if let Some(name) = &status.location_name {
        field("Location:", name);
    }
    field("Check-in:", format_timestamp(status.check_in_time));
    if status.is_checked_out {
        field("Check-out:", format_timestamp(status.check_out_time));
    }
    if let Some(elapsed) = status.elapsed_time {
        field("Worked:", format_seconds(elapsed));
    }
    if status.is_manual_checkout {
        field("Next check-in:", format_timestamp(status.next_check_in_time));
    }
    if status.pending_sync {
        println!("{ICON_PENDING} waiting to sync with the backend");
    }
}

/// One-line notice that the attendance state changed (replay output).
pub fn transition(status: &AttendanceStatus) {
    let place = status
        .location_name
        .as_deref()
        .map(|n| format!(" @ {n}"))
        .unwrap_or_default();
    println!("    → {}{}", colored_label(status.label()), place);
}

pub fn selected(id: Option<GeofenceId>) {
    if let Some(id) = id {
        println!("{ICON_PIN} selected geofence: {id}");
    }
}
