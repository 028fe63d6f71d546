//! Time utilities: formatting elapsed durations and timestamps for CLI output.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Local};

pub fn format_seconds(secs: i64) -> String {
    let sign = if secs < 0 { "-" } else { "" };
    let s = secs.abs();
    format!("{}{:02}:{:02}:{:02}", sign, s / 3600, (s % 3600) / 60, s % 60)
}

pub fn format_timestamp(ts: Option<DateTime<Local>>) -> String {
    match ts {
        Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        None => "--".to_string(),
    }
}

/// Parse an RFC 3339 timestamp as stored in the database.
pub fn parse_rfc3339(s: &str) -> AppResult<DateTime<Local>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Local))
        .map_err(|_| AppError::InvalidTimestamp(s.to_string()))
}

pub fn parse_optional_rfc3339(s: Option<String>) -> AppResult<Option<DateTime<Local>>> {
    s.map(|v| parse_rfc3339(&v)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_seconds_as_clock() {
        assert_eq!(format_seconds(3_725), "01:02:05");
        assert_eq!(format_seconds(-60), "-00:01:00");
    }
}
