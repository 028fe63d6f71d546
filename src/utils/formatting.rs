//! Formatting utilities used for CLI outputs.

pub fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

pub fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}

/// Color associated with an attendance label (see `AttendanceStatus::label`).
pub fn describe_status(label: &str) -> &'static str {
    match label {
        "checked in" => "\x1b[32m",
        "checked out" => "\x1b[34m",
        "checked out (manual)" => "\x1b[33m",
        _ => "\x1b[90m",
    }
}
