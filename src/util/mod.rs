//! Utility modules for locdigest.

mod time_parser;

pub use time_parser::{TimeParseError, parse_instant};

use chrono::NaiveDateTime;

/// Canonical rendering of an instant in output tables.
pub fn format_instant(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}
