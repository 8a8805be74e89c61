//! Flexible instant parser for event tables and CLI arguments.
//!
//! Supports multiple formats:
//! - ISO 8601: `2022-01-01T10:00:00` (optionally with a UTC offset)
//! - Space-separated: `2022-01-01 10:00:00`
//! - Date only: `2022-01-01` (midnight)
//! - Unix timestamp: `1640995200`

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Error type for instant parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to parse time '{}': {}", self.input, self.message)
    }
}

impl std::error::Error for TimeParseError {}

/// Parses a flexible instant string into a naive UTC datetime.
///
/// # Supported formats
///
/// | Format | Example |
/// |--------|---------|
/// | ISO 8601 | `2022-01-01T10:00:00`, `2022-01-01T10:00:00+01:00` |
/// | Space-separated | `2022-01-01 10:00:00`, `2022-01-01 10:00` |
/// | Date only | `2022-01-01` (midnight) |
/// | Unix timestamp | `1640995200` |
pub fn parse_instant(input: &str) -> Result<NaiveDateTime, TimeParseError> {
    let input = input.trim();

    // Try each format in order
    if let Some(dt) = try_parse_unix_timestamp(input) {
        return Ok(dt);
    }

    if let Some(dt) = try_parse_iso8601(input) {
        return Ok(dt);
    }

    if let Some(dt) = try_parse_space_separated(input) {
        return Ok(dt);
    }

    if let Some(dt) = try_parse_date_only(input) {
        return Ok(dt);
    }

    Err(TimeParseError {
        input: input.to_string(),
        message: "unrecognized format; use ISO 8601 (2022-01-01T10:00:00), \
                  date+time (2022-01-01 10:00:00), date (2022-01-01), \
                  or unix seconds (1640995200)"
            .to_string(),
    })
}

/// Try to parse as Unix timestamp (plain integer, seconds).
fn try_parse_unix_timestamp(input: &str) -> Option<NaiveDateTime> {
    if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
        let secs = input.parse::<i64>().ok()?;
        Some(DateTime::from_timestamp(secs, 0)?.naive_utc())
    } else {
        None
    }
}

/// Try to parse as ISO 8601 datetime with a `T` separator.
fn try_parse_iso8601(input: &str) -> Option<NaiveDateTime> {
    if !input.contains('T') {
        return None;
    }

    // With timezone offset first, then naive variants
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Some(dt);
    }

    None
}

/// Try to parse as space-separated date and time.
fn try_parse_space_separated(input: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Some(dt);
    }
    None
}

/// Try to parse as a bare date (midnight UTC).
fn try_parse_date_only(input: &str) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?;
    date.and_hms_opt(0, 0, 0)
}
