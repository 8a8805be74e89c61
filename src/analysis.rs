//! Observation-window analysis.
//!
//! Wraps the window driver and describes the run: how much warmup and
//! buffer data surrounded the observation window, and how many events and
//! distinct users each region contained.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::digest::{DigestError, DigestParams};
use crate::driver::{DigestTable, EventTable, digest_multi_user_window};

/// Statistics for one region of the input (warmup, observation or buffer).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    /// Region length in seconds. Warmup and buffer are measured against the
    /// global min/max event time and may be negative when the window
    /// extends beyond the data.
    pub duration_seconds: i64,
    pub events: u64,
    pub distinct_users: u64,
}

/// Metadata record of a window run: the input split into the events before,
/// inside and after the observation window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowMeta {
    pub warmup: RegionStats,
    pub observation: RegionStats,
    pub buffer: RegionStats,
}

fn region_stats<'a, I>(duration_seconds: i64, rows: I) -> RegionStats
where
    I: Iterator<Item = &'a str>,
{
    let mut events = 0u64;
    let mut users: HashSet<&str> = HashSet::new();
    for user in rows {
        events += 1;
        users.insert(user);
    }
    RegionStats {
        duration_seconds,
        events,
        distinct_users: users.len() as u64,
    }
}

/// Computes the window metadata from the full, unfiltered input.
pub fn window_meta(
    table: &EventTable,
    ow_start: NaiveDateTime,
    ow_end: NaiveDateTime,
) -> WindowMeta {
    let min_time = table.rows.iter().map(|r| r.time).min();
    let max_time = table.rows.iter().map(|r| r.time).max();

    let warmup_duration = min_time.map_or(0, |t| (ow_start - t).num_seconds());
    let buffer_duration = max_time.map_or(0, |t| (t - ow_end).num_seconds());

    WindowMeta {
        warmup: region_stats(
            warmup_duration,
            table
                .rows
                .iter()
                .filter(|r| r.time < ow_start)
                .map(|r| r.user.as_str()),
        ),
        observation: region_stats(
            (ow_end - ow_start).num_seconds(),
            table
                .rows
                .iter()
                .filter(|r| ow_start <= r.time && r.time <= ow_end)
                .map(|r| r.user.as_str()),
        ),
        buffer: region_stats(
            buffer_duration,
            table
                .rows
                .iter()
                .filter(|r| r.time > ow_end)
                .map(|r| r.user.as_str()),
        ),
    }
}

/// Runs the window driver and returns the clipped digest table together
/// with the run metadata.
pub fn generate_digests_observation_window(
    table: &EventTable,
    params: DigestParams,
    ow_start: NaiveDateTime,
    ow_end: NaiveDateTime,
) -> Result<(DigestTable, WindowMeta), DigestError> {
    let meta = window_meta(table, ow_start, ow_end);
    let digests = digest_multi_user_window(table, params, ow_start, ow_end)?;
    Ok((digests, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::EventRow;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn row(user: &str, time: &str) -> EventRow {
        EventRow {
            user: user.to_string(),
            time: ts(time),
            cell: "A".to_string(),
            props: Vec::new(),
        }
    }

    fn sample_table() -> EventTable {
        EventTable {
            prop_names: Vec::new(),
            rows: vec![
                row("u1", "2022-01-01 00:00:00"),
                row("u2", "2022-01-01 06:00:00"),
                row("u1", "2022-01-02 00:00:00"),
                row("u1", "2022-01-02 12:00:00"),
                row("u2", "2022-01-03 12:00:00"),
            ],
        }
    }

    #[test]
    fn test_window_meta_regions() {
        let meta = window_meta(
            &sample_table(),
            ts("2022-01-02 00:00:00"),
            ts("2022-01-03 00:00:00"),
        );
        assert_eq!(
            meta.warmup,
            RegionStats {
                duration_seconds: 24 * 60 * 60,
                events: 2,
                distinct_users: 2,
            }
        );
        assert_eq!(
            meta.observation,
            RegionStats {
                duration_seconds: 24 * 60 * 60,
                events: 2,
                distinct_users: 1,
            }
        );
        assert_eq!(
            meta.buffer,
            RegionStats {
                duration_seconds: 12 * 60 * 60,
                events: 1,
                distinct_users: 1,
            }
        );
    }

    #[test]
    fn test_window_meta_window_beyond_data_is_negative() {
        let meta = window_meta(
            &sample_table(),
            ts("2021-12-25 00:00:00"),
            ts("2022-01-10 00:00:00"),
        );
        assert!(meta.warmup.duration_seconds < 0);
        assert!(meta.buffer.duration_seconds < 0);
        assert_eq!(meta.warmup.events, 0);
        assert_eq!(meta.buffer.events, 0);
    }

    #[test]
    fn test_window_meta_empty_input() {
        let table = EventTable::default();
        let meta = window_meta(&table, ts("2022-01-01 00:00:00"), ts("2022-01-02 00:00:00"));
        assert_eq!(meta.warmup, RegionStats::default());
        assert_eq!(meta.buffer, RegionStats::default());
        assert_eq!(meta.observation.duration_seconds, 24 * 60 * 60);
        assert_eq!(meta.observation.events, 0);
    }

    #[test]
    fn test_analysis_returns_digests_and_meta() {
        let (digests, meta) = generate_digests_observation_window(
            &sample_table(),
            DigestParams::default(),
            ts("2022-01-02 00:00:00"),
            ts("2022-01-03 00:00:00"),
        )
        .unwrap();
        assert_eq!(meta.observation.events, 2);
        // Only u1 has digests starting inside the window.
        assert!(digests.rows.iter().all(|r| r.user == "u1"));
        assert!(!digests.rows.is_empty());
    }

    #[test]
    fn test_meta_serialises_to_json() {
        let meta = window_meta(
            &sample_table(),
            ts("2022-01-02 00:00:00"),
            ts("2022-01-03 00:00:00"),
        );
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"warmup\""));
        assert!(json.contains("\"observation\""));
        assert!(json.contains("\"buffer\""));
        assert!(json.contains("\"duration_seconds\""));
    }
}
