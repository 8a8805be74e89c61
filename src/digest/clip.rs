//! Observation-window clipping.
//!
//! Restricts a digest run to the digests starting inside `[ow_start,
//! ow_end]` without distorting results at the boundaries. The machine is
//! memory-less across any gap larger than `long_dt` (a renewal gap), so it
//! is enough to warm up from the last renewal gap before the window and to
//! buffer until the first renewal gap after it.

use chrono::NaiveDateTime;

use super::machine::digest_series;
use super::{Digest, DigestError, DigestParams};

/// Inclusive slice bounds `(first, last)` of the events needed to
/// reproduce, exactly, every digest starting inside the window.
///
/// `times` must be sorted ascending. Returns `None` for an empty series.
pub fn clip_bounds(
    times: &[NaiveDateTime],
    ow_start: NaiveDateTime,
    ow_end: NaiveDateTime,
    long_dt: i64,
) -> Option<(usize, usize)> {
    if times.is_empty() {
        return None;
    }

    // Warmup: start right after the last renewal gap before the window.
    let warmup_len = times.partition_point(|t| *t < ow_start);
    let mut first = 0;
    for i in (1..warmup_len).rev() {
        if (times[i] - times[i - 1]).num_seconds() > long_dt {
            first = i;
            break;
        }
    }

    // Buffer: stop right before the first renewal gap after the window.
    let buffer_start = times.partition_point(|t| *t <= ow_end);
    let mut last = times.len() - 1;
    for i in buffer_start..times.len().saturating_sub(1) {
        if (times[i + 1] - times[i]).num_seconds() > long_dt {
            last = i;
            break;
        }
    }

    Some((first, last))
}

/// Runs the digest machine on the clipped slice of one user's series and
/// keeps the digests whose `start_time` falls inside `[ow_start, ow_end]`.
///
/// Equivalent to running the machine on the full series and filtering by
/// `start_time`, but touches only the events around the window.
pub fn digest_series_window(
    params: DigestParams,
    times: &[NaiveDateTime],
    cells: &[String],
    ow_start: NaiveDateTime,
    ow_end: NaiveDateTime,
) -> Result<Vec<Digest>, DigestError> {
    let Some((first, last)) = clip_bounds(times, ow_start, ow_end, params.long_dt) else {
        return Ok(Vec::new());
    };

    let events = times[first..=last]
        .iter()
        .zip(&cells[first..=last])
        .map(|(t, c)| (*t, c.as_str()));
    let digests = digest_series(params, events)?;
    Ok(digests
        .into_iter()
        .filter(|d| ow_start <= d.start_time && d.start_time <= ow_end)
        .collect())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::digest::{CUTOFF, LONG_DT, SHORT_DT};

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn series(events: &[(&str, &str)]) -> (Vec<NaiveDateTime>, Vec<String>) {
        (
            events.iter().map(|(t, _)| ts(t)).collect(),
            events.iter().map(|(_, c)| c.to_string()).collect(),
        )
    }

    #[test]
    fn test_clip_bounds_no_gaps() {
        let (times, _) = series(&[
            ("2022-01-01 10:00:00", "A"),
            ("2022-01-01 11:00:00", "A"),
            ("2022-01-01 12:00:00", "A"),
        ]);
        let bounds = clip_bounds(
            &times,
            ts("2022-01-01 11:00:00"),
            ts("2022-01-01 11:30:00"),
            LONG_DT,
        );
        assert_eq!(bounds, Some((0, 2)));
    }

    #[test]
    fn test_clip_bounds_trims_both_sides() {
        let (times, _) = series(&[
            ("2022-01-01 00:00:00", "A"),
            ("2022-01-03 00:00:00", "A"), // renewal gap before the window
            ("2022-01-03 01:00:00", "A"),
            ("2022-01-03 12:00:00", "A"),
            ("2022-01-05 00:00:00", "A"), // renewal gap after the window
            ("2022-01-05 01:00:00", "A"),
        ]);
        let bounds = clip_bounds(
            &times,
            ts("2022-01-03 01:00:00"),
            ts("2022-01-03 23:00:00"),
            LONG_DT,
        );
        assert_eq!(bounds, Some((1, 3)));
    }

    #[test]
    fn test_clip_bounds_empty() {
        assert_eq!(
            clip_bounds(
                &[],
                ts("2022-01-01 00:00:00"),
                ts("2022-01-02 00:00:00"),
                LONG_DT
            ),
            None
        );
    }

    #[test]
    fn test_window_keeps_digests_starting_inside() {
        let (times, cells) = series(&[
            ("2021-08-15 10:00:00", "A"),
            ("2021-08-18 10:00:00", "A"),
            ("2022-01-01 10:00:00", "A"),
            ("2022-01-01 12:00:00", "A"),
            ("2022-01-01 12:01:00", "B"),
            ("2022-01-01 14:00:00", "B"),
        ]);
        let params = DigestParams::default();
        let full = digest_series(params, times.iter().copied().zip(cells.iter().map(String::as_str)))
            .unwrap();

        let ow_start = ts("2022-01-01 00:00:00");
        let ow_end = ts("2022-01-02 00:00:00");
        let windowed =
            digest_series_window(params, &times, &cells, ow_start, ow_end).unwrap();

        let expected: Vec<_> = full
            .into_iter()
            .filter(|d| ow_start <= d.start_time && d.start_time <= ow_end)
            .collect();
        assert_eq!(windowed, expected);
        assert!(!windowed.is_empty());
    }

    #[test]
    fn test_window_outside_data_is_empty() {
        let (times, cells) = series(&[
            ("2022-01-01 10:00:00", "A"),
            ("2022-01-01 10:00:05", "B"),
        ]);
        let out = digest_series_window(
            DigestParams::default(),
            &times,
            &cells,
            ts("2023-01-01 00:00:00"),
            ts("2023-01-02 00:00:00"),
        )
        .unwrap();
        assert!(out.is_empty());
    }

    /// Random ordered series with occasional renewal-sized gaps.
    fn arb_series() -> impl Strategy<Value = (Vec<NaiveDateTime>, Vec<String>)> {
        prop::collection::vec((0i64..LONG_DT * 2, 0usize..3), 1..60).prop_map(|steps| {
            let mut t = ts("2022-01-01 00:00:00");
            let mut times = Vec::with_capacity(steps.len());
            let mut cells = Vec::with_capacity(steps.len());
            for (gap, cell) in steps {
                t += chrono::Duration::seconds(gap);
                times.push(t);
                cells.push(["A", "B", "C"][cell].to_string());
            }
            (times, cells)
        })
    }

    proptest! {
        #[test]
        fn prop_window_run_equals_filtered_full_run(
            (times, cells) in arb_series(),
            start_off in 0i64..(LONG_DT * 120),
            window_len in 0i64..(LONG_DT * 20),
        ) {
            let params = DigestParams::new(SHORT_DT, LONG_DT, CUTOFF).unwrap();
            let ow_start = ts("2022-01-01 00:00:00") + chrono::Duration::seconds(start_off);
            let ow_end = ow_start + chrono::Duration::seconds(window_len);

            let full = digest_series(
                params,
                times.iter().copied().zip(cells.iter().map(String::as_str)),
            )
            .unwrap();
            let expected: Vec<_> = full
                .into_iter()
                .filter(|d| ow_start <= d.start_time && d.start_time <= ow_end)
                .collect();

            let windowed =
                digest_series_window(params, &times, &cells, ow_start, ow_end).unwrap();
            prop_assert_eq!(windowed, expected);
        }
    }
}
