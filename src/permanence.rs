//! Permanence accounting.
//!
//! An independent utility that attributes observed time to footprints
//! (cells or any other opaque location label). For each consecutive pair of
//! events on the same footprint closer than `max_dt`, the gap is credited
//! to that footprint. A pluggable distance metric can additionally credit
//! half-gaps around a visit whose neighbours are close enough to imply low
//! travel speed; the default metric reports infinite distance, which
//! disables that branch.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Weekday};

use crate::driver::EventTable;

/// 30 km/h in m/s.
pub const MAX_SPEED: f64 = 30.0 * 1000.0 / 3600.0;
/// Default cap for each half-gap credit: 8 minutes.
pub const SEMI_TIME_THRESHOLD: i64 = 8 * 60;
/// Default maximum creditable gap: 12 hours.
pub const MAX_DT: i64 = 12 * 60 * 60;

/// Calendar bucketing of permanence totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl TimePeriod {
    /// Start of the period containing `time` (weeks start on Monday).
    fn start_of(&self, time: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = match self {
            TimePeriod::Daily => time.date(),
            TimePeriod::Weekly => time.date().week(Weekday::Mon).first_day(),
            TimePeriod::Monthly => time.date().with_day(1)?,
        };
        date.and_hms_opt(0, 0, 0)
    }
}

/// Tuning knobs for permanence accounting.
#[derive(Debug, Clone, Copy)]
pub struct PermanenceParams {
    pub max_speed: f64,
    pub semi_time_threshold: i64,
    pub max_dt: i64,
}

impl Default for PermanenceParams {
    fn default() -> Self {
        Self {
            max_speed: MAX_SPEED,
            semi_time_threshold: SEMI_TIME_THRESHOLD,
            max_dt: MAX_DT,
        }
    }
}

/// Distance in metres between two footprints. The default metric knows
/// nothing about footprint identities and reports infinity.
pub type DistanceFn = fn(&str, &str) -> f64;

/// Default footprint metric: every pair is infinitely far apart.
pub fn footprint_distance(_fp1: &str, _fp2: &str) -> f64 {
    f64::INFINITY
}

/// Permanence total for one footprint (and period, when grouped).
#[derive(Debug, Clone, PartialEq)]
pub struct PermanenceRecord {
    pub footprint: String,
    /// Start of the calendar period; `None` without grouping.
    pub period_start: Option<NaiveDateTime>,
    pub seconds: f64,
}

/// Computes per-footprint permanence over one sorted series.
///
/// `times` must be sorted ascending and aligned with `footprints`. Returns
/// totals keyed by footprint (and period start, when `grouping` is set),
/// in key order.
pub fn get_permanence(
    footprints: &[String],
    times: &[NaiveDateTime],
    params: PermanenceParams,
    distance: DistanceFn,
    grouping: Option<TimePeriod>,
) -> Vec<PermanenceRecord> {
    let n = times.len().min(footprints.len());
    let mut totals: BTreeMap<(String, Option<NaiveDateTime>), f64> = BTreeMap::new();
    let mut credit = |i: usize, seconds: f64| {
        let key = (
            footprints[i].clone(),
            grouping.and_then(|g| g.start_of(times[i])),
        );
        *totals.entry(key).or_insert(0.0) += seconds;
    };

    for i in 1..n {
        let dt = (times[i] - times[i - 1]).num_seconds();
        let same_footprint = footprints[i] == footprints[i - 1] && dt < params.max_dt;
        if same_footprint {
            credit(i, dt as f64);
            continue;
        }

        // Visit sandwiched between near-enough neighbours: credit the
        // capped half-gaps on both sides.
        if i + 1 < n {
            let dt_next = (times[i + 1] - times[i]).num_seconds();
            let span = (dt + dt_next) as f64;
            let low_speed = distance(&footprints[i - 1], &footprints[i + 1]) / span
                < params.max_speed;
            if low_speed && dt + dt_next < params.max_dt {
                let threshold = params.semi_time_threshold as f64;
                let semi = (0.5 * dt as f64).min(threshold)
                    + (0.5 * dt_next as f64).min(threshold);
                credit(i, semi);
            }
        }
    }

    totals
        .into_iter()
        .map(|((footprint, period_start), seconds)| PermanenceRecord {
            footprint,
            period_start,
            seconds,
        })
        .collect()
}

/// One labelled permanence output row of the multi-user wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct PermanenceRow {
    pub user: String,
    pub props: Vec<String>,
    pub record: PermanenceRecord,
}

/// Computes permanence per `(user, props...)` group of an event table,
/// using the `cell` column as the footprint.
///
/// Groups are emitted in lexicographic order, mirroring the digest driver.
pub fn permanence_multi_user(
    table: &EventTable,
    params: PermanenceParams,
    distance: DistanceFn,
    grouping: Option<TimePeriod>,
) -> Vec<PermanenceRow> {
    let mut groups: BTreeMap<(String, Vec<String>), Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        groups
            .entry((row.user.clone(), row.props.clone()))
            .or_default()
            .push(i);
    }

    let mut out = Vec::new();
    for ((user, props), mut indices) in groups {
        indices.sort_by_key(|&i| table.rows[i].time);
        let footprints: Vec<String> = indices
            .iter()
            .map(|&i| table.rows[i].cell.clone())
            .collect();
        let times: Vec<NaiveDateTime> = indices.iter().map(|&i| table.rows[i].time).collect();
        for record in get_permanence(&footprints, &times, params, distance, grouping) {
            out.push(PermanenceRow {
                user: user.clone(),
                props: props.clone(),
                record,
            });
        }
    }
    out
}
