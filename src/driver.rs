//! Multi-user digestion driver.
//!
//! Partitions a heterogeneous event table by `(user, user_props...)`, sorts
//! each partition by time and feeds it to the digest machine, labelling the
//! emitted digests with the grouping tuple and a per-group `digest_id`.
//! The output is deterministic regardless of input row order: groups are
//! emitted in lexicographic order of their grouping tuple.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::digest::clip::digest_series_window;
use crate::digest::machine::digest_series;
use crate::digest::{Digest, DigestError, DigestParams};

/// One input event row: required `user`, `time`, `cell` plus any number of
/// static per-user property values (one per configured prop column).
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub user: String,
    pub time: NaiveDateTime,
    pub cell: String,
    pub props: Vec<String>,
}

/// An event table: rows plus the names of the configured prop columns.
///
/// Every row is expected to carry one prop value per name, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    pub prop_names: Vec<String>,
    pub rows: Vec<EventRow>,
}

/// One output row: a digest labelled with its grouping tuple and the
/// zero-based position of the digest within its group.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestRow {
    pub user: String,
    pub props: Vec<String>,
    pub digest_id: u64,
    pub digest: Digest,
}

/// The digest table produced by a run, with the prop column names carried
/// through from the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestTable {
    pub prop_names: Vec<String>,
    pub rows: Vec<DigestRow>,
}

/// A partition of the input: grouping key plus time-sorted events.
struct Group {
    user: String,
    props: Vec<String>,
    times: Vec<NaiveDateTime>,
    cells: Vec<String>,
}

/// Groups rows by `(user, props...)` and sorts each group by time.
///
/// The sort is stable, so rows with identical timestamps keep their input
/// order within a group.
fn partition(table: &EventTable) -> Vec<Group> {
    let mut groups: BTreeMap<(String, Vec<String>), Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        groups
            .entry((row.user.clone(), row.props.clone()))
            .or_default()
            .push(i);
    }

    groups
        .into_iter()
        .map(|((user, props), mut indices)| {
            indices.sort_by_key(|&i| table.rows[i].time);
            Group {
                user,
                props,
                times: indices.iter().map(|&i| table.rows[i].time).collect(),
                cells: indices.iter().map(|&i| table.rows[i].cell.clone()).collect(),
            }
        })
        .collect()
}

fn label(table: &mut DigestTable, group: Group, digests: Vec<Digest>) {
    for (digest_id, digest) in digests.into_iter().enumerate() {
        table.rows.push(DigestRow {
            user: group.user.clone(),
            props: group.props.clone(),
            digest_id: digest_id as u64,
            digest,
        });
    }
}

/// Digests every user of the table over its whole time range.
///
/// Empty input yields an empty table with the prop names carried through.
pub fn digest_multi_user(
    table: &EventTable,
    params: DigestParams,
) -> Result<DigestTable, DigestError> {
    let mut out = DigestTable {
        prop_names: table.prop_names.clone(),
        rows: Vec::new(),
    };
    for group in partition(table) {
        let digests = digest_series(
            params,
            group
                .times
                .iter()
                .copied()
                .zip(group.cells.iter().map(String::as_str)),
        )?;
        debug!(
            "digested user {}: {} events -> {} digests",
            group.user,
            group.times.len(),
            digests.len()
        );
        label(&mut out, group, digests);
    }
    Ok(out)
}

/// Digests every user of the table, keeping only digests whose start falls
/// inside `[ow_start, ow_end]`.
///
/// Each group is clipped to the events around the window before running the
/// machine; the result equals filtering a full run by `start_time`.
pub fn digest_multi_user_window(
    table: &EventTable,
    params: DigestParams,
    ow_start: NaiveDateTime,
    ow_end: NaiveDateTime,
) -> Result<DigestTable, DigestError> {
    let mut out = DigestTable {
        prop_names: table.prop_names.clone(),
        rows: Vec::new(),
    };
    for group in partition(table) {
        let digests =
            digest_series_window(params, &group.times, &group.cells, ow_start, ow_end)?;
        debug!(
            "digested user {} in window: {} events -> {} digests",
            group.user,
            group.times.len(),
            digests.len()
        );
        label(&mut out, group, digests);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn row(user: &str, time: &str, cell: &str) -> EventRow {
        EventRow {
            user: user.to_string(),
            time: ts(time),
            cell: cell.to_string(),
            props: Vec::new(),
        }
    }

    fn hourly_rows(user: &str) -> Vec<EventRow> {
        (1..=5)
            .map(|h| row(user, &format!("2022-01-01 {:02}:00:00", h), "A"))
            .collect()
    }

    fn mixed_rows(user: &str) -> Vec<EventRow> {
        [
            ("2021-08-15 10:00:00", "A"),
            ("2021-08-18 10:00:00", "A"),
            ("2021-09-15 10:00:00", "A"),
            ("2021-09-15 10:00:01", "A"),
            ("2022-01-01 10:00:00", "A"),
            ("2022-01-01 12:00:00", "A"),
            ("2022-01-01 12:01:00", "B"),
            ("2022-01-01 12:01:04", "A"),
            ("2022-01-01 12:01:05", "B"),
            ("2022-01-01 12:01:06", "B"),
            ("2022-01-01 12:01:07", "A"),
            ("2022-01-01 12:01:10", "B"),
            ("2022-01-01 14:00:00", "B"),
            ("2022-01-01 15:00:00", "B"),
            ("2022-01-01 16:00:00", "B"),
            ("2022-01-01 17:00:00", "B"),
            ("2022-01-01 18:00:00", "B"),
        ]
        .iter()
        .map(|(t, c)| row(user, t, c))
        .collect()
    }

    #[test]
    fn test_single_user_single_digest() {
        let table = EventTable {
            prop_names: Vec::new(),
            rows: hourly_rows("Agent1"),
        };
        let out = digest_multi_user(&table, DigestParams::default()).unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].user, "Agent1");
        assert_eq!(out.rows[0].digest_id, 0);
        assert_eq!(out.rows[0].digest.num_events, 5);
    }

    #[test]
    fn test_two_users_are_independent() {
        let mut rows = hourly_rows("Agent1");
        rows.extend(mixed_rows("Agent2"));
        let table = EventTable {
            prop_names: Vec::new(),
            rows,
        };
        let out = digest_multi_user(&table, DigestParams::default()).unwrap();

        let per_user = |user: &str| out.rows.iter().filter(|r| r.user == user).count();
        assert_eq!(per_user("Agent1"), 1);
        assert_eq!(per_user("Agent2"), 6);
        // Groups come out in lexicographic order with digest_id dense per group.
        let ids: Vec<(String, u64)> = out
            .rows
            .iter()
            .map(|r| (r.user.clone(), r.digest_id))
            .collect();
        let mut expected: Vec<(String, u64)> =
            vec![("Agent1".to_string(), 0)];
        expected.extend((0..6).map(|i| ("Agent2".to_string(), i)));
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_props_split_groups() {
        let mut rows = Vec::new();
        for (prop, cell) in [("home", "A"), ("work", "B")] {
            for h in 1..=3 {
                let mut r = row("Agent1", &format!("2022-01-01 {:02}:00:00", h), cell);
                r.props = vec![prop.to_string()];
                rows.push(r);
            }
        }
        let table = EventTable {
            prop_names: vec!["segment".to_string()],
            rows,
        };
        let out = digest_multi_user(&table, DigestParams::default()).unwrap();
        assert_eq!(out.prop_names, vec!["segment".to_string()]);
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0].props, vec!["home".to_string()]);
        assert_eq!(out.rows[1].props, vec!["work".to_string()]);
        assert_eq!(out.rows[0].digest.start_cell, "A");
        assert_eq!(out.rows[1].digest.start_cell, "B");
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let table = EventTable {
            prop_names: vec!["segment".to_string()],
            rows: Vec::new(),
        };
        let out = digest_multi_user(&table, DigestParams::default()).unwrap();
        assert!(out.rows.is_empty());
        assert_eq!(out.prop_names, vec!["segment".to_string()]);
    }

    #[test]
    fn test_window_driver_filters_by_start() {
        let table = EventTable {
            prop_names: Vec::new(),
            rows: mixed_rows("Agent2"),
        };
        let params = DigestParams::default();
        let full = digest_multi_user(&table, params).unwrap();
        let ow_start = ts("2022-01-01 00:00:00");
        let ow_end = ts("2022-01-02 00:00:00");
        let windowed = digest_multi_user_window(&table, params, ow_start, ow_end).unwrap();

        let expected: Vec<&DigestRow> = full
            .rows
            .iter()
            .filter(|r| ow_start <= r.digest.start_time && r.digest.start_time <= ow_end)
            .collect();
        assert_eq!(windowed.rows.len(), expected.len());
        for (got, want) in windowed.rows.iter().zip(expected) {
            assert_eq!(&got.digest, &want.digest);
        }
        // digest_id is re-numbered for the window.
        for (i, r) in windowed.rows.iter().enumerate() {
            assert_eq!(r.digest_id, i as u64);
        }
    }

    fn arb_table() -> impl Strategy<Value = EventTable> {
        prop::collection::vec(
            (0usize..3, 0i64..200_000, 0usize..3),
            1..60,
        )
        .prop_map(|triples| {
            let base = ts("2022-01-01 00:00:00");
            // Unique timestamps: with equal times a stable time sort keeps
            // input order, and permutation invariance cannot hold.
            let rows = triples
                .into_iter()
                .enumerate()
                .map(|(i, (user, off, cell))| EventRow {
                    user: ["u1", "u2", "u3"][user].to_string(),
                    time: base + chrono::Duration::seconds(off * 60 + i as i64),
                    cell: ["A", "B", "C"][cell].to_string(),
                    props: Vec::new(),
                })
                .collect();
            EventTable {
                prop_names: Vec::new(),
                rows,
            }
        })
    }

    proptest! {
        #[test]
        fn prop_permutation_invariance(table in arb_table(), seed in any::<u64>()) {
            let params = DigestParams::default();
            let baseline = digest_multi_user(&table, params).unwrap();

            // Deterministic shuffle of the rows.
            let mut shuffled = table.clone();
            let mut state = seed | 1;
            for i in (1..shuffled.rows.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.rows.swap(i, j);
            }

            prop_assert_eq!(digest_multi_user(&shuffled, params).unwrap(), baseline);
        }
    }
}
