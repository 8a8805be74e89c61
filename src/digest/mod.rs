//! Digest core: types, parameters and the per-user state machine.
//!
//! A digest is a closed contiguous segment of one user's location events
//! during which the user stayed within a small bounded set of cells. The
//! state machine in [`machine`] consumes ordered `(time, cell)` events and
//! emits digests; [`clip`] restricts a run to an observation window without
//! distorting results at its boundaries.

pub mod clip;
pub mod machine;

pub use machine::Digestor;

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// Classification of a digest.
///
/// `ShortOneCell` and `LongOneCell` are distinct states of the machine but
/// share the same external label: the output encoding is lossy on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestType {
    /// Repeated events in one cell within `short_dt` of each other.
    ShortOneCell,
    /// Rapid alternation between two cells within `short_dt`.
    ShortTwoCell,
    /// Rapid alternation between three cells within `short_dt`.
    ShortThreeCell,
    /// Continued presence in one cell with gaps up to `long_dt`.
    LongOneCell,
}

impl DigestType {
    /// External label written to the output table.
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestType::ShortOneCell | DigestType::LongOneCell => "1-cell-repetition",
            DigestType::ShortTwoCell => "2-cell-flapping",
            DigestType::ShortThreeCell => "3-cell-flapping",
        }
    }
}

/// A closed digest: one user's contiguous segment of events.
///
/// Invariants on every emitted digest:
/// - `num_cells == events_in_cell.len()` and
///   `num_events == events_in_cell.values().sum()`
/// - `start_cell` and `end_cell` are keys of `events_in_cell`
/// - `end_time >= start_time`
#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub start_cell: String,
    pub end_cell: String,
    /// Per-cell event counts; keys are the distinct cells of the segment.
    pub events_in_cell: BTreeMap<String, u32>,
    pub num_cells: u32,
    pub num_events: u32,
    pub kind: DigestType,
}

/// Time thresholds of the digest state machine, in seconds.
///
/// `short_dt` gates flapping between nearby cells, `long_dt` extends
/// single-cell presence through quiet periods, `cutoff` bounds the duration
/// of any digest regardless of activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestParams {
    pub short_dt: i64,
    pub long_dt: i64,
    pub cutoff: i64,
}

/// Default `short_dt`: 15 seconds.
pub const SHORT_DT: i64 = 15;
/// Default `long_dt`: 8 hours.
pub const LONG_DT: i64 = 8 * 60 * 60;
/// Default `cutoff`: 24 hours.
pub const CUTOFF: i64 = 24 * 60 * 60;

impl DigestParams {
    /// Validates and builds a parameter triple.
    ///
    /// All thresholds must be strictly positive and satisfy
    /// `short_dt < long_dt <= cutoff`.
    pub fn new(short_dt: i64, long_dt: i64, cutoff: i64) -> Result<Self, DigestError> {
        if short_dt <= 0 || long_dt <= 0 || cutoff <= 0 || short_dt >= long_dt || long_dt > cutoff
        {
            return Err(DigestError::InvalidParameters {
                short_dt,
                long_dt,
                cutoff,
            });
        }
        Ok(Self {
            short_dt,
            long_dt,
            cutoff,
        })
    }
}

impl Default for DigestParams {
    fn default() -> Self {
        Self {
            short_dt: SHORT_DT,
            long_dt: LONG_DT,
            cutoff: CUTOFF,
        }
    }
}

/// Errors raised by the digest core.
#[derive(Debug, Clone, PartialEq)]
pub enum DigestError {
    /// An event arrived earlier than its predecessor. Fatal for the stream.
    UnorderedEvents {
        prev: NaiveDateTime,
        current: NaiveDateTime,
    },
    /// Non-positive or inverted thresholds. Fatal for the run.
    InvalidParameters {
        short_dt: i64,
        long_dt: i64,
        cutoff: i64,
    },
}

impl std::fmt::Display for DigestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DigestError::UnorderedEvents { prev, current } => write!(
                f,
                "events are not ordered in time: previous event at {}, current at {}",
                prev, current
            ),
            DigestError::InvalidParameters {
                short_dt,
                long_dt,
                cutoff,
            } => write!(
                f,
                "invalid digest parameters: need 0 < short_dt < long_dt <= cutoff, \
                 got short_dt={} long_dt={} cutoff={}",
                short_dt, long_dt, cutoff
            ),
        }
    }
}

impl std::error::Error for DigestError {}
