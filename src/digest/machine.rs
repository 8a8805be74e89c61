//! The digest state machine.
//!
//! Consumes one user's events in time order and emits closed digests. The
//! machine is causal: each emitted digest depends only on events up to the
//! one that closed it.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use super::{Digest, DigestError, DigestParams, DigestType};

/// A digest under construction. Frozen into a [`Digest`] on close.
#[derive(Debug, Clone)]
struct OpenDigest {
    start_time: NaiveDateTime,
    start_cell: String,
    events_in_cell: BTreeMap<String, u32>,
    num_cells: u32,
    num_events: u32,
    kind: DigestType,
}

impl OpenDigest {
    fn new(time: NaiveDateTime, cell: &str) -> Self {
        let mut events_in_cell = BTreeMap::new();
        events_in_cell.insert(cell.to_string(), 1);
        Self {
            start_time: time,
            start_cell: cell.to_string(),
            events_in_cell,
            num_cells: 1,
            num_events: 1,
            kind: DigestType::ShortOneCell,
        }
    }

    fn close(self, end_time: NaiveDateTime, end_cell: String) -> Digest {
        Digest {
            start_time: self.start_time,
            end_time,
            start_cell: self.start_cell,
            end_cell,
            events_in_cell: self.events_in_cell,
            num_cells: self.num_cells,
            num_events: self.num_events,
            kind: self.kind,
        }
    }
}

/// Machine state while a digest is open. `last_time`/`last_cell` track the
/// most recently absorbed event; they become the end of the digest on close.
#[derive(Debug, Clone)]
struct Tracking {
    open: OpenDigest,
    last_time: NaiveDateTime,
    last_cell: String,
}

impl Tracking {
    fn start(time: NaiveDateTime, cell: &str) -> Self {
        Self {
            open: OpenDigest::new(time, cell),
            last_time: time,
            last_cell: cell.to_string(),
        }
    }

    fn close(self) -> Digest {
        self.open.close(self.last_time, self.last_cell)
    }
}

/// How an event is absorbed into the open digest.
enum Step {
    /// Count the event; no state change.
    Stay,
    /// Count the event and move to another single-cell state.
    Promote(DigestType),
    /// Count the event, add its (new) cell, and move state.
    Grow(DigestType),
}

/// State machine that reads a sequence of events and produces digests.
///
/// Feed events with [`process_event`](Self::process_event); each call emits
/// at most one closed digest. Call [`finish`](Self::finish) after the last
/// event to flush the digest still open.
#[derive(Debug, Clone)]
pub struct Digestor {
    params: DigestParams,
    state: Option<Tracking>,
}

impl Digestor {
    pub fn new(params: DigestParams) -> Self {
        Self {
            params,
            state: None,
        }
    }

    pub fn params(&self) -> &DigestParams {
        &self.params
    }

    /// Advances the machine by one event, returning the digest the event
    /// closed, if any.
    ///
    /// Events must be in non-decreasing time order; a step back in time is
    /// an [`DigestError::UnorderedEvents`]. Equal timestamps are treated as
    /// `dt = 0` and take the short-`dt` transitions.
    pub fn process_event(
        &mut self,
        time: NaiveDateTime,
        cell: &str,
    ) -> Result<Option<Digest>, DigestError> {
        let Some(st) = self.state.as_mut() else {
            self.state = Some(Tracking::start(time, cell));
            return Ok(None);
        };

        let dt = (time - st.last_time).num_seconds();
        if dt < 0 {
            return Err(DigestError::UnorderedEvents {
                prev: st.last_time,
                current: time,
            });
        }

        let known = st.open.events_in_cell.contains_key(cell);
        let p = &self.params;
        let step = match st.open.kind {
            DigestType::ShortOneCell => {
                if dt < p.short_dt && known {
                    Some(Step::Stay)
                } else if dt < p.short_dt {
                    Some(Step::Grow(DigestType::ShortTwoCell))
                } else if dt < p.long_dt && known {
                    Some(Step::Promote(DigestType::LongOneCell))
                } else {
                    None
                }
            }
            DigestType::ShortTwoCell => {
                if dt < p.short_dt && known {
                    Some(Step::Stay)
                } else if dt < p.short_dt {
                    Some(Step::Grow(DigestType::ShortThreeCell))
                } else {
                    None
                }
            }
            DigestType::ShortThreeCell => {
                if dt < p.short_dt && known {
                    Some(Step::Stay)
                } else {
                    None
                }
            }
            DigestType::LongOneCell => {
                if dt < p.long_dt && known {
                    Some(Step::Stay)
                } else {
                    None
                }
            }
        };

        let Some(step) = step else {
            return self.close_and_restart(time, cell);
        };

        st.open.num_events += 1;
        match step {
            Step::Stay => {
                *st.open.events_in_cell.entry(cell.to_string()).or_insert(0) += 1;
            }
            Step::Promote(kind) => {
                *st.open.events_in_cell.entry(cell.to_string()).or_insert(0) += 1;
                st.open.kind = kind;
            }
            Step::Grow(kind) => {
                st.open.events_in_cell.insert(cell.to_string(), 1);
                st.open.num_cells += 1;
                st.open.kind = kind;
            }
        }
        st.last_time = time;
        st.last_cell.clear();
        st.last_cell.push_str(cell);

        // Duration bound: a digest never spans more than `cutoff` seconds,
        // no matter how active the user is.
        if (time - st.open.start_time).num_seconds() > p.cutoff {
            return self.close_and_restart(time, cell);
        }

        Ok(None)
    }

    /// Closes the open digest and restarts the machine on the triggering
    /// event.
    ///
    /// If the closed digest absorbed more than one event, the new digest is
    /// seeded at the last absorbed `(time, cell)` and the trigger is
    /// replayed into it, so that consecutive digests share a seam
    /// (`prev.end_time == next.start_time`). When the replay itself closes
    /// the seeded digest (the trigger lies beyond `long_dt` of the seed),
    /// that one-event seed is dropped rather than emitted.
    fn close_and_restart(
        &mut self,
        time: NaiveDateTime,
        cell: &str,
    ) -> Result<Option<Digest>, DigestError> {
        let Some(st) = self.state.take() else {
            self.state = Some(Tracking::start(time, cell));
            return Ok(None);
        };

        let seed_time = st.last_time;
        let seed_cell = st.last_cell.clone();
        let prev = st.close();

        if prev.num_events > 1 {
            self.state = Some(Tracking::start(seed_time, &seed_cell));
            // The replay can only close the one-event seed; that digest is
            // discarded here.
            let _ = self.process_event(time, cell)?;
        } else {
            self.state = Some(Tracking::start(time, cell));
        }
        Ok(Some(prev))
    }

    /// Flushes the machine at end of input, returning the digest still open.
    pub fn finish(&mut self) -> Option<Digest> {
        self.state.take().map(Tracking::close)
    }
}

/// Runs the machine over a whole event series and collects every digest.
pub fn digest_series<'a, I>(params: DigestParams, events: I) -> Result<Vec<Digest>, DigestError>
where
    I: IntoIterator<Item = (NaiveDateTime, &'a str)>,
{
    let mut machine = Digestor::new(params);
    let mut digests = Vec::new();
    for (time, cell) in events {
        if let Some(digest) = machine.process_event(time, cell)? {
            digests.push(digest);
        }
    }
    if let Some(digest) = machine.finish() {
        digests.push(digest);
    }
    Ok(digests)
}
