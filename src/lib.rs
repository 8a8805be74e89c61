//! locdigest - Mobility digest generation library.
//!
//! This library condenses long streams of per-user location events, each a
//! `(time, cell)` pair, into a much smaller sequence of digests: contiguous
//! segments during which the user was plausibly "at" a small bounded set of
//! cells. It provides the core functionality shared by:
//! - the `locdigest` CLI - batch digestion of CSV/parquet event tables
//! - downstream mobility analysis built on the digest table

pub mod analysis;
pub mod digest;
pub mod driver;
pub mod mercator;
pub mod permanence;
pub mod table;
pub mod util;
