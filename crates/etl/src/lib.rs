//! The bounded-memory external-sort transform used by every stage that produces
//! a large volume of derived data.
//!
//! A [`Collector`] buffers `(key, value)` byte pairs up to a configured budget,
//! spills sorted runs to a scratch directory once that budget is exceeded, and
//! replays everything it ever collected back in ascending key order via a k-way
//! merge. [`Collector::load`] then drives that sorted stream straight into a
//! destination table, either `APPEND`-ing (rejecting any non-monotone key) or
//! `UPSERT`-ing.

mod collector;
mod error;
mod run;

pub use collector::{Collector, LoadMode};
pub use error::CollectorError;
