//! Load progress and resumability
//!
//! A unit present in the progress records is never reprocessed. Records are
//! appended only after a unit's rows are committed and are never updated or
//! deleted by the loader.
//!
//! # Overview
//!
//! - `ProgressTracker` - skip-set plus the serialized append point
//! - `ProgressSnapshot` - serializable view for reporting

mod tracker;
mod types;

pub use tracker::ProgressTracker;
pub use types::ProgressSnapshot;

#[cfg(test)]
mod tracker_tests;
