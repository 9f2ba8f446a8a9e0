//! Loader types
//!
//! Unit stages, run options and the reports produced by the loader.

use crate::convert::{accumulate, ErrorCounts};
use crate::schema::{RegisterOutcome, Schema};
use crate::types::Period;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Where a unit is in its load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStage {
    Discovered,
    /// Already committed by an earlier run
    Skipped,
    Read,
    Normalized,
    Converted,
    PartitionTagged,
    Inserted,
    ProgressRecorded,
    Failed,
}

impl UnitStage {
    /// Stage name as logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Skipped => "skipped",
            Self::Read => "read",
            Self::Normalized => "normalized",
            Self::Converted => "converted",
            Self::PartitionTagged => "partition_tagged",
            Self::Inserted => "inserted",
            Self::ProgressRecorded => "progress_recorded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Options
// ============================================================================

/// Options of one load or inference run
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Read, convert and tag, but insert nothing
    pub dry_run: bool,
    /// Regions to select; empty uses the configured regions
    pub regions: Vec<String>,
    /// First period, inclusive
    pub period_start: Period,
    /// Last period, inclusive
    pub period_end: Period,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            regions: Vec::new(),
            period_start: Period::EARLIEST,
            period_end: Period::current(),
        }
    }
}

impl LoadOptions {
    /// Options for a period range
    pub fn new(period_start: Period, period_end: Period) -> Self {
        Self {
            period_start,
            period_end,
            ..Self::default()
        }
    }

    /// Restrict to regions
    #[must_use]
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    /// Enable dry run
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// A unit that did not load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub unit_id: String,
    /// Stage the unit failed in
    pub stage: UnitStage,
    pub message: String,
}

/// Result of processing one unit
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    pub unit_id: String,
    /// Final stage reached
    pub stage: UnitStage,
    /// Rows inserted (or that would be, in a dry run)
    pub rows: u64,
    pub error_counts: ErrorCounts,
    pub failure: Option<UnitFailure>,
}

impl UnitOutcome {
    /// Unit that loaded
    pub fn loaded(unit_id: impl Into<String>, stage: UnitStage, rows: u64, error_counts: ErrorCounts) -> Self {
        Self {
            unit_id: unit_id.into(),
            stage,
            rows,
            error_counts,
            failure: None,
        }
    }

    /// Unit that failed in `stage`
    pub fn failed(unit_id: impl Into<String>, stage: UnitStage, message: impl Into<String>) -> Self {
        let unit_id = unit_id.into();
        Self {
            failure: Some(UnitFailure {
                unit_id: unit_id.clone(),
                stage,
                message: message.into(),
            }),
            unit_id,
            stage: UnitStage::Failed,
            rows: 0,
            error_counts: ErrorCounts::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Summary of one load run of a record group
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub record_group: String,
    pub table_name: String,
    pub dry_run: bool,
    pub units_discovered: usize,
    pub units_attempted: usize,
    pub units_skipped: usize,
    pub units_loaded: usize,
    pub units_failed: usize,
    /// Units never submitted because the run was cancelled
    pub units_not_submitted: usize,
    pub rows_inserted: u64,
    /// Conversion failures per column, over the whole run
    pub error_counts: ErrorCounts,
    pub failures: Vec<UnitFailure>,
    #[serde(serialize_with = "serialize_duration_ms", rename = "duration_ms")]
    pub duration: Duration,
}

impl RunReport {
    pub fn new(record_group: impl Into<String>, table_name: impl Into<String>, dry_run: bool) -> Self {
        Self {
            record_group: record_group.into(),
            table_name: table_name.into(),
            dry_run,
            ..Self::default()
        }
    }

    /// Fold a unit outcome into the report
    pub fn absorb(&mut self, outcome: UnitOutcome) {
        self.units_attempted += 1;
        match outcome.failure {
            Some(failure) => {
                self.units_failed += 1;
                self.failures.push(failure);
            }
            None => {
                self.units_loaded += 1;
                self.rows_inserted += outcome.rows;
                accumulate(&mut self.error_counts, &outcome.error_counts);
            }
        }
    }

    /// Total conversion failures
    pub fn total_errors(&self) -> u64 {
        self.error_counts.values().sum()
    }
}

fn serialize_duration_ms<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Summary of a schema inference run
#[derive(Debug, Clone, Serialize)]
pub struct InferenceReport {
    pub record_group: String,
    pub units_sampled: usize,
    pub units_skipped: usize,
    pub outcome: RegisterOutcome,
    pub schema: Schema,
}
