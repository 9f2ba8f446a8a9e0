//! Conversion result types

use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;

/// Per-column count of values that failed conversion
pub type ErrorCounts = BTreeMap<String, u64>;

/// A converted batch with its conversion error counts
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Typed columns, surviving auxiliary columns, then pass-through partition key
    pub batch: RecordBatch,
    /// Failures per primary column; every schema column is present
    pub error_counts: ErrorCounts,
}

impl ConversionOutput {
    /// Total failures across columns
    pub fn total_errors(&self) -> u64 {
        self.error_counts.values().sum()
    }
}

/// Add one batch's counts into a running total
pub fn accumulate(total: &mut ErrorCounts, batch: &ErrorCounts) {
    for (column, count) in batch {
        *total.entry(column.clone()).or_insert(0) += count;
    }
}
