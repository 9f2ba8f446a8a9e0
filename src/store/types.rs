//! Store interface and records

use crate::error::Result;
use crate::schema::TableColumn;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A committed input unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Unit identifier (file stem)
    pub unit_id: String,
    pub record_group: String,
    pub table_name: String,
    /// Rows inserted for the unit
    pub rows_inserted: u64,
    pub committed_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Record stamped with the current time
    pub fn new(
        unit_id: impl Into<String>,
        record_group: impl Into<String>,
        table_name: impl Into<String>,
        rows_inserted: u64,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            record_group: record_group.into(),
            table_name: table_name.into(),
            rows_inserted,
            committed_at: Utc::now(),
        }
    }
}

/// Relational store used by the loader
///
/// Calls are blocking; the loader runs them on blocking worker threads.
pub trait Store: Send + Sync {
    /// Whether a table exists
    fn table_exists(&self, name: &str) -> Result<bool>;

    /// Create a table with the given layout (no-op if it exists)
    fn create_table(&self, name: &str, columns: &[TableColumn]) -> Result<()>;

    /// Create the partition of `parent` holding rows keyed `key` (no-op if it exists)
    fn create_partition(&self, parent: &str, key: &str) -> Result<()>;

    /// Insert every batch in one transaction; any error rolls the whole call back
    fn bulk_insert(
        &self,
        name: &str,
        columns: &[TableColumn],
        batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
    ) -> Result<u64>;

    /// Identifiers of committed units for a table
    fn query_progress(&self, name: &str) -> Result<HashSet<String>>;

    /// Append a progress record
    fn record_progress(&self, record: &ProgressRecord) -> Result<()>;

    /// Release cached memory under pressure
    fn release_memory(&self) -> Result<()> {
        Ok(())
    }
}
