//! Load progress tracker
//!
//! Seeds a skip-set from the store's progress records and appends new
//! records one at a time behind a single async mutex.

use super::types::ProgressSnapshot;
use crate::error::{Error, Result};
use crate::store::{ProgressRecord, Store};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Tracks committed units of one record group's table
pub struct ProgressTracker {
    store: Arc<dyn Store>,
    record_group: String,
    table_name: String,
    /// Units known to be committed
    committed: RwLock<HashSet<String>>,
    /// Serialization point for progress appends
    append_lock: Mutex<()>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("record_group", &self.record_group)
            .field("table_name", &self.table_name)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Load committed units for a table
    pub async fn load(
        store: Arc<dyn Store>,
        record_group: impl Into<String>,
        table_name: impl Into<String>,
    ) -> Result<Self> {
        let table_name = table_name.into();
        let committed = {
            let store = Arc::clone(&store);
            let table = table_name.clone();
            tokio::task::spawn_blocking(move || store.query_progress(&table))
                .await
                .map_err(|e| Error::progress(format!("Progress query task failed: {e}")))??
        };

        debug!(table = %table_name, committed = committed.len(), "Loaded load progress");
        Ok(Self {
            store,
            record_group: record_group.into(),
            table_name,
            committed: RwLock::new(committed),
            append_lock: Mutex::new(()),
        })
    }

    /// Whether a unit was already committed
    pub async fn is_committed(&self, unit_id: &str) -> bool {
        self.committed.read().await.contains(unit_id)
    }

    /// Number of committed units
    pub async fn committed_count(&self) -> usize {
        self.committed.read().await.len()
    }

    /// Record a committed unit; call only after its rows are durable
    pub async fn record(&self, unit_id: &str, rows_inserted: u64) -> Result<ProgressRecord> {
        let _guard = self.append_lock.lock().await;

        if self.is_committed(unit_id).await {
            return Err(Error::progress(format!(
                "Unit '{unit_id}' is already recorded for '{}'",
                self.table_name
            )));
        }

        let record = ProgressRecord::new(unit_id, &self.record_group, &self.table_name, rows_inserted);
        {
            let store = Arc::clone(&self.store);
            let record = record.clone();
            tokio::task::spawn_blocking(move || store.record_progress(&record))
                .await
                .map_err(|e| Error::progress(format!("Progress append task failed: {e}")))??;
        }

        self.committed.write().await.insert(unit_id.to_string());
        debug!(unit = unit_id, rows = rows_inserted, "Recorded progress");
        Ok(record)
    }

    /// Point-in-time view of the tracker
    pub async fn snapshot(&self) -> ProgressSnapshot {
        let mut units: Vec<String> = self.committed.read().await.iter().cloned().collect();
        units.sort();
        ProgressSnapshot {
            record_group: self.record_group.clone(),
            table_name: self.table_name.clone(),
            committed_units: units,
        }
    }
}
