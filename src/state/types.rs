//! Progress state types

use serde::{Deserialize, Serialize};

/// Committed units of one table at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub record_group: String,
    pub table_name: String,
    /// Sorted unit identifiers
    pub committed_units: Vec<String>,
}

impl ProgressSnapshot {
    /// Whether a unit is in the snapshot
    pub fn contains(&self, unit_id: &str) -> bool {
        self.committed_units.binary_search_by(|u| u.as_str().cmp(unit_id)).is_ok()
    }
}
