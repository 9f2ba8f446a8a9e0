//! Partition router implementations
//!
//! Each router derives the region keys of a load differently.

use super::tagging::region_from_unit;
use super::types::PartitionRouter;
use crate::error::{Error, Result};
use crate::types::RegionCode;
use std::collections::BTreeSet;
use tracing::warn;

// ============================================================================
// List Router
// ============================================================================

/// List-based partition router
///
/// Creates partitions from a static list of region codes, e.g. from config.
#[derive(Debug, Clone)]
pub struct ListRouter {
    /// Region codes
    values: Vec<RegionCode>,
    /// Field name for partition
    partition_field: String,
}

impl ListRouter {
    /// Create a new list router
    pub fn new(values: Vec<RegionCode>, partition_field: impl Into<String>) -> Self {
        Self {
            values,
            partition_field: partition_field.into(),
        }
    }
}

impl PartitionRouter for ListRouter {
    fn partitions(&self) -> Result<Vec<RegionCode>> {
        let mut keys = BTreeSet::new();
        for value in &self.values {
            let key = value.trim().to_ascii_uppercase();
            if key.len() != 2 || !key.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::invalid_value(
                    "regions",
                    format!("'{value}' is not a two-letter region code"),
                ));
            }
            keys.insert(key);
        }
        Ok(keys.into_iter().collect())
    }

    fn partition_field(&self) -> &str {
        &self.partition_field
    }
}

// ============================================================================
// Unit Router
// ============================================================================

/// Unit-name partition router
///
/// Derives region keys from the identifiers of the units about to be loaded.
/// Units whose names carry no region are skipped with a warning; their rows
/// must then carry the key themselves.
#[derive(Debug, Clone)]
pub struct UnitRouter {
    /// Record group prefix of the unit names
    record_group: String,
    /// Unit identifiers
    unit_ids: Vec<String>,
    /// Field name for partition
    partition_field: String,
}

impl UnitRouter {
    /// Create a new unit router
    pub fn new(
        record_group: impl Into<String>,
        unit_ids: Vec<String>,
        partition_field: impl Into<String>,
    ) -> Self {
        Self {
            record_group: record_group.into(),
            unit_ids,
            partition_field: partition_field.into(),
        }
    }
}

impl PartitionRouter for UnitRouter {
    fn partitions(&self) -> Result<Vec<RegionCode>> {
        let mut keys = BTreeSet::new();
        for unit in &self.unit_ids {
            match region_from_unit(unit, &self.record_group) {
                Some(region) => {
                    keys.insert(region);
                }
                None => warn!(unit = %unit, "Unit name carries no region code"),
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn partition_field(&self) -> &str {
        &self.partition_field
    }
}
