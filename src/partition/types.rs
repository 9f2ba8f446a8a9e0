//! Partition types and traits
//!
//! Defines the region partition abstractions.

use crate::error::Result;
use crate::types::RegionCode;

/// A single region partition of a table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partition {
    /// Region code stored in the partition key column
    pub key: RegionCode,
    /// Physical partition name (`{table}_{key}`)
    pub name: String,
}

impl Partition {
    /// Create the partition of a table for a region
    pub fn new(table: &str, key: impl Into<RegionCode>) -> Self {
        let key = key.into().trim().to_ascii_uppercase();
        let name = format!("{table}_{}", key.to_ascii_lowercase());
        Self { key, name }
    }
}

/// Partition router trait
///
/// Produces the set of region keys a load needs before any rows are inserted.
pub trait PartitionRouter: Send + Sync {
    /// Region keys, sorted and deduplicated
    fn partitions(&self) -> Result<Vec<RegionCode>>;

    /// Name of the partition key column
    fn partition_field(&self) -> &str;

    /// Partitions of a concrete table
    fn table_partitions(&self, table: &str) -> Result<Vec<Partition>> {
        Ok(self
            .partitions()?
            .into_iter()
            .map(|key| Partition::new(table, key))
            .collect())
    }
}
