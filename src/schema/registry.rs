//! Schema registry
//!
//! The only place schemas are created or replaced. Schemas are persisted as
//! one JSON document keyed by record group, written atomically.

use super::types::{ColumnDecision, Schema, SchemaColumn, DEFAULT_PARTITION_KEY, PROVENANCE_COLUMN};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Result of registering a decision set
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// No schema existed for the record group
    Created,
    /// The same schema was already registered
    Unchanged,
    /// A different schema was replaced whole
    Replaced,
}

/// Persisted per-record-group schemas
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    /// Registry document; empty in memory-only mode
    path: PathBuf,
    schemas: Arc<RwLock<BTreeMap<String, Schema>>>,
}

impl SchemaRegistry {
    /// Open a registry file, loading existing schemas if present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let schemas = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::registry(format!("Failed to read registry file: {e}")))?;
            serde_json::from_str(&contents)
                .map_err(|e| Error::registry(format!("Failed to parse registry file: {e}")))?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), "Opened schema registry");
        Ok(Self {
            path,
            schemas: Arc::new(RwLock::new(schemas)),
        })
    }

    /// Registry without file persistence
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            schemas: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Register decisions under the default partition key
    pub fn register(
        &self,
        record_group: &str,
        decisions: &[ColumnDecision],
        table_name: &str,
    ) -> Result<(Schema, RegisterOutcome)> {
        self.register_partitioned(record_group, decisions, table_name, DEFAULT_PARTITION_KEY)
    }

    /// Register decisions, creating or replacing the group's schema
    ///
    /// Decisions for the bookkeeping columns are ignored; those are appended
    /// by the schema layout and never inferred.
    pub fn register_partitioned(
        &self,
        record_group: &str,
        decisions: &[ColumnDecision],
        table_name: &str,
        partition_key: &str,
    ) -> Result<(Schema, RegisterOutcome)> {
        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(decisions.len());
        for decision in decisions {
            if decision.name == PROVENANCE_COLUMN || decision.name == partition_key {
                debug!(column = %decision.name, "Ignoring decision for bookkeeping column");
                continue;
            }
            if !seen.insert(decision.name.as_str()) {
                warn!("Duplicate decision for column '{}' ignored", decision.name);
                continue;
            }
            columns.push(SchemaColumn {
                name: decision.name.clone(),
                target_type: decision.decision.target_type,
                has_auxiliary: decision.decision.needs_auxiliary_column,
            });
        }

        let schema = Schema::new(record_group, table_name, partition_key, columns);

        let outcome = {
            let mut schemas = self.write_lock()?;
            let outcome = match schemas.get(record_group) {
                None => RegisterOutcome::Created,
                Some(existing) if *existing == schema => RegisterOutcome::Unchanged,
                Some(_) => RegisterOutcome::Replaced,
            };
            if outcome != RegisterOutcome::Unchanged {
                // Memory only follows a successful write
                let mut next = schemas.clone();
                next.insert(record_group.to_string(), schema.clone());
                self.save(&next)?;
                *schemas = next;
            }
            outcome
        };

        info!(
            record_group,
            table = table_name,
            columns = schema.columns.len(),
            signature = %schema.signature(),
            "Schema {:?}",
            outcome
        );
        Ok((schema, outcome))
    }

    /// Schema for a record group
    pub fn lookup(&self, record_group: &str) -> Result<Schema> {
        self.read_lock()?
            .get(record_group)
            .cloned()
            .ok_or_else(|| Error::SchemaNotFound {
                record_group: record_group.to_string(),
            })
    }

    /// Registered record groups
    pub fn record_groups(&self) -> Result<Vec<String>> {
        Ok(self.read_lock()?.keys().cloned().collect())
    }

    /// Export the registry document as pretty JSON
    pub fn to_json_pretty(&self) -> Result<String> {
        render(&*self.read_lock()?)
    }

    /// Write a registry document (no-op in memory-only mode)
    fn save(&self, schemas: &BTreeMap<String, Schema>) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        let contents = render(schemas)?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, &contents)
            .map_err(|e| Error::registry(format!("Failed to write registry file: {e}")))?;
        std::fs::rename(&temp_path, &self.path)
            .map_err(|e| Error::registry(format!("Failed to rename registry file: {e}")))?;

        Ok(())
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Schema>>> {
        self.schemas
            .read()
            .map_err(|_| Error::registry("registry lock poisoned"))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, Schema>>> {
        self.schemas
            .write()
            .map_err(|_| Error::registry("registry lock poisoned"))
    }
}

fn render(schemas: &BTreeMap<String, Schema>) -> Result<String> {
    serde_json::to_string_pretty(schemas)
        .map_err(|e| Error::registry(format!("Failed to serialize registry: {e}")))
}
