//! Relational schema inference and registry
//!
//! # Features
//!
//! - **Type Inference**: Ordered rules over column fingerprints and names
//! - **Column Roles**: Versioned role table with name-marker fallback
//! - **Registry**: Persisted per-record-group schemas, replaced whole on change
//! - **Table Layout**: Data, auxiliary and bookkeeping columns in stable order

mod inference;
mod registry;
mod roles;
mod types;

pub use inference::TypeInferrer;
pub use registry::{RegisterOutcome, SchemaRegistry};
pub use roles::{heuristic_role, RoleTable, ROLE_TABLE_VERSION};
pub use types::{
    auxiliary_name, AuxiliaryPolicy, ColumnDecision, ColumnRole, Schema, SchemaColumn,
    TableColumn, TableColumnKind, TargetType, TypeDecision, AUXILIARY_PREFIX,
    DEFAULT_PARTITION_KEY, MAX_VARCHAR_WIDTH, NUMERIC_PRECISION, NUMERIC_SCALE,
    PARTITION_KEY_WIDTH, PROVENANCE_COLUMN,
};

#[cfg(test)]
mod tests;
