//! Schema types

use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Prefix of the auxiliary column that keeps raw values on conversion failure
pub const AUXILIARY_PREFIX: &str = "raw_";

/// Per-row provenance identifier column
pub const PROVENANCE_COLUMN: &str = "source_id";

/// Default partition key column (two-letter state code)
pub const DEFAULT_PARTITION_KEY: &str = "uf";

/// Width of the partition key code
pub const PARTITION_KEY_WIDTH: u16 = 2;

/// Maximum width of a bounded variable-width text column
pub const MAX_VARCHAR_WIDTH: u16 = 255;

/// Precision of NUMERIC columns
pub const NUMERIC_PRECISION: u8 = 38;

/// Scale of NUMERIC columns
pub const NUMERIC_SCALE: i8 = 6;

/// Target column type decided by inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetType {
    SmallInt,
    Integer,
    BigInt,
    Numeric,
    Boolean,
    Date,
    /// Fixed-width text, `CHAR(n)`
    FixedText(u16),
    /// Variable-width text bounded at `n <= 255`, `VARCHAR(n)`
    VarText(u16),
    /// Unbounded text
    Text,
}

impl TargetType {
    /// Whether this is one of the text variants
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            TargetType::FixedText(_) | TargetType::VarText(_) | TargetType::Text
        )
    }

    /// SQL type used in table DDL
    pub fn sql_type(&self) -> String {
        match self {
            TargetType::SmallInt => "SMALLINT".to_string(),
            TargetType::Integer => "INTEGER".to_string(),
            TargetType::BigInt => "BIGINT".to_string(),
            TargetType::Numeric => format!("DECIMAL({NUMERIC_PRECISION},{NUMERIC_SCALE})"),
            TargetType::Boolean => "BOOLEAN".to_string(),
            TargetType::Date => "DATE".to_string(),
            TargetType::FixedText(n) => format!("CHAR({n})"),
            TargetType::VarText(n) => format!("VARCHAR({n})"),
            TargetType::Text => "TEXT".to_string(),
        }
    }

    /// Arrow type of converted values
    pub fn arrow_type(&self) -> DataType {
        match self {
            TargetType::SmallInt => DataType::Int16,
            TargetType::Integer => DataType::Int32,
            TargetType::BigInt => DataType::Int64,
            TargetType::Numeric => DataType::Decimal128(NUMERIC_PRECISION, NUMERIC_SCALE),
            TargetType::Boolean => DataType::Boolean,
            TargetType::Date => DataType::Date32,
            TargetType::FixedText(_) | TargetType::VarText(_) | TargetType::Text => DataType::Utf8,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Numeric => write!(f, "NUMERIC"),
            other => write!(f, "{}", other.sql_type()),
        }
    }
}

impl FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let width = |prefix: &str| -> Option<Result<u16, String>> {
            let inner = upper.strip_prefix(prefix)?.strip_suffix(')')?;
            Some(
                inner
                    .trim()
                    .parse::<u16>()
                    .map_err(|e| format!("invalid width in '{s}': {e}")),
            )
        };

        if let Some(n) = width("CHAR(") {
            return n.map(TargetType::FixedText);
        }
        if let Some(n) = width("VARCHAR(") {
            let n = n?;
            if n > MAX_VARCHAR_WIDTH {
                return Err(format!("VARCHAR width {n} exceeds {MAX_VARCHAR_WIDTH}"));
            }
            return Ok(TargetType::VarText(n));
        }

        match upper.as_str() {
            "SMALLINT" => Ok(TargetType::SmallInt),
            "INTEGER" => Ok(TargetType::Integer),
            "BIGINT" => Ok(TargetType::BigInt),
            "NUMERIC" => Ok(TargetType::Numeric),
            "BOOLEAN" => Ok(TargetType::Boolean),
            "DATE" => Ok(TargetType::Date),
            "TEXT" => Ok(TargetType::Text),
            _ => Err(format!("unknown target type '{s}'")),
        }
    }
}

impl TryFrom<String> for TargetType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetType> for String {
    fn from(value: TargetType) -> Self {
        value.to_string()
    }
}

/// Type decision for one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDecision {
    /// Target type
    pub target_type: TargetType,
    /// Whether an auxiliary raw-value column is kept for failed conversions
    pub needs_auxiliary_column: bool,
}

impl TypeDecision {
    /// Decision without auxiliary column
    pub fn new(target_type: TargetType) -> Self {
        Self {
            target_type,
            needs_auxiliary_column: false,
        }
    }

    /// Decision with auxiliary column
    pub fn with_auxiliary(target_type: TargetType) -> Self {
        Self {
            target_type,
            needs_auxiliary_column: true,
        }
    }
}

/// A named type decision, as supplied to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDecision {
    pub name: String,
    pub decision: TypeDecision,
}

impl ColumnDecision {
    pub fn new(name: impl Into<String>, decision: TypeDecision) -> Self {
        Self {
            name: name.into(),
            decision,
        }
    }
}

/// Which columns get an auxiliary raw-value column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryPolicy {
    /// Only dates that needed the repair heuristic during inference
    #[default]
    DateRepair,
    /// Every non-text column
    AllTyped,
}

/// Semantic role of a column, driving name-based inference rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// `YYYYMMDD` dates
    Date,
    /// Monetary values and amounts
    Amount,
    /// Codes whose leading zeros are significant
    Code,
    /// No special handling
    Plain,
}

// ============================================================================
// Schema
// ============================================================================

/// A persisted schema column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub target_type: TargetType,
    pub has_auxiliary: bool,
}

impl SchemaColumn {
    /// Name of this column's auxiliary column
    pub fn auxiliary_name(&self) -> String {
        auxiliary_name(&self.name)
    }
}

/// Auxiliary column name for a primary column
pub fn auxiliary_name(column: &str) -> String {
    format!("{AUXILIARY_PREFIX}{column}")
}

/// Role of a physical table column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableColumnKind {
    Data,
    Auxiliary,
    Provenance,
    PartitionKey,
}

/// A physical table column derived from a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub target_type: TargetType,
    pub kind: TableColumnKind,
}

/// Schema of one record group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Record group code
    pub record_group: String,
    /// Physical table name
    pub table_name: String,
    /// Partition key column
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Inferred columns, in supplied order
    pub columns: Vec<SchemaColumn>,
}

fn default_partition_key() -> String {
    DEFAULT_PARTITION_KEY.to_string()
}

impl Schema {
    /// Create a schema from ordered columns
    pub fn new(
        record_group: impl Into<String>,
        table_name: impl Into<String>,
        partition_key: impl Into<String>,
        columns: Vec<SchemaColumn>,
    ) -> Self {
        Self {
            record_group: record_group.into(),
            table_name: table_name.into(),
            partition_key: partition_key.into(),
            columns,
        }
    }

    /// Inferred (non-bookkeeping) columns
    pub fn data_columns(&self) -> &[SchemaColumn] {
        &self.columns
    }

    /// Look up an inferred column by name
    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a name is one of the two bookkeeping columns
    pub fn is_bookkeeping(&self, name: &str) -> bool {
        name == PROVENANCE_COLUMN || name == self.partition_key
    }

    /// Physical layout: data columns, auxiliary columns, provenance, partition key
    pub fn table_columns(&self) -> Vec<TableColumn> {
        let mut layout: Vec<TableColumn> = self
            .columns
            .iter()
            .map(|c| TableColumn {
                name: c.name.clone(),
                target_type: c.target_type,
                kind: TableColumnKind::Data,
            })
            .collect();

        layout.extend(
            self.columns
                .iter()
                .filter(|c| c.has_auxiliary)
                .map(|c| TableColumn {
                    name: c.auxiliary_name(),
                    target_type: TargetType::Text,
                    kind: TableColumnKind::Auxiliary,
                }),
        );

        layout.push(TableColumn {
            name: PROVENANCE_COLUMN.to_string(),
            target_type: TargetType::Text,
            kind: TableColumnKind::Provenance,
        });
        layout.push(TableColumn {
            name: self.partition_key.clone(),
            target_type: TargetType::FixedText(PARTITION_KEY_WIDTH),
            kind: TableColumnKind::PartitionKey,
        });

        layout
    }

    /// Names of the physical columns, in table order
    pub fn table_column_names(&self) -> Vec<String> {
        self.table_columns().into_iter().map(|c| c.name).collect()
    }

    /// Arrow schema of the full physical layout
    pub fn arrow_schema(&self) -> ArrowSchema {
        let fields: Vec<Field> = self
            .table_columns()
            .iter()
            .map(|c| {
                Field::new(
                    &c.name,
                    c.target_type.arrow_type(),
                    c.kind != TableColumnKind::Provenance,
                )
            })
            .collect();
        ArrowSchema::new(fields)
    }

    /// Content signature for logging and change detection
    pub fn signature(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.table_name.hash(&mut hasher);
        self.partition_key.hash(&mut hasher);
        self.columns.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}
