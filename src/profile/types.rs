//! Column fingerprint types

use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};

/// Raw kind of a column as it arrives in the input unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Null,
    Other,
}

impl DataKind {
    /// Map an Arrow data type to its raw kind
    pub fn from_arrow(data_type: &DataType) -> Self {
        match data_type {
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => DataKind::String,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => DataKind::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => DataKind::Float,
            DataType::Boolean => DataKind::Boolean,
            DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => DataKind::Date,
            DataType::Null => DataKind::Null,
            _ => DataKind::Other,
        }
    }

    /// Whether values of this kind carry meaningful string lengths
    pub fn is_string(&self) -> bool {
        matches!(self, DataKind::String)
    }
}

/// Statistical fingerprint of one column over a bounded sample
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnFingerprint {
    /// Column name (case-folded)
    pub column: String,
    /// Raw observed kind
    pub data_kind: DataKind,
    /// Distinct non-null values in the sample
    pub distinct_count: usize,
    /// Null or blank values in the sample
    pub null_count: usize,
    /// Distinct values in first-seen order, capped
    pub sample_values: Vec<String>,
    /// Longest string value (0 without string samples)
    pub max_length: usize,
    /// Shortest non-empty string value (0 without string samples)
    pub min_length: usize,
    pub has_leading_zeros: bool,
    pub has_special_chars: bool,
    pub has_mixed_representations: bool,
}

impl ColumnFingerprint {
    /// True when the sample held nothing but nulls
    pub fn is_all_null(&self) -> bool {
        self.distinct_count == 0 && self.null_count > 0
    }
}
