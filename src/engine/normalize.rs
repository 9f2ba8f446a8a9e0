//! Raw batch normalization
//!
//! Source files of one record group drift over the years: column names
//! change case, get renamed, appear and disappear. Normalization maps every
//! raw batch onto the schema's column set, all as text, before conversion.

use crate::error::Result;
use crate::types::StringMap;
use arrow::array::{new_null_array, ArrayRef};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Canonical column name: trimmed, lower-cased, then mapped through synonyms
///
/// Synonym keys are matched case-insensitively.
pub fn canonical_name(raw: &str, synonyms: &StringMap) -> String {
    let lowered = raw.trim().to_lowercase();
    synonyms
        .get(&lowered)
        .or_else(|| {
            synonyms
                .iter()
                .find(|(k, _)| k.trim().eq_ignore_ascii_case(&lowered))
                .map(|(_, v)| v)
        })
        .map(|v| v.trim().to_lowercase())
        .unwrap_or(lowered)
}

/// Normalize a raw batch to the expected columns, all as `Utf8`
///
/// Output order is `expected_columns`, then the partition key when the
/// unit carries it. Missing expected columns become all-null; unexpected
/// columns are dropped. When two raw columns map to the same canonical
/// name the first one wins.
pub fn normalize_batch(
    batch: &RecordBatch,
    expected_columns: &[String],
    synonyms: &StringMap,
    partition_key: &str,
) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let schema = batch.schema();

    let mut by_name: HashMap<String, &ArrayRef> = HashMap::new();
    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        by_name
            .entry(canonical_name(field.name(), synonyms))
            .or_insert(array);
    }

    let mut fields = Vec::with_capacity(expected_columns.len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(expected_columns.len() + 1);
    let mut missing = Vec::new();

    for name in expected_columns {
        let array = match by_name.remove(name.as_str()) {
            Some(array) => cast(array, &DataType::Utf8)?,
            None => {
                missing.push(name.as_str());
                new_null_array(&DataType::Utf8, rows)
            }
        };
        fields.push(Field::new(name, DataType::Utf8, true));
        arrays.push(array);
    }

    if let Some(key) = by_name.remove(partition_key) {
        fields.push(Field::new(partition_key, DataType::Utf8, true));
        arrays.push(cast(key, &DataType::Utf8)?);
    }

    if !missing.is_empty() || !by_name.is_empty() {
        let mut dropped: Vec<&str> = by_name.keys().map(String::as_str).collect();
        dropped.sort_unstable();
        debug!(missing = ?missing, dropped = ?dropped, "Normalized column drift");
    }

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(ArrowSchema::new(fields)),
        arrays,
        &options,
    )?)
}
