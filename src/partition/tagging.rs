//! Partition tagging
//!
//! Puts a region code and a provenance identifier on every converted row
//! and splits tagged batches so each insert targets a single partition.

use crate::error::{Error, Result};
use crate::schema::{Schema, PROVENANCE_COLUMN};
use crate::types::RegionCode;
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, StringArray, StringBuilder};
use arrow::compute::{cast, filter_record_batch};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Region + YYMM suffix of a unit name (`...SP2401`, `...SP2401a`)
static REGION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]{2})\d{4}[A-Z]?$").expect("valid regex"));

/// Region code encoded in a unit name
///
/// Unit names follow `{GROUP}{UF}{YYMM}`; the two letters after the group
/// prefix are the region. Names that do not start with the group fall back
/// to the letters in front of the trailing period.
pub fn region_from_unit(unit_id: &str, record_group: &str) -> Option<RegionCode> {
    let upper = unit_id.to_ascii_uppercase();
    let group = record_group.to_ascii_uppercase();

    if let Some(rest) = upper.strip_prefix(&group) {
        let region: String = rest.chars().take(2).collect();
        if region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()) {
            return Some(region);
        }
    }

    REGION_SUFFIX
        .captures(&upper)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Provenance identifier of a row
pub fn provenance_id(unit_id: &str, ordinal: u64) -> String {
    format!("{unit_id}:{ordinal}")
}

/// Tag a converted batch with provenance and region
///
/// Appends `source_id` (ordinals continue from `start_ordinal`) and the
/// partition key as the last two columns. A null or blank key falls back
/// to the unit's region; a row with neither is rejected.
pub fn tag_batch(
    batch: &RecordBatch,
    schema: &Schema,
    unit_id: &str,
    region: Option<&str>,
    start_ordinal: u64,
) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let key_name = schema.partition_key.as_str();

    let existing = match batch.column_by_name(key_name) {
        Some(column) => Some(cast(column, &DataType::Utf8)?),
        None => None,
    };
    let existing = existing.as_ref().map(|a| a.as_string::<i32>());
    let fallback = region.map(|r| r.trim().to_ascii_uppercase());

    let mut keys = StringBuilder::with_capacity(rows, rows * 2);
    for row in 0..rows {
        let carried = existing
            .filter(|a| a.is_valid(row))
            .map(|a| a.value(row).trim())
            .filter(|v| !v.is_empty());

        match carried.map(str::to_ascii_uppercase).or_else(|| fallback.clone()) {
            Some(key) => keys.append_value(key),
            None => {
                return Err(Error::partition(
                    &schema.table_name,
                    format!("row {} of unit '{unit_id}' has no region", start_ordinal + row as u64),
                ))
            }
        }
    }

    let ids: StringArray = (0..rows as u64)
        .map(|i| Some(provenance_id(unit_id, start_ordinal + i)))
        .collect();

    let mut fields: Vec<Field> = Vec::with_capacity(batch.num_columns() + 2);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns() + 2);
    for (field, array) in batch.schema().fields().iter().zip(batch.columns()) {
        if field.name() == key_name || field.name() == PROVENANCE_COLUMN {
            continue;
        }
        fields.push(field.as_ref().clone());
        arrays.push(Arc::clone(array));
    }

    fields.push(Field::new(PROVENANCE_COLUMN, DataType::Utf8, false));
    arrays.push(Arc::new(ids));
    fields.push(Field::new(key_name, DataType::Utf8, false));
    arrays.push(Arc::new(keys.finish()));

    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(ArrowSchema::new(fields)),
        arrays,
        &options,
    )?)
}

/// Split a tagged batch into one batch per region, ordered by region
///
/// Row order within each region is preserved.
pub fn split_by_region(batch: &RecordBatch, key_column: &str) -> Result<Vec<(RegionCode, RecordBatch)>> {
    let column = batch
        .column_by_name(key_column)
        .ok_or_else(|| Error::partition(key_column, "batch has no partition key column"))?;
    let keys = cast(column, &DataType::Utf8)?;
    let keys = keys.as_string::<i32>();

    let mut rows_by_region: BTreeMap<&str, Vec<bool>> = BTreeMap::new();
    for row in 0..keys.len() {
        if keys.is_null(row) {
            return Err(Error::partition(key_column, format!("row {row} has a null region")));
        }
        rows_by_region
            .entry(keys.value(row))
            .or_insert_with(|| vec![false; keys.len()])[row] = true;
    }

    if rows_by_region.len() == 1 {
        let region = rows_by_region.keys().next().map(|k| (*k).to_string());
        return Ok(region.map(|r| vec![(r, batch.clone())]).unwrap_or_default());
    }

    rows_by_region
        .into_iter()
        .map(|(region, mask)| {
            let filtered = filter_record_batch(batch, &BooleanArray::from(mask))?;
            Ok((region.to_string(), filtered))
        })
        .collect()
}
