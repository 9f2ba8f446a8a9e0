//! Column profiler
//!
//! Turns a bounded sample of raw values into a [`ColumnFingerprint`].
//! Profiling is a pure function of the sample.

use super::types::{ColumnFingerprint, DataKind};
use crate::coerce::{classify_representation, is_all_digits};
use crate::error::{Error, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::collections::{BTreeSet, HashSet};
use tracing::warn;

/// Sampled values examined for leading zeros and special characters
const SHAPE_WINDOW: usize = 10;

/// Sampled values examined for mixed representations
const REPRESENTATION_WINDOW: usize = 20;

/// Column profiler with a configurable sample cap
#[derive(Debug, Clone)]
pub struct ColumnProfiler {
    sample_values_cap: usize,
}

impl Default for ColumnProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnProfiler {
    /// Profiler keeping up to 100 sample values
    pub fn new() -> Self {
        Self {
            sample_values_cap: 100,
        }
    }

    /// Set the sample value cap
    #[must_use]
    pub fn with_sample_cap(mut self, cap: usize) -> Self {
        self.sample_values_cap = cap.max(1);
        self
    }

    /// Profile raw values of one column
    ///
    /// `None` and values that are blank after trimming count as nulls.
    pub fn profile_values<I, S>(&self, column: &str, data_kind: DataKind, values: I) -> ColumnFingerprint
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let mut fp = ColumnFingerprint {
            column: column.to_string(),
            data_kind,
            ..ColumnFingerprint::default()
        };

        let mut distinct: HashSet<String> = HashSet::new();
        let mut min_length = usize::MAX;

        for value in values {
            let Some(raw) = value else {
                fp.null_count += 1;
                continue;
            };
            let trimmed = raw.as_ref().trim();
            if trimmed.is_empty() {
                fp.null_count += 1;
                continue;
            }

            if data_kind.is_string() {
                let len = trimmed.chars().count();
                fp.max_length = fp.max_length.max(len);
                min_length = min_length.min(len);
            }

            if distinct.insert(trimmed.to_string()) && fp.sample_values.len() < self.sample_values_cap {
                fp.sample_values.push(trimmed.to_string());
            }
        }

        fp.distinct_count = distinct.len();
        fp.min_length = if min_length == usize::MAX { 0 } else { min_length };

        let shape_window = &fp.sample_values[..fp.sample_values.len().min(SHAPE_WINDOW)];
        fp.has_leading_zeros = data_kind.is_string()
            && shape_window
                .iter()
                .any(|v| v.len() > 1 && v.starts_with('0') && is_all_digits(v));
        fp.has_special_chars = shape_window
            .iter()
            .any(|v| v.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()));

        let representations: BTreeSet<_> = fp
            .sample_values
            .iter()
            .take(REPRESENTATION_WINDOW)
            .map(|v| classify_representation(v))
            .collect();
        fp.has_mixed_representations = representations.len() > 1;

        fp
    }

    /// Profile an Arrow array, reading values through a text cast
    pub fn profile_array(&self, column: &str, array: &ArrayRef) -> Result<ColumnFingerprint> {
        let data_kind = DataKind::from_arrow(array.data_type());
        if data_kind == DataKind::Null {
            let values = std::iter::repeat(None::<&str>).take(array.len());
            return Ok(self.profile_values(column, data_kind, values));
        }

        let text = cast(array, &DataType::Utf8)
            .map_err(|e| Error::profiling(column, format!("cannot read as text: {e}")))?;
        let strings = text.as_string::<i32>();
        Ok(self.profile_values(column, data_kind, strings.iter()))
    }

    /// Profile every column of a batch, skipping unreadable columns
    pub fn profile_batch(&self, batch: &RecordBatch) -> Vec<ColumnFingerprint> {
        let schema = batch.schema();
        schema
            .fields()
            .iter()
            .zip(batch.columns())
            .filter_map(|(field, array)| match self.profile_array(field.name(), array) {
                Ok(fp) => Some(fp),
                Err(e) => {
                    warn!("Skipping column '{}': {}", field.name(), e);
                    None
                }
            })
            .collect()
    }
}
