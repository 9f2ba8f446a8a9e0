//! Multi-unit profiling session for one record group

use super::profiler::ColumnProfiler;
use super::types::{ColumnFingerprint, DataKind};
use crate::engine::normalize::canonical_name;
use crate::source::UnitReader;
use crate::types::StringMap;
use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct ColumnSample {
    data_kind: Option<DataKind>,
    values: Vec<Option<String>>,
}

/// Accumulates bounded samples across input units and fingerprints them
#[derive(Debug)]
pub struct ProfileSession {
    profiler: ColumnProfiler,
    synonyms: StringMap,
    order: Vec<String>,
    samples: HashMap<String, ColumnSample>,
    units_sampled: usize,
    units_skipped: usize,
}

impl ProfileSession {
    /// New session
    pub fn new(profiler: ColumnProfiler) -> Self {
        Self {
            profiler,
            synonyms: StringMap::new(),
            order: Vec::new(),
            samples: HashMap::new(),
            units_sampled: 0,
            units_skipped: 0,
        }
    }

    /// Map source column names to canonical ones before profiling
    #[must_use]
    pub fn with_synonyms(mut self, synonyms: StringMap) -> Self {
        self.synonyms = synonyms;
        self
    }

    /// Units that contributed samples
    pub fn units_sampled(&self) -> usize {
        self.units_sampled
    }

    /// Units that could not be read
    pub fn units_skipped(&self) -> usize {
        self.units_skipped
    }

    /// Sample one unit; unreadable units are logged and skipped
    pub fn sample_unit(&mut self, reader: &dyn UnitReader, locator: &str, rows: usize) -> bool {
        match reader.sample(locator, rows) {
            Ok(batch) => {
                debug!(unit = locator, rows = batch.num_rows(), "Sampled unit");
                self.add_batch(&batch);
                self.units_sampled += 1;
                true
            }
            Err(e) => {
                warn!("Skipping unit '{}' during profiling: {}", locator, e);
                self.units_skipped += 1;
                false
            }
        }
    }

    /// Add the rows of a sampled batch
    pub fn add_batch(&mut self, batch: &RecordBatch) {
        let schema = batch.schema();
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let name = canonical_name(field.name(), &self.synonyms);

            let text = match cast(array, &DataType::Utf8) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping column '{}': cannot read as text: {}", name, e);
                    continue;
                }
            };

            if !self.samples.contains_key(&name) {
                self.order.push(name.clone());
            }
            let sample = self.samples.entry(name).or_default();

            let kind = DataKind::from_arrow(array.data_type());
            sample.data_kind = match (sample.data_kind, kind) {
                (None, k) | (Some(DataKind::Null), k) => Some(k),
                (Some(prev), DataKind::Null) => Some(prev),
                (Some(prev), k) if prev == k => Some(prev),
                // Units disagree on the physical type; everything is read as text
                (Some(_), _) => Some(DataKind::String),
            };

            let strings = text.as_string::<i32>();
            sample
                .values
                .extend(strings.iter().map(|v| v.map(str::to_string)));
        }
    }

    /// Fingerprints in first-seen column order
    pub fn finish(self) -> Vec<ColumnFingerprint> {
        let Self {
            profiler,
            order,
            mut samples,
            ..
        } = self;

        order
            .into_iter()
            .filter_map(|name| {
                let sample = samples.remove(&name)?;
                let kind = sample.data_kind.unwrap_or_default();
                Some(profiler.profile_values(&name, kind, sample.values))
            })
            .collect()
    }
}
