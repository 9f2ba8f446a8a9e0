//! Chunked unit readers

use crate::error::{Error, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;

/// Stream of raw batches from one unit
pub type BatchStream = Box<dyn Iterator<Item = Result<RecordBatch>> + Send>;

/// Reads input units in bounded chunks
pub trait UnitReader: Send + Sync {
    /// Stream the unit in chunks of at most `chunk_size` rows, in file order
    fn open(&self, locator: &str, chunk_size: usize) -> Result<BatchStream>;

    /// First `rows` rows of the unit, for profiling
    fn sample(&self, locator: &str, rows: usize) -> Result<RecordBatch>;
}

/// Parquet unit reader
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetUnitReader;

impl ParquetUnitReader {
    pub fn new() -> Self {
        Self
    }

    fn builder(&self, locator: &str) -> Result<ParquetRecordBatchReaderBuilder<File>> {
        let path = Path::new(locator);
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: locator.to_string(),
            });
        }
        let file = File::open(path).map_err(|e| Error::read(locator, e.to_string()))?;
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| Error::read(locator, e.to_string()))
    }
}

impl UnitReader for ParquetUnitReader {
    fn open(&self, locator: &str, chunk_size: usize) -> Result<BatchStream> {
        let reader = self
            .builder(locator)?
            .with_batch_size(chunk_size.max(1))
            .build()
            .map_err(|e| Error::read(locator, e.to_string()))?;

        let unit = locator.to_string();
        Ok(Box::new(reader.map(move |batch| {
            batch.map_err(|e| Error::read(&unit, e.to_string()))
        })))
    }

    fn sample(&self, locator: &str, rows: usize) -> Result<RecordBatch> {
        let builder = self.builder(locator)?;
        let schema = builder.schema().clone();
        let mut reader = builder
            .with_batch_size(rows.max(1))
            .with_limit(rows)
            .build()
            .map_err(|e| Error::read(locator, e.to_string()))?;

        match reader.next() {
            Some(batch) => batch.map_err(|e| Error::read(locator, e.to_string())),
            None => Ok(RecordBatch::new_empty(schema)),
        }
    }
}
