//! Per-unit pipeline
//!
//! Runs one unit through READ, NORMALIZED, CONVERTED and PARTITION-TAGGED
//! lazily, chunk by chunk, so the store pulls batches inside its insert
//! transaction and an error at any stage rolls the whole unit back.

use super::normalize::normalize_batch;
use super::types::{UnitOutcome, UnitStage};
use crate::convert::{accumulate, convert, ErrorCounts};
use crate::error::{Error, Result};
use crate::partition::{split_by_region, tag_batch};
use crate::schema::{Schema, TableColumn};
use crate::source::{BatchStream, UnitReader};
use crate::store::Store;
use crate::types::{RegionCode, StringMap};
use arrow::record_batch::RecordBatch;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a worker needs to process units of one record group
pub(crate) struct UnitContext {
    pub schema: Arc<Schema>,
    pub columns: Arc<Vec<TableColumn>>,
    pub expected_columns: Arc<Vec<String>>,
    pub synonyms: Arc<StringMap>,
    pub reader: Arc<dyn UnitReader>,
    pub store: Arc<dyn Store>,
    pub dry_run: bool,
}

/// One unit to process
pub(crate) struct UnitJob {
    pub locator: String,
    pub unit_id: String,
    pub region: Option<RegionCode>,
    pub chunk_size: usize,
    /// Set when the unit timed out
    pub abandon: Arc<AtomicBool>,
}

impl UnitContext {
    /// Process one unit up to (and including) its insert
    ///
    /// Progress is recorded by the caller once this returns successfully.
    pub fn process(&self, job: &UnitJob) -> UnitOutcome {
        let stream = match self.reader.open(&job.locator, job.chunk_size) {
            Ok(stream) => stream,
            Err(e) => return UnitOutcome::failed(&job.unit_id, UnitStage::Read, e.to_string()),
        };

        let mut pipeline = UnitPipeline::new(self, job, stream);

        if self.dry_run {
            let counted: Result<u64> = pipeline
                .by_ref()
                .try_fold(0u64, |rows, batch| Ok(rows + batch?.num_rows() as u64));
            return match counted {
                Ok(rows) => UnitOutcome::loaded(
                    &job.unit_id,
                    UnitStage::PartitionTagged,
                    rows,
                    pipeline.error_counts,
                ),
                Err(e) => pipeline.failure(UnitStage::PartitionTagged, &e),
            };
        }

        let inserted = self
            .store
            .bulk_insert(&self.schema.table_name, &self.columns, &mut pipeline);
        match inserted {
            Ok(rows) => {
                if rows != pipeline.rows_tagged {
                    warn!(
                        unit = %job.unit_id,
                        inserted = rows,
                        tagged = pipeline.rows_tagged,
                        "Inserted row count differs from tagged rows"
                    );
                }
                UnitOutcome::loaded(&job.unit_id, UnitStage::Inserted, rows, pipeline.error_counts)
            }
            Err(e) => pipeline.failure(UnitStage::Inserted, &e),
        }
    }
}

/// Lazy chunk pipeline of one unit
struct UnitPipeline<'a> {
    ctx: &'a UnitContext,
    job: &'a UnitJob,
    stream: BatchStream,
    pending: VecDeque<RecordBatch>,
    /// Next provenance ordinal
    ordinal: u64,
    rows_tagged: u64,
    error_counts: ErrorCounts,
    /// Stage of the first pipeline error, if any
    failed_stage: Option<UnitStage>,
}

impl<'a> UnitPipeline<'a> {
    fn new(ctx: &'a UnitContext, job: &'a UnitJob, stream: BatchStream) -> Self {
        Self {
            ctx,
            job,
            stream,
            pending: VecDeque::new(),
            ordinal: 0,
            rows_tagged: 0,
            error_counts: ErrorCounts::new(),
            failed_stage: None,
        }
    }

    /// Failed outcome; pipeline errors win over the consumer's stage
    fn failure(&self, consumer_stage: UnitStage, error: &Error) -> UnitOutcome {
        let stage = self.failed_stage.unwrap_or(consumer_stage);
        UnitOutcome::failed(&self.job.unit_id, stage, error.to_string())
    }

    fn fail(&mut self, stage: UnitStage, error: Error) -> Option<Result<RecordBatch>> {
        self.failed_stage = Some(stage);
        Some(Err(error))
    }

    /// Only a timed-out unit stops early; run cancellation lets it finish
    fn check_abandoned(&self) -> Result<()> {
        if self.job.abandon.load(Ordering::SeqCst) {
            return Err(Error::Cancelled {
                unit: self.job.unit_id.clone(),
            });
        }
        Ok(())
    }
}

impl Iterator for UnitPipeline<'_> {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Some(Ok(batch));
            }
            if self.failed_stage.is_some() {
                return None;
            }

            let raw = match self.stream.next()? {
                Ok(raw) => raw,
                Err(e) => return self.fail(UnitStage::Read, e),
            };
            if let Err(e) = self.check_abandoned() {
                return self.fail(UnitStage::Read, e);
            }
            if raw.num_rows() == 0 {
                continue;
            }

            let ctx = self.ctx;
            let schema = &ctx.schema;
            let normalized = match normalize_batch(
                &raw,
                &ctx.expected_columns,
                &ctx.synonyms,
                &schema.partition_key,
            ) {
                Ok(batch) => batch,
                Err(e) => return self.fail(UnitStage::Normalized, e),
            };

            let converted = match convert(&normalized, schema) {
                Ok(output) => output,
                Err(e) => return self.fail(UnitStage::Converted, e),
            };
            accumulate(&mut self.error_counts, &converted.error_counts);

            let tagged = match tag_batch(
                &converted.batch,
                schema,
                &self.job.unit_id,
                self.job.region.as_deref(),
                self.ordinal,
            ) {
                Ok(batch) => batch,
                Err(e) => return self.fail(UnitStage::PartitionTagged, e),
            };
            let rows = tagged.num_rows() as u64;

            match split_by_region(&tagged, &schema.partition_key) {
                Ok(parts) => self.pending.extend(parts.into_iter().map(|(_, batch)| batch)),
                Err(e) => return self.fail(UnitStage::PartitionTagged, e),
            }

            debug!(
                unit = %self.job.unit_id,
                rows,
                first_ordinal = self.ordinal,
                "Processed chunk"
            );
            self.ordinal += rows;
            self.rows_tagged += rows;
        }
    }
}
