//! Batch loader module
//!
//! Orchestrates load runs of a record group.
//!
//! # Overview
//!
//! The engine module provides:
//! - `BatchLoader` - discovers units, skips committed ones, and runs each
//!   remaining unit through read, normalize, convert, tag and insert on a
//!   bounded worker pool, recording progress after every commit
//! - `infer_schema` - the offline profile, infer and register run
//! - `normalize` - column drift handling shared with profiling
//! - Run options and reports

mod infer;
pub mod normalize;
mod pipeline;
mod types;

pub use infer::infer_schema;
pub use types::{InferenceReport, LoadOptions, RunReport, UnitFailure, UnitOutcome, UnitStage};

use crate::config::EtlConfig;
use crate::error::{Error, Result};
use crate::partition::{region_from_unit, ListRouter, PartitionRouter, UnitRouter};
use crate::resource::ResourceGovernor;
use crate::retry::RetryPolicy;
use crate::schema::{Schema, SchemaRegistry};
use crate::source::{unit_id, Discovery, UnitReader};
use crate::state::ProgressTracker;
use crate::store::Store;
use pipeline::{UnitContext, UnitJob};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Batch loader for one configured pipeline
pub struct BatchLoader {
    config: Arc<EtlConfig>,
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn Store>,
    discovery: Arc<dyn Discovery>,
    reader: Arc<dyn UnitReader>,
    governor: Arc<ResourceGovernor>,
    retry: RetryPolicy,
    /// Stops new submissions; in-flight units run to completion
    cancelled: Arc<AtomicBool>,
}

impl BatchLoader {
    /// Create a loader and register its emergency cleanup hook
    pub fn new(
        config: Arc<EtlConfig>,
        registry: Arc<SchemaRegistry>,
        store: Arc<dyn Store>,
        discovery: Arc<dyn Discovery>,
        reader: Arc<dyn UnitReader>,
        governor: Arc<ResourceGovernor>,
    ) -> Self {
        // Submissions are paused by the governor while cleanup runs
        {
            let store = Arc::clone(&store);
            governor.register_cleanup(
                "batch-loader",
                Box::new(move || -> anyhow::Result<()> {
                    store.release_memory()?;
                    Ok(())
                }),
            );
        }

        Self {
            retry: RetryPolicy::from_config(&config.retry),
            config,
            registry,
            store,
            discovery,
            reader,
            governor,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Override the retry policy used for setup operations
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Flag that cancels the run when set
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Stop submitting new units
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Schema registry
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Load every pending unit of a record group
    ///
    /// Failed units are logged and reported; the run itself only fails when
    /// it cannot start (no schema, discovery or setup errors).
    pub async fn load(&self, record_group: &str, options: &LoadOptions) -> Result<RunReport> {
        let start = Instant::now();
        let schema = Arc::new(self.registry.lookup(record_group)?);
        let group = self.config.record_group(record_group);
        let mut report = RunReport::new(record_group, &schema.table_name, options.dry_run);

        let regions = if options.regions.is_empty() {
            self.config.regions.clone()
        } else {
            options.regions.clone()
        };
        let locators =
            self.discovery
                .discover(record_group, &regions, options.period_start, options.period_end)?;
        report.units_discovered = locators.len();

        info!(
            record_group,
            table = %schema.table_name,
            units = locators.len(),
            dry_run = options.dry_run,
            "Starting load"
        );

        let tracker = Arc::new(
            ProgressTracker::load(Arc::clone(&self.store), record_group, &schema.table_name)
                .await?,
        );

        let mut pending = Vec::with_capacity(locators.len());
        for locator in locators {
            let id = unit_id(&locator);
            if tracker.is_committed(&id).await {
                debug!(unit = %id, "Skipping committed unit");
                report.units_skipped += 1;
            } else {
                pending.push((locator, id));
            }
        }

        if pending.is_empty() {
            info!(record_group, skipped = report.units_skipped, "Nothing to load");
            report.duration = start.elapsed();
            return Ok(report);
        }

        if !options.dry_run {
            let unit_ids: Vec<String> = pending.iter().map(|(_, id)| id.clone()).collect();
            self.prepare_table(&schema, record_group, &unit_ids, &regions).await?;
        }

        let ctx = Arc::new(UnitContext {
            columns: Arc::new(schema.table_columns()),
            expected_columns: Arc::new(schema.columns.iter().map(|c| c.name.clone()).collect()),
            synonyms: Arc::new(group.synonyms.clone()),
            schema: Arc::clone(&schema),
            reader: Arc::clone(&self.reader),
            store: Arc::clone(&self.store),
            dry_run: options.dry_run,
        });

        let _sampler = self.governor.start();
        let workers = self.governor.recommended_workers();
        let semaphore = Arc::new(Semaphore::new(workers));
        let timeout = Duration::from_secs(self.config.load.unit_timeout_secs);
        info!(workers, pending = pending.len(), "Submitting units");

        let mut join_set = JoinSet::new();
        let total = pending.len();
        for (submitted, (locator, id)) in pending.into_iter().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!(
                    remaining = total - submitted,
                    "Run cancelled, not submitting remaining units"
                );
                report.units_not_submitted = total - submitted;
                break;
            }

            self.governor.wait_for_headroom().await;
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::Other(format!("Worker pool closed: {e}")))?;

            let job = UnitJob {
                region: region_from_unit(&id, record_group),
                locator,
                unit_id: id,
                chunk_size: self.governor.chunk_size(),
                abandon: Arc::new(AtomicBool::new(false)),
            };
            let ctx = Arc::clone(&ctx);
            let tracker = Arc::clone(&tracker);
            join_set.spawn(run_unit(ctx, job, permit, timeout, tracker));
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    error!("Unit task panicked: {}", e);
                    report.absorb(UnitOutcome::failed("<unknown>", UnitStage::Failed, e.to_string()));
                }
            }
        }

        report.duration = start.elapsed();
        info!(
            record_group,
            loaded = report.units_loaded,
            failed = report.units_failed,
            skipped = report.units_skipped,
            rows = report.rows_inserted,
            conversion_errors = report.total_errors(),
            "Load finished in {:?}",
            report.duration
        );
        Ok(report)
    }

    /// Create the table and every partition the pending units need
    ///
    /// Schema-altering statements run here, before any worker starts.
    async fn prepare_table(
        &self,
        schema: &Schema,
        record_group: &str,
        unit_ids: &[String],
        regions: &[String],
    ) -> Result<()> {
        let mut keys: BTreeSet<String> =
            UnitRouter::new(record_group, unit_ids.to_vec(), &schema.partition_key)
                .partitions()?
                .into_iter()
                .collect();
        keys.extend(ListRouter::new(regions.to_vec(), &schema.partition_key).partitions()?);

        let store = Arc::clone(&self.store);
        let retry = self.retry.clone();
        let table = schema.table_name.clone();
        let columns = schema.table_columns();

        tokio::task::spawn_blocking(move || {
            retry.run(&format!("create table {table}"), || {
                store.create_table(&table, &columns)
            })?;
            for key in &keys {
                retry.run(&format!("create partition {table}/{key}"), || {
                    store.create_partition(&table, key)
                })?;
            }
            debug!(table = %table, partitions = keys.len(), "Table ready");
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::store(format!("Setup task failed: {e}")))?
    }
}

/// Run one unit with its timeout, then record its progress
///
/// The worker permit is held by the blocking task, so a timed-out unit keeps
/// its slot until it has actually stopped.
async fn run_unit(
    ctx: Arc<UnitContext>,
    job: UnitJob,
    permit: OwnedSemaphorePermit,
    timeout: Duration,
    tracker: Arc<ProgressTracker>,
) -> UnitOutcome {
    let unit = job.unit_id.clone();
    let abandon = Arc::clone(&job.abandon);
    let dry_run = ctx.dry_run;
    debug!(unit = %unit, chunk_size = job.chunk_size, "Processing unit");

    let work = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        ctx.process(&job)
    });
    let outcome = match tokio::time::timeout(timeout, work).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => UnitOutcome::failed(&unit, UnitStage::Failed, format!("Worker failed: {e}")),
        Err(_) => {
            // The blocking read/insert cannot be interrupted; the flag makes
            // it stop at the next chunk and roll back
            abandon.store(true, Ordering::SeqCst);
            let error = Error::Timeout {
                unit: unit.clone(),
                timeout_secs: timeout.as_secs(),
            };
            UnitOutcome::failed(&unit, UnitStage::Failed, error.to_string())
        }
    };

    if let Some(failure) = &outcome.failure {
        error!(
            unit = %unit,
            stage = %failure.stage,
            "Unit failed: {}",
            failure.message
        );
        return outcome;
    }
    if dry_run {
        info!(unit = %unit, rows = outcome.rows, "Dry run: unit converted");
        return outcome;
    }

    match tracker.record(&unit, outcome.rows).await {
        Ok(_) => {
            info!(unit = %unit, rows = outcome.rows, "Unit loaded");
            UnitOutcome {
                stage: UnitStage::ProgressRecorded,
                ..outcome
            }
        }
        Err(e) => {
            // Rows are committed; a rerun will hit the provenance key instead of duplicating
            error!(unit = %unit, "Rows committed but progress not recorded: {}", e);
            UnitOutcome::failed(&unit, UnitStage::ProgressRecorded, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests;
