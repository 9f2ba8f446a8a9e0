//! Tests for the batch loader

use super::normalize::{canonical_name, normalize_batch};
use super::*;
use crate::config::EtlConfig;
use crate::resource::{CleanupOutcome, FixedMonitor, ResourceGovernor};
use crate::schema::{RegisterOutcome, SchemaRegistry, TargetType};
use crate::source::{LocalDiscovery, ParquetUnitReader};
use crate::store::{DuckDbStore, Store};
use crate::types::{Period, StringMap};
use arrow::array::{Array, ArrayRef, AsArray, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Fixtures
// ============================================================================

fn string_batch(columns: &[(&str, Vec<Option<&str>>)]) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, _)| Field::new(*name, DataType::Utf8, true))
        .collect();
    let arrays: Vec<ArrayRef> = columns
        .iter()
        .map(|(_, values)| Arc::new(StringArray::from(values.clone())) as ArrayRef)
        .collect();
    RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays).unwrap()
}

fn write_parquet(path: &Path, batch: &RecordBatch) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).unwrap();
    writer.write(batch).unwrap();
    writer.close().unwrap();
}

fn write_claims(dir: &Path, name: &str) {
    let batch = string_batch(&[
        ("CODIGO", vec![Some("001"), Some("002"), Some("010")]),
        ("DATA_EVENTO", vec![Some("20240115"), Some("20240116"), Some("00000000")]),
        ("VALOR", vec![Some("12.50"), Some("3"), Some("7,25")]),
    ]);
    write_parquet(&dir.join(name), &batch);
}

struct Harness {
    _dir: tempfile::TempDir,
    config: Arc<EtlConfig>,
    registry: Arc<SchemaRegistry>,
    store: Arc<DuckDbStore>,
    monitor: Arc<FixedMonitor>,
    governor: Arc<ResourceGovernor>,
    loader: BatchLoader,
}

fn harness(units: &[&str]) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    for unit in units {
        write_claims(dir.path(), unit);
    }

    let mut config = EtlConfig::default();
    config.base_path = dir.path().to_path_buf();
    config.load.max_workers = 4;
    config.resources.grace_period_secs = 0;
    let config = Arc::new(config);

    let registry = Arc::new(SchemaRegistry::in_memory());
    let store = Arc::new(DuckDbStore::in_memory().unwrap());
    let monitor = Arc::new(FixedMonitor::idle());
    let governor = Arc::new(
        ResourceGovernor::new(&config.resources, &config.load, monitor.clone())
            .with_terminator(Arc::new(|code| panic!("terminated with {code}"))),
    );
    let loader = BatchLoader::new(
        Arc::clone(&config),
        Arc::clone(&registry),
        store.clone(),
        Arc::new(LocalDiscovery::new(dir.path())),
        Arc::new(ParquetUnitReader::new()),
        Arc::clone(&governor),
    );

    Harness {
        _dir: dir,
        config,
        registry,
        store,
        monitor,
        governor,
        loader,
    }
}

fn options() -> LoadOptions {
    LoadOptions::new(Period::new(2024, 1).unwrap(), Period::new(2024, 12).unwrap())
}

async fn infer(h: &Harness) -> InferenceReport {
    infer_schema(
        &h.config,
        &h.registry,
        Arc::new(LocalDiscovery::new(&h.config.base_path)),
        Arc::new(ParquetUnitReader::new()),
        "RD",
        &options(),
    )
    .await
    .unwrap()
}

// ============================================================================
// Normalization Tests
// ============================================================================

#[test]
fn test_canonical_name_applies_synonyms() {
    let mut synonyms = StringMap::new();
    synonyms.insert("VAL_TOT".to_string(), "valor".to_string());

    assert_eq!(canonical_name("  CODIGO ", &synonyms), "codigo");
    assert_eq!(canonical_name("val_tot", &synonyms), "valor");
    assert_eq!(canonical_name("VAL_TOT", &synonyms), "valor");
}

#[test]
fn test_normalize_batch_handles_drift() {
    let mut synonyms = StringMap::new();
    synonyms.insert("vl_total".to_string(), "valor".to_string());

    let raw = RecordBatch::try_new(
        Arc::new(ArrowSchema::new(vec![
            Field::new("CODIGO", DataType::Utf8, true),
            Field::new("VL_TOTAL", DataType::Int32, true),
            Field::new("EXTRA", DataType::Utf8, true),
            Field::new("UF", DataType::Utf8, true),
        ])),
        vec![
            Arc::new(StringArray::from(vec!["001", "002"])) as ArrayRef,
            Arc::new(Int32Array::from(vec![Some(10), None])) as ArrayRef,
            Arc::new(StringArray::from(vec!["x", "y"])) as ArrayRef,
            Arc::new(StringArray::from(vec!["SP", "RJ"])) as ArrayRef,
        ],
    )
    .unwrap();

    let expected = vec!["codigo".to_string(), "valor".to_string(), "data_evento".to_string()];
    let normalized = normalize_batch(&raw, &expected, &synonyms, "uf").unwrap();

    let names: Vec<String> = normalized
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["codigo", "valor", "data_evento", "uf"]);
    assert!(normalized
        .schema()
        .fields()
        .iter()
        .all(|f| f.data_type() == &DataType::Utf8));

    let valor = normalized.column(1).as_string::<i32>();
    assert_eq!(valor.value(0), "10");
    assert!(valor.is_null(1));
    assert_eq!(normalized.column(2).null_count(), 2);
}

#[test]
fn test_normalize_batch_without_partition_key() {
    let raw = string_batch(&[("codigo", vec![Some("001")])]);
    let normalized = normalize_batch(&raw, &["codigo".to_string()], &StringMap::new(), "uf").unwrap();
    assert_eq!(normalized.num_columns(), 1);
    assert_eq!(normalized.num_rows(), 1);
}

// ============================================================================
// Stage & Report Tests
// ============================================================================

#[test]
fn test_run_report_absorb() {
    let mut report = RunReport::new("RD", "rd", false);
    let mut counts = crate::convert::ErrorCounts::new();
    counts.insert("dt_inter".to_string(), 2);

    report.absorb(UnitOutcome::loaded("RDSP2401", UnitStage::ProgressRecorded, 10, counts.clone()));
    report.absorb(UnitOutcome::loaded("RDSP2402", UnitStage::ProgressRecorded, 5, counts));
    report.absorb(UnitOutcome::failed("RDSP2403", UnitStage::Read, "truncated"));

    assert_eq!(report.units_attempted, 3);
    assert_eq!(report.units_loaded, 2);
    assert_eq!(report.units_failed, 1);
    assert_eq!(report.rows_inserted, 15);
    assert_eq!(report.total_errors(), 4);
    assert_eq!(report.failures[0].stage, UnitStage::Read);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["failures"][0]["stage"], "read");
    assert!(json.get("duration_ms").is_some());
}

#[test]
fn test_unit_stage_display() {
    assert_eq!(UnitStage::PartitionTagged.to_string(), "partition_tagged");
    assert_eq!(UnitStage::ProgressRecorded.as_str(), "progress_recorded");
}

// ============================================================================
// Inference Tests
// ============================================================================

#[tokio::test]
async fn test_infer_schema_registers_decisions() {
    let h = harness(&["RDSP2401.parquet", "RDRJ2401.parquet"]);
    let report = infer(&h).await;

    assert_eq!(report.units_sampled, 2);
    assert_eq!(report.outcome, RegisterOutcome::Created);

    let schema = h.registry.lookup("RD").unwrap();
    assert_eq!(schema.table_name, "rd");
    let codigo = schema.column("codigo").unwrap();
    assert_eq!(codigo.target_type, TargetType::FixedText(3));
    let data = schema.column("data_evento").unwrap();
    assert_eq!(data.target_type, TargetType::Date);
    assert!(!data.has_auxiliary);
    assert_eq!(schema.column("valor").unwrap().target_type, TargetType::Numeric);

    // Same data, same decisions
    assert_eq!(infer(&h).await.outcome, RegisterOutcome::Unchanged);
}

#[tokio::test]
async fn test_infer_schema_without_units_fails() {
    let h = harness(&[]);
    let result = infer_schema(
        &h.config,
        &h.registry,
        Arc::new(LocalDiscovery::new(&h.config.base_path)),
        Arc::new(ParquetUnitReader::new()),
        "RD",
        &options(),
    )
    .await;
    assert!(matches!(result, Err(crate::Error::Discovery { .. })));
}

// ============================================================================
// Load Tests
// ============================================================================

#[tokio::test]
async fn test_load_without_schema_fails() {
    let h = harness(&["RDSP2401.parquet"]);
    let result = h.loader.load("RD", &options()).await;
    assert!(matches!(result, Err(crate::Error::SchemaNotFound { .. })));
}

#[tokio::test]
async fn test_load_inserts_and_records_progress() {
    let h = harness(&["RDSP2401.parquet", "RDRJ2401.parquet"]);
    infer(&h).await;

    let report = h.loader.load("RD", &options()).await.unwrap();
    assert_eq!(report.units_discovered, 2);
    assert_eq!(report.units_loaded, 2);
    assert_eq!(report.units_failed, 0);
    assert_eq!(report.rows_inserted, 6);
    assert_eq!(h.store.count_rows("rd").unwrap(), 6);
    assert_eq!(h.store.partitions("rd").unwrap(), vec!["RJ", "SP"]);

    let sp = h
        .store
        .query_strings("SELECT source_id FROM rd_sp ORDER BY source_id")
        .unwrap();
    assert_eq!(
        sp,
        vec![
            Some("RDSP2401:0".to_string()),
            Some("RDSP2401:1".to_string()),
            Some("RDSP2401:2".to_string())
        ]
    );

    let progress = h.store.progress_records("rd").unwrap();
    assert_eq!(progress.len(), 2);
    assert!(progress.iter().all(|p| p.rows_inserted == 3));
}

#[tokio::test]
async fn test_rerun_skips_committed_units() {
    let h = harness(&["RDSP2401.parquet"]);
    infer(&h).await;

    h.loader.load("RD", &options()).await.unwrap();
    let second = h.loader.load("RD", &options()).await.unwrap();

    assert_eq!(second.units_skipped, 1);
    assert_eq!(second.units_attempted, 0);
    assert_eq!(second.rows_inserted, 0);
    assert_eq!(h.store.count_rows("rd").unwrap(), 3);
}

#[tokio::test]
async fn test_dry_run_inserts_nothing() {
    let h = harness(&["RDSP2401.parquet"]);
    infer(&h).await;

    let report = h
        .loader
        .load("RD", &options().with_dry_run(true))
        .await
        .unwrap();
    assert!(report.dry_run);
    assert_eq!(report.units_loaded, 1);
    assert_eq!(report.rows_inserted, 3);
    assert!(!h.store.table_exists("rd").unwrap());
    assert!(h.store.query_progress("rd").unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_unit_does_not_stop_the_run() {
    let h = harness(&["RDSP2401.parquet"]);
    infer(&h).await;
    std::fs::write(h.config.base_path.join("RDMG2401.parquet"), b"not a parquet file").unwrap();

    let report = h.loader.load("RD", &options()).await.unwrap();
    assert_eq!(report.units_loaded, 1);
    assert_eq!(report.units_failed, 1);
    assert_eq!(report.failures[0].unit_id, "RDMG2401");
    assert_eq!(report.failures[0].stage, UnitStage::Read);

    // The failed unit is retried on the next run
    let progress = h.store.query_progress("rd").unwrap();
    assert!(!progress.contains("RDMG2401"));
}

#[tokio::test]
async fn test_cancelled_loader_submits_nothing() {
    let h = harness(&["RDSP2401.parquet", "RDSP2402.parquet"]);
    infer(&h).await;

    h.loader.cancel();
    let report = h.loader.load("RD", &options()).await.unwrap();
    assert_eq!(report.units_attempted, 0);
    assert_eq!(report.units_not_submitted, 2);
    assert_eq!(h.store.count_rows("rd").unwrap(), 0);
}

#[tokio::test]
async fn test_load_continues_after_memory_recovers() {
    let h = harness(&["RDSP2401.parquet"]);
    infer(&h).await;

    h.monitor.set_memory_percent(97.0);
    h.governor.sample();
    assert!(h.governor.is_critical());
    h.monitor.set_memory_percent(20.0);
    assert_eq!(h.governor.emergency_cleanup().await, CleanupOutcome::Recovered);

    let report = h.loader.load("RD", &options()).await.unwrap();
    assert_eq!(report.units_not_submitted, 0);
    assert_eq!(report.units_loaded, 1);
    assert_eq!(report.rows_inserted, 3);
}

#[tokio::test]
async fn test_only_timeout_abandons_an_in_flight_unit() {
    use super::pipeline::{UnitContext, UnitJob};
    use std::sync::atomic::{AtomicBool, Ordering};

    let h = harness(&["RDSP2401.parquet"]);
    infer(&h).await;
    let schema = Arc::new(h.registry.lookup("RD").unwrap());
    let ctx = UnitContext {
        columns: Arc::new(schema.table_columns()),
        expected_columns: Arc::new(schema.columns.iter().map(|c| c.name.clone()).collect()),
        synonyms: Arc::new(StringMap::new()),
        schema,
        reader: Arc::new(ParquetUnitReader::new()),
        store: h.store.clone(),
        dry_run: true,
    };
    let job = UnitJob {
        locator: h.config.base_path.join("RDSP2401.parquet").display().to_string(),
        unit_id: "RDSP2401".to_string(),
        region: Some("SP".to_string()),
        chunk_size: 2,
        abandon: Arc::new(AtomicBool::new(false)),
    };

    // Cancelling the run stops submissions, not units already running
    h.loader.cancel();
    let outcome = ctx.process(&job);
    assert!(!outcome.is_failed());
    assert_eq!(outcome.rows, 3);

    job.abandon.store(true, Ordering::SeqCst);
    let outcome = ctx.process(&job);
    assert!(outcome.is_failed());
    assert_eq!(outcome.failure.unwrap().stage, UnitStage::Read);
}

/// Reader whose `open` blocks until the test releases it
struct GatedReader {
    gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
}

impl crate::source::UnitReader for GatedReader {
    fn open(&self, locator: &str, _chunk_size: usize) -> crate::Result<crate::source::BatchStream> {
        let _ = self.gate.lock().unwrap().recv();
        Err(crate::Error::read(locator, "released"))
    }

    fn sample(&self, locator: &str, _rows: usize) -> crate::Result<RecordBatch> {
        Err(crate::Error::read(locator, "not sampled"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timed_out_unit_keeps_its_worker_slot() {
    use super::pipeline::{UnitContext, UnitJob};
    use crate::state::ProgressTracker;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    let h = harness(&[]);
    let (release, gate) = std::sync::mpsc::channel();
    let schema = Arc::new(crate::schema::Schema::new("RD", "rd", "uf", Vec::new()));
    let ctx = Arc::new(UnitContext {
        columns: Arc::new(schema.table_columns()),
        expected_columns: Arc::new(Vec::new()),
        synonyms: Arc::new(StringMap::new()),
        schema,
        reader: Arc::new(GatedReader {
            gate: std::sync::Mutex::new(gate),
        }),
        store: h.store.clone(),
        dry_run: true,
    });
    let job = UnitJob {
        locator: "RDSP2401.parquet".to_string(),
        unit_id: "RDSP2401".to_string(),
        region: Some("SP".to_string()),
        chunk_size: 10,
        abandon: Arc::new(AtomicBool::new(false)),
    };
    let tracker = Arc::new(ProgressTracker::load(h.store.clone(), "RD", "rd").await.unwrap());

    let semaphore = Arc::new(tokio::sync::Semaphore::new(1));
    let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
    let outcome = run_unit(ctx, job, permit, Duration::from_millis(50), tracker).await;

    assert!(outcome.is_failed());
    assert!(outcome.failure.unwrap().message.contains("timed out"));
    // The blocking work is still running, so its slot is still taken
    assert_eq!(semaphore.available_permits(), 0);

    release.send(()).unwrap();
    let reacquired = tokio::time::timeout(Duration::from_secs(5), semaphore.acquire()).await;
    assert!(reacquired.is_ok());
}
