//! Discovery and reader tests

use super::*;
use crate::types::Period;
use arrow::array::{ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use std::path::Path;
use std::sync::Arc;

fn write_unit(path: &Path, rows: usize) {
    let values: Vec<String> = (0..rows).map(|i| format!("{i:03}")).collect();
    let schema = Arc::new(Schema::new(vec![Field::new("CODIGO", DataType::Utf8, true)]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![Arc::new(StringArray::from(values)) as ArrayRef],
    )
    .unwrap();

    let file = std::fs::File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

fn period(s: &str) -> Period {
    s.parse().unwrap()
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discover_filters_by_group_region_and_period() {
    let dir = tempfile::tempdir().unwrap();
    for name in [
        "RDSP2401.parquet",
        "rdrj2401.parquet",
        "RDSP2312.parquet",
        "RDSP2403.parquet",
        "PASP2401.parquet",
        "RDSP2401.csv",
        "notes.parquet",
    ] {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }

    let discovery = LocalDiscovery::new(dir.path());
    let all = discovery
        .discover("RD", &[], period("2023-12"), period("2024-02"))
        .unwrap();
    let names: Vec<String> = all.iter().map(|l| unit_id(l)).collect();
    assert_eq!(names, vec!["RDSP2312", "rdrj2401", "RDSP2401"]);

    let sp_only = discovery
        .discover("RD", &["sp".to_string()], period("2024-01"), period("2024-12"))
        .unwrap();
    let names: Vec<String> = sp_only.iter().map(|l| unit_id(l)).collect();
    assert_eq!(names, vec!["RDSP2401", "RDSP2403"]);
}

#[test]
fn test_discover_split_files_and_subdirectories() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("2024");
    std::fs::create_dir(&sub).unwrap();
    std::fs::write(sub.join("PASP2401a.parquet"), b"").unwrap();
    std::fs::write(sub.join("PASP2401b.parquet"), b"").unwrap();

    let found = LocalDiscovery::new(dir.path())
        .discover("PA", &[], period("2024-01"), period("2024-01"))
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(unit_id(&found[0]), "PASP2401a");
}

#[test]
fn test_discover_nineties_years() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("RDSP9801.parquet"), b"").unwrap();

    let discovery = LocalDiscovery::new(dir.path());
    assert!(discovery
        .discover("RD", &[], period("2024-01"), period("2024-12"))
        .unwrap()
        .is_empty());
    assert_eq!(
        discovery
            .discover("RD", &[], period("1998-01"), period("1998-01"))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_discover_missing_base_path() {
    let result = LocalDiscovery::new("/nonexistent/datasus").discover(
        "RD",
        &[],
        period("2024-01"),
        period("2024-01"),
    );
    assert!(matches!(result, Err(crate::Error::Discovery { .. })));
}

// ============================================================================
// Reader
// ============================================================================

#[test]
fn test_open_streams_in_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RDSP2401.parquet");
    write_unit(&path, 25);

    let locator = path.display().to_string();
    let chunks: Vec<RecordBatch> = ParquetUnitReader::new()
        .open(&locator, 10)
        .unwrap()
        .collect::<crate::Result<_>>()
        .unwrap();

    let sizes: Vec<usize> = chunks.iter().map(RecordBatch::num_rows).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
}

#[test]
fn test_sample_limits_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("RDSP2401.parquet");
    write_unit(&path, 25);

    let sample = ParquetUnitReader::new()
        .sample(&path.display().to_string(), 7)
        .unwrap();
    assert_eq!(sample.num_rows(), 7);
}

#[test]
fn test_read_missing_or_corrupt_unit() {
    let dir = tempfile::tempdir().unwrap();
    let reader = ParquetUnitReader::new();

    let missing = dir.path().join("RDSP2401.parquet").display().to_string();
    assert!(matches!(
        reader.open(&missing, 10),
        Err(crate::Error::FileNotFound { .. })
    ));

    let corrupt = dir.path().join("RDSP2402.parquet");
    std::fs::write(&corrupt, b"not parquet").unwrap();
    assert!(matches!(
        reader.sample(&corrupt.display().to_string(), 10),
        Err(crate::Error::Read { .. })
    ));
}

#[test]
fn test_unit_id() {
    assert_eq!(unit_id("/data/RDSP2401.parquet"), "RDSP2401");
    assert_eq!(unit_id("RDSP2401"), "RDSP2401");
}
