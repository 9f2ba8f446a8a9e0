//! Conversion engine tests

use super::*;
use crate::schema::{Schema, SchemaColumn, TargetType};
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Decimal128Array, Int16Array, Int32Array,
    StringArray,
};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn text_batch(columns: &[(&str, Vec<Option<&str>>)]) -> RecordBatch {
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

fn schema(columns: &[(&str, TargetType, bool)]) -> Schema {
    Schema::new(
        "RD",
        "rd",
        "uf",
        columns
            .iter()
            .map(|(name, ty, aux)| SchemaColumn {
                name: (*name).to_string(),
                target_type: *ty,
                has_auxiliary: *aux,
            })
            .collect(),
    )
}

fn date_days(y: i32, m: u32, d: u32) -> i32 {
    crate::coerce::days_since_epoch(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

// ============================================================================
// Dates
// ============================================================================

#[test]
fn test_no_date_marker_is_null_without_error() {
    let batch = text_batch(&[("dt_inter", vec![Some("00000000"), Some("20240115")])]);
    let out = convert(&batch, &schema(&[("dt_inter", TargetType::Date, true)])).unwrap();

    let dates = out.batch.column(0).as_any().downcast_ref::<Date32Array>().unwrap();
    assert!(dates.is_null(0));
    assert_eq!(dates.value(1), date_days(2024, 1, 15));
    assert_eq!(out.error_counts["dt_inter"], 0);
    // No failures, so the auxiliary column is pruned
    assert!(out.batch.column_by_name("raw_dt_inter").is_none());
}

#[test]
fn test_repaired_date_keeps_original() {
    let batch = text_batch(&[("dt_inter", vec![Some("20240230"), Some("2024ABCD"), Some("XYZ")])]);
    let out = convert(&batch, &schema(&[("dt_inter", TargetType::Date, true)])).unwrap();

    let dates = out.batch.column(0).as_any().downcast_ref::<Date32Array>().unwrap();
    assert_eq!(dates.value(0), date_days(2024, 2, 1));
    assert_eq!(dates.value(1), date_days(2024, 1, 1));
    assert!(dates.is_null(2));

    let raw = out.batch.column_by_name("raw_dt_inter").unwrap().as_string::<i32>();
    assert_eq!(raw.value(0), "20240230");
    assert_eq!(raw.value(1), "2024ABCD");
    assert_eq!(raw.value(2), "XYZ");
    assert_eq!(out.error_counts["dt_inter"], 3);
}

// ============================================================================
// Numbers & Booleans
// ============================================================================

#[test]
fn test_integer_overflow_is_failure() {
    let batch = text_batch(&[
        ("qtd", vec![Some("32767"), Some("32768"), Some(" 12 "), Some("1.5")]),
        ("total", vec![Some("32768"), None, Some(""), Some("-7")]),
    ]);
    let out = convert(
        &batch,
        &schema(&[
            ("qtd", TargetType::SmallInt, true),
            ("total", TargetType::Integer, false),
        ]),
    )
    .unwrap();

    let qtd = out.batch.column(0).as_any().downcast_ref::<Int16Array>().unwrap();
    assert_eq!(qtd.value(0), 32767);
    assert!(qtd.is_null(1));
    assert_eq!(qtd.value(2), 12);
    assert!(qtd.is_null(3));
    assert_eq!(out.error_counts["qtd"], 2);

    let total = out.batch.column(1).as_any().downcast_ref::<Int32Array>().unwrap();
    assert_eq!(total.value(0), 32768);
    assert!(total.is_null(1));
    assert!(total.is_null(2));
    assert_eq!(total.value(3), -7);
    assert_eq!(out.error_counts["total"], 0);

    let raw = out.batch.column_by_name("raw_qtd").unwrap().as_string::<i32>();
    assert!(raw.is_null(0));
    assert_eq!(raw.value(1), "32768");
}

#[test]
fn test_numeric_scale_and_separator() {
    let batch = text_batch(&[("valor", vec![Some("12.5"), Some("0,75"), Some("1.2345678"), Some("abc")])]);
    let out = convert(&batch, &schema(&[("valor", TargetType::Numeric, false)])).unwrap();

    let values = out.batch.column(0).as_any().downcast_ref::<Decimal128Array>().unwrap();
    assert_eq!(values.value(0), 12_500_000);
    assert_eq!(values.value(1), 750_000);
    assert_eq!(values.value(2), 1_234_568);
    assert!(values.is_null(3));
    assert_eq!(out.error_counts["valor"], 1);
    // Without an auxiliary column the failure is only counted
    assert_eq!(out.batch.num_columns(), 1);
}

#[test]
fn test_boolean_tokens() {
    let batch = text_batch(&[("flag", vec![Some("YES"), Some("0"), Some("True"), Some("maybe")])]);
    let out = convert(&batch, &schema(&[("flag", TargetType::Boolean, false)])).unwrap();

    let flags = out.batch.column(0).as_any().downcast_ref::<BooleanArray>().unwrap();
    assert!(flags.value(0));
    assert!(!flags.value(1));
    assert!(flags.value(2));
    assert!(flags.is_null(3));
}

// ============================================================================
// Text
// ============================================================================

#[test]
fn test_text_is_trimmed_only() {
    let batch = text_batch(&[(
        "codigo",
        vec![Some(" 001 "), Some("   "), Some("0012"), Some("2077485X")],
    )]);
    let out = convert(&batch, &schema(&[("codigo", TargetType::FixedText(3), true)])).unwrap();

    let codes = out.batch.column(0).as_string::<i32>();
    assert_eq!(codes.value(0), "001");
    assert!(codes.is_null(1));
    // Values wider than the inferred width are kept whole
    assert_eq!(codes.value(2), "0012");
    assert_eq!(codes.value(3), "2077485X");
    assert_eq!(out.error_counts["codigo"], 0);
    assert!(out.batch.column_by_name("raw_codigo").is_none());
}

#[test]
fn test_unbounded_text_never_fails() {
    let long = "x".repeat(1_000);
    let batch = text_batch(&[("obs", vec![Some(long.as_str())])]);
    let out = convert(&batch, &schema(&[("obs", TargetType::Text, false)])).unwrap();
    assert_eq!(out.total_errors(), 0);
}

// ============================================================================
// Structure
// ============================================================================

#[test]
fn test_missing_column_is_structural_mismatch() {
    let batch = text_batch(&[("codigo", vec![Some("001")])]);
    let err = convert(
        &batch,
        &schema(&[
            ("codigo", TargetType::FixedText(3), false),
            ("valor", TargetType::Numeric, false),
        ]),
    )
    .unwrap_err();

    match err {
        crate::Error::StructuralMismatch { expected, found, .. } => {
            assert_eq!(expected, 2);
            assert_eq!(found, 1);
        }
        other => panic!("Expected StructuralMismatch, got {other:?}"),
    }
}

#[test]
fn test_output_layout_and_partition_passthrough() {
    let batch = text_batch(&[
        ("extra", vec![Some("ignored")]),
        ("uf", vec![Some("SP")]),
        ("valor", vec![Some("x")]),
        ("codigo", vec![Some("001")]),
    ]);
    let out = convert(
        &batch,
        &schema(&[
            ("codigo", TargetType::FixedText(3), true),
            ("valor", TargetType::Numeric, true),
        ]),
    )
    .unwrap();

    let names: Vec<String> = out
        .batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["codigo", "valor", "raw_valor", "uf"]);
}

#[test]
fn test_accumulate_error_counts() {
    let mut total = ErrorCounts::new();
    let mut a = ErrorCounts::new();
    a.insert("valor".to_string(), 2);
    let mut b = ErrorCounts::new();
    b.insert("valor".to_string(), 3);
    b.insert("codigo".to_string(), 1);

    accumulate(&mut total, &a);
    accumulate(&mut total, &b);
    assert_eq!(total["valor"], 5);
    assert_eq!(total["codigo"], 1);
}
