//! Type inference and registry tests

use super::*;
use crate::profile::{ColumnFingerprint, ColumnProfiler, DataKind};
use pretty_assertions::assert_eq;

fn fingerprint(column: &str, values: &[&str]) -> ColumnFingerprint {
    ColumnProfiler::new().profile_values(column, DataKind::String, values.iter().map(|v| Some(*v)))
}

fn infer(column: &str, values: &[&str]) -> TypeDecision {
    TypeInferrer::new().infer(column, &fingerprint(column, values))
}

// ============================================================================
// Inference Rules
// ============================================================================

#[test]
fn test_all_null_is_unbounded_text() {
    let fp = ColumnProfiler::new().profile_values("x", DataKind::String, [None::<&str>, None]);
    assert_eq!(TypeInferrer::new().infer("x", &fp), TypeDecision::new(TargetType::Text));
}

#[test]
fn test_clean_dates() {
    assert_eq!(
        infer("dt_inter", &["20240115", "20231231", "00000000"]),
        TypeDecision::new(TargetType::Date)
    );
}

#[test]
fn test_repaired_dates_need_auxiliary() {
    let decision = infer("dt_saida", &["20240115", "20240230"]);
    assert_eq!(decision, TypeDecision::with_auxiliary(TargetType::Date));
}

#[test]
fn test_invalid_dates_fall_back_to_text() {
    assert_eq!(
        infer("data_evento", &["20240115", "ABCDEFGH"]),
        TypeDecision::new(TargetType::FixedText(8))
    );
}

#[test]
fn test_year_month_dates_are_text() {
    assert_eq!(
        infer("dt_competencia", &["202401", "202402"]),
        TypeDecision::new(TargetType::FixedText(6))
    );
}

#[test]
fn test_amount_role() {
    assert_eq!(infer("val_tot", &["12.50", "100", "0,75"]), TypeDecision::new(TargetType::Numeric));
    assert_eq!(
        infer("valor", &["12.50", "n/a"]),
        TypeDecision::new(TargetType::VarText(5))
    );
}

#[test]
fn test_leading_zeros_keep_text() {
    assert_eq!(
        infer("codigo", &["001", "002", "010"]),
        TypeDecision::new(TargetType::FixedText(3))
    );
}

#[test]
fn test_code_list_keeps_text() {
    assert_eq!(
        infer("cnes", &["2077485", "2078015"]),
        TypeDecision::new(TargetType::FixedText(7))
    );
}

#[test]
fn test_boolean_tokens() {
    assert_eq!(infer("flag", &["yes", "NO", "true"]), TypeDecision::new(TargetType::Boolean));
    assert_eq!(infer("flag", &["0", "1"]), TypeDecision::new(TargetType::Boolean));
    assert_ne!(infer("flag", &["y", "n"]).target_type, TargetType::Boolean);
    // Digits outside the token set fall through to the numeric rule
    assert_eq!(infer("flag", &["1", "2"]).target_type, TargetType::SmallInt);
}

#[test]
fn test_integer_width_boundaries() {
    assert_eq!(infer("qtd", &["32767", "-5"]).target_type, TargetType::SmallInt);
    assert_eq!(infer("qtd", &["32768"]).target_type, TargetType::Integer);
    assert_eq!(infer("qtd", &["2147483648"]).target_type, TargetType::BigInt);
    assert_eq!(infer("qtd", &["12.5", "3"]).target_type, TargetType::Numeric);
    assert_eq!(
        infer("qtd", &["99999999999999999999"]).target_type,
        TargetType::Numeric
    );
}

#[test]
fn test_mixed_representations_unbounded() {
    assert_eq!(infer("obs", &["12", "abc", "x-1"]), TypeDecision::new(TargetType::Text));
}

#[test]
fn test_text_sizing() {
    assert_eq!(infer("nome", &["ana", "bia"]).target_type, TargetType::FixedText(3));
    assert_eq!(infer("nome", &["ana", "beatriz"]).target_type, TargetType::VarText(7));

    let long = "x".repeat(300);
    assert_eq!(infer("nome", &[long.as_str(), "y"]).target_type, TargetType::Text);
}

#[test]
fn test_inference_is_deterministic() {
    let fp = fingerprint("dt_inter", &["20240230", "20240101"]);
    let inferrer = TypeInferrer::new();
    assert_eq!(inferrer.infer("dt_inter", &fp), inferrer.infer("dt_inter", &fp));
}

#[test]
fn test_all_typed_policy_adds_auxiliary() {
    let inferrer = TypeInferrer::new().with_auxiliary_policy(AuxiliaryPolicy::AllTyped);
    let fp = fingerprint("qtd", &["1", "20000"]);
    assert_eq!(inferrer.infer("qtd", &fp), TypeDecision::with_auxiliary(TargetType::SmallInt));

    let fp = fingerprint("nome", &["ana"]);
    assert!(!inferrer.infer("nome", &fp).needs_auxiliary_column);
}

// ============================================================================
// Roles
// ============================================================================

#[test]
fn test_role_table_overrides_heuristic() {
    // `pa_cmp` has no date marker, `dt_cmp` would; the table wins either way
    let table = RoleTable::builtin();
    assert_eq!(table.role_for(Some("PA"), "pa_valapr"), ColumnRole::Amount);
    assert_eq!(table.role_for(Some("RD"), "nasc"), ColumnRole::Date);
    assert_eq!(table.role_for(None, "nasc"), ColumnRole::Plain);

    let mut custom = RoleTable::empty();
    custom.insert("RD", "dt_extra", ColumnRole::Plain);
    assert_eq!(custom.role_for(Some("rd"), "DT_EXTRA"), ColumnRole::Plain);
    assert_eq!(custom.role_for(Some("RD"), "dt_inter"), ColumnRole::Date);
}

#[test]
fn test_heuristic_roles() {
    assert_eq!(heuristic_role("data_evento"), ColumnRole::Date);
    assert_eq!(heuristic_role("DT_INTER"), ColumnRole::Date);
    assert_eq!(heuristic_role("vl_total"), ColumnRole::Amount);
    assert_eq!(heuristic_role("munic_res"), ColumnRole::Code);
    assert_eq!(heuristic_role("sexo"), ColumnRole::Plain);
}

#[test]
fn test_group_roles_drive_inference() {
    let roles = RoleTable::builtin();
    let inferrer = TypeInferrer::new().with_roles(roles);
    let fp = fingerprint("nasc", &["19800101", "19751231"]);

    assert_eq!(inferrer.infer_in_group("RD", "nasc", &fp).target_type, TargetType::Date);
    // Outside the group the name has no marker and the values look like integers
    assert_eq!(inferrer.infer("nasc", &fp).target_type, TargetType::Integer);
}

// ============================================================================
// Target Types & Layout
// ============================================================================

#[test]
fn test_target_type_text_form() {
    for ty in [
        TargetType::SmallInt,
        TargetType::Numeric,
        TargetType::Date,
        TargetType::FixedText(2),
        TargetType::VarText(40),
        TargetType::Text,
    ] {
        assert_eq!(ty.to_string().parse::<TargetType>().unwrap(), ty);
    }
    assert!("VARCHAR(300)".parse::<TargetType>().is_err());
    assert!("BLOB".parse::<TargetType>().is_err());
    assert_eq!(TargetType::Numeric.sql_type(), "DECIMAL(38,6)");
}

#[test]
fn test_table_layout_order() {
    let schema = Schema::new(
        "RD",
        "rd",
        "uf",
        vec![
            SchemaColumn {
                name: "dt_inter".to_string(),
                target_type: TargetType::Date,
                has_auxiliary: true,
            },
            SchemaColumn {
                name: "val_tot".to_string(),
                target_type: TargetType::Numeric,
                has_auxiliary: false,
            },
        ],
    );

    assert_eq!(
        schema.table_column_names(),
        vec!["dt_inter", "val_tot", "raw_dt_inter", "source_id", "uf"]
    );
    let layout = schema.table_columns();
    assert_eq!(layout[2].kind, TableColumnKind::Auxiliary);
    assert_eq!(layout[4].target_type, TargetType::FixedText(2));
}

// ============================================================================
// Registry
// ============================================================================

fn decisions() -> Vec<ColumnDecision> {
    vec![
        ColumnDecision::new("codigo", TypeDecision::new(TargetType::FixedText(3))),
        ColumnDecision::new("data_evento", TypeDecision::new(TargetType::Date)),
        ColumnDecision::new("valor", TypeDecision::new(TargetType::Numeric)),
    ]
}

#[test]
fn test_register_and_lookup() {
    let registry = SchemaRegistry::in_memory();
    let (schema, outcome) = registry.register("RD", &decisions(), "rd").unwrap();

    assert_eq!(outcome, RegisterOutcome::Created);
    assert_eq!(schema.columns.len(), 3);
    assert_eq!(registry.lookup("RD").unwrap(), schema);
    assert!(matches!(
        registry.lookup("PA"),
        Err(crate::Error::SchemaNotFound { .. })
    ));
}

#[test]
fn test_register_is_idempotent_and_replaces_whole() {
    let registry = SchemaRegistry::in_memory();
    registry.register("RD", &decisions(), "rd").unwrap();

    let (_, outcome) = registry.register("RD", &decisions(), "rd").unwrap();
    assert_eq!(outcome, RegisterOutcome::Unchanged);

    let changed = vec![ColumnDecision::new("codigo", TypeDecision::new(TargetType::Text))];
    let (schema, outcome) = registry.register("RD", &changed, "rd").unwrap();
    assert_eq!(outcome, RegisterOutcome::Replaced);
    assert_eq!(registry.lookup("RD").unwrap().columns.len(), 1);
    assert_eq!(schema.columns[0].target_type, TargetType::Text);
}

#[test]
fn test_register_ignores_bookkeeping_decisions() {
    let registry = SchemaRegistry::in_memory();
    let mut with_uf = decisions();
    with_uf.push(ColumnDecision::new("uf", TypeDecision::new(TargetType::FixedText(2))));
    with_uf.push(ColumnDecision::new("source_id", TypeDecision::new(TargetType::Text)));

    let (schema, _) = registry.register("RD", &with_uf, "rd").unwrap();
    assert_eq!(schema.columns.len(), 3);
    assert_eq!(schema.table_column_names().last().unwrap(), "uf");
}

#[test]
fn test_registry_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schemas.json");

    {
        let registry = SchemaRegistry::open(&path).unwrap();
        registry.register("RD", &decisions(), "sih_rd").unwrap();
    }

    let reopened = SchemaRegistry::open(&path).unwrap();
    let schema = reopened.lookup("RD").unwrap();
    assert_eq!(schema.table_name, "sih_rd");
    assert_eq!(schema.columns[0].target_type, TargetType::FixedText(3));
    assert_eq!(reopened.record_groups().unwrap(), vec!["RD"]);

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"CHAR(3)\""));
}

#[test]
fn test_failed_write_leaves_registry_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schemas.json");
    let registry = SchemaRegistry::open(&path).unwrap();

    // A directory where the temp file goes makes the write fail
    let blocker = path.with_extension("tmp");
    std::fs::create_dir(&blocker).unwrap();
    assert!(matches!(
        registry.register("RD", &decisions(), "rd"),
        Err(crate::Error::Registry { .. })
    ));
    assert!(matches!(registry.lookup("RD"), Err(crate::Error::SchemaNotFound { .. })));

    std::fs::remove_dir(&blocker).unwrap();
    let (_, outcome) = registry.register("RD", &decisions(), "rd").unwrap();
    assert_eq!(outcome, RegisterOutcome::Created);
    assert!(SchemaRegistry::open(&path).unwrap().lookup("RD").is_ok());
}

#[test]
fn test_registry_rejects_unknown_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schemas.json");
    std::fs::write(
        &path,
        r#"{"RD": {"record_group": "RD", "table_name": "rd", "columns": [{"name": "x", "target_type": "BLOB", "has_auxiliary": false}]}}"#,
    )
    .unwrap();

    assert!(matches!(
        SchemaRegistry::open(&path),
        Err(crate::Error::Registry { .. })
    ));
}
