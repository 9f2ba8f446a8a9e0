//! Schema inference run
//!
//! Discover units, profile a bounded sample of each, infer one decision per
//! column and register the result. Runs once per record group, before any
//! load.

use super::types::{InferenceReport, LoadOptions};
use crate::config::EtlConfig;
use crate::error::{Error, Result};
use crate::profile::{ColumnFingerprint, ColumnProfiler, DataKind, ProfileSession};
use crate::schema::{RoleTable, SchemaRegistry, TypeInferrer};
use crate::source::{Discovery, UnitReader};
use std::sync::Arc;
use tracing::{info, warn};

/// Profile, infer and register the schema of a record group
pub async fn infer_schema(
    config: &EtlConfig,
    registry: &SchemaRegistry,
    discovery: Arc<dyn Discovery>,
    reader: Arc<dyn UnitReader>,
    record_group: &str,
    options: &LoadOptions,
) -> Result<InferenceReport> {
    let group = config.record_group(record_group);
    let regions = if options.regions.is_empty() {
        config.regions.clone()
    } else {
        options.regions.clone()
    };

    let mut locators =
        discovery.discover(record_group, &regions, options.period_start, options.period_end)?;
    if let Some(max_units) = config.profile.max_units {
        locators.truncate(max_units);
    }
    if locators.is_empty() {
        return Err(Error::discovery(format!(
            "No units found for record group '{record_group}' between {} and {}",
            options.period_start, options.period_end
        )));
    }

    info!(record_group, units = locators.len(), "Profiling record group");

    let profiler = ColumnProfiler::new().with_sample_cap(config.profile.sample_values_cap);
    let rows = config.profile.rows_per_unit;
    let synonyms = group.synonyms.clone();
    let (fingerprints, units_sampled, units_skipped) = tokio::task::spawn_blocking(move || {
        let mut session = ProfileSession::new(profiler).with_synonyms(synonyms);
        for locator in &locators {
            session.sample_unit(reader.as_ref(), locator, rows);
        }
        let sampled = session.units_sampled();
        let skipped = session.units_skipped();
        (session.finish(), sampled, skipped)
    })
    .await
    .map_err(|e| Error::profiling("*", format!("Profiling task failed: {e}")))?;

    if units_sampled == 0 {
        return Err(Error::profiling(
            "*",
            format!("None of the {units_skipped} units of '{record_group}' could be read"),
        ));
    }

    let fingerprints = select_columns(fingerprints, &group.columns, config.profile.sample_values_cap);

    let inferrer = TypeInferrer::new()
        .with_roles(RoleTable::builtin().with_group_roles(record_group, &group.roles))
        .with_auxiliary_policy(group.auxiliary_policy);
    let decisions = inferrer.infer_all(record_group, &fingerprints);

    let (schema, outcome) = registry.register_partitioned(
        record_group,
        &decisions,
        &group.table_name(record_group),
        group.partition_key(),
    )?;

    Ok(InferenceReport {
        record_group: record_group.to_string(),
        units_sampled,
        units_skipped,
        outcome,
        schema,
    })
}

/// Restrict fingerprints to the configured column list, in its order
///
/// Configured columns never seen in the sample get an empty fingerprint,
/// which infers as unbounded text. An empty list keeps every column.
fn select_columns(
    mut fingerprints: Vec<ColumnFingerprint>,
    columns: &[String],
    sample_cap: usize,
) -> Vec<ColumnFingerprint> {
    if columns.is_empty() {
        return fingerprints;
    }

    let profiler = ColumnProfiler::new().with_sample_cap(sample_cap);
    let selected: Vec<ColumnFingerprint> = columns
        .iter()
        .map(|name| {
            let name = name.trim().to_lowercase();
            match fingerprints.iter().position(|fp| fp.column == name) {
                Some(index) => fingerprints.swap_remove(index),
                None => {
                    warn!(column = %name, "Configured column not found in any sampled unit");
                    profiler.profile_values(&name, DataKind::Null, std::iter::empty::<Option<&str>>())
                }
            }
        })
        .collect();

    for extra in &fingerprints {
        warn!(column = %extra.column, "Sampled column not in configured list, ignoring");
    }
    selected
}
