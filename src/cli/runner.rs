//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat, Selection};
use crate::config::EtlConfig;
use crate::engine::{infer_schema, BatchLoader, LoadOptions};
use crate::error::{Error, Result, ResultExt};
use crate::resource::{ResourceGovernor, SystemMonitor};
use crate::schema::{SchemaRegistry, TableColumnKind};
use crate::source::{LocalDiscovery, ParquetUnitReader};
use crate::store::DuckDbStore;
use crate::types::{OptionStringExt, Period};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;
        match &self.cli.command {
            Commands::Infer {
                record_group,
                selection,
            } => self.infer(config, record_group, selection).await,
            Commands::Load {
                record_group,
                selection,
                dry_run,
            } => self.load(config, record_group, selection, *dry_run).await,
            Commands::Schema { record_group, ddl } => {
                self.schema(&config, record_group.as_deref(), *ddl)
            }
            Commands::Progress { record_group } => self.progress(&config, record_group),
        }
    }

    /// Load configuration, applying command-line overrides
    fn load_config(&self) -> Result<EtlConfig> {
        let mut config = match &self.cli.config {
            Some(path) => EtlConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => EtlConfig::default(),
        };
        if let Some(database) = self.cli.database.clone().none_if_empty() {
            config.database.path = database;
        }
        Ok(config)
    }

    fn options(selection: &Selection, dry_run: bool) -> Result<LoadOptions> {
        let start = selection.from.unwrap_or(Period::EARLIEST);
        let end = selection.to.unwrap_or_else(Period::current);
        if start > end {
            return Err(Error::invalid_value(
                "--from",
                format!("{start} is after {end}"),
            ));
        }
        Ok(LoadOptions::new(start, end)
            .with_regions(selection.regions.iter().map(|r| r.trim().to_ascii_uppercase()).collect())
            .with_dry_run(dry_run))
    }

    /// Profile and register a record group's schema
    async fn infer(&self, config: EtlConfig, record_group: &str, selection: &Selection) -> Result<()> {
        let options = Self::options(selection, false)?;
        let registry = SchemaRegistry::open(&config.registry_path)?;
        let report = infer_schema(
            &config,
            &registry,
            Arc::new(LocalDiscovery::new(&config.base_path)),
            Arc::new(ParquetUnitReader::new()),
            &record_group.to_ascii_uppercase(),
            &options,
        )
        .await?;

        info!(
            record_group = %report.record_group,
            outcome = ?report.outcome,
            "Schema inferred from {} units",
            report.units_sampled
        );
        self.output(&serde_json::to_value(&report)?);
        Ok(())
    }

    /// Load pending units
    async fn load(
        &self,
        config: EtlConfig,
        record_group: &str,
        selection: &Selection,
        dry_run: bool,
    ) -> Result<()> {
        let options = Self::options(selection, dry_run)?;
        let registry = Arc::new(SchemaRegistry::open(&config.registry_path)?);
        let store = Arc::new(DuckDbStore::open(&config.database)?);
        let governor = Arc::new(ResourceGovernor::new(
            &config.resources,
            &config.load,
            Arc::new(SystemMonitor::new()),
        ));

        let config = Arc::new(config);
        let loader = BatchLoader::new(
            Arc::clone(&config),
            registry,
            store,
            Arc::new(LocalDiscovery::new(&config.base_path)),
            Arc::new(ParquetUnitReader::new()),
            governor,
        );

        let cancel = loader.cancel_flag();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight units");
                cancel.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        });

        let report = loader
            .load(&record_group.to_ascii_uppercase(), &options)
            .await?;
        self.output(&serde_json::to_value(&report)?);
        Ok(())
    }

    /// Print registered schemas
    fn schema(&self, config: &EtlConfig, record_group: Option<&str>, ddl: bool) -> Result<()> {
        let registry = SchemaRegistry::open(&config.registry_path)?;
        let groups = match record_group {
            Some(group) => vec![group.to_ascii_uppercase()],
            None => registry.record_groups()?,
        };

        for group in groups {
            let schema = registry.lookup(&group)?;
            if ddl {
                let columns: Vec<String> = schema
                    .table_columns()
                    .iter()
                    .map(|c| {
                        let suffix = match c.kind {
                            TableColumnKind::Provenance => " PRIMARY KEY",
                            TableColumnKind::PartitionKey => " NOT NULL",
                            _ => "",
                        };
                        format!("  {} {}{}", c.name, c.target_type.sql_type(), suffix)
                    })
                    .collect();
                println!("CREATE TABLE {} (\n{}\n);", schema.table_name, columns.join(",\n"));
            } else {
                self.output(&json!({
                    "record_group": group,
                    "signature": schema.signature(),
                    "schema": schema,
                }));
            }
        }
        Ok(())
    }

    /// Print committed units
    fn progress(&self, config: &EtlConfig, record_group: &str) -> Result<()> {
        let group = record_group.to_ascii_uppercase();
        let registry = SchemaRegistry::open(&config.registry_path)?;
        let table = match registry.lookup(&group) {
            Ok(schema) => schema.table_name,
            Err(Error::SchemaNotFound { .. }) => config.record_group(&group).table_name(&group),
            Err(e) => return Err(e),
        };

        let store = DuckDbStore::open(&config.database)?;
        let records = store.progress_records(&table)?;
        let rows: u64 = records.iter().map(|r| r.rows_inserted).sum();

        self.output(&json!({
            "record_group": group,
            "table_name": table,
            "units_committed": records.len(),
            "rows_inserted": rows,
            "units": records,
        }));
        Ok(())
    }

    fn output(&self, value: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(value).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
            }
        }
    }
}
