//! Configuration for extract ingestion runs
//!
//! A single explicit [`EtlConfig`] is loaded from YAML or JSON and passed to
//! every component constructor. Nothing reads global state.

use crate::error::{Error, Result};
use crate::schema::{AuxiliaryPolicy, ColumnRole, DEFAULT_PARTITION_KEY};
use crate::types::BackoffType;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Valid unquoted SQL identifier for tables and columns
static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid regex"));

/// Hard ceiling on concurrent workers
pub const MAX_WORKERS_CEILING: usize = 16;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration of an ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Relational store settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Directory scanned for input units
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Schema registry document
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Region codes to load (empty = every region found)
    #[serde(default)]
    pub regions: Vec<String>,

    /// Batch loader settings
    #[serde(default)]
    pub load: LoadConfig,

    /// Profiling settings
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Resource governor settings
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Retry wrapper settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per record group settings, keyed by group code (e.g. `RD`)
    #[serde(default)]
    pub record_groups: BTreeMap<String, RecordGroupConfig>,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            base_path: default_base_path(),
            registry_path: default_registry_path(),
            regions: Vec::new(),
            load: LoadConfig::default(),
            profile: ProfileConfig::default(),
            resources: ResourceConfig::default(),
            retry: RetryConfig::default(),
            record_groups: BTreeMap::new(),
        }
    }
}

fn default_base_path() -> PathBuf {
    PathBuf::from("data")
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("schemas.json")
}

impl EtlConfig {
    /// Load from a file, picking the format by extension (`.json` or YAML)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_json_str(&content)?
        } else {
            Self::from_yaml_str(&content)?
        };
        tracing::debug!(path = %path.display(), groups = config.record_groups.len(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Settings for a record group, falling back to defaults when unconfigured
    pub fn record_group(&self, code: &str) -> RecordGroupConfig {
        self.record_groups
            .get(code)
            .or_else(|| self.record_groups.get(&code.to_ascii_uppercase()))
            .cloned()
            .unwrap_or_default()
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let load = &self.load;
        if load.chunk_size == 0 {
            return Err(Error::invalid_value("load.chunk_size", "must be positive"));
        }
        if load.min_chunk_size == 0 || load.min_chunk_size > load.chunk_size {
            return Err(Error::invalid_value(
                "load.min_chunk_size",
                format!("must be between 1 and chunk_size ({})", load.chunk_size),
            ));
        }
        if load.max_workers == 0 || load.max_workers > MAX_WORKERS_CEILING {
            return Err(Error::invalid_value(
                "load.max_workers",
                format!("must be between 1 and {MAX_WORKERS_CEILING}"),
            ));
        }

        if self.profile.rows_per_unit == 0 {
            return Err(Error::invalid_value(
                "profile.rows_per_unit",
                "must be positive",
            ));
        }

        let res = &self.resources;
        for (field, value) in [
            ("resources.memory_throttle_percent", res.memory_throttle_percent),
            ("resources.memory_critical_percent", res.memory_critical_percent),
            ("resources.cpu_throttle_percent", res.cpu_throttle_percent),
        ] {
            if !(value > 0.0 && value <= 100.0) {
                return Err(Error::invalid_value(field, "must be in (0, 100]"));
            }
        }
        if res.memory_throttle_percent > res.memory_critical_percent {
            return Err(Error::invalid_value(
                "resources.memory_throttle_percent",
                "must not exceed memory_critical_percent",
            ));
        }
        if res.sample_interval_secs == 0 {
            return Err(Error::invalid_value(
                "resources.sample_interval_secs",
                "must be positive",
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_value("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(Error::invalid_value(
                "retry.initial_backoff_ms",
                "must not exceed max_backoff_ms",
            ));
        }

        for region in &self.regions {
            if region.len() != 2 || !region.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::invalid_value(
                    "regions",
                    format!("'{region}' is not a two-letter region code"),
                ));
            }
        }

        for (code, group) in &self.record_groups {
            group.validate(code)?;
        }

        Ok(())
    }
}

// ============================================================================
// Database Config
// ============================================================================

/// Relational store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: String,

    /// DuckDB memory limit (e.g. `4GB`)
    #[serde(default)]
    pub memory_limit: Option<String>,

    /// DuckDB worker threads
    #[serde(default)]
    pub threads: Option<usize>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            memory_limit: None,
            threads: None,
        }
    }
}

fn default_database_path() -> String {
    "datasus.duckdb".to_string()
}

// ============================================================================
// Load Config
// ============================================================================

/// Batch loader settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Rows per streamed chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Lower bound when the governor shrinks chunks
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Upper bound on concurrent units
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Wall-clock limit per unit
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            min_chunk_size: default_min_chunk_size(),
            max_workers: default_max_workers(),
            unit_timeout_secs: default_unit_timeout(),
        }
    }
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_min_chunk_size() -> usize {
    1_000
}

fn default_max_workers() -> usize {
    MAX_WORKERS_CEILING
}

fn default_unit_timeout() -> u64 {
    3600
}

// ============================================================================
// Profile Config
// ============================================================================

/// Profiling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Rows sampled from each input unit
    #[serde(default = "default_rows_per_unit")]
    pub rows_per_unit: usize,

    /// Distinct sample values kept per fingerprint
    #[serde(default = "default_sample_values_cap")]
    pub sample_values_cap: usize,

    /// Units sampled per record group (None = all)
    #[serde(default)]
    pub max_units: Option<usize>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            rows_per_unit: default_rows_per_unit(),
            sample_values_cap: default_sample_values_cap(),
            max_units: None,
        }
    }
}

fn default_rows_per_unit() -> usize {
    1_000
}

fn default_sample_values_cap() -> usize {
    100
}

// ============================================================================
// Resource Config
// ============================================================================

/// Resource governor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_memory_throttle")]
    pub memory_throttle_percent: f32,

    #[serde(default = "default_memory_critical")]
    pub memory_critical_percent: f32,

    #[serde(default = "default_cpu_throttle")]
    pub cpu_throttle_percent: f32,

    /// Seconds between samples
    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    /// Memory budget per worker, for worker sizing
    #[serde(default = "default_memory_per_worker")]
    pub memory_per_worker_mb: u64,

    /// Wait after cleanup before resampling
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory_throttle_percent: default_memory_throttle(),
            memory_critical_percent: default_memory_critical(),
            cpu_throttle_percent: default_cpu_throttle(),
            sample_interval_secs: default_sample_interval(),
            memory_per_worker_mb: default_memory_per_worker(),
            grace_period_secs: default_grace_period(),
        }
    }
}

fn default_memory_throttle() -> f32 {
    85.0
}

fn default_memory_critical() -> f32 {
    95.0
}

fn default_cpu_throttle() -> f32 {
    90.0
}

fn default_sample_interval() -> u64 {
    5
}

fn default_memory_per_worker() -> u64 {
    512
}

fn default_grace_period() -> u64 {
    2
}

// ============================================================================
// Retry Config
// ============================================================================

/// Retry wrapper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    #[serde(default)]
    pub backoff_type: BackoffType,

    /// Randomize each delay by up to ±25%
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            backoff_type: BackoffType::default(),
            jitter: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Record Group Config
// ============================================================================

/// Settings for one record group
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordGroupConfig {
    /// Physical table name (default: lower-cased group code)
    #[serde(default)]
    pub table_name: Option<String>,

    /// Expected canonical columns; empty means "whatever the schema has"
    #[serde(default)]
    pub columns: Vec<String>,

    /// Source column name -> canonical column name
    #[serde(default)]
    pub synonyms: HashMap<String, String>,

    /// Column roles overriding the built-in role table
    #[serde(default)]
    pub roles: HashMap<String, ColumnRole>,

    /// Partition key column
    #[serde(default = "default_partition_key")]
    pub partition_key: String,

    #[serde(default)]
    pub auxiliary_policy: AuxiliaryPolicy,
}

fn default_partition_key() -> String {
    DEFAULT_PARTITION_KEY.to_string()
}

impl RecordGroupConfig {
    /// Resolved table name for a group code
    pub fn table_name(&self, code: &str) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| code.to_ascii_lowercase())
    }

    /// Partition key, defaulting when left empty by `Default`
    pub fn partition_key(&self) -> &str {
        if self.partition_key.is_empty() {
            DEFAULT_PARTITION_KEY
        } else {
            &self.partition_key
        }
    }

    fn validate(&self, code: &str) -> Result<()> {
        let table = self.table_name(code);
        if !IDENTIFIER_RE.is_match(&table) {
            return Err(Error::invalid_value(
                format!("record_groups.{code}.table_name"),
                format!("'{table}' is not a valid identifier"),
            ));
        }
        if !IDENTIFIER_RE.is_match(self.partition_key()) {
            return Err(Error::invalid_value(
                format!("record_groups.{code}.partition_key"),
                format!("'{}' is not a valid identifier", self.partition_key),
            ));
        }
        for (source, canonical) in &self.synonyms {
            if canonical.trim().is_empty() {
                return Err(Error::invalid_value(
                    format!("record_groups.{code}.synonyms"),
                    format!("synonym for '{source}' is empty"),
                ));
            }
        }
        Ok(())
    }
}
