//! Error types for datasus-etl
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Value-level conversion failures are never errors: they are captured in
//! auxiliary columns and counters by the conversion engine. Everything here
//! is at least batch-fatal.

use thiserror::Error;

/// The main error type for datasus-etl
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Schema Errors
    // ============================================================================
    #[error("No schema registered for record group '{record_group}'")]
    SchemaNotFound { record_group: String },

    #[error("Schema registry error: {message}")]
    Registry { message: String },

    #[error("Column '{column}' could not be profiled: {message}")]
    Profiling { column: String, message: String },

    // ============================================================================
    // Batch-fatal Errors
    // ============================================================================
    #[error(
        "Structural mismatch in record group '{record_group}': expected {expected} columns, found {found} ({message})"
    )]
    StructuralMismatch {
        record_group: String,
        expected: usize,
        found: usize,
        message: String,
    },

    #[error("Conversion of column '{column}' failed: {message}")]
    Conversion { column: String, message: String },

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Discovery failed: {message}")]
    Discovery { message: String },

    #[error("Failed to read '{unit}': {message}")]
    Read { unit: String, message: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    // ============================================================================
    // Store Errors
    // ============================================================================
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    #[error("Partition error for table '{table}': {message}")]
    Partition { table: String, message: String },

    #[error("Progress error: {message}")]
    Progress { message: String },

    // ============================================================================
    // Execution Errors
    // ============================================================================
    #[error("Unit '{unit}' timed out after {timeout_secs}s")]
    Timeout { unit: String, timeout_secs: u64 },

    #[error("Unit '{unit}' was cancelled")]
    Cancelled { unit: String },

    #[error("Max attempts ({max_attempts}) exceeded: {last_error}")]
    MaxRetriesExceeded {
        max_attempts: u32,
        last_error: String,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Create a profiling error
    pub fn profiling(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Profiling {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a conversion error
    pub fn conversion(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a read error
    pub fn read(unit: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Read {
            unit: unit.into(),
            message: message.into(),
        }
    }

    /// Create a discovery error
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a partition error
    pub fn partition(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Partition {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a progress error
    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
        }
    }

    /// Check if this error is worth retrying with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) | Error::Timeout { .. } => true,
            Error::Duckdb(e) => is_transient_store_message(&e.to_string()),
            Error::Store { message } => is_transient_store_message(message),
            _ => false,
        }
    }
}

/// Check if a store failure message describes a transient condition
fn is_transient_store_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["conflict", "lock", "busy", "timeout", "connection"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Result type alias for datasus-etl
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
