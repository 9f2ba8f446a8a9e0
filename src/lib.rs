// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # datasus-etl
//!
//! Schema inference and partitioned bulk loading for nationwide
//! health-system administrative extracts (hospitalization and outpatient
//! claim batches) distributed as columnar files.
//!
//! ## Features
//!
//! - **Column Profiling**: Bounded-sample fingerprints per column
//! - **Type Inference**: Ordered rules over fingerprints and column roles
//! - **Schema Registry**: One persisted schema per record group
//! - **Conversion**: Typed columns with raw-value quarantine for failures
//! - **Batch Loading**: Resumable, partitioned, bounded-concurrency loads
//! - **Resource Governance**: Memory/CPU throttling and emergency shutdown
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use datasus_etl::config::EtlConfig;
//! use datasus_etl::engine::{infer_schema, BatchLoader, LoadOptions};
//!
//! let config = EtlConfig::from_file("etl.yaml")?;
//! let report = infer_schema(&config, &registry, discovery, reader, "RD", &LoadOptions::default()).await?;
//! let run = loader.load("RD", &LoadOptions::default()).await?;
//! println!("{} rows from {} units", run.rows_inserted, run.units_loaded);
//! ```
//!
//! ## Architecture
//!
//! ```text
//!   offline, once per record group           per load run
//! ┌──────────┐  ┌──────────┐  ┌──────────┐   ┌─────────────────────────┐
//! │ Profiler │→ │ Inferrer │→ │ Registry │ → │ Batch Loader            │
//! └──────────┘  └──────────┘  └──────────┘   │  read → normalize →     │
//!                                            │  convert → tag → insert │
//!                                            └───────────┬─────────────┘
//!                                   Resource Governor ───┘ (throttling)
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Value-level parsers shared by inference and conversion
pub mod coerce;

/// Configuration
pub mod config;

/// Retry wrapper with backoff and jitter
pub mod retry;

/// Column profiling
pub mod profile;

/// Type inference, column roles and the schema registry
pub mod schema;

/// Schema-driven type conversion
pub mod convert;

/// Unit discovery and chunked reading
pub mod source;

/// Relational store interface and DuckDB implementation
pub mod store;

/// Load progress tracking
pub mod state;

/// Region partitioning and provenance tagging
pub mod partition;

/// Batch loader and inference runs
pub mod engine;

/// Resource governor
pub mod resource;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
