//! CLI module
//!
//! Command-line interface for schema inference and loads.
//!
//! # Commands
//!
//! - `infer` - Profile units and register a record group's schema
//! - `load` - Load pending units into the store
//! - `schema` - Show registered schemas or their DDL
//! - `progress` - Show committed units

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, Selection};
pub use runner::Runner;
