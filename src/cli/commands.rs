//! CLI commands and argument parsing

use crate::types::Period;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// DATASUS extract ingestion CLI
#[derive(Parser, Debug)]
#[command(name = "datasus-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Profile sampled units and register the record group's schema
    Infer {
        /// Record group code (e.g. RD, SP, PA)
        record_group: String,

        #[command(flatten)]
        selection: Selection,
    },

    /// Load every pending unit of a record group
    Load {
        /// Record group code
        record_group: String,

        #[command(flatten)]
        selection: Selection,

        /// Read, convert and tag without inserting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show registered schemas (all, or one record group)
    Schema {
        record_group: Option<String>,

        /// Print the table DDL instead of the registry entry
        #[arg(long)]
        ddl: bool,
    },

    /// Show committed units of a record group
    Progress {
        record_group: String,
    },
}

/// Unit selection shared by `infer` and `load`
#[derive(clap::Args, Debug, Clone)]
pub struct Selection {
    /// Region codes, comma-separated (default: configured regions, or all)
    #[arg(long, value_delimiter = ',')]
    pub regions: Vec<String>,

    /// First period, YYYY-MM
    #[arg(long)]
    pub from: Option<Period>,

    /// Last period, YYYY-MM
    #[arg(long)]
    pub to: Option<Period>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one document per line)
    Json,
    /// Human-readable output
    Pretty,
}
