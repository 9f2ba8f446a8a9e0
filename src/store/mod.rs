//! Relational store
//!
//! The loader talks to the store only through the [`Store`] trait. The
//! bundled implementation is an embedded DuckDB database.

mod engine;
mod types;

pub use engine::DuckDbStore;
pub use types::{ProgressRecord, Store};
