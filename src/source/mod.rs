//! Input units: discovery and chunked reading

mod discovery;
mod reader;

pub use discovery::{unit_id, Discovery, LocalDiscovery};
pub use reader::{BatchStream, ParquetUnitReader, UnitReader};

#[cfg(test)]
mod tests;
