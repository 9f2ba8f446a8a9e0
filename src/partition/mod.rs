//! Region partitioning module
//!
//! Tables are list-partitioned by a two-letter region code.
//!
//! # Overview
//!
//! - Routers produce the region keys a load needs, either from a static list
//!   or from the names of the units being loaded
//! - Tagging stamps every row with its region and a provenance identifier
//!   (`{unit}:{ordinal}`), then splits batches per region so that each
//!   insert lands in exactly one partition

mod routers;
mod tagging;
mod types;

pub use routers::{ListRouter, UnitRouter};
pub use tagging::{provenance_id, region_from_unit, split_by_region, tag_batch};
pub use types::{Partition, PartitionRouter};
