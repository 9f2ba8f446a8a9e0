//! Column profiling
//!
//! Computes per-column statistical fingerprints from bounded samples of
//! input units. Fingerprints feed the type inferrer.

mod profiler;
mod session;
mod types;

pub use profiler::ColumnProfiler;
pub use session::ProfileSession;
pub use types::{ColumnFingerprint, DataKind};
