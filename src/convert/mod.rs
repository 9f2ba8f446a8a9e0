//! Schema-driven type conversion with auxiliary-column quarantine

mod engine;
mod types;

pub use engine::convert;
pub use types::{accumulate, ConversionOutput, ErrorCounts};

#[cfg(test)]
mod tests;
