//! Resource governance
//!
//! Keeps the loader inside safe memory and CPU bounds.
//!
//! # Overview
//!
//! - `ResourceMonitor` - memory/CPU readings (`SystemMonitor`, `FixedMonitor`)
//! - `ResourceGovernor` - throttle decisions, worker and chunk sizing,
//!   emergency cleanup with process termination

mod governor;
mod monitor;

pub use governor::{
    CleanupHook, CleanupOutcome, ResourceGovernor, SamplerHandle, Terminator, CRITICAL_EXIT_CODE,
};
pub use monitor::{FixedMonitor, ResourceMonitor, ResourceSample, SystemMonitor};
