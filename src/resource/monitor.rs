//! Resource monitors
//!
//! OS sampling sits behind `ResourceMonitor` so the governor can run
//! against fixed readings in tests.

use serde::Serialize;
use std::sync::{Mutex, PoisonError, RwLock};
use sysinfo::System;

/// One memory/CPU reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ResourceSample {
    /// Used memory, percent of total
    pub memory_percent: f32,
    /// Global CPU usage, percent
    pub cpu_percent: f32,
    /// Memory still available to the process
    pub available_memory_mb: u64,
    /// Logical CPUs
    pub cpu_count: usize,
}

/// Source of resource readings
pub trait ResourceMonitor: Send + Sync {
    /// Take a fresh reading
    fn sample(&self) -> ResourceSample;
}

// ============================================================================
// System Monitor
// ============================================================================

/// Live readings from the operating system
pub struct SystemMonitor {
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemMonitor").finish_non_exhaustive()
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        // CPU usage is a delta; the first refresh only primes it
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl ResourceMonitor for SystemMonitor {
    fn sample(&self) -> ResourceSample {
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();
        system.refresh_cpu_usage();

        let total = system.total_memory();
        let available = match system.available_memory() {
            0 => total.saturating_sub(system.used_memory()),
            available => available,
        };
        let used = total.saturating_sub(available);
        let memory_percent = if total > 0 {
            (used as f64 / total as f64 * 100.0) as f32
        } else {
            0.0
        };

        ResourceSample {
            memory_percent,
            cpu_percent: system.global_cpu_usage(),
            available_memory_mb: available / (1024 * 1024),
            cpu_count: system.cpus().len().max(1),
        }
    }
}

// ============================================================================
// Fixed Monitor
// ============================================================================

/// Monitor returning a settable reading
#[derive(Debug, Default)]
pub struct FixedMonitor {
    current: RwLock<ResourceSample>,
}

impl FixedMonitor {
    pub fn new(sample: ResourceSample) -> Self {
        Self {
            current: RwLock::new(sample),
        }
    }

    /// Reading with plenty of headroom
    pub fn idle() -> Self {
        Self::new(ResourceSample {
            memory_percent: 20.0,
            cpu_percent: 10.0,
            available_memory_mb: 64 * 1024,
            cpu_count: 16,
        })
    }

    /// Replace the reading
    pub fn set(&self, sample: ResourceSample) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = sample;
    }

    /// Change only the memory percentage
    pub fn set_memory_percent(&self, percent: f32) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        current.memory_percent = percent;
    }
}

impl ResourceMonitor for FixedMonitor {
    fn sample(&self) -> ResourceSample {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}
