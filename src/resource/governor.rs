//! Resource governor
//!
//! Samples memory and CPU on an interval, tells the loader when to hold
//! back new submissions, sizes the worker pool and chunk size, and runs
//! the emergency path when memory becomes critical.

use super::monitor::{ResourceMonitor, ResourceSample};
use crate::config::{LoadConfig, ResourceConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Action run when memory is critical; a failure is logged and the next hook runs
pub type CleanupHook = Box<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Process terminator, called with an exit code
pub type Terminator = Arc<dyn Fn(i32) + Send + Sync>;

/// Exit code used when memory stays critical after cleanup
pub const CRITICAL_EXIT_CODE: i32 = 137;

/// Shortest poll interval while submissions are paused
const MIN_PAUSE_POLL: Duration = Duration::from_millis(50);

/// Result of an emergency cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Memory dropped below the critical threshold
    Recovered,
    /// Memory stayed critical and the terminator was invoked
    Terminated,
    /// Another cleanup was already running
    InProgress,
}

/// Adaptive throughput control for the loader
pub struct ResourceGovernor {
    config: ResourceConfig,
    max_workers: usize,
    base_chunk_size: usize,
    min_chunk_size: usize,
    chunk_size: AtomicUsize,
    monitor: Arc<dyn ResourceMonitor>,
    latest: RwLock<ResourceSample>,
    hooks: Mutex<Vec<(String, CleanupHook)>>,
    terminator: Terminator,
    cleaning: AtomicBool,
    throttle_pause: Duration,
}

impl std::fmt::Debug for ResourceGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGovernor")
            .field("config", &self.config)
            .field("max_workers", &self.max_workers)
            .field("latest", &self.latest())
            .finish_non_exhaustive()
    }
}

impl ResourceGovernor {
    /// Create a governor and take an initial reading
    pub fn new(config: &ResourceConfig, load: &LoadConfig, monitor: Arc<dyn ResourceMonitor>) -> Self {
        let latest = monitor.sample();
        Self {
            config: config.clone(),
            max_workers: load.max_workers.max(1),
            base_chunk_size: load.chunk_size.max(1),
            min_chunk_size: load.min_chunk_size.clamp(1, load.chunk_size.max(1)),
            chunk_size: AtomicUsize::new(load.chunk_size.max(1)),
            monitor,
            latest: RwLock::new(latest),
            hooks: Mutex::new(Vec::new()),
            terminator: Arc::new(|code| std::process::exit(code)),
            cleaning: AtomicBool::new(false),
            throttle_pause: Duration::from_secs(config.sample_interval_secs),
        }
    }

    /// Replace the process terminator
    #[must_use]
    pub fn with_terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Delay applied before a submission while throttled
    #[must_use]
    pub fn with_throttle_pause(mut self, pause: Duration) -> Self {
        self.throttle_pause = pause;
        self
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    /// Take a fresh reading
    pub fn sample(&self) -> ResourceSample {
        let sample = self.monitor.sample();
        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = sample;
        debug!(
            memory = sample.memory_percent,
            cpu = sample.cpu_percent,
            "Resource sample"
        );
        sample
    }

    /// Most recent reading
    pub fn latest(&self) -> ResourceSample {
        *self.latest.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background sampling loop
    ///
    /// Each tick resamples, adjusts the chunk size and runs the emergency
    /// path when memory is critical. The loop stops when the handle drops.
    pub fn start(self: &Arc<Self>) -> SamplerHandle {
        let governor = Arc::clone(self);
        let period = Duration::from_secs(self.config.sample_interval_secs.max(1));
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                governor.sample();
                governor.adjust_chunk_size();
                if governor.is_critical() {
                    governor.emergency_cleanup().await;
                }
            }
        });
        SamplerHandle { task }
    }

    // ========================================================================
    // Decisions
    // ========================================================================

    /// Whether new submissions should be delayed
    pub fn should_throttle(&self) -> bool {
        let sample = self.latest();
        sample.memory_percent >= self.config.memory_throttle_percent
            || sample.cpu_percent >= self.config.cpu_throttle_percent
    }

    /// Whether memory crossed the critical threshold
    pub fn is_critical(&self) -> bool {
        self.latest().memory_percent >= self.config.memory_critical_percent
    }

    /// Whether an emergency cleanup is running
    pub fn is_paused(&self) -> bool {
        self.cleaning.load(Ordering::SeqCst)
    }

    /// Pause before the next submission, if throttled
    ///
    /// Submissions are held for as long as an emergency cleanup runs and
    /// resume once it reports recovery.
    pub async fn wait_for_headroom(&self) {
        if self.is_paused() {
            info!("Emergency cleanup running, holding submissions");
            while self.is_paused() {
                tokio::time::sleep(self.throttle_pause.max(MIN_PAUSE_POLL)).await;
            }
        }
        if self.should_throttle() {
            let sample = self.latest();
            warn!(
                memory = sample.memory_percent,
                cpu = sample.cpu_percent,
                "Throttling submissions for {:?}",
                self.throttle_pause
            );
            tokio::time::sleep(self.throttle_pause).await;
            self.sample();
        }
    }

    /// Worker count from available memory and CPU headroom
    pub fn recommended_workers(&self) -> usize {
        let sample = self.latest();

        let by_memory = if self.config.memory_per_worker_mb == 0 {
            self.max_workers
        } else {
            (sample.available_memory_mb / self.config.memory_per_worker_mb) as usize
        };

        let idle = (100.0 - sample.cpu_percent.clamp(0.0, 100.0)) / 100.0;
        let by_cpu = (idle * sample.cpu_count as f32).ceil() as usize;

        let mut workers = by_memory.min(by_cpu).min(self.max_workers);
        if self.should_throttle() {
            workers /= 2;
        }
        workers.max(1)
    }

    /// Current chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.load(Ordering::Relaxed)
    }

    /// Halve the chunk size under throttle, grow it back otherwise
    pub fn adjust_chunk_size(&self) -> usize {
        let current = self.chunk_size();
        let next = if self.should_throttle() {
            (current / 2).max(self.min_chunk_size)
        } else {
            current.saturating_mul(2).min(self.base_chunk_size)
        };
        if next != current {
            info!(from = current, to = next, "Adjusted chunk size");
            self.chunk_size.store(next, Ordering::Relaxed);
        }
        next
    }

    // ========================================================================
    // Emergency Path
    // ========================================================================

    /// Register an action for the emergency path
    pub fn register_cleanup(&self, name: impl Into<String>, hook: CleanupHook) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), hook));
    }

    /// Run cleanup hooks, wait, resample and terminate if still critical
    pub async fn emergency_cleanup(&self) -> CleanupOutcome {
        if self.cleaning.swap(true, Ordering::SeqCst) {
            return CleanupOutcome::InProgress;
        }

        let before = self.latest();
        warn!(
            memory = before.memory_percent,
            "Memory critical, running emergency cleanup"
        );

        {
            let hooks = self.hooks.lock().unwrap_or_else(PoisonError::into_inner);
            for (name, hook) in hooks.iter() {
                debug!(hook = %name, "Running cleanup hook");
                if let Err(e) = hook() {
                    warn!(hook = %name, "Cleanup hook failed: {:#}", e);
                }
            }
        }

        tokio::time::sleep(Duration::from_secs(self.config.grace_period_secs)).await;
        let after = self.sample();

        let outcome = if after.memory_percent >= self.config.memory_critical_percent {
            error!(
                memory = after.memory_percent,
                "Memory still critical after cleanup, terminating"
            );
            (self.terminator)(CRITICAL_EXIT_CODE);
            CleanupOutcome::Terminated
        } else {
            info!(memory = after.memory_percent, "Recovered from memory pressure");
            CleanupOutcome::Recovered
        };

        self.cleaning.store(false, Ordering::SeqCst);
        outcome
    }
}

/// Running sampling loop; aborted on drop
#[derive(Debug)]
pub struct SamplerHandle {
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stop sampling
    pub fn stop(self) {}
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
