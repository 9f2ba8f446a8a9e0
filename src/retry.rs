//! Retry wrapper with backoff and jitter
//!
//! The one place transient failures are retried. Only errors for which
//! [`Error::is_retryable`] holds are attempted again; everything else is
//! returned immediately.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::types::BackoffType;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Randomize delays by up to ±25%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build from configuration
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            backoff_type: config.backoff_type,
            jitter: config.jitter,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => Some(self.initial_backoff),
            BackoffType::Linear => self.initial_backoff.checked_mul(attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.checked_mul(factor)
            }
        };

        std::cmp::min(delay.unwrap_or(self.max_backoff), self.max_backoff)
    }

    /// Delay with jitter applied, still capped at `max_backoff`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.calculate_backoff(attempt);
        if !self.jitter || base.is_zero() {
            return base;
        }
        let factor: f64 = rand::rng().random_range(0.75..=1.25);
        std::cmp::min(base.mul_f64(factor), self.max_backoff)
    }

    /// Run a blocking operation with retries
    pub fn run<T, F>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let delay = self.next_delay(operation, attempt, e)?;
                    std::thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Run an async operation with retries
    pub async fn run_async<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let delay = self.next_delay(operation, attempt, e)?;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Decide whether a failed attempt is retried; returns the delay or the final error
    fn next_delay(&self, operation: &str, attempt: u32, error: Error) -> Result<Duration> {
        if !error.is_retryable() {
            return Err(error);
        }
        if attempt + 1 >= self.max_attempts {
            if self.max_attempts == 1 {
                return Err(error);
            }
            return Err(Error::MaxRetriesExceeded {
                max_attempts: self.max_attempts,
                last_error: error.to_string(),
            });
        }

        let delay = self.delay_for(attempt);
        warn!(
            "{} failed ({}), attempt {}/{}, retrying in {:?}",
            operation,
            error,
            attempt + 1,
            self.max_attempts,
            delay
        );
        Ok(delay)
    }
}
