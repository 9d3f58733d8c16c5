//! Retry with exponential backoff and jitter.
//!
//! Only `AdapterError::Transient` is retried; validation and fatal errors
//! return on the first attempt. The jitter keeps a pool of workers that hit
//! a rate limit together from stampeding the provider in lockstep.

use std::time::Duration;

use log::{debug, warn};
use rand::Rng;

use crate::config::RetryConfig;

use super::AdapterError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// No-delay policy for tests.
    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Runs `f` until it succeeds, fails non-transiently, or attempts are
    /// exhausted. The final transient error is returned as-is so the caller
    /// can decide how to degrade.
    pub fn run<T, F>(&self, op: &str, mut f: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Result<T, AdapterError>,
    {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        op, attempt, self.max_attempts, e, delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!("{} failed after {} attempts: {}", op, attempt, e);
                    } else {
                        debug!("{} failed without retry: {}", op, e);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Exponential backoff capped at `max_delay`, plus up to 25% jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
        let capped = exp.min(self.max_delay);
        if capped.is_zero() {
            return capped;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64 / 4);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}
