//! # Retry With Backoff
//!
//! Bounded retry for external-service calls. Only [`ErrorKind::Transient`]
//! failures are retried; the delay starts at `initial_backoff` and doubles
//! after each failed attempt. Sleeping goes through [`Sleeper`] so callers
//! (and tests) control how the worker blocks.
//!
//! [`ErrorKind::Transient`]: crate::gateway::ErrorKind::Transient

use crate::gateway::GatewayError;
use std::time::Duration;

/// Blocks the calling worker for a backoff delay.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Production sleeper: parks the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Result<T, GatewayError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient error, retrying: {}",
                        err
                    );
                    sleeper.sleep(delay);
                    delay = delay.checked_mul(2).unwrap_or(Duration::MAX);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}
