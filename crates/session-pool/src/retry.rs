//! Backoff schedule and retrying of operations that need a session.

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::driver::SessionDriver;
use crate::error::{Error, Result};
use crate::guard::PooledSession;
use crate::pool::Pool;

// ---------------------------------------------------------------------------
// RetryBackoff
// ---------------------------------------------------------------------------

/// Exponential, capped delay schedule.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetryBackoff {
    /// Delay before the first retry (default: 50ms).
    pub base_delay: Duration,
    /// Maximum delay cap (default: 5s).
    pub max_delay: Duration,
    /// Multiplier per attempt (default: 2.0).
    pub multiplier: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryBackoff {
    /// Calculate the delay for a given retry number (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let factor = self.multiplier.powi(exponent);
        let delay_secs = self.base_delay.as_secs_f64() * factor;
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Validate the schedule, returning an error if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::configuration(
                "retry_backoff.multiplier must be a finite value >= 1.0",
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::configuration(
                "retry_backoff.max_delay must not be less than base_delay",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// retry_operation
// ---------------------------------------------------------------------------

/// Settings for [`Pool::retry_operation`].
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Retries after the first attempt (default: 10).
    pub max_retries: u32,
    /// Delay schedule between attempts.
    pub backoff: RetryBackoff,
    /// Per-attempt bound on waiting for a session; `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 10,
            backoff: RetryBackoff::default(),
            acquire_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl<D: SessionDriver> Pool<D> {
    /// Run `op` with a checked-out session, retrying retryable failures.
    ///
    /// Each attempt acquires a fresh session (bounded by
    /// `settings.acquire_timeout`) and hands it to `op` by value, so the
    /// session goes back to the pool when the attempt's future finishes.
    /// An exhausted pool counts as a retryable failure. Non-retryable
    /// errors and the error of the last allowed attempt are returned.
    pub async fn retry_operation<T, F, Fut>(&self, settings: &RetrySettings, mut op: F) -> Result<T>
    where
        F: FnMut(PooledSession<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            let checkout = match settings.acquire_timeout {
                Some(timeout) => self.acquire_timeout(timeout).await,
                None => self.acquire().await,
            };
            let outcome = match checkout {
                Ok(session) if session.is_placeholder() => Err(Error::Placeholder),
                Ok(session) => op(session).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < settings.max_retries => {
                    retries += 1;
                    let delay = settings.backoff.delay_for(retries);
                    tracing::debug!(retry = retries, delay = ?delay, error = %e, "retrying session operation");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
