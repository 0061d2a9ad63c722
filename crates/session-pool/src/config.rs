//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::retry::RetryBackoff;

/// Configuration for a session pool.
///
/// `max_size` has no sensible default; build the config with
/// [`PoolConfig::new`] and override the rest with struct update syntax:
///
/// ```
/// use std::time::Duration;
/// use nebula_session_pool::PoolConfig;
///
/// let config = PoolConfig {
///     min_size: 2,
///     spin_timeout: Duration::from_secs(5),
///     ..PoolConfig::new(16)
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Maximum number of sessions alive at once (idle + checked out + in transition)
    pub max_size: usize,
    /// Soft floor the pool refills towards when sessions are destroyed
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_size: usize,
    /// How long the maintenance loop waits for a task before sweeping idle sessions
    #[cfg_attr(feature = "serde", serde(default = "defaults::spin_timeout"))]
    pub spin_timeout: Duration,
    /// Lifetime granted to an idle session each time it is returned
    #[cfg_attr(feature = "serde", serde(default = "defaults::idle_horizon"))]
    pub idle_horizon: Duration,
    /// Remaining idle lifetime below which a session is kept alive by the sweep
    #[cfg_attr(feature = "serde", serde(default = "defaults::keep_alive_staleness"))]
    pub keep_alive_staleness: Duration,
    /// Number of driver operations (create/keep-alive/delete) allowed in flight
    #[cfg_attr(feature = "serde", serde(default = "defaults::completion_workers"))]
    pub completion_workers: usize,
    /// Upper bound on the connectivity probe before a failed create is retried
    #[cfg_attr(feature = "serde", serde(default = "defaults::ready_timeout"))]
    pub ready_timeout: Duration,
    /// Delay schedule between retries of a failed create
    #[cfg_attr(feature = "serde", serde(default))]
    pub retry_backoff: RetryBackoff,
}

mod defaults {
    use std::time::Duration;

    pub(super) const fn spin_timeout() -> Duration {
        Duration::from_secs(30)
    }

    pub(super) const fn idle_horizon() -> Duration {
        Duration::from_secs(600)
    }

    pub(super) const fn keep_alive_staleness() -> Duration {
        Duration::from_secs(240)
    }

    pub(super) const fn completion_workers() -> usize {
        4
    }

    pub(super) const fn ready_timeout() -> Duration {
        Duration::from_secs(10)
    }
}

impl PoolConfig {
    /// Create a configuration with the given maximum size and defaults elsewhere.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            min_size: 0,
            spin_timeout: defaults::spin_timeout(),
            idle_horizon: defaults::idle_horizon(),
            keep_alive_staleness: defaults::keep_alive_staleness(),
            completion_workers: defaults::completion_workers(),
            ready_timeout: defaults::ready_timeout(),
            retry_backoff: RetryBackoff::default(),
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.spin_timeout.is_zero() {
            return Err(Error::configuration(
                "spin_timeout must be greater than zero",
            ));
        }
        if self.keep_alive_staleness >= self.idle_horizon {
            return Err(Error::configuration(format!(
                "keep_alive_staleness ({:?}) must be less than idle_horizon ({:?})",
                self.keep_alive_staleness, self.idle_horizon
            )));
        }
        if self.completion_workers == 0 {
            return Err(Error::configuration(
                "completion_workers must be greater than 0",
            ));
        }
        self.retry_backoff.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = PoolConfig::new(10);
        assert_eq!(config.max_size, 10);
        assert_eq!(config.min_size, 0);
        assert_eq!(config.spin_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_horizon, Duration::from_secs(600));
        assert_eq!(config.keep_alive_staleness, Duration::from_secs(240));
        assert_eq!(config.completion_workers, 4);
    }

    #[test]
    fn validation_rejects_bad_sizes() {
        assert!(PoolConfig::new(0).validate().is_err());
        assert!(
            PoolConfig {
                min_size: 3,
                ..PoolConfig::new(2)
            }
            .validate()
            .is_err()
        );
        assert!(
            PoolConfig {
                min_size: 2,
                ..PoolConfig::new(2)
            }
            .validate()
            .is_ok()
        );
    }

    #[test]
    fn validation_rejects_zero_timings_and_workers() {
        assert!(
            PoolConfig {
                spin_timeout: Duration::ZERO,
                ..PoolConfig::new(1)
            }
            .validate()
            .is_err()
        );
        assert!(
            PoolConfig {
                completion_workers: 0,
                ..PoolConfig::new(1)
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn staleness_must_fit_inside_idle_horizon() {
        let config = PoolConfig {
            idle_horizon: Duration::from_secs(60),
            keep_alive_staleness: Duration::from_secs(60),
            ..PoolConfig::new(1)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unbounded_idle_horizon_is_accepted() {
        let config = PoolConfig {
            idle_horizon: Duration::MAX,
            ..PoolConfig::new(1)
        };
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_only_max_size() {
        let config: PoolConfig = serde_json::from_str(r#"{"max_size": 8, "min_size": 2}"#)
            .expect("config should deserialize");
        assert_eq!(
            config,
            PoolConfig {
                min_size: 2,
                ..PoolConfig::new(8)
            }
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serializes_and_reads_back() {
        let config = PoolConfig {
            min_size: 1,
            idle_horizon: Duration::from_secs(120),
            ..PoolConfig::new(4)
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
