//! Error types for the session pool
use thiserror::Error;

/// Result type for session pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the pool and by session drivers.
///
/// Only [`Error::PoolEmpty`] and [`Error::Configuration`] ever reach a
/// caller of the pool itself. Remote failures are absorbed by the pool and
/// turned into destroy/retry transitions; the `CreateFailed` and
/// `KeepAliveFailed` variants describe those transitions in logs and events.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No session became available within the requested bound
    #[error("Session pool exhausted: {active_size}/{max_size} active, {waiters} waiting")]
    PoolEmpty {
        /// Sessions counted against `max_size` when the caller gave up
        active_size: usize,
        /// Configured maximum
        max_size: usize,
        /// Callers still queued for a session
        waiters: usize,
    },

    /// Creating a session failed; the pool retries in the background
    #[error("Session create failed (attempt {attempt}): {reason}")]
    CreateFailed {
        /// 1-based attempt number within the failure chain
        attempt: u32,
        /// The failure reason
        reason: String,
    },

    /// Keep-alive of an idle session failed; the session is destroyed
    #[error("Keep-alive failed for session '{session_id}': {reason}")]
    KeepAliveFailed {
        /// The session identifier
        session_id: String,
        /// The failure reason
        reason: String,
    },

    /// Error reported by a session driver
    #[error("Driver error: {message}")]
    Driver {
        /// The error message
        message: String,
        /// Whether repeating the operation may succeed
        retryable: bool,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A placeholder session, handed out after shutdown began, was used for real work
    #[error("Session is a placeholder issued during pool shutdown")]
    Placeholder,
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a non-retryable driver error
    pub fn driver<S: Into<String>>(message: S) -> Self {
        Self::Driver {
            message: message.into(),
            retryable: false,
            source: None,
        }
    }

    /// Create a retryable (transient) driver error
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Driver {
            message: message.into(),
            retryable: true,
            source: None,
        }
    }

    /// Attach an underlying cause to a driver error.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn with_source<E>(self, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::Driver {
                message, retryable, ..
            } => Self::Driver {
                message,
                retryable,
                source: Some(Box::new(error)),
            },
            other => other,
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PoolEmpty { .. } => true,
            Self::Driver { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_empty_is_retryable() {
        let err = Error::PoolEmpty {
            active_size: 2,
            max_size: 2,
            waiters: 0,
        };
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Session pool exhausted: 2/2 active, 0 waiting"
        );
    }

    #[test]
    fn driver_errors_carry_retryability() {
        assert!(Error::transient("unavailable").is_retryable());
        assert!(!Error::driver("bad request").is_retryable());
        assert!(!Error::configuration("min_size > max_size").is_retryable());
        assert!(!Error::Placeholder.is_retryable());
    }

    #[test]
    fn with_source_keeps_message_and_exposes_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::transient("stream broken").with_source(io);

        assert!(err.is_retryable());
        let source = std::error::Error::source(&err).expect("source attached");
        assert_eq!(source.to_string(), "reset");
    }
}
