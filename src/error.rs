//! Error types for cache operations.

use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cache, its backends and the producers it runs.
///
/// `Error` is `Clone` because a single producer outcome is delivered to the
/// producing caller and to every waiter attached to the same key.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The key encoded to an empty or malformed string.
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// The remote store could not be reached or rejected a command.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The user-supplied producer failed.
    #[error("Producer failed: {0}")]
    Producer(String),

    /// The producer owning a pending key was dropped before completing.
    #[error("Producer for key {0} was abandoned before completing")]
    ProducerAbandoned(String),

    /// A stored value could not be decoded into the requested type.
    #[error("Type conversion failed: {0}")]
    TypeConversion(String),

    /// A waiter gave up before the in-flight producer completed.
    #[error("Timed out after {0:?} waiting for key {1}")]
    Timeout(Duration, String),

    /// An argument or stored value is outside the accepted range.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Backend configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap any displayable failure as a producer error.
    ///
    /// ```
    /// use stampede_cache::Error;
    ///
    /// let err = Error::producer("database offline");
    /// assert_eq!(err.to_string(), "Producer failed: database offline");
    /// ```
    pub fn producer(err: impl Display) -> Self {
        Error::Producer(err.to_string())
    }

    /// Whether the error came out of the remote store rather than the caller.
    pub fn is_backend(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::TypeConversion(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_helper_keeps_message() {
        let err = Error::producer(std::io::Error::other("disk gone"));
        assert_eq!(err, Error::Producer("disk gone".to_string()));
    }

    #[test]
    fn test_json_error_is_type_conversion() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::TypeConversion(_)));
        assert!(!err.is_backend());
    }
}
