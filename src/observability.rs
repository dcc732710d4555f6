//! Metrics hooks for cache operations.

use std::time::Duration;

/// Receives timing and outcome events from [`crate::CacheService`].
///
/// All methods have empty defaults so implementations only override what they
/// record. Implementations must be cheap; they run inline on every operation.
pub trait CacheMetrics: Send + Sync {
    /// A fetch was answered without running a producer in this caller.
    fn record_hit(&self, _key: &str, _duration: Duration) {}

    /// A fetch ran the producer in this caller.
    fn record_miss(&self, _key: &str, _duration: Duration) {}

    /// An operation failed.
    fn record_error(&self, _key: &str, _error: &str) {}
}

/// Metrics sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl CacheMetrics for NoOpMetrics {}
