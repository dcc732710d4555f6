//! Cache backend implementations.
//!
//! Every backend exposes the same string-keyed, string-valued capability set
//! through [`CacheBackend`]. [`InMemoryBackend`] keeps everything in process;
//! [`RemoteBackend`] maps the contract onto a network store while still
//! coordinating producers locally.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "inmemory")]
pub mod inmemory;
pub mod remote;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;
pub use remote::{RemoteBackend, RemoteStore};

#[cfg(feature = "redis")]
pub use self::redis::{KeyLayout, RedisBackend, RedisConfig, RedisStore};

/// Capability set shared by all backends.
///
/// Keys passed here are already encoded and validated by the caller.
/// All returned futures are `Send`, so backends can be driven from spawned tasks.
pub trait CacheBackend: Clone + Send + Sync + 'static {
    /// Return the committed value for `key`, running `producer` on a miss.
    ///
    /// At most one `producer` runs per key at a time within this process.
    /// Concurrent callers for the same key suspend until it completes and all
    /// receive the same outcome. A failed producer leaves the key absent.
    ///
    /// `wait` bounds how long this caller will wait for someone else's
    /// producer. It never cancels that producer.
    ///
    /// # Errors
    ///
    /// - The producer's error, delivered to the producer and every waiter
    /// - `Error::Timeout` if `wait` elapsed first
    fn fetch<F, Fut>(
        &self,
        key: &str,
        producer: F,
        wait: Option<Duration>,
    ) -> impl Future<Output = Result<String>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<String>> + Send;

    /// Read a committed value. Never runs a producer; a pending key reads as absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Commit `value` for `key` with an explicit TTL (`None` = no expiry).
    fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove the given keys, returning how many committed values were removed.
    fn delete(&self, keys: &[&str]) -> impl Future<Output = Result<u64>> + Send;

    /// Atomically add `delta` to an integer value. An absent key starts at zero.
    fn incr(&self, key: &str, delta: i64) -> impl Future<Output = Result<i64>> + Send;

    /// Atomically add `delta` to a float value. An absent key starts at zero.
    fn incr_f(&self, key: &str, delta: f64) -> impl Future<Output = Result<f64>> + Send;

    /// Drop every entry this backend owns.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// Check whether the backend is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send;

    /// TTL applied by [`CacheBackend::set`].
    fn default_ttl(&self) -> Option<Duration>;

    /// Commit `value` for `key` using the default TTL.
    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<()>> + Send {
        self.set_with_ttl(key, value, self.default_ttl())
    }

    /// `incr` with a negated delta.
    fn decr(&self, key: &str, delta: i64) -> impl Future<Output = Result<i64>> + Send {
        async move {
            let delta = delta.checked_neg().ok_or_else(|| {
                Error::Validation(format!("cannot decrement by {}", delta))
            })?;
            self.incr(key, delta).await
        }
    }

    /// `incr_f` with a negated delta.
    fn decr_f(&self, key: &str, delta: f64) -> impl Future<Output = Result<f64>> + Send {
        self.incr_f(key, -delta)
    }
}
