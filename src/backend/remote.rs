//! Remote backend adapter.
//!
//! [`RemoteBackend`] maps the fetch-or-compute contract onto any network
//! key-value store implementing [`RemoteStore`]. Committed values live in the
//! store (with its native expiry); in-flight producers are tracked locally, so
//! single-flight holds among callers of one process only. Two processes
//! sharing a store may both run a producer for the same key.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::token::{completion_token, Completer, Waiter};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Client surface the adapter needs from a remote store.
///
/// Keys are the cache keys as seen by the caller; the store applies its own
/// namespace or prefix. Implementations must be safe for concurrent use.
pub trait RemoteStore: Clone + Send + Sync + 'static {
    /// Read a value. `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Write a value, expiring it after `ttl` when given.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Remove keys, returning how many existed.
    fn delete(&self, keys: &[&str]) -> impl Future<Output = Result<u64>> + Send;

    /// Native atomic integer increment.
    fn incr(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Native atomic float increment.
    fn incr_f(
        &self,
        key: &str,
        delta: f64,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<f64>> + Send;

    /// Remove every key in the store's namespace.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// Round-trip check.
    fn ping(&self) -> impl Future<Output = Result<bool>> + Send;
}

/// Local in-flight state for a key after a store miss.
enum Flight {
    Wait(Waiter),
    Produce(Completer),
}

/// Cache backend over a [`RemoteStore`].
///
/// Read failures are logged and treated as misses, so `fetch` falls through
/// to the producer. Write, delete and increment failures are returned to the
/// caller; nothing is retried.
///
/// A `set`, `delete`, increment or `clear` issued through this adapter while
/// a producer is running for the key supersedes it: the producer still hands
/// its result to its waiters but does not write it to the store.
#[derive(Clone)]
pub struct RemoteBackend<S> {
    store: S,
    in_flight: Arc<DashMap<String, Waiter>>,
    default_ttl: Option<Duration>,
}

impl<S: RemoteStore> RemoteBackend<S> {
    /// Wrap `store`. Values are written without expiry unless
    /// [`RemoteBackend::with_default_ttl`] is used.
    pub fn new(store: S) -> Self {
        RemoteBackend {
            store,
            in_flight: Arc::new(DashMap::new()),
            default_ttl: None,
        }
    }

    /// TTL attached to every value written by `set` and `fetch`.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of keys with a producer currently running in this process.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Remote GET {} failed, treating as miss: {}", key, e);
                None
            }
        }
    }

    fn claim(&self, key: &str) -> Flight {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_abandoned() {
                    return Flight::Wait(occupied.get().clone());
                }
                let (completer, waiter) = completion_token(key);
                occupied.insert(waiter);
                Flight::Produce(completer)
            }
            Entry::Vacant(vacant) => {
                let (completer, waiter) = completion_token(key);
                vacant.insert(waiter);
                Flight::Produce(completer)
            }
        }
    }

    /// True while the in-flight slot for `key` still belongs to `token_id`.
    fn holds(&self, key: &str, token_id: u64) -> bool {
        self.in_flight
            .get(key)
            .map_or(false, |waiter| waiter.id() == token_id)
    }

    /// Detach any running producer for `key` so it skips its store write.
    fn supersede(&self, key: &str) {
        if self.in_flight.remove(key).is_some() {
            debug!("» In-flight producer for {} superseded", key);
        }
    }

    fn release(&self, key: &str, token_id: u64) {
        self.in_flight
            .remove_if(key, |_, waiter| waiter.id() == token_id);
    }
}

impl<S: RemoteStore> CacheBackend for RemoteBackend<S> {
    async fn fetch<F, Fut>(
        &self,
        key: &str,
        producer: F,
        wait: Option<Duration>,
    ) -> Result<String>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<String>> + Send,
    {
        loop {
            if let Some(value) = self.read(key).await {
                debug!("✓ Remote GET {} -> HIT", key);
                return Ok(value);
            }

            match self.claim(key) {
                Flight::Wait(waiter) => {
                    debug!("» {} is being produced in this process, waiting", key);
                    match waiter.wait_for(wait).await {
                        Err(Error::ProducerAbandoned(_)) => continue,
                        outcome => return outcome,
                    }
                }
                Flight::Produce(completer) => {
                    let token_id = completer.id();

                    // A producer may have committed and released between our
                    // miss and our claim.
                    if let Some(value) = self.read(key).await {
                        self.release(key, token_id);
                        completer.complete(Ok(value.clone()));
                        return Ok(value);
                    }

                    debug!("✗ Remote GET {} -> MISS, producing", key);
                    let outcome = producer().await;

                    match &outcome {
                        Ok(value) if self.holds(key, token_id) => {
                            if let Err(e) = self.store.set(key, value, self.default_ttl).await {
                                warn!("Remote SET {} failed, value not cached: {}", key, e);
                            }
                        }
                        Ok(_) => debug!("Discarding result for {}: key was overwritten", key),
                        Err(e) => debug!("Producer for {} failed: {}", key, e),
                    }

                    self.release(key, token_id);
                    completer.complete(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read(key).await)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.supersede(key);
        self.store.set(key, &value, ttl).await
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        for key in keys {
            self.supersede(key);
        }
        self.store.delete(keys).await
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.supersede(key);
        self.store.incr(key, delta, self.default_ttl).await
    }

    async fn incr_f(&self, key: &str, delta: f64) -> Result<f64> {
        self.supersede(key);
        self.store.incr_f(key, delta, self.default_ttl).await
    }

    async fn clear(&self) -> Result<()> {
        self.in_flight.clear();
        self.store.clear().await
    }

    async fn health_check(&self) -> Result<bool> {
        match self.store.ping().await {
            Ok(alive) => Ok(alive),
            Err(e) => {
                debug!("Remote health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }
}
