//! In-process cache backend.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::token::{completion_token, Completer, Waiter};
use crate::value::CacheValue;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A committed value and its optional deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Entry {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// One record per key: either committed, or owned by an in-flight producer.
#[derive(Debug)]
enum Slot {
    Committed(Entry),
    Pending(Waiter),
}

impl Slot {
    fn live_value(&self, now: Instant) -> Option<&str> {
        match self {
            Slot::Committed(entry) if entry.is_live(now) => Some(&entry.value),
            _ => None,
        }
    }

    fn is_pending(&self, token_id: u64) -> bool {
        matches!(self, Slot::Pending(waiter) if waiter.id() == token_id)
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Slot::Committed(entry) if !entry.is_live(now))
    }
}

/// Outcome of the structural check a fetch performs under the map lock.
enum Claim {
    /// A committed value was found.
    Hit(String),
    /// Another caller owns the key; wait on its token.
    Wait(Waiter),
    /// This caller registered a new token and must run the producer.
    Produce(Completer),
}

/// In-memory backend built on a sharded concurrent map.
///
/// Each shard has its own lock, so unrelated keys rarely contend. Lock guards
/// are only held for single lookups, inserts and replacements; producers always
/// run with no lock held.
///
/// Committed values never expire unless a default TTL is configured with
/// [`InMemoryBackend::with_default_ttl`]. Expired entries read as absent.
///
/// # Example
///
/// ```
/// # use stampede_cache::backend::{CacheBackend, InMemoryBackend};
/// # use stampede_cache::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = InMemoryBackend::new();
/// let value = backend
///     .fetch("greeting", || async { Ok("hello".to_string()) }, None)
///     .await?;
/// assert_eq!(value, "hello");
/// assert_eq!(backend.get("greeting").await?, Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    map: Arc<DashMap<String, Slot>>,
    default_ttl: Option<Duration>,
}

impl InMemoryBackend {
    /// Create an empty backend with no expiry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire committed values `ttl` after they are written.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Number of committed, unexpired entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.map
            .iter()
            .filter(|slot| slot.value().live_value(now).is_some())
            .count()
    }

    /// True when no committed, unexpired entry exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Structural check-and-insert for a fetch.
    fn claim(&self, key: &str) -> Claim {
        let now = Instant::now();

        // Fast path under the shard read lock.
        if let Some(slot) = self.map.get(key) {
            if let Some(value) = slot.live_value(now) {
                return Claim::Hit(value.to_string());
            }
        }

        // Re-check under the shard write lock.
        match self.map.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let found = match occupied.get() {
                    Slot::Committed(entry) if entry.is_live(now) => {
                        Some(Claim::Hit(entry.value.clone()))
                    }
                    Slot::Pending(waiter) if !waiter.is_abandoned() => {
                        Some(Claim::Wait(waiter.clone()))
                    }
                    _ => None,
                };
                if let Some(claim) = found {
                    return claim;
                }

                // Expired value or abandoned token: take the key over.
                let (completer, waiter) = completion_token(key);
                occupied.insert(Slot::Pending(waiter));
                Claim::Produce(completer)
            }
            MapEntry::Vacant(vacant) => {
                let (completer, waiter) = completion_token(key);
                vacant.insert(Slot::Pending(waiter));
                Claim::Produce(completer)
            }
        }
    }

    /// Replace our pending slot with the committed value.
    ///
    /// Skipped when a `set`, `del` or `clear` replaced the slot meanwhile.
    fn commit(&self, key: &str, token_id: u64, value: String) {
        match self.map.get_mut(key) {
            Some(mut slot) if slot.is_pending(token_id) => {
                *slot = Slot::Committed(Entry::new(value, self.default_ttl));
                debug!("✓ Committed {}", key);
            }
            _ => debug!("Discarding result for {}: slot was overwritten", key),
        }
    }

    fn abandon(&self, key: &str, token_id: u64) {
        self.map.remove_if(key, |_, slot| slot.is_pending(token_id));
    }

    /// Read-modify-write a numeric value under the shard write lock.
    ///
    /// Absent, expired and pending keys start from `delta`.
    fn update_number<N>(&self, key: &str, delta: N, add: impl FnOnce(N, N) -> Option<N>) -> Result<N>
    where
        N: CacheValue + Copy + std::fmt::Display,
    {
        let now = Instant::now();
        match self.map.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let next = match occupied.get().live_value(now) {
                    Some(current) => {
                        let current = N::decode_value(current)?;
                        add(current, delta).ok_or_else(|| {
                            Error::Validation(format!(
                                "adding {} to {} overflows for key {}",
                                delta, current, key
                            ))
                        })?
                    }
                    None => delta,
                };
                occupied.insert(Slot::Committed(Entry::new(next.to_string(), self.default_ttl)));
                Ok(next)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Slot::Committed(Entry::new(delta.to_string(), self.default_ttl)));
                Ok(delta)
            }
        }
    }
}

impl CacheBackend for InMemoryBackend {
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
            match self.claim(key) {
                Claim::Hit(value) => {
                    debug!("✓ GET {} -> HIT", key);
                    return Ok(value);
                }
                Claim::Wait(waiter) => {
                    debug!("» {} is being produced, waiting", key);
                    match waiter.wait_for(wait).await {
                        Err(Error::ProducerAbandoned(_)) => {
                            debug!("Producer for {} abandoned, retrying", key);
                            continue;
                        }
                        outcome => return outcome,
                    }
                }
                Claim::Produce(completer) => {
                    debug!("✗ GET {} -> MISS, producing", key);
                    let token_id = completer.id();
                    let outcome = producer().await;

                    match &outcome {
                        Ok(value) => self.commit(key, token_id, value.clone()),
                        Err(e) => {
                            debug!("Producer for {} failed: {}", key, e);
                            self.abandon(key, token_id);
                        }
                    }

                    completer.complete(outcome.clone());
                    return outcome;
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let (value, expired) = match self.map.get(key) {
            Some(slot) => (slot.live_value(now).map(str::to_string), slot.is_expired(now)),
            None => (None, false),
        };

        if expired {
            self.map.remove_if(key, |_, slot| slot.is_expired(now));
        }
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.map
            .insert(key.to_string(), Slot::Committed(Entry::new(value, ttl)));
        debug!("✓ SET {}", key);
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, slot)) = self.map.remove(*key) {
                if slot.live_value(now).is_some() {
                    removed += 1;
                }
            }
        }
        debug!("✓ DELETE {} keys ({} removed)", keys.len(), removed);
        Ok(removed)
    }

    async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        self.update_number(key, delta, i64::checked_add)
    }

    async fn incr_f(&self, key: &str, delta: f64) -> Result<f64> {
        self.update_number(key, delta, |a, b| Some(a + b))
    }

    async fn clear(&self) -> Result<()> {
        self.map.clear();
        warn!("⚠ In-memory cache cleared");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }
}
