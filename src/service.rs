//! Typed cache facade.

use crate::backend::CacheBackend;
use crate::builder::FetchBuilder;
use crate::error::Result;
use crate::key::{CacheKey, KeyCodec};
use crate::observability::{CacheMetrics, NoOpMetrics};
use crate::value::CacheValue;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Typed entry point for cache operations.
///
/// Encodes keys with a [`KeyCodec`], values with [`CacheValue`], and delegates
/// to the chosen [`CacheBackend`]. `CacheService` is cheap to clone and can be
/// shared across tasks.
///
/// # Example
///
/// ```
/// use stampede_cache::{backend::InMemoryBackend, CacheService};
///
/// # async fn example() -> stampede_cache::Result<()> {
/// let cache = CacheService::new(InMemoryBackend::new());
///
/// let answer: u64 = cache.fetch("answer", || async { Ok(42u64) }).await?;
/// assert_eq!(answer, 42);
///
/// // Committed: the producer does not run again.
/// let again: u64 = cache.fetch("answer", || async { Ok(0u64) }).await?;
/// assert_eq!(again, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheService<B: CacheBackend> {
    backend: B,
    codec: KeyCodec,
    metrics: Arc<dyn CacheMetrics>,
}

impl<B: CacheBackend> CacheService<B> {
    /// Create a service over `backend`.
    pub fn new(backend: B) -> Self {
        CacheService {
            backend,
            codec: KeyCodec::new(),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the key codec.
    pub fn with_codec(mut self, codec: KeyCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Return the committed value for `key`, or run `producer` to create it.
    ///
    /// Among concurrent callers for the same key only one runs its producer;
    /// the rest wait and receive the same value or error. Errors are not
    /// cached, so the next fetch after a failure runs a producer again.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidKey`: key encodes to an empty or malformed string
    /// - `Error::Producer` (or whatever the producer returned)
    /// - `Error::TypeConversion`: the committed value is not a valid `V`
    pub async fn fetch<K, V, F, Fut>(&self, key: &K, producer: F) -> Result<V>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V>> + Send,
    {
        self.fetch_inner(key, producer, None).await
    }

    /// Like [`CacheService::fetch`], but stop waiting on another caller's
    /// producer after `timeout`.
    ///
    /// The timeout only applies while waiting. When this caller is the
    /// producer it runs to completion.
    ///
    /// # Errors
    ///
    /// As [`CacheService::fetch`], plus `Error::Timeout`.
    pub async fn fetch_within<K, V, F, Fut>(
        &self,
        key: &K,
        timeout: Duration,
        producer: F,
    ) -> Result<V>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V>> + Send,
    {
        self.fetch_inner(key, producer, Some(timeout)).await
    }

    /// Start a fluent fetch.
    ///
    /// ```ignore
    /// let user: Json<User> = cache
    ///     .fetching("user:1")
    ///     .with_timeout(Duration::from_millis(250))
    ///     .execute(|| load_user(1))
    ///     .await?;
    /// ```
    pub fn fetching<'a, K: CacheKey + ?Sized>(&'a self, key: &'a K) -> FetchBuilder<'a, B, K> {
        FetchBuilder::new(self, key)
    }

    pub(crate) async fn fetch_inner<K, V, F, Fut>(
        &self,
        key: &K,
        producer: F,
        wait: Option<Duration>,
    ) -> Result<V>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V>> + Send,
    {
        let key = self.codec.encode(key)?;
        let timer = Instant::now();
        let produced = Arc::new(AtomicBool::new(false));

        let flag = produced.clone();
        let result = self
            .backend
            .fetch(
                &key,
                move || async move {
                    flag.store(true, Ordering::Relaxed);
                    producer().await?.encode_value()
                },
                wait,
            )
            .await
            .and_then(|raw| V::decode_value(&raw));

        match &result {
            Ok(_) if produced.load(Ordering::Relaxed) => {
                self.metrics.record_miss(&key, timer.elapsed())
            }
            Ok(_) => self.metrics.record_hit(&key, timer.elapsed()),
            Err(e) => self.metrics.record_error(&key, &e.to_string()),
        }
        result
    }

    /// Read a committed value without ever running a producer.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidKey`: key encodes to an empty or malformed string
    /// - `Error::TypeConversion`: the stored value is not a valid `V`
    pub async fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
    {
        let key = self.codec.encode(key)?;
        match self.backend.get(&key).await? {
            Some(raw) => V::decode_value(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Commit `value` with the backend's default TTL, replacing any state.
    ///
    /// # Errors
    ///
    /// Returns `Err` on an invalid key, an unencodable value, or a backend failure.
    pub async fn set<K, V>(&self, key: &K, value: &V) -> Result<()>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
    {
        let key = self.codec.encode(key)?;
        self.backend.set(&key, value.encode_value()?).await
    }

    /// Commit `value` with an explicit TTL (`None` = no expiry).
    ///
    /// # Errors
    ///
    /// Same as [`CacheService::set`].
    pub async fn set_with_ttl<K, V>(&self, key: &K, value: &V, ttl: Option<Duration>) -> Result<()>
    where
        K: CacheKey + ?Sized,
        V: CacheValue,
    {
        let key = self.codec.encode(key)?;
        self.backend.set_with_ttl(&key, value.encode_value()?, ttl).await
    }

    /// Remove keys, returning how many committed values were removed.
    ///
    /// # Errors
    ///
    /// Returns `Err` if any key is invalid (nothing is deleted) or the backend fails.
    pub async fn del<K: CacheKey>(&self, keys: &[K]) -> Result<u64> {
        let encoded = keys
            .iter()
            .map(|k| self.codec.encode(k))
            .collect::<Result<Vec<_>>>()?;
        let refs: Vec<&str> = encoded.iter().map(String::as_str).collect();
        self.backend.delete(&refs).await
    }

    /// Atomically add `delta`; an absent key starts from zero.
    ///
    /// # Errors
    ///
    /// `Error::TypeConversion` if the stored value is not an integer.
    pub async fn incr<K: CacheKey + ?Sized>(&self, key: &K, delta: i64) -> Result<i64> {
        let key = self.codec.encode(key)?;
        self.backend.incr(&key, delta).await
    }

    /// Atomically subtract `delta`.
    ///
    /// # Errors
    ///
    /// As [`CacheService::incr`]; also `Error::Validation` for `i64::MIN`.
    pub async fn decr<K: CacheKey + ?Sized>(&self, key: &K, delta: i64) -> Result<i64> {
        let key = self.codec.encode(key)?;
        self.backend.decr(&key, delta).await
    }

    /// Atomically add a float `delta`; an absent key starts from zero.
    ///
    /// # Errors
    ///
    /// `Error::TypeConversion` if the stored value is not a number.
    pub async fn incr_f<K: CacheKey + ?Sized>(&self, key: &K, delta: f64) -> Result<f64> {
        let key = self.codec.encode(key)?;
        self.backend.incr_f(&key, delta).await
    }

    /// Atomically subtract a float `delta`.
    ///
    /// # Errors
    ///
    /// As [`CacheService::incr_f`].
    pub async fn decr_f<K: CacheKey + ?Sized>(&self, key: &K, delta: f64) -> Result<f64> {
        let key = self.codec.encode(key)?;
        self.backend.decr_f(&key, delta).await
    }

    /// Drop every entry in the backend's namespace.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the backend fails.
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }
}
