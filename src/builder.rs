//! Builder pattern for fetch operations.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::key::CacheKey;
use crate::service::CacheService;
use crate::value::CacheValue;
use std::future::Future;
use std::time::Duration;

/// Fluent builder for a single fetch.
///
/// # Example
///
/// ```
/// use stampede_cache::{backend::InMemoryBackend, CacheService};
/// use std::time::Duration;
///
/// # async fn example() -> stampede_cache::Result<()> {
/// let cache = CacheService::new(InMemoryBackend::new());
///
/// let report: String = cache
///     .fetching("report:2024")
///     .with_timeout(Duration::from_secs(2))
///     .execute(|| async { Ok("rendered".to_string()) })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct FetchBuilder<'a, B: CacheBackend, K: ?Sized> {
    service: &'a CacheService<B>,
    key: &'a K,
    timeout: Option<Duration>,
}

impl<'a, B: CacheBackend, K: CacheKey + ?Sized> FetchBuilder<'a, B, K> {
    /// Create a new builder with default settings.
    pub(crate) fn new(service: &'a CacheService<B>, key: &'a K) -> Self {
        Self {
            service,
            key,
            timeout: None,
        }
    }

    /// Give up waiting on another caller's producer after `timeout`.
    ///
    /// Has no effect when this caller ends up running the producer itself,
    /// and abandoning the wait never cancels the running producer.
    ///
    /// # Example
    ///
    /// ```ignore
    /// builder.with_timeout(Duration::from_millis(500))
    /// ```
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute the fetch.
    ///
    /// # Errors
    ///
    /// Returns `Err` in these cases:
    /// - `Error::InvalidKey`: Key encodes to an empty or malformed string
    /// - `Error::Timeout`: The configured timeout elapsed while waiting
    /// - `Error::TypeConversion`: The committed value is not a valid `V`
    /// - Any error returned by the producer
    pub async fn execute<V, F, Fut>(self, producer: F) -> Result<V>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V>> + Send,
    {
        self.service
            .fetch_inner(self.key, producer, self.timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::error::Error;

    #[tokio::test]
    async fn test_builder_basic() {
        let cache = CacheService::new(InMemoryBackend::new());

        let value: i32 = cache
            .fetching("k")
            .execute(|| async { Ok(5) })
            .await
            .expect("Failed to execute");

        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_builder_timeout_while_waiting() {
        let cache = CacheService::new(InMemoryBackend::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let producer_cache = cache.clone();
        let producer = tokio::spawn(async move {
            producer_cache
                .fetch("slow", || async move {
                    rx.await.ok();
                    Ok("done".to_string())
                })
                .await
        });
        tokio::task::yield_now().await;

        let waited: Result<String> = cache
            .fetching("slow")
            .with_timeout(Duration::from_millis(20))
            .execute(|| async { Ok("never".to_string()) })
            .await;
        assert!(matches!(waited, Err(Error::Timeout(_, ref key)) if key == "slow"));

        // The producer is unaffected by the abandoned waiter.
        tx.send(()).expect("send");
        assert_eq!(producer.await.expect("join").expect("fetch"), "done");

        let value: String = cache
            .fetching("slow")
            .with_timeout(Duration::from_millis(20))
            .execute(|| async { Ok("never".to_string()) })
            .await
            .expect("Failed to execute");
        assert_eq!(value, "done");
    }
}
