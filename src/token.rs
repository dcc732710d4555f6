//! One-shot completion signal for an in-flight producer.
//!
//! A token is split into a [`Completer`], owned by the single caller that runs
//! the producer, and any number of [`Waiter`]s. The completer writes the outcome
//! exactly once; every waiter then observes that same outcome.
//!
//! Dropping the completer without writing (the producer future was dropped or
//! panicked) closes the token. Waiters see [`Error::ProducerAbandoned`] and the
//! slot holding the token reads as abandoned, so another caller can take over.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

type Outcome = Option<Result<String>>;

/// Create a fresh completion token for `key`.
pub fn completion_token(key: &str) -> (Completer, Waiter) {
    let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = watch::channel(None);
    let key: std::sync::Arc<str> = key.into();

    (
        Completer {
            id,
            key: key.clone(),
            tx,
        },
        Waiter { id, key, rx },
    )
}

/// Write half of a completion token.
#[derive(Debug)]
pub struct Completer {
    id: u64,
    key: std::sync::Arc<str>,
    tx: watch::Sender<Outcome>,
}

impl Completer {
    /// Identifier shared with every [`Waiter`] of this token.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Publish the outcome and release all waiters.
    pub fn complete(self, outcome: Result<String>) {
        // send_replace stores the value even when no waiter is subscribed.
        self.tx.send_replace(Some(outcome));
        trace!("token {} for {} completed", self.id, self.key);
    }
}

/// Read half of a completion token. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Waiter {
    id: u64,
    key: std::sync::Arc<str>,
    rx: watch::Receiver<Outcome>,
}

impl Waiter {
    /// Identifier of the token this waiter belongs to.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the completer has been dropped without writing an outcome.
    pub fn is_abandoned(&self) -> bool {
        self.rx.has_changed().is_err() && self.rx.borrow().is_none()
    }

    /// Suspend until the producer publishes its outcome.
    ///
    /// # Errors
    ///
    /// Returns the producer's own error, or [`Error::ProducerAbandoned`] if the
    /// completer was dropped before writing.
    pub async fn wait(mut self) -> Result<String> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| Err(Error::ProducerAbandoned(self.key.to_string())))
    }

    /// Like [`Waiter::wait`], but give up after `timeout`.
    ///
    /// Giving up only detaches this waiter; the producer keeps running and
    /// still commits its result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if no outcome arrived in time.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<String> {
        let key = self.key.clone();
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Timeout(timeout, key.to_string())),
        }
    }

    /// Wait with an optional timeout.
    pub(crate) async fn wait_for(self, timeout: Option<Duration>) -> Result<String> {
        match timeout {
            Some(timeout) => self.wait_timeout(timeout).await,
            None => self.wait().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_waiters_see_same_value() {
        let (completer, waiter) = completion_token("k");
        let handles: Vec<_> = (0..8)
            .map(|_| tokio::spawn(waiter.clone().wait()))
            .collect();

        completer.complete(Ok("v".to_string()));

        for handle in handles {
            assert_eq!(handle.await.expect("join"), Ok("v".to_string()));
        }
        assert_eq!(waiter.wait().await, Ok("v".to_string()));
    }

    #[tokio::test]
    async fn test_error_is_broadcast() {
        let (completer, waiter) = completion_token("k");
        let late = waiter.clone();
        completer.complete(Err(Error::producer("boom")));

        assert_eq!(waiter.wait().await, Err(Error::producer("boom")));
        assert_eq!(late.wait().await, Err(Error::producer("boom")));
    }

    #[tokio::test]
    async fn test_dropped_completer_abandons() {
        let (completer, waiter) = completion_token("k");
        assert!(!waiter.is_abandoned());

        drop(completer);

        assert!(waiter.is_abandoned());
        assert_eq!(
            waiter.wait().await,
            Err(Error::ProducerAbandoned("k".to_string()))
        );
    }

    #[tokio::test]
    async fn test_completed_token_is_not_abandoned() {
        let (completer, waiter) = completion_token("k");
        completer.complete(Ok("v".to_string()));
        assert!(!waiter.is_abandoned());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_leaves_token_usable() {
        let (completer, waiter) = completion_token("k");

        let result = waiter
            .clone()
            .wait_timeout(Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_, ref k)) if k == "k"));

        completer.complete(Ok("late".to_string()));
        assert_eq!(waiter.wait().await, Ok("late".to_string()));
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _) = completion_token("k");
        let (b, wb) = completion_token("k");
        assert_ne!(a.id(), b.id());
        assert_eq!(b.id(), wb.id());
    }
}
