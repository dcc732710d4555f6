//! # stampede-cache
//!
//! A concurrent fetch-or-compute cache: for any key, at most one computation
//! of its value runs at a time, while unrelated keys proceed independently.
//!
//! ## Features
//!
//! - **Single-flight:** Concurrent misses on one key share a single producer run
//! - **Errors are not cached:** A failed producer leaves the key absent
//! - **Backend Agnostic:** In-memory and Redis backends behind one trait
//! - **Typed:** Keys via [`CacheKey`], values via [`value::CacheValue`]
//! - **Bounded waiting:** Waiters can give up without cancelling the producer
//!
//! ## Quick Start
//!
//! ```
//! use stampede_cache::{backend::InMemoryBackend, CacheService};
//!
//! # async fn example() -> stampede_cache::Result<()> {
//! let cache = CacheService::new(InMemoryBackend::new());
//!
//! // Only one of many concurrent callers runs the closure.
//! let page: String = cache
//!     .fetch("page:/home", || async { Ok("<html>…</html>".to_string()) })
//!     .await?;
//!
//! cache.incr("visits", 1).await?;
//! cache.del(&["page:/home"]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Limits
//!
//! Single-flight is per process. Processes sharing a remote store may each run
//! a producer for the same key. Expiry is left to the backend.

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod error;
pub mod key;
pub mod observability;
pub mod service;
pub mod token;
pub mod value;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use builder::FetchBuilder;
pub use error::{Error, Result};
pub use key::{CacheKey, KeyCodec};
pub use service::CacheService;
pub use value::{CacheValue, Json};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
