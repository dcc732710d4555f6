//! Redis remote store.

use super::remote::{RemoteBackend, RemoteStore};
use crate::error::{Error, Result};
use deadpool_redis::redis::{self, RedisError};
use deadpool_redis::{Config, Connection, Pool, PoolConfig, PoolError, Runtime};
use std::time::Duration;

/// Default Redis connection pool size.
/// Formula: (CPU cores × 2) + 1
/// For 8-core systems: 16 connections is optimal
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Keys fetched per SCAN round trip when clearing a prefix.
const SCAN_BATCH: usize = 500;

impl From<RedisError> for Error {
    fn from(e: RedisError) -> Self {
        let message = e.to_string();
        // INCRBY/INCRBYFLOAT on a non-numeric value is a type problem, not an outage.
        if e.kind() == redis::ErrorKind::TypeError
            || message.contains("not an integer")
            || message.contains("not a valid float")
        {
            Error::TypeConversion(message)
        } else {
            Error::BackendUnavailable(message)
        }
    }
}

impl From<PoolError> for Error {
    fn from(e: PoolError) -> Self {
        Error::BackendUnavailable(format!("Failed to get Redis connection: {}", e))
    }
}

/// How cache keys map onto Redis keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyLayout {
    /// Each cache key is a top-level Redis key `prefix + key` with its own TTL.
    Prefixed { prefix: String },
    /// All cache keys are fields of one hash. The TTL applies to the whole hash.
    Hash { namespace: String },
}

impl Default for KeyLayout {
    fn default() -> Self {
        KeyLayout::Prefixed {
            prefix: "cache:".to_string(),
        }
    }
}

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String, // e.g., "redis://localhost:6379/0"
    pub layout: KeyLayout,
    pub default_ttl: Option<Duration>,
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            layout: KeyLayout::default(),
            default_ttl: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl RedisConfig {
    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// - `REDIS_URL`: connection URL
    /// - `REDIS_POOL_SIZE`: maximum pooled connections
    /// - `CACHE_PREFIX`: key prefix (prefixed layout)
    /// - `CACHE_TTL_SECS`: default TTL in seconds, `0` for none
    pub fn from_env() -> Self {
        let mut config = RedisConfig::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.url = url;
        }
        if let Some(size) = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        {
            config.pool_size = size;
        }
        if let Ok(prefix) = std::env::var("CACHE_PREFIX") {
            config.layout = KeyLayout::Prefixed { prefix };
        }
        if let Some(secs) = std::env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.default_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }

        config
    }
}

/// Redis store with connection pooling.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    layout: KeyLayout,
}

impl RedisStore {
    /// Create a pooled store. No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn new(config: &RedisConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(Error::Config("Redis pool size must be positive".to_string()));
        }

        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_size));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Redis store initialized for {} ({:?}, pool size: {})",
            config.url, config.layout, config.pool_size
        );

        Ok(RedisStore {
            pool,
            layout: config.layout.clone(),
        })
    }

    async fn conn(&self) -> Result<Connection> {
        Ok(self.pool.get().await?)
    }

    fn full_key(prefix: &str, key: &str) -> String {
        format!("{}{}", prefix, key)
    }

    /// Run an increment command and refresh the TTL in one atomic pipeline.
    async fn increment<T>(
        &self,
        key: &str,
        delta: T,
        ttl: Option<Duration>,
        int_cmd: bool,
    ) -> Result<T>
    where
        T: redis::ToRedisArgs + redis::FromRedisValue + Send + Sync,
    {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();

        let expire_target = match &self.layout {
            KeyLayout::Prefixed { prefix } => {
                let full = Self::full_key(prefix, key);
                let cmd = if int_cmd { "INCRBY" } else { "INCRBYFLOAT" };
                pipe.cmd(cmd).arg(&full).arg(delta);
                full
            }
            KeyLayout::Hash { namespace } => {
                let cmd = if int_cmd { "HINCRBY" } else { "HINCRBYFLOAT" };
                pipe.cmd(cmd).arg(namespace).arg(key).arg(delta);
                namespace.clone()
            }
        };
        if let Some(ttl) = ttl {
            pipe.cmd("PEXPIRE").arg(&expire_target).arg(ttl_millis(ttl)).ignore();
        }

        let (value,): (T,) = pipe.query_async(&mut conn).await?;
        debug!("✓ Redis INCR {}", key);
        Ok(value)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escape glob metacharacters so a prefix matches literally in SCAN MATCH.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = match &self.layout {
            KeyLayout::Prefixed { prefix } => {
                redis::cmd("GET")
                    .arg(Self::full_key(prefix, key))
                    .query_async(&mut conn)
                    .await?
            }
            KeyLayout::Hash { namespace } => {
                redis::cmd("HGET")
                    .arg(namespace)
                    .arg(key)
                    .query_async(&mut conn)
                    .await?
            }
        };

        debug!(
            "✓ Redis GET {} -> {}",
            key,
            if value.is_some() { "HIT" } else { "MISS" }
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;

        match &self.layout {
            KeyLayout::Prefixed { prefix } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(Self::full_key(prefix, key)).arg(value);
                if let Some(ttl) = ttl {
                    cmd.arg("PX").arg(ttl_millis(ttl));
                }
                let () = cmd.query_async(&mut conn).await?;
            }
            KeyLayout::Hash { namespace } => {
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .cmd("HSET")
                    .arg(namespace)
                    .arg(key)
                    .arg(value)
                    .ignore();
                if let Some(ttl) = ttl {
                    pipe.cmd("PEXPIRE").arg(namespace).arg(ttl_millis(ttl)).ignore();
                }
                let () = pipe.query_async(&mut conn).await?;
            }
        }

        if let Some(d) = ttl {
            debug!("✓ Redis SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Redis SET {}", key);
        }
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> Result<u64> {
        let mut conn = self.conn().await?;

        let removed: u64 = match &self.layout {
            KeyLayout::Prefixed { prefix } => {
                let full: Vec<String> = keys.iter().map(|k| Self::full_key(prefix, k)).collect();
                redis::cmd("DEL").arg(&full).query_async(&mut conn).await?
            }
            KeyLayout::Hash { namespace } => {
                redis::cmd("HDEL")
                    .arg(namespace)
                    .arg(keys)
                    .query_async(&mut conn)
                    .await?
            }
        };

        debug!("✓ Redis DELETE {} keys ({} removed)", keys.len(), removed);
        Ok(removed)
    }

    async fn incr(&self, key: &str, delta: i64, ttl: Option<Duration>) -> Result<i64> {
        self.increment(key, delta, ttl, true).await
    }

    async fn incr_f(&self, key: &str, delta: f64, ttl: Option<Duration>) -> Result<f64> {
        self.increment(key, delta, ttl, false).await
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn().await?;

        match &self.layout {
            KeyLayout::Hash { namespace } => {
                let _: u64 = redis::cmd("DEL").arg(namespace).query_async(&mut conn).await?;
            }
            KeyLayout::Prefixed { prefix } => {
                if prefix.is_empty() {
                    return Err(Error::Validation(
                        "refusing to clear a Redis store without a key prefix".to_string(),
                    ));
                }

                let pattern = format!("{}*", escape_glob(prefix));
                let mut cursor: u64 = 0;
                loop {
                    let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn)
                        .await?;
                    if !keys.is_empty() {
                        let _: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                    }
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
            }
        }

        warn!("⚠ Redis cache cleared ({:?})", self.layout);
        Ok(())
    }

    async fn ping(&self) -> Result<bool> {
        let mut conn = self.conn().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }
}

/// Remote backend over Redis.
pub type RedisBackend = RemoteBackend<RedisStore>;

impl RemoteBackend<RedisStore> {
    /// Create a Redis-backed cache backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn from_config(config: RedisConfig) -> Result<Self> {
        let store = RedisStore::new(&config)?;
        let backend = RemoteBackend::new(store);
        Ok(match config.default_ttl {
            Some(ttl) => backend.with_default_ttl(ttl),
            None => backend,
        })
    }

    /// Create from a URL with the default layout.
    ///
    /// Pool size is determined by:
    /// 1. `REDIS_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub fn from_url(url: impl Into<String>) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self::from_config(RedisConfig {
            url: url.into(),
            pool_size,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.default_ttl, None);
        assert_eq!(
            config.layout,
            KeyLayout::Prefixed {
                prefix: "cache:".to_string()
            }
        );
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let config = RedisConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(RedisStore::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        // Nothing listens here; creating the pool must still succeed.
        let backend = RedisBackend::from_config(RedisConfig {
            url: "redis://127.0.0.1:1".to_string(),
            layout: KeyLayout::Hash {
                namespace: "sessions".to_string(),
            },
            default_ttl: Some(Duration::from_secs(60)),
            pool_size: 2,
        })
        .expect("pool");

        assert_eq!(backend.store().layout, KeyLayout::Hash {
            namespace: "sessions".to_string()
        });
        assert!(!crate::backend::CacheBackend::health_check(&backend)
            .await
            .expect("health"));
    }

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("app:v1:"), "app:v1:");
        assert_eq!(escape_glob("a*b?[c]\\"), "a\\*b\\?\\[c\\]\\\\");
    }

    #[test]
    fn test_ttl_millis_rounds_up_to_one() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
        assert_eq!(ttl_millis(Duration::MAX), u64::MAX);
    }
}
