//! Redis-backed cache.
//!
//! Run with a local Redis:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379 CACHE_TTL_SECS=60 \
//!     cargo run --example redis_usage --features redis
//! ```

use stampede_cache::backend::{KeyLayout, RedisBackend, RedisConfig};
use stampede_cache::{error::Result, CacheBackend, CacheService};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init()
        .ok();

    // Prefixed layout, configured from the environment.
    let backend = RedisBackend::from_config(RedisConfig::from_env())?;
    if !backend.health_check().await? {
        eprintln!("Redis is not reachable; start it or set REDIS_URL");
        return Ok(());
    }
    let cache = CacheService::new(backend);

    let rendered: String = cache
        .fetch("page:/about", || async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok("<h1>About</h1>".to_string())
        })
        .await?;
    println!("✓ page:/about = {}", rendered);

    let visits = cache.incr("visits:/about", 1).await?;
    println!("✓ visits:/about = {}", visits);

    // Hash layout: every key is a field of one hash, expiring together.
    let sessions = CacheService::new(RedisBackend::from_config(RedisConfig {
        layout: KeyLayout::Hash {
            namespace: "sessions".to_string(),
        },
        default_ttl: Some(Duration::from_secs(30 * 60)),
        ..RedisConfig::from_env()
    })?);
    sessions.set("user:42", &"token-abc".to_string()).await?;
    let token: Option<String> = sessions.get("user:42").await?;
    println!("✓ sessions[user:42] = {:?}", token);

    sessions.clear().await?;
    cache.del(&["page:/about", "visits:/about"]).await?;
    println!("✓ Cleaned up");

    Ok(())
}
