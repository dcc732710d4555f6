//! Basic usage example of the cache.

use serde::{Deserialize, Serialize};
use stampede_cache::{backend::InMemoryBackend, error::Result, CacheService, Error, Json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Example entity: Employment
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Employment {
    id: String,
    employer_name: String,
    salary: f64,
}

/// Simulates a slow database lookup.
async fn load_employment(id: &str, queries: &AtomicUsize) -> Result<Json<Employment>> {
    queries.fetch_add(1, Ordering::SeqCst);
    println!("  [DB] Fetching employment: {}", id);
    tokio::time::sleep(Duration::from_millis(200)).await;

    match id {
        "emp_001" => Ok(Json(Employment {
            id: id.to_string(),
            employer_name: "Acme Corp".to_string(),
            salary: 75000.0,
        })),
        _ => Err(Error::producer(format!("employment {} not found", id))),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Stampede Cache - Basic Example ===\n");

    let cache = CacheService::new(InMemoryBackend::new());
    let queries = Arc::new(AtomicUsize::new(0));

    // 1. Many concurrent requests for a cold key share one database query.
    println!("1. 100 concurrent requests for emp_001:");
    let handles: Vec<_> = (0..100)
        .map(|_| {
            let cache = cache.clone();
            let queries = queries.clone();
            tokio::spawn(async move {
                cache
                    .fetch("employment:emp_001", move || async move {
                        load_employment("emp_001", &queries).await
                    })
                    .await
            })
        })
        .collect();

    for handle in handles {
        let Json(emp) = handle.await.expect("task panicked")?;
        assert_eq!(emp.id, "emp_001");
    }
    println!(
        "   ✓ All requests served, database queried {} time(s)\n",
        queries.load(Ordering::SeqCst)
    );

    // 2. Committed: no further queries.
    println!("2. Cached read:");
    let cached: Option<Json<Employment>> = cache.get("employment:emp_001").await?;
    if let Some(Json(emp)) = cached {
        println!("   ✓ {} from cache (${:.2})\n", emp.employer_name, emp.salary);
    }

    // 3. Failures are shared but not cached.
    println!("3. Failing lookup:");
    let q = queries.clone();
    let missing: Result<Json<Employment>> = cache
        .fetch("employment:emp_999", move || async move {
            load_employment("emp_999", &q).await
        })
        .await;
    if let Err(e) = missing {
        println!("   ✓ Error returned and not cached: {}\n", e);
    }

    // 4. Counters.
    println!("4. Counters:");
    cache.incr("page_views", 1).await?;
    let views = cache.incr("page_views", 1).await?;
    println!("   ✓ page_views = {}\n", views);

    // 5. Invalidate.
    println!("5. Invalidate emp_001:");
    let removed = cache.del(&["employment:emp_001"]).await?;
    println!("   ✓ Removed {} entr(ies)\n", removed);

    println!("=== Example Complete ===\n");

    Ok(())
}
