use criterion::{criterion_group, criterion_main, Criterion};
use futures::future::join_all;
use stampede_cache::backend::InMemoryBackend;
use stampede_cache::CacheService;
use std::hint::black_box;
use std::time::Duration;

fn bench_committed_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let cache = CacheService::new(InMemoryBackend::new());

    c.bench_function("fetch_committed_hit", |b| {
        b.to_async(&runtime).iter(|| {
            let cache = cache.clone();
            async move {
                let value: String = cache
                    .fetch("hot", || async { Ok("value".to_string()) })
                    .await
                    .expect("fetch");
                black_box(value)
            }
        })
    });
}

fn bench_contended_with_deletes(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let cache = CacheService::new(InMemoryBackend::new());

    c.bench_function("fetch_contended_random_delete", |b| {
        b.to_async(&runtime).iter(|| {
            let cache = cache.clone();
            async move {
                let tasks = (0..64).map(|_| {
                    let cache = cache.clone();
                    tokio::spawn(async move {
                        let value: String = cache
                            .fetch("key", || async {
                                tokio::time::sleep(Duration::from_micros(100)).await;
                                Ok("ok".to_string())
                            })
                            .await
                            .expect("fetch");
                        if rand::random::<u32>() % 1000 == 0 {
                            cache.del(&["key"]).await.expect("del");
                        }
                        value
                    })
                });
                black_box(join_all(tasks).await)
            }
        })
    });
}

fn bench_distinct_keys(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let cache = CacheService::new(InMemoryBackend::new());

    c.bench_function("fetch_distinct_keys", |b| {
        let mut n: u64 = 0;
        b.to_async(&runtime).iter(|| {
            n += 1;
            let key = n;
            let cache = cache.clone();
            async move {
                let value: u64 = cache
                    .fetch(&key, move || async move { Ok(key) })
                    .await
                    .expect("fetch");
                black_box(value)
            }
        })
    });
}

criterion_group!(
    benches,
    bench_committed_hit,
    bench_contended_with_deletes,
    bench_distinct_keys
);
criterion_main!(benches);
