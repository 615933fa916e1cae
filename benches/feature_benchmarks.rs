#![allow(deprecated)]

//! Feature resolution benchmarks for flagstaff

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use flagstaff::{FeatureManager, FeatureScope, FeaturesConfig, ScopeKey};

struct User(u64);

impl FeatureScope for User {
    fn scope_id(&self) -> String {
        self.0.to_string()
    }
}

fn rollout_manager() -> FeatureManager {
    let manager = FeatureManager::new(FeaturesConfig::default());
    manager.define("rollout", |scope: &ScopeKey| {
        scope
            .id()
            .and_then(|id| id.parse::<u64>().ok())
            .is_some_and(|id| id % 10 == 0)
    });
    manager
}

fn value_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let manager = rollout_manager();
    let user = User(40);

    // Warm the cache
    rt.block_on(async {
        manager.active("rollout", Some(&user)).await.unwrap();
    });

    let mut group = c.benchmark_group("feature_value");
    group.throughput(Throughput::Elements(1));

    group.bench_function("active_cache_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let result = manager.active("rollout", Some(&user)).await.unwrap();
            black_box(result)
        });
    });

    group.bench_function("active_store_hit", |b| {
        b.to_async(&rt).iter(|| async {
            manager.flush_cache();
            let result = manager.active("rollout", Some(&user)).await.unwrap();
            black_box(result)
        });
    });

    group.bench_function("active_resolve", |b| {
        b.to_async(&rt).iter(|| async {
            manager.forget("rollout", Some(&user)).await.unwrap();
            let result = manager.active("rollout", Some(&user)).await.unwrap();
            black_box(result)
        });
    });

    group.finish();
}

fn load_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("feature_load");

    for scopes in [1u64, 10, 100] {
        let users: Vec<User> = (0..scopes).map(User).collect();
        group.throughput(Throughput::Elements(scopes));

        group.bench_with_input(BenchmarkId::new("load", scopes), &users, |b, users| {
            let manager = rollout_manager();
            manager.define_value("theme", "dark");
            let scoped: Vec<Option<&dyn FeatureScope>> =
                users.iter().map(|u| Some(u as &dyn FeatureScope)).collect();

            b.to_async(&rt).iter(|| async {
                manager.flush_cache();
                let loaded = manager.load(&["rollout", "theme"], &scoped).await.unwrap();
                black_box(loaded)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, value_benchmark, load_benchmark);
criterion_main!(benches);
