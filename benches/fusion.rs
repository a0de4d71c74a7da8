//! Benchmarks for result fusion.
//!
//! Benchmark targets:
//! - 100 items: <5ms
//! - 1000 items: <50ms (near-duplicate detection is quadratic in kept items)

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use strata::models::{
    ClassificationResult, DetectionSource, LayerItem, LayerResult, RoutingStats,
};
use strata::services::FusionOptions;
use strata::{LayerId, QueryType, ResultFusion, RoutingResult};

const TOPICS: &[&str] = &[
    "login flow",
    "token refresh",
    "password reset",
    "session storage",
    "rate limiting",
    "audit trail",
];

fn routing_with_items(count: usize) -> RoutingResult {
    let query = "How does the login flow refresh the session token?";
    let per_layer = count / LayerId::all().len();
    let results = LayerId::all()
        .iter()
        .map(|&layer| LayerResult {
            layer,
            outcome: Ok((0..per_layer)
                .map(|i| {
                    LayerItem::from(format!(
                        "{layer} note {i}: the {} handler lives in module {}",
                        TOPICS[i % TOPICS.len()],
                        i % 17
                    ))
                })
                .collect()),
            weight: 0.2,
            elapsed_ms: 0,
        })
        .collect();

    RoutingResult {
        query: query.to_string(),
        classification: ClassificationResult::from_policy(
            query,
            QueryType::General,
            0.5,
            "",
            DetectionSource::Keyword,
        ),
        results,
        stats: RoutingStats::default(),
    }
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("fusion_merge");
    let fusion = ResultFusion::new();
    let options = FusionOptions::default();

    for count in [60usize, 300, 1_200] {
        let routing = routing_with_items(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &routing, |b, routing| {
            b.iter(|| fusion.merge(black_box(routing), &options));
        });
    }

    group.finish();
}

fn bench_diversity(c: &mut Criterion) {
    let fusion = ResultFusion::new();
    let options = FusionOptions::default().with_diversity(0.1);
    let routing = routing_with_items(300);

    c.bench_function("fusion_merge_with_diversity", |b| {
        b.iter(|| fusion.merge(black_box(&routing), &options));
    });
}

criterion_group!(benches, bench_merge, bench_diversity);
criterion_main!(benches);
