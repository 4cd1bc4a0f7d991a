//! Benchmarks for context similarity and full decisions.
//!
//! Similarity runs once per stored pattern on every decision, so a full
//! bucket (50 patterns) bounds the cost of the pattern stage.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relay_core::config::DecisionConfig;
use relay_decision::similarity::similarity;
use relay_decision::DecisionEngine;
use serde_json::{json, Value};

fn context(index: usize) -> Value {
    json!({
        "filePath": format!("src/module_{}/handler_{}.rs", index % 7, index),
        "changeType": if index % 2 == 0 { "format" } else { "refactor" },
        "importance": ["low", "medium", "high"][index % 3],
        "linesChanged": index * 3,
    })
}

fn bench_similarity(c: &mut Criterion) {
    let contexts: Vec<Value> = (0..100).map(context).collect();

    let mut group = c.benchmark_group("similarity");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("pair", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let a = &contexts[idx % contexts.len()];
            let other = &contexts[(idx + 1) % contexts.len()];
            idx += 1;
            similarity(black_box(a), black_box(other))
        });
    });

    group.bench_function("full_bucket_50", |b| {
        let probe = context(1000);
        b.iter(|| {
            contexts[..50]
                .iter()
                .map(|p| similarity(&probe, p))
                .fold(0.0f64, f64::max)
        });
    });

    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let engine = DecisionEngine::new(DecisionConfig::default());
    // Warm the bucket so the pattern stage has work to do.
    for i in 0..50 {
        engine.decide("file_operation", "canModify", &context(i * 2));
    }

    let mut group = c.benchmark_group("decide");
    group.bench_function("warm_bucket", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            idx += 1;
            engine.decide("file_operation", "canModify", black_box(&context(idx)))
        });
    });
    group.finish();
}

criterion_group!(benches, bench_similarity, bench_decide);
criterion_main!(benches);
