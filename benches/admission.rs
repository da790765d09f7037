use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use remedy_intake::adapters::memory::InMemoryObjectLookup;
use remedy_intake::domain::models::{
    ClusterEvent, DynamicObject, EventSelector, IntakeConfig, ObjectIdentity, ObjectRef, PolicyRef,
    RemediationPolicy, SuppressionKey,
};
use remedy_intake::infrastructure::clock::ManualClock;
use remedy_intake::services::{IntakeOrchestrator, RateLimiter, SelectorMatcher};

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn policies(count: usize) -> Vec<RemediationPolicy> {
    (0..count)
        .map(|i| {
            RemediationPolicy::new("ops", format!("policy-{i}"))
                .with_selector(EventSelector {
                    reason: format!("Reason{i}"),
                    ..EventSelector::default()
                })
                .with_selector(EventSelector {
                    event_type: "Warning".to_string(),
                    message: r"exit code \d+".to_string(),
                    ..EventSelector::default()
                })
                .with_rate_limit(10_000, 15)
        })
        .collect()
}

fn event() -> ClusterEvent {
    ClusterEvent::new(
        "Warning",
        "BackOff",
        "container exited with exit code 137",
        ObjectRef::new("v1", "Pod", "default", "web-7d4b9c8f6d-q2w5z"),
    )
    .with_last_timestamp(t0())
}

/// Benchmark selector evaluation across policy set sizes
fn bench_selector_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_matching");
    let event = event();

    for count in [1usize, 10, 100] {
        let matcher = SelectorMatcher::compile(&policies(count));
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("policies", count), &matcher, |b, matcher| {
            b.iter(|| black_box(matcher.matches(black_box(&event)).count()))
        });
    }

    group.finish();
}

/// Benchmark sliding-window decisions for one hot key
fn bench_rate_limiter(c: &mut Criterion) {
    let mut group = c.benchmark_group("rate_limiter");
    let key = SuppressionKey::new(
        PolicyRef::new("ops", "p"),
        ObjectIdentity::new("default", "Deployment", "web"),
        "BackOff",
    );

    group.throughput(Throughput::Elements(1000));
    group.bench_function("check_and_record", |b| {
        let limiter = RateLimiter::new();
        let mut now = t0();
        b.iter(|| {
            for _ in 0..1000 {
                now += Duration::milliseconds(100);
                black_box(limiter.check_and_record(black_box(&key), 100, now));
            }
        })
    });

    group.finish();
}

/// Benchmark the full intake path including owner resolution
fn bench_evaluate(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let deploy = DynamicObject::new("apps/v1", "Deployment", "default", "web");
    let rs = DynamicObject::new("apps/v1", "ReplicaSet", "default", "web-7d4b9c8f6d").owned_by(&deploy, true);
    let pod = DynamicObject::new("v1", "Pod", "default", "web-7d4b9c8f6d-q2w5z").owned_by(&rs, true);
    let lookup = Arc::new(InMemoryObjectLookup::from_objects([deploy, rs, pod]));

    let intake = IntakeOrchestrator::new(
        &policies(10),
        lookup,
        Arc::new(ManualClock::new(t0())),
        &IntakeConfig::default(),
    );
    let event = event();

    c.bench_function("evaluate", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(intake.evaluate(black_box(&event)).await) })
    });
}

criterion_group!(benches, bench_selector_matching, bench_rate_limiter, bench_evaluate);
criterion_main!(benches);
