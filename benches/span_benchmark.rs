/*!
 * Span Benchmarks
 *
 * Cost of the span lifecycle, identity derivation, and aggregation intake
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tracery::registry;
use tracery::{
    AggregationFactory, AggregationWorker, CallSite, KeyStrategy, SpanIdentity, SpanRecord,
    SpanStatus, TraceContext,
};

/// Keep the per-thread call tree from accumulating across iterations
const CLEANUP_INTERVAL: u32 = 8192;

fn quiet_registry() {
    registry::set_aggregation_worker(Arc::new(AggregationWorker::synchronous()));
}

fn bench_start_stop_cycle(c: &mut Criterion) {
    quiet_registry();
    c.bench_function("span_start_stop", |b| {
        let mut iterations = 0u32;
        b.iter(|| {
            let span = tracery::start(black_box("request")).unwrap();
            span.stop().unwrap();
            iterations += 1;
            if iterations % CLEANUP_INTERVAL == 0 {
                TraceContext::cleanup();
            }
        });
    });
    TraceContext::cleanup();
}

fn bench_nested_spans(c: &mut Criterion) {
    quiet_registry();
    let mut group = c.benchmark_group("nested_spans");

    for depth in [2usize, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let mut iterations = 0u32;
            b.iter(|| {
                let mut spans = Vec::with_capacity(depth);
                for _ in 0..depth {
                    spans.push(tracery::start(black_box("layer")).unwrap());
                }
                while let Some(span) = spans.pop() {
                    span.stop().unwrap();
                }
                iterations += 1;
                if iterations % CLEANUP_INTERVAL == 0 {
                    TraceContext::cleanup();
                }
            });
        });
    }

    group.finish();
    TraceContext::cleanup();
}

fn bench_identity_derivation(c: &mut Criterion) {
    let site = CallSite::new("bench.rs", 42, 9);
    let parent = SpanIdentity::derive(None, "root", &site);

    c.bench_function("identity_derive", |b| {
        b.iter(|| {
            black_box(SpanIdentity::derive(
                Some(&parent),
                black_box("lookup"),
                &site,
            ))
        });
    });
}

fn bench_aggregation_intake(c: &mut Criterion) {
    let worker = Arc::new(AggregationWorker::synchronous());
    worker
        .add_factory(AggregationFactory::execution("bench").with_strategy(KeyStrategy::ByName))
        .unwrap();
    worker.start();

    let record = Arc::new(SpanRecord {
        identity: SpanIdentity::from_bytes([3; 16]),
        name: "request".to_string(),
        status: SpanStatus::Stopped,
        start_millis: 0,
        duration_nanos: 1_250,
        own_duration_nanos: 1_250,
        depth: 1,
        lineage: Vec::new(),
        context: Vec::new(),
        debug_lines: Vec::new(),
        abort: None,
        foreign: false,
    });

    c.bench_function("aggregate_record", |b| {
        b.iter(|| worker.aggregate(black_box(Arc::clone(&record))));
    });
}

fn bench_snapshot_capture(c: &mut Criterion) {
    quiet_registry();
    let root = tracery::start("export").unwrap();
    for _ in 0..4 {
        let step = tracery::start("step").unwrap();
        let leaf = tracery::start("leaf").unwrap();
        leaf.stop().unwrap();
        step.stop().unwrap();
    }
    root.stop().unwrap();

    c.bench_function("snapshot_capture", |b| {
        b.iter(|| black_box(root.to_snapshot()));
    });
    TraceContext::cleanup();
}

criterion_group!(
    benches,
    bench_start_stop_cycle,
    bench_nested_spans,
    bench_identity_derivation,
    bench_aggregation_intake,
    bench_snapshot_capture
);

criterion_main!(benches);
