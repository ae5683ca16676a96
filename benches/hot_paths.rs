//! Hot path benchmarks for profiling-driven optimization.
//!
//! Run with: `cargo bench --bench hot_paths`
//! Compare baselines: `cargo bench --bench hot_paths -- --baseline main`
//!
//! These benchmarks cover the per-record and per-scrape paths:
//! canonical key encoding, store upsert, snapshot, rendering and
//! v5 decode + classification.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

#[path = "../tests/common/mod.rs"]
mod common;

use common::V5Flow;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use netflow_exporter::flow::{FlowDecoder, NetflowDecoder};
use netflow_exporter::metrics::{
    into_metric_families, FieldClassifier, LabelSet, Sample, SampleKeyEncoder, SampleStore,
    SnapshotExporter,
};

fn flow_labels(i: usize) -> LabelSet {
    LabelSet::from_pairs(&[
        ("From", "192.168.1.1"),
        ("NetflowVersion", "9"),
        ("TemplateID", "256"),
        ("sourceIPv4Address", &format!("10.0.{}.{}", (i >> 8) & 0xff, i & 0xff)),
        ("destinationIPv4Address", "10.1.0.1"),
        ("protocolIdentifier", "6"),
        ("destinationTransportPort", "443"),
    ])
}

fn flow_sample(i: usize, observed_at_ms: i64) -> Sample {
    Sample::new(flow_labels(i), BTreeMap::new(), observed_at_ms)
        .with_count("packetDeltaCount", 10.0)
        .with_count("octetDeltaCount", 1500.0)
}

fn filled_store(entries: usize) -> Arc<SampleStore> {
    let store = Arc::new(SampleStore::new());
    for i in 0..entries {
        store.upsert(flow_sample(i, 1_000));
    }
    store
}

/// SampleKeyEncoder::encode - runs once per upsert
fn bench_key_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_encode");
    group.throughput(Throughput::Elements(1));

    let labels = flow_labels(42);
    group.bench_function("seven_labels", |b| {
        b.iter(|| SampleKeyEncoder::encode(black_box(&labels)))
    });

    group.finish();
}

/// SampleStore::upsert - new keys, replacements and stale no-ops
fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");
    group.throughput(Throughput::Elements(1));

    group.bench_function("replace", |b| {
        let store = SampleStore::new();
        let mut ts = 0i64;
        b.iter(|| {
            ts += 1;
            store.upsert(black_box(flow_sample(7, ts)))
        })
    });

    group.bench_function("stale", |b| {
        let store = SampleStore::new();
        store.upsert(flow_sample(7, i64::MAX));
        b.iter(|| store.upsert(black_box(flow_sample(7, 1))))
    });

    group.bench_function("insert", |b| {
        let store = SampleStore::new();
        let mut i = 0usize;
        b.iter(|| {
            i += 1;
            store.upsert(black_box(flow_sample(i, 1)))
        })
    });

    group.finish();
}

/// SampleStore::snapshot - the only part of a scrape that holds the lock
fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for entries in [100, 1_000, 10_000] {
        let store = filled_store(entries);
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &store, |b, store| {
            b.iter(|| store.snapshot())
        });
    }

    group.finish();
}

/// Full scrape rendering: filter, name, group into families
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for entries in [100, 1_000, 10_000] {
        let exporter = SnapshotExporter::new(filled_store(entries), Duration::from_secs(300));
        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &exporter, |b, exporter| {
            b.iter(|| into_metric_families(exporter.render_at(black_box(2_000))))
        });
    }

    group.finish();
}

fn v5_packet(records: usize) -> Vec<u8> {
    let flows: Vec<V5Flow> = (0..records)
        .map(|i| V5Flow::new([10, 0, 0, i as u8], [10, 1, 0, 1], 10, 1500))
        .collect();
    common::v5_packet(&flows)
}

/// Decode + classify one full v5 datagram (30 records)
fn bench_decode_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_classify");
    group.throughput(Throughput::Elements(30));

    let packet = v5_packet(30);
    let classifier = FieldClassifier::new("Count$", "Time").unwrap();
    let from = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1));

    group.bench_function("v5_30_records", |b| {
        let mut decoder = NetflowDecoder::new();
        b.iter(|| {
            let records = decoder.decode(black_box(&packet)).unwrap();
            records
                .iter()
                .filter_map(|r| classifier.classify(r, from, 1_000))
                .count()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_key_encode,
    bench_upsert,
    bench_snapshot,
    bench_render,
    bench_decode_classify,
);

criterion_main!(benches);
