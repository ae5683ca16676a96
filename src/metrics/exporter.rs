//! Snapshot export: store → timestamped Prometheus gauges
//!
//! Every scrape takes a snapshot of the store (lock held only for the copy),
//! drops samples older than the TTL without deleting them, and renders one
//! point per count, stamped with the time the sample was observed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{self, LabelPair, MetricFamily, MetricType};
use prometheus::{Gauge, IntCounter, Opts};

use super::store::SampleStore;
use super::types::{unix_now_ms, unix_now_secs, LabelSet, FROM_LABEL, TEMPLATE_ID_LABEL};

pub const LAST_PROCESSED_NAME: &str = "netflow_last_processed";
pub const DROPPED_NAME: &str = "netflow_ingest_dropped_total";
const METRIC_PREFIX: &str = "netflow";

/// A rendered measurement ready for exposition
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub help: String,
    pub labels: LabelSet,
    pub value: f64,
    /// Observation time of the underlying sample, not the scrape time
    pub timestamp_ms: i64,
}

/// Static self-metrics of the ingest path
#[derive(Debug, Clone)]
pub struct IngestMetrics {
    last_processed: Gauge,
    dropped: IntCounter,
}

impl IngestMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let last_processed = Gauge::with_opts(Opts::new(
            LAST_PROCESSED_NAME,
            "Unix timestamp of the last processed netflow metric.",
        ))?;
        let dropped = IntCounter::with_opts(Opts::new(
            DROPPED_NAME,
            "Samples dropped because the ingest queue was full.",
        ))?;
        Ok(IngestMetrics {
            last_processed,
            dropped,
        })
    }

    /// Record a successful ingestion at the current wall clock
    pub fn mark_processed(&self) {
        self.last_processed.set(unix_now_secs());
    }

    pub fn inc_dropped(&self) {
        self.dropped.inc();
    }

    pub fn last_processed(&self) -> f64 {
        self.last_processed.get()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

/// Renders fresh store contents as metric points
#[derive(Debug, Clone)]
pub struct SnapshotExporter {
    store: Arc<SampleStore>,
    ttl: Duration,
}

impl SnapshotExporter {
    pub fn new(store: Arc<SampleStore>, ttl: Duration) -> Self {
        SnapshotExporter { store, ttl }
    }

    /// Render against the wall clock
    pub fn render(&self) -> Vec<MetricPoint> {
        self.render_at(unix_now_ms())
    }

    /// Render every non-expired sample as of `now_ms`
    pub fn render_at(&self, now_ms: i64) -> Vec<MetricPoint> {
        let snapshot = self.store.snapshot();

        let mut points = Vec::new();
        for sample in snapshot.iter().filter(|s| !s.is_expired(self.ttl, now_ms)) {
            for (field, value) in &sample.counts {
                points.push(MetricPoint {
                    name: metric_name(&sample.labels, field),
                    help: format!("netflow metric {}", field),
                    labels: sample.labels.clone(),
                    value: *value,
                    timestamp_ms: sample.observed_at_ms,
                });
            }
        }
        points
    }
}

/// Exposition name for one count of a sample:
/// `netflow_<From>[_TemplateID<id>]_<field>`, dots removed.
pub fn metric_name(labels: &LabelSet, field: &str) -> String {
    let from = labels.get(FROM_LABEL).unwrap_or_default();
    let raw = match labels.get(TEMPLATE_ID_LABEL) {
        Some(template_id) if !template_id.is_empty() => format!(
            "{}_{}_TemplateID{}_{}",
            METRIC_PREFIX, from, template_id, field
        ),
        _ => format!("{}_{}_{}", METRIC_PREFIX, from, field),
    };
    sanitize_metric_name(&raw)
}

fn sanitize_metric_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '.')
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Group points into gauge families, one per metric name
pub fn into_metric_families(points: Vec<MetricPoint>) -> Vec<MetricFamily> {
    let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for point in points {
        let family = families.entry(point.name.clone()).or_insert_with(|| {
            let mut family = MetricFamily::default();
            family.set_name(point.name.clone());
            family.set_help(point.help.clone());
            family.set_field_type(MetricType::GAUGE);
            family
        });

        let pairs: Vec<LabelPair> = point
            .labels
            .iter()
            .map(|(name, value)| {
                let mut pair = LabelPair::default();
                pair.set_name(name.to_string());
                pair.set_value(value.to_string());
                pair
            })
            .collect();

        let mut gauge = proto::Gauge::default();
        gauge.set_value(point.value);

        let mut metric = proto::Metric::default();
        metric.set_label(pairs.into());
        metric.set_gauge(gauge);
        metric.set_timestamp_ms(point.timestamp_ms);
        family.mut_metric().push(metric);
    }

    families.into_values().collect()
}

/// Prometheus collector combining the ingest self-metrics and the sample snapshot
pub struct FlowCollector {
    exporter: SnapshotExporter,
    ingest: IngestMetrics,
}

impl FlowCollector {
    pub fn new(exporter: SnapshotExporter, ingest: IngestMetrics) -> Self {
        FlowCollector { exporter, ingest }
    }
}

impl Collector for FlowCollector {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = self.ingest.last_processed.desc();
        descs.extend(self.ingest.dropped.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = self.ingest.last_processed.collect();
        families.extend(self.ingest.dropped.collect());
        families.extend(into_metric_families(self.exporter.render()));
        families
    }
}
