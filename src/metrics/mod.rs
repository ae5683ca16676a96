//! Flow Sample Aggregation Module
//!
//! This module holds the freshness-bounded sample cache behind the exporter:
//!
//! - **Canonical keys** so label sets built in any order share one identity
//! - **Last-writer-wins by timestamp** so late or duplicate samples never regress an entry
//! - **TTL filtering at export time** on top of the periodic sweep
//! - **Prometheus collection** with producer-supplied timestamps

mod types;
mod key_encoder;
mod classifier;
mod store;
mod exporter;

pub use types::{
    unix_now_ms, unix_now_secs, LabelSet, Sample, FROM_LABEL, TEMPLATE_ID_LABEL, VERSION_LABEL,
};
pub use key_encoder::SampleKeyEncoder;
pub use classifier::{FieldClassifier, PatternError};
pub use store::{SampleStore, UpsertOutcome};
pub use exporter::{
    into_metric_families, metric_name, FlowCollector, IngestMetrics, MetricPoint,
    SnapshotExporter, DROPPED_NAME, LAST_PROCESSED_NAME,
};
