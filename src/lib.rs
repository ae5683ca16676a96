//! NetFlow v5/v9 collector exposing flow counters as Prometheus metrics
//!
//! Flow records arriving over UDP are decoded, split into labels and counts,
//! and cached per label set with last-writer-wins semantics. Every scrape
//! renders the fresh part of the cache as gauges stamped with the time each
//! sample was observed.

pub mod config;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod observability;
pub mod production;

pub use config::{ConfigError, ExporterConfig, LogFormat};
pub use error::ExporterError;
pub use metrics::{LabelSet, Sample, SampleStore, SnapshotExporter};
pub use production::{ExporterServer, RunningExporter};
