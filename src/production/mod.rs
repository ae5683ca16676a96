//! Runtime wiring: UDP listener → ingest pipeline → store ← sweeper, HTTP scrape endpoint

mod ingest;
mod listener;
mod server;
mod ttl_manager;

pub use ingest::{BackpressurePolicy, IngestError, IngestHandle, IngestPipeline, Submission};
pub use listener::FlowListener;
pub use server::{encode_metrics, shutdown_signal, ExporterServer, RunningExporter};
pub use ttl_manager::ExpirySweeper;
