//! Ingest pipeline: many producers, one store writer
//!
//! ```text
//! Listener 1 ──┐
//! Listener 2 ──┤──► bounded queue ──► IngestPipeline ──► SampleStore::upsert
//! Listener 3 ──┘
//! ```
//!
//! ## Backpressure
//!
//! - **Block**: `submit` waits for queue capacity, throttling the producer
//! - **Drop**: `submit` never waits; a full queue drops the sample and bumps
//!   `netflow_ingest_dropped_total`

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace};

use crate::metrics::{IngestMetrics, Sample, SampleStore, UpsertOutcome};

/// What a producer does when the ingest queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    #[default]
    Block,
    Drop,
}

impl std::str::FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "drop" => Ok(BackpressurePolicy::Drop),
            other => Err(format!("unknown backpressure policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    /// The pipeline has stopped and accepts no more samples
    Closed,
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Closed => write!(f, "Ingest pipeline closed"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Fate of a submitted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    Dropped,
}

/// Producer side of the pipeline; cheap to clone, one per producer task
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<Sample>,
    policy: BackpressurePolicy,
    metrics: IngestMetrics,
}

impl IngestHandle {
    pub async fn submit(&self, sample: Sample) -> Result<Submission, IngestError> {
        match self.policy {
            BackpressurePolicy::Block => self
                .tx
                .send(sample)
                .await
                .map(|_| Submission::Queued)
                .map_err(|_| IngestError::Closed),
            BackpressurePolicy::Drop => match self.tx.try_send(sample) {
                Ok(()) => Ok(Submission::Queued),
                Err(TrySendError::Full(_)) => {
                    self.metrics.inc_dropped();
                    debug!("ingest queue full, dropping sample");
                    Ok(Submission::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(IngestError::Closed),
            },
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }
}

/// Single consumer applying queued samples to the store
pub struct IngestPipeline {
    store: Arc<SampleStore>,
    rx: mpsc::Receiver<Sample>,
    metrics: IngestMetrics,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<SampleStore>,
        capacity: usize,
        policy: BackpressurePolicy,
        metrics: IngestMetrics,
    ) -> (Self, IngestHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = IngestHandle {
            tx,
            policy,
            metrics: metrics.clone(),
        };
        let pipeline = IngestPipeline { store, rx, metrics };
        (pipeline, handle)
    }

    /// Run until every handle has been dropped
    pub async fn run(mut self) {
        while let Some(sample) = self.rx.recv().await {
            self.apply(sample);
        }
        info!("Ingest pipeline stopped");
    }

    fn apply(&self, sample: Sample) {
        let outcome = self.store.upsert(sample);
        if outcome == UpsertOutcome::Stale {
            trace!("ignored sample no newer than stored entry");
        }
        self.metrics.mark_processed();
    }
}
