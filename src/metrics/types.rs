//! Core sample types for the flow cache

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::key_encoder::SampleKeyEncoder;

/// Label carrying the address of the exporter that sent the record
pub const FROM_LABEL: &str = "From";
/// Label carrying the template id of a v9 data record
pub const TEMPLATE_ID_LABEL: &str = "TemplateID";
/// Label carrying the NetFlow version of the packet
pub const VERSION_LABEL: &str = "NetflowVersion";

/// A set of labels (name/value pairs) identifying a sample.
/// Labels are stored in sorted order so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    labels: BTreeMap<String, String>,
}

impl LabelSet {
    /// Create an empty LabelSet
    pub fn new() -> Self {
        LabelSet {
            labels: BTreeMap::new(),
        }
    }

    /// Create LabelSet from slice of (name, value) tuples
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        pairs.iter().copied().collect()
    }

    /// Insert a label, replacing any previous value for the same name
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(name.into(), value.into());
    }

    /// Get a specific label value
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    /// Iterate labels in lexicographic name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical identity of this label set
    pub fn canonical_key(&self) -> String {
        SampleKeyEncoder::encode(self)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LabelSet {
            labels: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A measurement: identity labels, named counters and the time it was observed
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Identity dimensions (addresses, ports, protocol, metadata)
    pub labels: LabelSet,

    /// Metric field name to value (e.g. packetDeltaCount, octetDeltaCount)
    pub counts: BTreeMap<String, f64>,

    /// Milliseconds since the Unix epoch
    pub observed_at_ms: i64,
}

impl Sample {
    pub fn new(labels: LabelSet, counts: BTreeMap<String, f64>, observed_at_ms: i64) -> Self {
        Sample {
            labels,
            counts,
            observed_at_ms,
        }
    }

    /// Add a single count, builder style
    pub fn with_count(mut self, name: impl Into<String>, value: f64) -> Self {
        self.counts.insert(name.into(), value);
        self
    }

    /// Age of the sample at `now_ms`. Samples from the future have age zero.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.observed_at_ms).max(0)
    }

    /// True once `now - observed_at_ms >= ttl`
    pub fn is_expired(&self, ttl: Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.observed_at_ms) >= ttl_millis(ttl)
    }
}

/// TTL in milliseconds, saturated to i64
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}

/// Current wall clock in milliseconds since the Unix epoch
pub fn unix_now_ms() -> i64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
}

/// Current wall clock in fractional seconds since the Unix epoch
pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
