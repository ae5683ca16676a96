//! Sample store: latest sample per canonical key
//!
//! The map is guarded by a single mutex. Every operation holds the lock only
//! for the map access itself; key encoding happens before the lock is taken
//! and snapshots copy `Arc`s, so no rendering or I/O ever runs under it.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::key_encoder::SampleKeyEncoder;
use super::types::{ttl_millis, Sample};

/// Result of [`SampleStore::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entry existed for the key
    Inserted,
    /// An older entry was replaced
    Replaced,
    /// An entry at least as new already existed; nothing changed
    Stale,
}

/// Latest-sample-per-identity cache
#[derive(Debug, Default)]
pub struct SampleStore {
    entries: Mutex<HashMap<String, Arc<Sample>>>,
}

impl SampleStore {
    pub fn new() -> Self {
        SampleStore {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Insert the sample, or replace the existing entry if this one is strictly newer
    pub fn upsert(&self, sample: Sample) -> UpsertOutcome {
        let key = SampleKeyEncoder::encode(&sample.labels);
        let sample = Arc::new(sample);

        let mut entries = self.entries.lock();
        match entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(sample);
                UpsertOutcome::Inserted
            }
            Entry::Occupied(mut slot) if slot.get().observed_at_ms < sample.observed_at_ms => {
                slot.insert(sample);
                UpsertOutcome::Replaced
            }
            Entry::Occupied(_) => UpsertOutcome::Stale,
        }
    }

    /// Remove every entry with `now - observed_at_ms >= ttl`, returning how many were removed
    pub fn sweep(&self, ttl: Duration, now_ms: i64) -> usize {
        let ttl_ms = ttl_millis(ttl);
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, sample| now_ms.saturating_sub(sample.observed_at_ms) < ttl_ms);
        before - entries.len()
    }

    /// Point-in-time copy of every stored sample, fresh or stale
    pub fn snapshot(&self) -> Vec<Arc<Sample>> {
        let entries = self.entries.lock();
        entries.values().cloned().collect()
    }

    /// Look up the current entry for a canonical key
    pub fn get(&self, key: &str) -> Option<Arc<Sample>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
