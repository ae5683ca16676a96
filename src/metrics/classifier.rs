//! Field classification: decoded flow record → sample
//!
//! Each field of a record becomes a metric (its name matches the include
//! pattern and its value is numeric), a label (everything else), or is dropped
//! (its name matches the exclude pattern). Patterns are compiled once.

use std::collections::BTreeMap;
use std::net::IpAddr;

use regex::Regex;
use tracing::debug;

use super::types::{LabelSet, Sample, FROM_LABEL, TEMPLATE_ID_LABEL, VERSION_LABEL};
use crate::flow::FlowRecord;

/// Error compiling a classification pattern
#[derive(Debug, Clone)]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid pattern '{}': {}", self.pattern, self.reason)
    }
}

impl std::error::Error for PatternError {}

/// Splits record fields into labels and counts
#[derive(Debug, Clone)]
pub struct FieldClassifier {
    include: Regex,
    exclude: Option<Regex>,
}

impl FieldClassifier {
    /// Compile the include and exclude patterns. An empty exclude pattern excludes nothing.
    pub fn new(include: &str, exclude: &str) -> Result<Self, PatternError> {
        let include = compile(include)?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(compile(exclude)?)
        };
        Ok(FieldClassifier { include, exclude })
    }

    /// Turn a record into a sample, or None when it has no counts or no labels
    pub fn classify(&self, record: &FlowRecord, from: IpAddr, observed_at_ms: i64) -> Option<Sample> {
        let mut labels = LabelSet::new();
        let mut counts = BTreeMap::new();

        for field in &record.fields {
            if self.is_excluded(&field.name) {
                continue;
            }
            if self.include.is_match(&field.name) {
                if let Some(value) = field.value.as_f64() {
                    counts.insert(field.name.clone(), value);
                    continue;
                }
                debug!(field = %field.name, "non-numeric field matched include, keeping as label");
            }
            labels.insert(field.name.clone(), field.value.to_string());
        }

        if counts.is_empty() || labels.is_empty() {
            return None;
        }

        labels.insert(FROM_LABEL, from.to_string());
        if let Some(template_id) = record.template_id {
            labels.insert(TEMPLATE_ID_LABEL, template_id.to_string());
        }
        labels.insert(VERSION_LABEL, record.version.to_string());

        Some(Sample::new(labels, counts, observed_at_ms))
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude
            .as_ref()
            .map(|exclude| exclude.is_match(name))
            .unwrap_or(false)
    }
}

fn compile(pattern: &str) -> Result<Regex, PatternError> {
    Regex::new(pattern).map_err(|e| PatternError {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
