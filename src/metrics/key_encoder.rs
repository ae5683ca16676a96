//! Canonical key encoding for label sets
//!
//! Two label sets with the same name/value pairs always encode to the same
//! key, whatever order the labels were inserted in.
//!
//! Key format: `name1=value1,name2=value2,...` with names in lexicographic
//! order. The characters `\`, `=` and `,` inside names and values are escaped
//! with a backslash, so the pair and name/value boundaries are unambiguous.
//!
//! Examples:
//! - `{proto: 6, From: 10.0.0.1}` → `From=10.0.0.1,proto=6`
//! - `{a: "1,b=2"}` → `a=1\,b\=2` (distinct from `{a: 1, b: 2}` → `a=1,b=2`)

use super::types::LabelSet;

const PAIR_SEPARATOR: char = ',';
const NAME_VALUE_SEPARATOR: char = '=';
const ESCAPE: char = '\\';

/// Encodes label sets into canonical store keys
pub struct SampleKeyEncoder;

impl SampleKeyEncoder {
    /// Encode a label set into its canonical key
    pub fn encode(labels: &LabelSet) -> String {
        let mut key = String::with_capacity(Self::estimate_len(labels));
        for (i, (name, value)) in labels.iter().enumerate() {
            if i > 0 {
                key.push(PAIR_SEPARATOR);
            }
            Self::push_escaped(&mut key, name);
            key.push(NAME_VALUE_SEPARATOR);
            Self::push_escaped(&mut key, value);
        }
        key
    }

    /// Decode a canonical key back into its label set
    ///
    /// Returns None if the key was not produced by [`SampleKeyEncoder::encode`].
    pub fn decode(key: &str) -> Option<LabelSet> {
        let mut labels = LabelSet::new();
        if key.is_empty() {
            return Some(labels);
        }

        let mut name = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = key.chars();

        while let Some(c) = chars.next() {
            match c {
                ESCAPE => {
                    let escaped = chars.next()?;
                    if in_value {
                        value.push(escaped);
                    } else {
                        name.push(escaped);
                    }
                }
                NAME_VALUE_SEPARATOR if !in_value => in_value = true,
                NAME_VALUE_SEPARATOR => return None,
                PAIR_SEPARATOR => {
                    if !in_value {
                        return None;
                    }
                    labels.insert(std::mem::take(&mut name), std::mem::take(&mut value));
                    in_value = false;
                }
                c if in_value => value.push(c),
                c => name.push(c),
            }
        }

        if !in_value {
            return None;
        }
        labels.insert(name, value);
        Some(labels)
    }

    fn push_escaped(key: &mut String, s: &str) {
        for c in s.chars() {
            if matches!(c, ESCAPE | NAME_VALUE_SEPARATOR | PAIR_SEPARATOR) {
                key.push(ESCAPE);
            }
            key.push(c);
        }
    }

    fn estimate_len(labels: &LabelSet) -> usize {
        labels
            .iter()
            .map(|(name, value)| name.len() + value.len() + 2)
            .sum()
    }
}
