//! Flat per-poll event emitted for one JVM.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Suffix of the derived delta field of an integer counter.
pub const DIFF_SUFFIX: &str = "/diff";

/// Value of one event field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Long(i64),
}

/// One poll result: process id, capture time, and counter fields keyed by
/// hierarchical name.
///
/// Serializes flat: `{"pid": .., "@timestamp": .., "java/threads/live": 12, ..}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub pid: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Event {
    pub fn new(pid: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            pid: pid.into(),
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn long(&self, name: &str) -> Option<i64> {
        match self.fields.get(name) {
            Some(FieldValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Delta of `name` since the previous poll, if one was emitted.
    pub fn diff(&self, name: &str) -> Option<i64> {
        self.long(&format!("{}{}", name, DIFF_SUFFIX))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of counter fields (pid and timestamp excluded).
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serializes the event as a single JSON line (no trailing newline).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
