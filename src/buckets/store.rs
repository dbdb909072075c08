//! Bucket Store
//!
//! Fixed-width time windows keyed by their start second. The window for
//! timestamp `t` spans `[floor(t / size) * size, + size)`. Windows are created
//! on demand and kept for the whole run.

use super::key::MetricKey;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};

/// A numeric result with the short label used by expression references
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    pub value: f64,
    pub label: String,
}

impl Value {
    pub fn new(value: f64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// One time window
#[derive(Debug, Clone, Serialize)]
pub struct Bucket {
    #[serde(rename = "timestamp")]
    start: i64,
    #[serde(skip)]
    size: i64,
    values: HashMap<MetricKey, Value>,
    /// label → key of the most recent write under that label
    #[serde(skip)]
    shortcuts: HashMap<String, MetricKey>,
}

impl Bucket {
    fn new(start: i64, size: i64) -> Self {
        Self {
            start,
            size,
            values: HashMap::new(),
            shortcuts: HashMap::new(),
        }
    }

    /// First second covered by this window
    pub fn start(&self) -> i64 {
        self.start
    }

    /// First second after this window, clamped to `i64::MAX`
    pub fn end(&self) -> i64 {
        self.start.saturating_add(self.size)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp < self.end()
    }

    /// Store a value, replacing any earlier value for the same key
    pub fn set(&mut self, key: &MetricKey, value: Value) {
        self.shortcuts.insert(value.label.clone(), key.clone());
        self.values.insert(key.clone(), value);
    }

    pub fn get(&self, key: &MetricKey) -> Option<&Value> {
        self.values.get(key)
    }

    /// Find a value by its short label rather than its full key
    pub fn value_by_shortcut(&self, label: &str) -> Option<&Value> {
        self.shortcuts
            .get(label)
            .and_then(|key| self.values.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered collection of windows of one fixed width
#[derive(Debug, Clone)]
pub struct Buckets {
    size: i64,
    buckets: BTreeMap<i64, Bucket>,
}

impl Buckets {
    /// Create an empty store; widths below one second are raised to one
    pub fn new(bucket_size: i64) -> Self {
        Self {
            size: bucket_size.max(1),
            buckets: BTreeMap::new(),
        }
    }

    pub fn bucket_size(&self) -> i64 {
        self.size
    }

    /// Start of the window covering `timestamp`
    ///
    /// The first window is clamped to `i64::MIN` when its aligned start does
    /// not fit.
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        timestamp.saturating_sub(timestamp.rem_euclid(self.size))
    }

    /// Write `value` for `key` into the window covering `timestamp`
    pub fn add(&mut self, key: &MetricKey, label: &str, timestamp: i64, value: f64) {
        self.bucket_mut(timestamp).set(key, Value::new(value, label));
    }

    /// Window covering `timestamp`, created if necessary
    pub fn get_bucket(&mut self, timestamp: i64) -> &Bucket {
        self.bucket_mut(timestamp)
    }

    /// Window starting at `start`, without creating it
    pub fn bucket_at(&self, start: i64) -> Option<&Bucket> {
        self.buckets.get(&start)
    }

    /// Window covering `timestamp`, without creating it
    pub fn find(&self, timestamp: i64) -> Option<&Bucket> {
        self.buckets.get(&self.bucket_start(timestamp))
    }

    fn bucket_mut(&mut self, timestamp: i64) -> &mut Bucket {
        let start = self.bucket_start(timestamp);
        let size = self.size;
        self.buckets
            .entry(start)
            .or_insert_with(|| Bucket::new(start, size))
    }

    /// Windows in time order
    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.values()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl Serialize for Buckets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.buckets.values())
    }
}
