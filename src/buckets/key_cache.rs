//! Key Cache - interning of metric identities for one processing run
//!
//! `put` registers a key and returns the canonical instance; `get` looks one
//! up and, when the identity has never been registered, still returns a
//! freshly built key so callers always get something usable.

use super::key::{MetricKey, Tags};
use std::collections::HashSet;

/// Interns `MetricKey`s for the lifetime of one run
#[derive(Debug, Default)]
pub struct KeyCache {
    keys: HashSet<MetricKey>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the key if absent and return the canonical instance
    pub fn put(&mut self, key: MetricKey) -> MetricKey {
        if let Some(existing) = self.keys.get(&key) {
            return existing.clone();
        }
        self.keys.insert(key.clone());
        key
    }

    /// Build and intern a key from its parts
    pub fn intern(&mut self, name: &str, tags: &Tags) -> MetricKey {
        let probe = MetricKey::new(name, tags.clone());
        self.put(probe)
    }

    /// Look up a key without registering it
    pub fn get(&self, name: &str, tags: &Tags) -> MetricKey {
        let probe = MetricKey::new(name, tags.clone());
        match self.keys.get(&probe) {
            Some(existing) => existing.clone(),
            None => probe,
        }
    }

    pub fn contains(&self, name: &str, tags: &Tags) -> bool {
        self.keys.contains(&MetricKey::new(name, tags.clone()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
