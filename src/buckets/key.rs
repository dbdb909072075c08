//! Metric identity
//!
//! A `MetricKey` is a metric name plus a canonical `Tags` set. Keys are
//! reference counted so that a `KeyCache` can hand out one shared instance per
//! distinct identity; equality still falls back to comparing contents.

use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Replace characters the store does not accept in tag keys and values
///
/// Allowed: ASCII letters, digits, `-`, `_`, `.`, `/`. Anything else becomes `-`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Order-independent, sanitized tag set
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Empty tag set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Canonicalize the tags of a result record
    pub fn from_raw(raw: &HashMap<String, String>) -> Self {
        Self(
            raw.iter()
                .map(|(k, v)| (sanitize(k), sanitize(v)))
                .collect(),
        )
    }

    /// Query filter form of specification tags
    ///
    /// Multiple accepted values for one key are sorted and joined with `|`,
    /// the OpenTSDB OR syntax. Use `TagFilter` to match result tags.
    pub fn from_filters(filters: &HashMap<String, Vec<String>>) -> Self {
        Self(
            filters
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(k, values)| {
                    let mut values: Vec<String> = values.iter().map(|v| sanitize(v)).collect();
                    values.sort();
                    values.dedup();
                    (sanitize(k), values.join("|"))
                })
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
            first = false;
        }
        Ok(())
    }
}

/// Tag constraints of a metric specification, matched against result tags
///
/// A tag set matches when it carries every filtered key with one of the
/// accepted values. Extra tags on the series are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter(BTreeMap<String, BTreeSet<String>>);

impl TagFilter {
    pub fn from_filters(filters: &HashMap<String, Vec<String>>) -> Self {
        Self(
            filters
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(k, values)| (sanitize(k), values.iter().map(|v| sanitize(v)).collect()))
                .collect(),
        )
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        self.0
            .iter()
            .all(|(k, accepted)| tags.get(k).is_some_and(|v| accepted.contains(v)))
    }

    /// Number of constrained keys
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct KeyInner {
    name: String,
    tags: Tags,
}

/// Identity of one series: metric name and canonical tags
#[derive(Debug, Clone)]
pub struct MetricKey(Arc<KeyInner>);

impl MetricKey {
    pub fn new(name: impl Into<String>, tags: Tags) -> Self {
        Self(Arc::new(KeyInner {
            name: name.into(),
            tags,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn tags(&self) -> &Tags {
        &self.0.tags
    }

    /// True when both keys are the same interned instance
    pub fn same_instance(&self, other: &MetricKey) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for MetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.same_instance(other) || self.0 == other.0
    }
}

impl Eq for MetricKey {}

impl Hash for MetricKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.tags.is_empty() {
            write!(f, "{}", self.0.name)
        } else {
            write!(f, "{}{{{}}}", self.0.name, self.0.tags)
        }
    }
}

impl Serialize for MetricKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
