//! Result records returned by the remote store
//!
//! One `QueryResult` per series: the metric, its tags and the data points
//! keyed by epoch second. Failed sub-queries are represented by a record with
//! an ERROR status and no points.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A decoded series from the store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregate_tags: Vec<String>,
    /// Epoch second → value
    #[serde(default)]
    pub dps: BTreeMap<i64, DataPointValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<QueryStatus>,
}

impl QueryResult {
    /// Create an empty record for a metric
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            ..Default::default()
        }
    }

    /// Create a record standing in for a failed sub-query
    pub fn error(metric: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            status: Some(QueryStatus::error(message)),
            ..Default::default()
        }
    }

    /// Builder method: add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Builder method: add a data point
    pub fn point(mut self, timestamp: i64, value: f64) -> Self {
        self.dps.insert(timestamp, DataPointValue::Number(value));
        self
    }

    /// True when the record stands in for a failed sub-query
    pub fn is_error(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.status == StatusKind::Error)
            .unwrap_or(false)
    }

    /// Short description for debug logging
    pub fn debug_string(&self) -> String {
        format!(
            "metric={} tags={:?} points={} status={:?}",
            self.metric,
            self.tags,
            self.dps.len(),
            self.status.as_ref().map(|s| s.status)
        )
    }
}

/// A data point value; the store sends either strings or numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPointValue {
    Number(f64),
    Text(String),
    /// `null`, which is also how non-finite numbers serialize
    Missing,
}

impl DataPointValue {
    /// Numeric value, if the text parses
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Missing => None,
        }
    }
}

/// Outcome of one sub-query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Ok,
    Error,
}

/// Status attached to a result record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryStatus {
    pub status: StatusKind,
    #[serde(default)]
    pub message: String,
}

impl QueryStatus {
    pub fn ok() -> Self {
        Self {
            status: StatusKind::Ok,
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Error,
            message: message.into(),
        }
    }
}
