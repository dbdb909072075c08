//! Metric specifications and query requests
//!
//! A `MetricSpecification` describes one requested series. Specifications
//! that name a `metric` are fetched from the store; specifications that only
//! carry an `expression` are derived values computed per bucket from the
//! fetched series.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// End time marker meaning "up to the present"
pub const NOW: &str = "now";

/// One requested series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpecification {
    /// Label used to reference this series from expressions
    #[serde(default)]
    pub name: String,
    /// Metric name in the store (absent for derived values)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    /// RPN expression applied to each point, or computed per bucket
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Store-side aggregator (e.g. "avg", "sum")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
    /// Store-side downsample (e.g. "5m-avg")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downsample: Option<String>,
    /// Whether the store should convert the series to a rate
    #[serde(default)]
    pub rate: bool,
    /// Counter options for rate conversion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_options: Option<RateOptions>,
    /// Tag filters, each key mapping to the accepted values
    #[serde(default)]
    pub tags: HashMap<String, Vec<String>>,
}

impl MetricSpecification {
    /// Create a fetched series for a store metric
    pub fn metric(metric: impl Into<String>) -> Self {
        let metric = metric.into();
        Self {
            name: metric.clone(),
            metric: Some(metric),
            ..Default::default()
        }
    }

    /// Create a derived value computed from an expression
    pub fn derived(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: Some(expression.into()),
            ..Default::default()
        }
    }

    /// Builder method: set the reference label
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method: set the per-point expression
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// Builder method: add a tag filter value
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.entry(key.into()).or_default().push(value.into());
        self
    }

    /// The store metric, if this specification is fetched
    pub fn metric_name(&self) -> Option<&str> {
        self.metric
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    /// The trimmed expression, or `None` when blank
    pub fn expression(&self) -> Option<&str> {
        self.expression
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Name used for the series key: the store metric, else the label
    pub fn key_name(&self) -> &str {
        self.metric_name().unwrap_or(&self.name)
    }

    /// Label used for reference lookups: the name, else the store metric
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            self.metric_name().unwrap_or_default()
        } else {
            self.name.trim()
        }
    }

    /// True for expression-only specifications that are never fetched
    pub fn is_derived(&self) -> bool {
        self.metric_name().is_none() && self.expression().is_some()
    }
}

/// Select the derived (expression-only) specifications
pub fn value_filter(specs: &[MetricSpecification]) -> Vec<&MetricSpecification> {
    specs.iter().filter(|s| s.is_derived()).collect()
}

/// Counter options for rate conversion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOptions {
    #[serde(default)]
    pub counter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_max: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_value: Option<u64>,
}

/// A full query: time range, global settings and requested series
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Start time in any format the store accepts (e.g. "1h-ago")
    pub start: String,
    /// End time; "now" leaves it open
    #[serde(default = "default_end")]
    pub end: String,
    /// Global downsample overriding per-series downsample
    #[serde(default)]
    pub downsample: Option<String>,
    /// Divides the downsample interval to raise resolution
    #[serde(default)]
    pub downsample_multiplier: Option<f64>,
    /// Bucket width in seconds
    #[serde(default)]
    pub bucket_size: Option<i64>,
    /// Tags applied to every series that does not set the key itself
    #[serde(default)]
    pub tags: HashMap<String, Vec<String>>,
    /// Requested series
    pub metrics: Vec<MetricSpecification>,
}

fn default_end() -> String {
    NOW.to_string()
}

impl QueryRequest {
    /// Create a request over the given series
    pub fn new(start: impl Into<String>, metrics: Vec<MetricSpecification>) -> Self {
        Self {
            start: start.into(),
            end: default_end(),
            downsample: None,
            downsample_multiplier: None,
            bucket_size: None,
            tags: HashMap::new(),
            metrics,
        }
    }

    /// Builder method: set the bucket width
    pub fn bucket_size(mut self, secs: i64) -> Self {
        self.bucket_size = Some(secs);
        self
    }

    /// Builder method: set the global downsample
    pub fn downsample(mut self, downsample: impl Into<String>) -> Self {
        self.downsample = Some(downsample.into());
        self
    }

    /// Specifications with global tags merged in
    pub fn resolved_metrics(&self) -> Vec<MetricSpecification> {
        self.metrics
            .iter()
            .cloned()
            .map(|mut spec| {
                for (key, values) in &self.tags {
                    spec.tags
                        .entry(key.clone())
                        .or_insert_with(|| values.clone());
                }
                spec
            })
            .collect()
    }
}
