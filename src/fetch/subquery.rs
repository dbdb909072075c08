//! OpenTSDB query bodies
//!
//! A `QueryRequest` becomes one `OpenTsdbQuery` holding a sub-query per
//! fetched series; `separate` splits it so every sub-query can run on its
//! own worker.

use super::downsample::apply_multiplier;
use crate::buckets::Tags;
use crate::model::{MetricSpecification, QueryRequest, RateOptions, NOW};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregator used when a specification leaves it out
pub const DEFAULT_AGGREGATOR: &str = "avg";

/// Rate conversion options in the store's wire format
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateOption {
    pub counter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_max: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_value: Option<u64>,
}

impl From<&RateOptions> for RateOption {
    fn from(opts: &RateOptions) -> Self {
        Self {
            counter: opts.counter,
            counter_max: opts.counter_max,
            reset_value: opts.reset_value,
        }
    }
}

/// One series request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubQuery {
    pub aggregator: String,
    pub metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downsample: Option<String>,
    pub rate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_options: Option<RateOption>,
    /// Sanitized filters; several values for one key are OR-ed with `|`
    pub tags: BTreeMap<String, String>,
}

impl SubQuery {
    /// Build the sub-query for a fetched specification
    ///
    /// Returns `None` for derived specifications, which have nothing to fetch.
    pub fn from_spec(spec: &MetricSpecification) -> Option<Self> {
        let metric = spec.metric_name()?;
        let aggregator = spec
            .aggregator
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_AGGREGATOR);

        Some(Self {
            aggregator: aggregator.to_string(),
            metric: metric.to_string(),
            downsample: spec.downsample.clone().filter(|d| !d.trim().is_empty()),
            rate: spec.rate,
            rate_options: spec.rate_options.as_ref().map(RateOption::from),
            tags: Tags::from_filters(&spec.tags)
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

/// Request body for `POST /api/query`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenTsdbQuery {
    pub start: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    pub queries: Vec<SubQuery>,
}

impl OpenTsdbQuery {
    /// Build the store query for a request
    ///
    /// Global tags are merged into each specification and a global downsample,
    /// scaled by the multiplier, replaces every per-series downsample.
    pub fn from_request(request: &QueryRequest, default_multiplier: f64) -> Self {
        let end = Some(request.end.trim())
            .filter(|e| !e.is_empty() && *e != NOW)
            .map(str::to_string);

        let applied = request.downsample.as_deref().and_then(|ds| {
            let multiplier = request.downsample_multiplier.unwrap_or(default_multiplier);
            let applied = apply_multiplier(Some(ds), multiplier);
            tracing::info!(
                downsample = ds,
                multiplier,
                applied = ?applied,
                "Applying global downsample"
            );
            applied
        });

        let queries = request
            .resolved_metrics()
            .iter()
            .filter_map(SubQuery::from_spec)
            .map(|mut sub| {
                if let Some(global) = &applied {
                    if let Some(old) = sub.downsample.as_deref() {
                        tracing::info!(
                            metric = %sub.metric,
                            series = old,
                            global = %global,
                            "Overriding series downsample with global downsample"
                        );
                    }
                    sub.downsample = Some(global.clone());
                }
                sub
            })
            .collect();

        Self {
            start: request.start.clone(),
            end,
            queries,
        }
    }

    /// One query per sub-query, sharing the time range
    pub fn separate(&self) -> Vec<OpenTsdbQuery> {
        self.queries
            .iter()
            .map(|sub| OpenTsdbQuery {
                start: self.start.clone(),
                end: self.end.clone(),
                queries: vec![sub.clone()],
            })
            .collect()
    }

    /// Metric of the first sub-query, used to label failures
    pub fn metric(&self) -> &str {
        self.queries.first().map(|q| q.metric.as_str()).unwrap_or_default()
    }
}
