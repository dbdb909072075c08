//! Metric Service
//!
//! Ties the pieces together for one request:
//!
//! ```text
//! QueryRequest → validate → sub-queries → FetchCoordinator → records
//!              → one JSON line → ResultProcessor → QueryOutcome
//! ```

use crate::buckets::Buckets;
use crate::calc::{parse_expression, CalcError};
use crate::config::{Config, QueryConfig};
use crate::fetch::{FetchCoordinator, FetchError, OpenTsdbClient, OpenTsdbQuery, SubQueryExecutor};
use crate::model::{QueryRequest, QueryResult, QueryStatus};
use crate::processor::{decode_stream, ProcessError, ResultProcessor};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;
use thiserror::Error;

/// Errors that abort a whole request
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid expression for '{name}': {source}")]
    Expression {
        name: String,
        #[source]
        source: CalcError,
    },

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServiceError {
    /// True when the caller sent something unusable
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::InvalidRequest(_) | ServiceError::Expression { .. }
        )
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Fetch outcome of one requested series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatus {
    pub metric: String,
    #[serde(flatten)]
    pub status: QueryStatus,
}

/// One bucket flattened for output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

/// Buckets produced for a request plus the status of every fetched series
#[derive(Debug)]
pub struct QueryOutcome {
    pub buckets: Buckets,
    pub series_status: Vec<SeriesStatus>,
}

impl QueryOutcome {
    /// Flatten buckets into `{timestamp, values: {label: value}}` rows
    ///
    /// Tagged series are labelled `label{k=v,...}` so that several tag sets of
    /// one metric stay apart.
    pub fn to_series(&self) -> Vec<SeriesPoint> {
        self.buckets
            .iter()
            .map(|bucket| SeriesPoint {
                timestamp: bucket.start(),
                values: bucket
                    .iter()
                    .map(|(key, value)| {
                        let label = if key.tags().is_empty() {
                            value.label.clone()
                        } else {
                            format!("{}{{{}}}", value.label, key.tags())
                        };
                        (label, value.value)
                    })
                    .collect(),
            })
            .collect()
    }

    /// True when at least one series could not be fetched
    pub fn is_degraded(&self) -> bool {
        self.series_status
            .iter()
            .any(|s| s.status.status == crate::model::StatusKind::Error)
    }
}

/// Check a request before any work is done
pub fn validate(request: &QueryRequest, default_bucket_size: i64) -> ServiceResult<()> {
    if request.start.trim().is_empty() {
        return Err(ServiceError::InvalidRequest("start time is required".into()));
    }
    if request.metrics.is_empty() {
        return Err(ServiceError::InvalidRequest(
            "at least one metric is required".into(),
        ));
    }
    if request.bucket_size.unwrap_or(default_bucket_size) <= 0 {
        return Err(ServiceError::InvalidRequest(
            "bucket size must be positive".into(),
        ));
    }
    for spec in &request.metrics {
        if spec.metric_name().is_none() && spec.expression().is_none() {
            return Err(ServiceError::InvalidRequest(format!(
                "series '{}' has neither a metric nor an expression",
                spec.name
            )));
        }
        if let Some(expr) = spec.expression() {
            parse_expression(expr).map_err(|source| ServiceError::Expression {
                name: spec.label().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Process a saved or aggregated result stream for `request`
pub fn process_stream<R: BufRead>(
    request: &QueryRequest,
    reader: R,
    default_bucket_size: i64,
) -> ServiceResult<QueryOutcome> {
    validate(request, default_bucket_size)?;
    replay(request, reader, default_bucket_size)
}

fn replay<R: BufRead>(
    request: &QueryRequest,
    reader: R,
    default_bucket_size: i64,
) -> ServiceResult<QueryOutcome> {
    let records = decode_stream(reader).map_err(ProcessError::from)?;
    assemble(request, &records, default_bucket_size)
}

fn assemble(
    request: &QueryRequest,
    records: &[QueryResult],
    default_bucket_size: i64,
) -> ServiceResult<QueryOutcome> {
    let series_status = records
        .iter()
        .map(|record| SeriesStatus {
            metric: record.metric.clone(),
            status: record.status.clone().unwrap_or_else(QueryStatus::ok),
        })
        .collect();

    let processor = ResultProcessor::new(request.bucket_size.unwrap_or(default_bucket_size));
    let (buckets, _) = processor.process_records(records, &request.resolved_metrics())?;

    Ok(QueryOutcome {
        buckets,
        series_status,
    })
}

/// Runs requests against the remote store
#[derive(Clone)]
pub struct MetricService {
    coordinator: FetchCoordinator,
    defaults: QueryConfig,
}

impl MetricService {
    /// Create a service over any sub-query executor
    pub fn new(executor: Arc<dyn SubQueryExecutor>, config: &Config) -> ServiceResult<Self> {
        Ok(Self {
            coordinator: FetchCoordinator::new(executor, &config.executor)?,
            defaults: config.query.clone(),
        })
    }

    /// Create a service talking to the configured OpenTSDB
    pub fn from_config(config: &Config) -> ServiceResult<Self> {
        let client = OpenTsdbClient::new(&config.opentsdb)?;
        Self::new(Arc::new(client), config)
    }

    pub fn defaults(&self) -> &QueryConfig {
        &self.defaults
    }

    /// Workers available to run sub-queries
    pub fn pool_size(&self) -> usize {
        self.coordinator.pool_size()
    }

    /// Fetch every series of `request` and bucket the results
    pub async fn query(&self, request: &QueryRequest) -> ServiceResult<QueryOutcome> {
        validate(request, self.defaults.bucket_size_secs)?;

        let plan = OpenTsdbQuery::from_request(request, self.defaults.downsample_multiplier);
        tracing::info!(
            start = %plan.start,
            end = ?plan.end,
            series = plan.queries.len(),
            "Running query"
        );

        let records = self.coordinator.fetch_all(plan.separate()).await;
        for record in records.iter().filter(|r| r.is_error()) {
            tracing::warn!(metric = %record.metric, "Series fetch failed: {}", record.debug_string());
        }

        // Aggregated responses go through the same decoder as saved streams
        let mut line = serde_json::to_vec(&records)?;
        line.push(b'\n');
        replay(request, line.as_slice(), self.defaults.bucket_size_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::fetch::FetchResult;
    use crate::model::MetricSpecification;
    use async_trait::async_trait;
    use std::io::Cursor;

    struct StaticExecutor;

    #[async_trait]
    impl SubQueryExecutor for StaticExecutor {
        async fn execute(&self, query: &OpenTsdbQuery) -> FetchResult<Vec<QueryResult>> {
            match query.metric() {
                "used" => Ok(vec![QueryResult::new("used").point(0, 25.0).point(60, 30.0)]),
                "total" => Ok(vec![QueryResult::new("total").point(0, 100.0).point(60, 120.0)]),
                "tagged" => Ok(vec![QueryResult::new("tagged").tag("host", "a").point(0, 1.0)]),
                "grouped" => Ok(vec![
                    QueryResult::new("grouped").tag("host", "web1").point(0, 1.0),
                    QueryResult::new("grouped").tag("host", "web2").point(0, 2.0),
                ]),
                _ => Err(FetchError::Timeout),
            }
        }
    }

    fn service() -> MetricService {
        let config = Config {
            executor: ExecutorConfig {
                thread_pool_size: 2,
                batch_timeout_secs: 0,
            },
            ..Default::default()
        };
        MetricService::new(Arc::new(StaticExecutor), &config).unwrap()
    }

    fn usage_request() -> QueryRequest {
        QueryRequest::new(
            "1h-ago",
            vec![
                MetricSpecification::metric("used"),
                MetricSpecification::metric("total"),
                MetricSpecification::derived("pct", "used,total,/,100,*"),
            ],
        )
        .bucket_size(60)
    }

    #[tokio::test]
    async fn test_query_end_to_end() {
        let outcome = service().query(&usage_request()).await.unwrap();

        assert!(!outcome.is_degraded());
        let series = outcome.to_series();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, 0);
        assert_eq!(series[0].values.get("pct"), Some(&25.0));
        assert_eq!(series[1].values.get("pct"), Some(&25.0));
        assert_eq!(series[1].values.get("used"), Some(&30.0));
    }

    #[tokio::test]
    async fn test_failed_series_is_reported_not_fatal() {
        let mut request = usage_request();
        request.metrics.push(MetricSpecification::metric("missing"));

        let outcome = service().query(&request).await.unwrap();

        assert!(outcome.is_degraded());
        assert_eq!(outcome.series_status.len(), 3);
        let failed = &outcome.series_status[2];
        assert_eq!(failed.metric, "missing");
        assert_eq!(failed.status.message, "Request timeout");
        assert_eq!(outcome.to_series()[0].values.get("pct"), Some(&25.0));
    }

    #[tokio::test]
    async fn test_tagged_series_label() {
        let request = QueryRequest::new("1h-ago", vec![MetricSpecification::metric("tagged")]);
        let outcome = service().query(&request).await.unwrap();

        let series = outcome.to_series();
        assert_eq!(series[0].values.get("tagged{host=a}"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_alternative_tag_filter_keeps_every_series() {
        let request = QueryRequest::new(
            "1h-ago",
            vec![MetricSpecification::metric("grouped")
                .tag("host", "web1")
                .tag("host", "web2")],
        );
        let outcome = service().query(&request).await.unwrap();

        assert_eq!(outcome.series_status.len(), 2);
        let series = outcome.to_series();
        assert_eq!(series[0].values.get("grouped{host=web1}"), Some(&1.0));
        assert_eq!(series[0].values.get("grouped{host=web2}"), Some(&2.0));
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let svc = service();

        let empty = QueryRequest::new("1h-ago", vec![]);
        assert!(matches!(
            svc.query(&empty).await,
            Err(ServiceError::InvalidRequest(_))
        ));

        let no_start = QueryRequest::new(" ", vec![MetricSpecification::metric("used")]);
        assert!(svc.query(&no_start).await.unwrap_err().is_client_error());

        let bad_expr = QueryRequest::new("1h-ago", vec![MetricSpecification::derived("x", "a,?,+")]);
        assert!(matches!(
            svc.query(&bad_expr).await,
            Err(ServiceError::Expression { name, .. }) if name == "x"
        ));

        let zero_bucket = usage_request().bucket_size(0);
        assert!(svc.query(&zero_bucket).await.is_err());
    }

    #[test]
    fn test_process_saved_stream() {
        let stream = concat!(
            r#"[{"metric":"used","tags":{},"dps":{"0":"25","60":30}}]"#,
            "\n",
            r#"[{"metric":"total","tags":{},"dps":{"0":100,"60":120}}]"#,
            "\n",
        );

        let outcome = process_stream(&usage_request(), Cursor::new(stream), 300).unwrap();
        let series = outcome.to_series();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].values.get("pct"), Some(&25.0));
        assert_eq!(outcome.series_status.len(), 2);
    }

    #[test]
    fn test_series_status_wire_format() {
        let status = SeriesStatus {
            metric: "cpu".to_string(),
            status: QueryStatus::error("boom"),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["metric"], "cpu");
        assert_eq!(json["status"], "ERROR");
        assert_eq!(json["message"], "boom");
    }
}
