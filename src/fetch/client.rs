//! OpenTSDB REST client
//!
//! Runs a single-series query against `POST {url}/api/query` and returns
//! every result record of the response. Tag filters with alternatives
//! (`host=web1|web2`) come back as one record per matching tag value.

use super::error::{FetchError, FetchResult};
use super::subquery::OpenTsdbQuery;
use crate::config::OpenTsdbConfig;
use crate::model::QueryResult;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Executes one sub-query against the remote store
#[async_trait]
pub trait SubQueryExecutor: Send + Sync {
    /// Records of the response; never empty on success
    async fn execute(&self, query: &OpenTsdbQuery) -> FetchResult<Vec<QueryResult>>;
}

/// OpenTSDB HTTP client
#[derive(Debug, Clone)]
pub struct OpenTsdbClient {
    client: Client,
    query_url: String,
}

impl OpenTsdbClient {
    /// Create a client with pooling and timeouts from `config`
    pub fn new(config: &OpenTsdbConfig) -> FetchResult<Self> {
        tracing::debug!(
            max_total = config.max_total_pool_connections,
            per_route = config.max_pool_connections_per_route,
            "Setting up OpenTSDB connection pool"
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(config.max_pool_connections_per_route)
            .build()?;

        let query_url = format!("{}/api/query", config.url.trim_end_matches('/'));
        tracing::info!("OpenTSDB query endpoint: {}", query_url);

        Ok(Self { client, query_url })
    }

    pub fn query_url(&self) -> &str {
        &self.query_url
    }
}

#[async_trait]
impl SubQueryExecutor for OpenTsdbClient {
    async fn execute(&self, query: &OpenTsdbQuery) -> FetchResult<Vec<QueryResult>> {
        let response = self
            .client
            .post(&self.query_url)
            .json(query)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(FetchError::from_transport)?;
        response_records(query.metric(), &body)
    }
}

/// Decode a response body; an empty response becomes one empty record
fn response_records(metric: &str, body: &str) -> FetchResult<Vec<QueryResult>> {
    let records: Vec<QueryResult> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if records.is_empty() {
        return Ok(vec![QueryResult::new(metric)]);
    }
    if records.len() > 1 {
        tracing::debug!(metric, series = records.len(), "Response carries several series");
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url() {
        let config = OpenTsdbConfig {
            url: "http://tsdb:4242/".to_string(),
            ..Default::default()
        };
        let client = OpenTsdbClient::new(&config).unwrap();
        assert_eq!(client.query_url(), "http://tsdb:4242/api/query");
    }

    #[test]
    fn test_single_series_response() {
        let body = r#"[{"metric":"cpu","tags":{"host":"a"},"aggregateTags":[],"dps":{"100":1.5,"160":"2"}}]"#;
        let records = response_records("cpu", body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metric, "cpu");
        assert_eq!(records[0].dps.len(), 2);
    }

    #[test]
    fn test_every_series_of_response_is_kept() {
        let body = r#"[
            {"metric":"cpu","tags":{"host":"web1"},"aggregateTags":[],"dps":{"100":1}},
            {"metric":"cpu","tags":{"host":"web2"},"aggregateTags":[],"dps":{"100":2}}
        ]"#;
        let records = response_records("cpu", body).unwrap();
        let hosts: Vec<&str> = records.iter().map(|r| r.tags["host"].as_str()).collect();
        assert_eq!(hosts, vec!["web1", "web2"]);
    }

    #[test]
    fn test_empty_response_yields_empty_record() {
        let records = response_records("cpu", "[]").unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.metric, "cpu");
        assert!(record.dps.is_empty());
        assert!(!record.is_error());
    }

    #[test]
    fn test_bad_body() {
        assert!(matches!(
            response_records("cpu", "{\"error\":{}}"),
            Err(FetchError::Decode(_))
        ));
    }
}
