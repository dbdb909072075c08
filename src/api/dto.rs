//! API Data Transfer Objects
//!
//! Response bodies for the REST API. Requests use `model::QueryRequest`
//! directly.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::service::{QueryOutcome, SeriesPoint, SeriesStatus};

/// Response for POST /api/v1/query
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    /// One row per bucket, in time order
    pub results: Vec<SeriesPoint>,
    /// Fetch status of every requested series
    pub status: Vec<SeriesStatus>,
    /// Bucket width used for the rows
    pub bucket_size: i64,
}

impl From<QueryOutcome> for QueryResponse {
    fn from(outcome: QueryOutcome) -> Self {
        Self {
            results: outcome.to_series(),
            bucket_size: outcome.buckets.bucket_size(),
            status: outcome.series_status,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy
    pub status: String,
    /// Sub-queries fetched in parallel
    pub workers: usize,
    /// Server start time
    pub started_at: DateTime<Utc>,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
