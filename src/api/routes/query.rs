//! Query Routes
//!
//! - POST /api/v1/query - Fetch, bucket and evaluate a metric query

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::dto::QueryResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::model::QueryRequest;

/// POST /api/v1/query
///
/// Series that could not be fetched are reported in `status` and do not
/// fail the request.
pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    if req.metrics.is_empty() {
        return Err(ApiError::Validation("metrics cannot be empty".to_string()));
    }

    let outcome = state.service.query(&req).await?;
    if outcome.is_degraded() {
        tracing::warn!(
            series = outcome.series_status.len(),
            "Returning partial results"
        );
    }

    Ok(Json(QueryResponse::from(outcome)))
}
