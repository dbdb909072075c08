//! Fetch error types
//!
//! Failures of one sub-query are turned into ERROR-status records by the
//! coordinator; only `InvalidPoolSize` escapes a batch.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while fetching from the remote store
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("OpenTSDB unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout")]
    Timeout,

    /// Response body was not a list of result records
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Worker pool cannot be built with zero workers
    #[error("Invalid worker pool size: {0}")]
    InvalidPoolSize(usize),

    /// Batch deadline passed before the sub-query finished
    #[error("Batch interrupted after {0:?}")]
    Interrupted(Duration),
}

impl FetchError {
    /// Map a transport error the way every client call does
    pub(crate) fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() {
            FetchError::Unavailable
        } else {
            FetchError::Request(e)
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;
