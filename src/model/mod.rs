//! Request and Result Model
//!
//! Types exchanged with callers and with the remote store:
//!
//! - **spec**: `MetricSpecification` and the `QueryRequest` that carries them
//! - **result**: `QueryResult` records decoded from OpenTSDB responses and the
//!   per-series `QueryStatus`

mod result;
mod spec;

pub use result::{DataPointValue, QueryResult, QueryStatus, StatusKind};
pub use spec::{value_filter, MetricSpecification, QueryRequest, RateOptions, NOW};
