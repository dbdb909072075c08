//! Remote store access
//!
//! - **subquery**: request to OpenTSDB query bodies
//! - **downsample**: global downsample scaling
//! - **client**: `SubQueryExecutor` and its OpenTSDB implementation
//! - **coordinator**: bounded parallel execution of a batch

mod client;
mod coordinator;
pub mod downsample;
mod error;
mod subquery;

pub use client::{OpenTsdbClient, SubQueryExecutor};
pub use coordinator::FetchCoordinator;
pub use downsample::apply_multiplier;
pub use error::{FetchError, FetchResult};
pub use subquery::{OpenTsdbQuery, RateOption, SubQuery, DEFAULT_AGGREGATOR};
