//! # metricsvc
//!
//! Metric query tier for OpenTSDB: fans a query out as parallel sub-queries,
//! groups the returned points into fixed-width time buckets per series and
//! evaluates RPN expressions per point or across series within a bucket.
//!
//! ## Modules
//!
//! - [`model`]: metric specifications, query requests and result records
//! - [`buckets`]: series identity, key interning and the bucket store
//! - [`calc`]: RPN expression parser and calculator
//! - [`processor`]: result stream → buckets, derived values per window
//! - [`fetch`]: sub-query building, OpenTSDB client, bounded parallel fetch
//! - [`service`]: request → fetch → process
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust
//! use metricsvc::model::{MetricSpecification, QueryResult};
//! use metricsvc::processor::ResultProcessor;
//!
//! let records = vec![
//!     QueryResult::new("disk.used").point(0, 30.0).point(60, 45.0),
//!     QueryResult::new("disk.total").point(0, 60.0).point(60, 90.0),
//! ];
//! let specs = vec![
//!     MetricSpecification::metric("disk.used").named("used"),
//!     MetricSpecification::metric("disk.total").named("total"),
//!     MetricSpecification::derived("pct", "used,total,/,100,*"),
//! ];
//!
//! let (buckets, _stats) = ResultProcessor::new(60)
//!     .process_records(&records, &specs)
//!     .unwrap();
//!
//! let first = buckets.find(0).unwrap();
//! assert_eq!(first.value_by_shortcut("pct").map(|v| v.value), Some(50.0));
//! ```

pub mod api;
pub mod buckets;
pub mod calc;
pub mod config;
pub mod fetch;
pub mod model;
pub mod processor;
pub mod service;

// Re-export top-level types for convenience
pub use buckets::{Bucket, Buckets, KeyCache, MetricKey, Tags};

pub use calc::{CalcError, CalcResult, Calculator, EvaluationContext, ReferenceResolver};

pub use config::{Config, ConfigError};

pub use fetch::{FetchCoordinator, FetchError, OpenTsdbClient, SubQueryExecutor};

pub use model::{MetricSpecification, QueryRequest, QueryResult, QueryStatus};

pub use processor::{ProcessError, ResultProcessor};

pub use service::{MetricService, QueryOutcome, ServiceError};

pub use api::{build_router, serve, ApiError, AppState};
