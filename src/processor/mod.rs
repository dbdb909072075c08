//! Result Processor
//!
//! Converts decoded query results into fixed-width time buckets and
//! evaluates derived values once each window has received its data.
//!
//! - **decode**: newline-delimited JSON records
//! - **resolver**: expression references against a bucket
//! - **run**: the bucketing and evaluation loop

mod decode;
mod error;
mod resolver;
mod run;

pub use decode::{decode_line, decode_stream};
pub use error::{ProcessError, ProcessResult};
pub use resolver::{BucketResolver, TIME_REFERENCE};
pub use run::{ProcessStats, ResultProcessor};
