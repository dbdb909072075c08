//! Bucketing
//!
//! Groups result points into fixed-width time windows per series identity:
//!
//! - **key**: `MetricKey` identity and canonical `Tags`
//! - **key_cache**: per-run interning of keys
//! - **store**: `Buckets` of `Bucket` windows holding labelled `Value`s
//!
//! # Example
//!
//! ```rust
//! use metricsvc::buckets::{Buckets, KeyCache, Tags};
//!
//! let mut cache = KeyCache::new();
//! let key = cache.intern("cpu.user", &Tags::empty());
//!
//! let mut buckets = Buckets::new(60);
//! buckets.add(&key, "cpu", 125, 0.5);
//!
//! let bucket = buckets.get_bucket(170);
//! assert_eq!(bucket.start(), 120);
//! assert_eq!(bucket.value_by_shortcut("cpu").map(|v| v.value), Some(0.5));
//! ```

mod key;
mod key_cache;
mod store;

pub use key::{sanitize, MetricKey, TagFilter, Tags};
pub use key_cache::KeyCache;
pub use store::{Bucket, Buckets, Value};
