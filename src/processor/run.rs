//! Result Processor
//!
//! Turns decoded result records into buckets:
//!
//! ```text
//! lines → decode → records → per point:
//!   key (interned) → direct transform → bucket write → window closed?
//!                                                        ↓ yes
//!                         derived expressions over the closed window
//! end of stream → derived expressions over the last window
//! ```
//!
//! Calculators are bound by key name (metric, or name for derived values)
//! and apply to every series whose tags satisfy the specification's filters.
//!
//! All state lives in a `ProcessingRun` created per call, so concurrent
//! calls never share keys, calculators or buckets.

use super::decode::decode_stream;
use super::error::{ProcessError, ProcessResult};
use super::resolver::BucketResolver;
use crate::buckets::{Buckets, KeyCache, MetricKey, TagFilter, Tags};
use crate::calc::{CalcError, Calculator, EvaluationContext, ReferenceResolver};
use crate::model::{value_filter, MetricSpecification, QueryResult};
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::Arc;

/// Counters collected over one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Records consumed
    pub records: usize,
    /// Records carrying an ERROR status
    pub failed_records: usize,
    /// Raw points written
    pub points: usize,
    /// Points dropped (unparseable value or failed transform)
    pub skipped_points: usize,
    /// Derived values written
    pub derived_values: usize,
    /// Derived evaluations skipped because a reference had no value yet
    pub unresolved: usize,
}

/// Processes result streams into buckets of a fixed width
#[derive(Debug, Clone)]
pub struct ResultProcessor {
    bucket_size: i64,
}

impl ResultProcessor {
    pub fn new(bucket_size: i64) -> Self {
        Self { bucket_size }
    }

    pub fn bucket_size(&self) -> i64 {
        self.bucket_size
    }

    /// Decode a newline-delimited stream and process every record
    pub fn process<R: BufRead>(
        &self,
        reader: R,
        specs: &[MetricSpecification],
    ) -> ProcessResult<Buckets> {
        let records = decode_stream(reader)?;
        self.process_records(&records, specs)
            .map(|(buckets, _)| buckets)
    }

    /// Process already decoded records, returning buckets and counters
    pub fn process_records(
        &self,
        records: &[QueryResult],
        specs: &[MetricSpecification],
    ) -> ProcessResult<(Buckets, ProcessStats)> {
        let mut run = ProcessingRun::new(specs, self.bucket_size)?;
        for record in records {
            run.consume(record);
        }
        Ok(run.finish())
    }
}

/// Calculator of one specification and the series it applies to
struct BoundCalculator {
    filter: TagFilter,
    calc: Calculator,
}

/// Mutable state of one processing run
struct ProcessingRun {
    buckets: Buckets,
    keys: KeyCache,
    /// key name → calculators, most specific filter first
    calculators: HashMap<String, Vec<BoundCalculator>>,
    /// store metric → reference label
    labels: HashMap<String, String>,
    /// key names of derived specifications, in request order
    derived: Vec<String>,
    previous_timestamp: i64,
    current_timestamp: i64,
    previous_bucket: Option<i64>,
    current_tags: Option<Tags>,
    reported_unknown: HashSet<String>,
    stats: ProcessStats,
}

impl ProcessingRun {
    fn new(specs: &[MetricSpecification], bucket_size: i64) -> ProcessResult<Self> {
        let resolver: Arc<dyn ReferenceResolver> = Arc::new(BucketResolver::for_specs(specs));
        let mut calculators: HashMap<String, Vec<BoundCalculator>> = HashMap::new();
        let mut labels = HashMap::new();

        for spec in specs {
            if let Some(metric) = spec.metric_name() {
                labels.insert(metric.to_string(), spec.label().to_string());
            }

            if let Some(expr) = spec.expression() {
                let calc = Calculator::new(expr, Arc::clone(&resolver)).map_err(|source| {
                    ProcessError::Expression {
                        name: spec.label().to_string(),
                        source,
                    }
                })?;
                calculators
                    .entry(spec.key_name().to_string())
                    .or_default()
                    .push(BoundCalculator {
                        filter: TagFilter::from_filters(&spec.tags),
                        calc,
                    });
            }
        }

        // stable: equally specific filters keep request order
        for bound in calculators.values_mut() {
            bound.sort_by_key(|b| std::cmp::Reverse(b.filter.len()));
        }

        let mut derived: Vec<String> = Vec::new();
        for spec in value_filter(specs) {
            if !derived.iter().any(|name| name == spec.key_name()) {
                derived.push(spec.key_name().to_string());
            }
        }

        Ok(Self {
            buckets: Buckets::new(bucket_size),
            keys: KeyCache::new(),
            calculators,
            labels,
            derived,
            previous_timestamp: 0,
            current_timestamp: 0,
            previous_bucket: None,
            current_tags: None,
            reported_unknown: HashSet::new(),
            stats: ProcessStats::default(),
        })
    }

    /// Most specific calculator bound to the key's name whose filter accepts its tags
    fn calculator_for(&self, key: &MetricKey) -> Option<&Calculator> {
        self.calculators
            .get(key.name())?
            .iter()
            .find(|b| b.filter.matches(key.tags()))
            .map(|b| &b.calc)
    }

    fn consume(&mut self, record: &QueryResult) {
        self.stats.records += 1;
        tracing::debug!("processing result: {}", record.debug_string());

        if record.is_error() {
            self.stats.failed_records += 1;
            tracing::warn!(
                metric = %record.metric,
                message = %record.status.as_ref().map(|s| s.message.as_str()).unwrap_or_default(),
                "Skipping failed series"
            );
            return;
        }

        let tags = Tags::from_raw(&record.tags);
        let key = self.keys.intern(&record.metric, &tags);
        let label = self
            .labels
            .get(&record.metric)
            .cloned()
            .unwrap_or_else(|| record.metric.clone());

        for (&timestamp, raw) in &record.dps {
            let Some(value) = raw.as_f64() else {
                self.stats.skipped_points += 1;
                tracing::warn!(metric = %record.metric, timestamp, value = ?raw, "Non-numeric data point");
                continue;
            };

            let transformed = self
                .calculator_for(&key)
                .map_or(Ok(value), |calc| calc.evaluate_value(value));
            let value = match transformed {
                Ok(v) => v,
                Err(e) => {
                    self.stats.skipped_points += 1;
                    tracing::warn!(key = %key, timestamp, error = %e, "Point transform failed");
                    continue;
                }
            };

            self.previous_timestamp = self.current_timestamp;
            self.current_timestamp = timestamp;

            self.buckets.add(&key, &label, timestamp, value);
            self.stats.points += 1;

            let current = self.buckets.get_bucket(timestamp).start();
            if let Some(previous) = self.previous_bucket {
                if previous != current {
                    let previous_timestamp = self.previous_timestamp;
                    self.evaluate_derived(&tags, previous_timestamp, previous);
                }
            }
            self.previous_bucket = Some(current);
            self.current_tags = Some(tags.clone());
        }
    }

    /// Evaluate every derived value against the window starting at `bucket_start`
    fn evaluate_derived(&mut self, tags: &Tags, timestamp: i64, bucket_start: i64) {
        for idx in 0..self.derived.len() {
            let key = self.keys.get(&self.derived[idx], tags);

            let outcome = {
                let Some(calc) = self.calculator_for(&key) else {
                    continue;
                };
                let Some(bucket) = self.buckets.bucket_at(bucket_start) else {
                    continue;
                };
                calc.evaluate(&EvaluationContext::new(timestamp, bucket))
            };

            match outcome {
                Ok(value) => {
                    self.buckets.add(&key, key.name(), timestamp, value);
                    self.stats.derived_values += 1;
                }
                Err(CalcError::UnresolvedReference(name)) => {
                    self.stats.unresolved += 1;
                    tracing::trace!(key = %key, reference = %name, window = bucket_start, "Reference not in window");
                }
                Err(CalcError::UnknownReference(name)) => {
                    if self.reported_unknown.insert(name.clone()) {
                        tracing::warn!(key = %key, reference = %name, "Expression references an unknown name");
                    }
                }
                Err(e) => {
                    tracing::warn!(key = %key, window = bucket_start, error = %e, "Derived value evaluation failed");
                }
            }
        }
    }

    fn finish(mut self) -> (Buckets, ProcessStats) {
        if let (Some(bucket_start), Some(tags)) = (self.previous_bucket, self.current_tags.take()) {
            let timestamp = self.current_timestamp;
            self.evaluate_derived(&tags, timestamp, bucket_start);
        }

        tracing::info!(
            records = self.stats.records,
            failed = self.stats.failed_records,
            points = self.stats.points,
            skipped = self.stats.skipped_points,
            derived = self.stats.derived_values,
            unresolved = self.stats.unresolved,
            buckets = self.buckets.len(),
            "Processed query results"
        );

        (self.buckets, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QueryRequest;
    use std::io::Cursor;

    const SIZE: i64 = 60;

    fn lines(records: &[QueryResult]) -> String {
        records
            .iter()
            .map(|r| serde_json::to_string(&vec![r]).unwrap() + "\n")
            .collect()
    }

    fn value_at(buckets: &Buckets, ts: i64, label: &str) -> Option<f64> {
        buckets
            .find(ts)
            .and_then(|b| b.value_by_shortcut(label))
            .map(|v| v.value)
    }

    #[test]
    fn test_raw_points_are_bucketed() {
        let records = vec![QueryResult::new("cpu").point(100, 1.0).point(110, 2.0).point(200, 3.0)];
        let specs = vec![MetricSpecification::metric("cpu")];

        let buckets = ResultProcessor::new(SIZE)
            .process(Cursor::new(lines(&records)), &specs)
            .unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(value_at(&buckets, 60, "cpu"), Some(2.0));
        assert_eq!(value_at(&buckets, 180, "cpu"), Some(3.0));
    }

    #[test]
    fn test_direct_transform() {
        let records = vec![QueryResult::new("cpu").point(100, 0.5)];
        let specs = vec![MetricSpecification::metric("cpu").with_expression("100,*")];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "cpu"), Some(50.0));
        assert_eq!(stats.points, 1);
    }

    #[test]
    fn test_untagged_transform_applies_to_tagged_series() {
        let records = vec![QueryResult::new("cpu").tag("host", "web1").point(100, 2.0)];
        let specs = vec![MetricSpecification::metric("cpu").with_expression("NEG")];

        let (buckets, _) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "cpu"), Some(-2.0));
    }

    #[test]
    fn test_transform_with_alternative_host_filter() {
        let records = vec![
            QueryResult::new("cpu").tag("host", "web1").point(100, 2.0),
            QueryResult::new("cpu").tag("host", "web3").point(200, 5.0),
        ];
        let specs = vec![MetricSpecification::metric("cpu")
            .tag("host", "web1")
            .tag("host", "web2")
            .with_expression("NEG")];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "cpu"), Some(-2.0));
        // outside the filter: stored untouched
        assert_eq!(value_at(&buckets, 200, "cpu"), Some(5.0));
        assert_eq!(stats.skipped_points, 0);
    }

    #[test]
    fn test_filtered_transform_ignores_extra_result_tags() {
        let records = vec![QueryResult::new("cpu")
            .tag("host", "web1")
            .tag("dc", "east")
            .point(100, 0.5)];
        let specs = vec![MetricSpecification::metric("cpu")
            .tag("host", "web1")
            .with_expression("100,*")];

        let (buckets, _) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "cpu"), Some(50.0));
    }

    #[test]
    fn test_most_specific_transform_wins() {
        let records = vec![
            QueryResult::new("cpu").tag("host", "web1").point(100, 1.0),
            QueryResult::new("cpu").tag("host", "web2").point(200, 1.0),
        ];
        let specs = vec![
            MetricSpecification::metric("cpu").with_expression("10,*"),
            MetricSpecification::metric("cpu")
                .tag("host", "web1")
                .with_expression("2,*"),
        ];

        let (buckets, _) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "cpu"), Some(2.0));
        assert_eq!(value_at(&buckets, 200, "cpu"), Some(10.0));
    }

    #[test]
    fn test_global_tags_keep_derived_values() {
        let records = vec![
            QueryResult::new("disk.used")
                .tag("host", "web1")
                .tag("dc", "east")
                .point(100, 30.0),
            QueryResult::new("disk.total")
                .tag("host", "web1")
                .tag("dc", "east")
                .point(100, 60.0),
        ];
        let mut request = QueryRequest::new(
            "1h-ago",
            vec![
                MetricSpecification::metric("disk.used").named("used"),
                MetricSpecification::metric("disk.total").named("total"),
                MetricSpecification::derived("pct", "used,total,/,100,*"),
            ],
        );
        request
            .tags
            .insert("host".to_string(), vec!["web1".to_string()]);

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &request.resolved_metrics())
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "pct"), Some(50.0));
        assert_eq!(stats.derived_values, 1);
    }

    #[test]
    fn test_derived_fires_once_per_closed_window_and_on_flush() {
        let records = vec![
            QueryResult::new("cpu").point(100, 1.0),
            QueryResult::new("cpu").point(100 + SIZE, 2.0),
            QueryResult::new("cpu").point(100 + 2 * SIZE, 3.0),
        ];
        let specs = vec![
            MetricSpecification::metric("cpu"),
            MetricSpecification::derived("double", "cpu,2,*"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(stats.derived_values, 3);
        assert_eq!(value_at(&buckets, 100, "double"), Some(2.0));
        assert_eq!(value_at(&buckets, 100 + SIZE, "double"), Some(4.0));
        assert_eq!(value_at(&buckets, 100 + 2 * SIZE, "double"), Some(6.0));
    }

    #[test]
    fn test_derived_not_evaluated_before_window_closes() {
        let records = vec![QueryResult::new("cpu").point(100, 1.0).point(110, 5.0)];
        let specs = vec![
            MetricSpecification::metric("cpu"),
            MetricSpecification::derived("double", "cpu,2,*"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        // only the end-of-stream flush evaluates, after the last write
        assert_eq!(stats.derived_values, 1);
        assert_eq!(value_at(&buckets, 100, "double"), Some(10.0));
    }

    #[test]
    fn test_cross_metric_reference_with_aliases() {
        let records = vec![
            QueryResult::new("disk.used").point(100, 30.0).point(160, 45.0),
            QueryResult::new("disk.total").point(100, 60.0).point(160, 90.0),
        ];
        let specs = vec![
            MetricSpecification::metric("disk.used").named("used"),
            MetricSpecification::metric("disk.total").named("total"),
            MetricSpecification::derived("pct", "used,total,/,100,*"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "pct"), Some(50.0));
        assert_eq!(value_at(&buckets, 160, "pct"), Some(50.0));
        // the window at 60 first closed before disk.total arrived
        assert!(stats.unresolved >= 1);
    }

    #[test]
    fn test_missing_reference_is_not_fatal() {
        let records = vec![QueryResult::new("a").point(100, 2.0).point(160, 4.0)];
        let specs = vec![
            MetricSpecification::metric("a"),
            MetricSpecification::metric("b"),
            MetricSpecification::derived("sum", "a,b,+"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "a"), Some(2.0));
        assert_eq!(value_at(&buckets, 100, "sum"), None);
        assert_eq!(stats.derived_values, 0);
        assert_eq!(stats.unresolved, 2);
    }

    #[test]
    fn test_unknown_reference_is_contained() {
        let records = vec![QueryResult::new("a").point(100, 2.0)];
        let specs = vec![
            MetricSpecification::metric("a"),
            MetricSpecification::derived("oops", "a,typo,+"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "oops"), None);
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn test_time_reference_in_derived() {
        let records = vec![QueryResult::new("a").point(130, 1.0)];
        let specs = vec![
            MetricSpecification::metric("a"),
            MetricSpecification::derived("when", "time"),
        ];

        let (buckets, _) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 130, "when"), Some(130.0));
    }

    #[test]
    fn test_non_monotonic_timestamps() {
        // record order interleaves windows: 60, 0, 60
        let records = vec![
            QueryResult::new("a").point(70, 1.0),
            QueryResult::new("a").point(10, 2.0),
            QueryResult::new("a").point(80, 3.0),
        ];
        let specs = vec![
            MetricSpecification::metric("a"),
            MetricSpecification::derived("copy", "a"),
        ];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(stats.derived_values, 3);
        assert_eq!(value_at(&buckets, 10, "copy"), Some(2.0));
        assert_eq!(value_at(&buckets, 80, "copy"), Some(3.0));
    }

    #[test]
    fn test_failed_records_and_bad_values_are_skipped() {
        let mut bad = QueryResult::new("a").point(100, 1.0);
        bad.dps.insert(110, crate::model::DataPointValue::Text("n/a".to_string()));
        let records = vec![QueryResult::error("b", "timeout"), bad];
        let specs = vec![MetricSpecification::metric("a"), MetricSpecification::metric("b")];

        let (buckets, stats) = ResultProcessor::new(SIZE)
            .process_records(&records, &specs)
            .unwrap();

        assert_eq!(stats.failed_records, 1);
        assert_eq!(stats.skipped_points, 1);
        assert_eq!(value_at(&buckets, 100, "a"), Some(1.0));
    }

    #[test]
    fn test_invalid_expression_is_setup_error() {
        let specs = vec![MetricSpecification::derived("bad", "a,$,+")];
        let err = ResultProcessor::new(SIZE)
            .process_records(&[], &specs)
            .unwrap_err();
        assert!(matches!(err, ProcessError::Expression { name, .. } if name == "bad"));
    }

    #[test]
    fn test_malformed_line_skipped_in_stream() {
        let input = format!(
            "{}garbage line\n{}",
            lines(&[QueryResult::new("a").point(100, 1.0)]),
            lines(&[QueryResult::new("a").point(200, 2.0)])
        );
        let specs = vec![MetricSpecification::metric("a")];

        let buckets = ResultProcessor::new(SIZE)
            .process(Cursor::new(input), &specs)
            .unwrap();

        assert_eq!(buckets.len(), 2);
    }

    #[test]
    fn test_non_utf8_line_skipped_in_stream() {
        let mut input = lines(&[QueryResult::new("a").point(100, 1.0)]).into_bytes();
        input.extend_from_slice(b"\xff\xfe x\n");
        input.extend_from_slice(lines(&[QueryResult::new("a").point(200, 2.0)]).as_bytes());
        let specs = vec![MetricSpecification::metric("a")];

        let buckets = ResultProcessor::new(SIZE)
            .process(Cursor::new(input), &specs)
            .unwrap();

        assert_eq!(value_at(&buckets, 100, "a"), Some(1.0));
        assert_eq!(value_at(&buckets, 200, "a"), Some(2.0));
    }
}
