//! Bucket reference resolver
//!
//! Resolves expression references against one time window. `time` yields
//! the context timestamp; any other name is looked up by short label in the
//! context's bucket. Names that no requested series could ever produce are
//! reported as unknown rather than unresolved.

use crate::calc::{CalcError, CalcResult, EvaluationContext, ReferenceResolver};
use crate::model::MetricSpecification;
use std::collections::HashSet;

/// Reserved reference yielding the context timestamp
pub const TIME_REFERENCE: &str = "time";

/// Resolves references by short label within a bucket
#[derive(Debug, Clone, Default)]
pub struct BucketResolver {
    known: HashSet<String>,
}

impl BucketResolver {
    /// Resolver aware of every label the given specifications produce
    pub fn for_specs(specs: &[MetricSpecification]) -> Self {
        let mut known = HashSet::new();
        for spec in specs {
            known.insert(spec.label().to_string());
            if let Some(metric) = spec.metric_name() {
                known.insert(metric.to_string());
            }
        }
        Self { known }
    }

    /// True when some requested series could produce `name`
    pub fn is_known(&self, name: &str) -> bool {
        self.known.contains(name)
    }
}

impl ReferenceResolver for BucketResolver {
    fn resolve(&self, name: &str, ctx: &EvaluationContext<'_>) -> CalcResult<f64> {
        if name.eq_ignore_ascii_case(TIME_REFERENCE) {
            return Ok(ctx.timestamp as f64);
        }

        match ctx.bucket.value_by_shortcut(name) {
            Some(value) => Ok(value.value),
            None if self.is_known(name) => Err(CalcError::UnresolvedReference(name.to_string())),
            None => Err(CalcError::UnknownReference(name.to_string())),
        }
    }
}
