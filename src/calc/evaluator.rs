//! Calculator
//!
//! A `Calculator` is a compiled expression bound to a `ReferenceResolver`.
//! It evaluates in one of two modes:
//!
//! - **direct**: the input value seeds the stack (`100,*` scales a point)
//! - **contextual**: references are resolved against a time window through
//!   the resolver (`a,b,+` sums two series in the same bucket)

use super::ast::{Expression, Token};
use super::error::{CalcError, CalcResult};
use super::parser::parse_expression;
use crate::buckets::Bucket;
use std::fmt;
use std::sync::Arc;

/// Time window a contextual evaluation runs against
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Timestamp reported for the `time` reference
    pub timestamp: i64,
    /// Window holding the referenced values
    pub bucket: &'a Bucket,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(timestamp: i64, bucket: &'a Bucket) -> Self {
        Self { timestamp, bucket }
    }
}

/// Answers "what is the value of `name` in this context"
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, name: &str, ctx: &EvaluationContext<'_>) -> CalcResult<f64>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str, &EvaluationContext<'_>) -> CalcResult<f64> + Send + Sync,
{
    fn resolve(&self, name: &str, ctx: &EvaluationContext<'_>) -> CalcResult<f64> {
        self(name, ctx)
    }
}

/// Compiled expression with its reference resolver
#[derive(Clone)]
pub struct Calculator {
    expression: Expression,
    resolver: Arc<dyn ReferenceResolver>,
}

impl Calculator {
    /// Compile `source` and bind it to `resolver`
    pub fn new(source: &str, resolver: Arc<dyn ReferenceResolver>) -> CalcResult<Self> {
        Ok(Self {
            expression: parse_expression(source)?,
            resolver,
        })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Direct mode: transform one input value
    pub fn evaluate_value(&self, input: f64) -> CalcResult<f64> {
        execute(&self.expression.tokens, Some(input), |name| {
            Err(CalcError::NoContext(name.to_string()))
        })
    }

    /// Contextual mode: resolve references against a time window
    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> CalcResult<f64> {
        execute(&self.expression.tokens, None, |name| {
            self.resolver.resolve(name, ctx)
        })
    }
}

impl fmt::Debug for Calculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calculator")
            .field("expression", &self.expression.source)
            .finish()
    }
}

/// Run the stack machine over `tokens`
fn execute<L>(tokens: &[Token], seed: Option<f64>, mut lookup: L) -> CalcResult<f64>
where
    L: FnMut(&str) -> CalcResult<f64>,
{
    let mut stack: Vec<f64> = Vec::with_capacity(tokens.len() + 1);
    stack.extend(seed);

    for token in tokens {
        match token {
            Token::Literal(v) => stack.push(*v),
            Token::Reference(name) => stack.push(lookup(name)?),
            Token::Op(op) => op.apply(&mut stack)?,
        }
    }

    match stack.as_slice() {
        [result] => Ok(*result),
        other => Err(CalcError::InvalidResult(other.len())),
    }
}
