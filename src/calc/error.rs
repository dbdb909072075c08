//! Calculator error types
//!
//! Compile errors come from malformed expressions; evaluation errors from
//! stack misuse or references that cannot be satisfied.

use thiserror::Error;

/// Errors that can occur while compiling or evaluating an expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    /// A token is neither a number, an operator nor a valid identifier
    #[error("Invalid token '{token}' in expression '{expression}'")]
    Parse { token: String, expression: String },

    /// Expression is blank
    #[error("Expression is empty")]
    EmptyExpression,

    /// An operator found fewer operands than it needs
    #[error("Operator {op} needs {needed} operands, stack has {available}")]
    StackUnderflow {
        op: String,
        needed: usize,
        available: usize,
    },

    /// Evaluation did not end with exactly one value
    #[error("Expression left {0} values on the stack, expected 1")]
    InvalidResult(usize),

    /// Reference is known but has no value in the given time window
    #[error("Reference '{0}' is not available in this time window")]
    UnresolvedReference(String),

    /// Reference names nothing the resolver knows about
    #[error("Unknown reference '{0}'")]
    UnknownReference(String),

    /// Reference used in direct mode, where there is no time window
    #[error("Reference '{0}' needs an evaluation context")]
    NoContext(String),
}

impl CalcError {
    /// True for misses that are expected across window boundaries
    pub fn is_unresolved(&self) -> bool {
        matches!(self, CalcError::UnresolvedReference(_))
    }
}

/// Result type for calculator operations
pub type CalcResult<T> = Result<T, CalcError>;
