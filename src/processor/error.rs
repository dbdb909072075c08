//! Result processing error types
//!
//! Only failures that make the whole run meaningless surface here. Malformed
//! lines, unparseable values and unresolved references are logged and skipped
//! inside the run.

use crate::calc::CalcError;
use thiserror::Error;

/// Errors that abort a processing run
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Reading the input stream failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A metric specification carries an expression that does not compile
    #[error("Invalid expression for '{name}': {source}")]
    Expression {
        name: String,
        #[source]
        source: CalcError,
    },
}

/// Result type for processing operations
pub type ProcessResult<T> = Result<T, ProcessError>;
