//! Expression Calculator
//!
//! Compiles and evaluates RPN expressions attached to metric specifications:
//!
//! - **AST**: tokens and stack operators
//! - **Parser**: expression strings into AST
//! - **Evaluator**: `Calculator` with direct and contextual evaluation
//!
//! # Example
//!
//! ```rust
//! use metricsvc::calc::{Calculator, CalcError, EvaluationContext, ReferenceResolver};
//! use std::sync::Arc;
//!
//! let resolver: Arc<dyn ReferenceResolver> = Arc::new(
//!     |name: &str, _ctx: &EvaluationContext<'_>| -> Result<f64, CalcError> {
//!         Err(CalcError::UnknownReference(name.to_string()))
//!     },
//! );
//! let calc = Calculator::new("8,*", resolver).unwrap();
//! assert_eq!(calc.evaluate_value(2.0).unwrap(), 16.0);
//! ```

mod ast;
mod error;
mod evaluator;
mod parser;

pub use ast::{Expression, Op, Token};
pub use error::{CalcError, CalcResult};
pub use evaluator::{Calculator, EvaluationContext, ReferenceResolver};
pub use parser::parse_expression;
