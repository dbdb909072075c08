//! Expression Abstract Syntax Tree
//!
//! An RPN expression compiles to a flat list of `Token`s: literals, named
//! references and operators. Operators know their arity and apply themselves
//! to the evaluation stack.

use super::error::{CalcError, CalcResult};
use std::fmt;

/// A compiled RPN expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Original source text
    pub source: String,
    /// Tokens in evaluation order
    pub tokens: Vec<Token>,
}

impl Expression {
    /// Names referenced by this expression, in order of appearance
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|t| match t {
            Token::Reference(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn has_references(&self) -> bool {
        self.references().next().is_some()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// One element of an RPN expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Numeric literal or named constant
    Literal(f64),
    /// Name resolved at evaluation time
    Reference(String),
    /// Operator applied to the stack
    Op(Op),
}

/// Stack operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Min,
    Max,
    /// cond, then, else → then if cond is non-zero
    If,
    Abs,
    Neg,
    Sqrt,
    Log,
    Exp,
    Floor,
    Ceil,
    Dup,
    Pop,
    /// Swap the top two values
    Exc,
}

impl Op {
    /// Parse a keyword operator (case-insensitive)
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "LT" => Some(Self::Lt),
            "LE" => Some(Self::Le),
            "GT" => Some(Self::Gt),
            "GE" => Some(Self::Ge),
            "EQ" => Some(Self::Eq),
            "NE" => Some(Self::Ne),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            "IF" => Some(Self::If),
            "ABS" => Some(Self::Abs),
            "NEG" => Some(Self::Neg),
            "SQRT" => Some(Self::Sqrt),
            "LOG" => Some(Self::Log),
            "EXP" => Some(Self::Exp),
            "FLOOR" => Some(Self::Floor),
            "CEIL" => Some(Self::Ceil),
            "DUP" => Some(Self::Dup),
            "POP" => Some(Self::Pop),
            "EXC" => Some(Self::Exc),
            _ => None,
        }
    }

    /// Number of operands consumed
    pub fn arity(&self) -> usize {
        match self {
            Self::If => 3,
            Self::Abs
            | Self::Neg
            | Self::Sqrt
            | Self::Log
            | Self::Exp
            | Self::Floor
            | Self::Ceil
            | Self::Dup
            | Self::Pop => 1,
            _ => 2,
        }
    }

    /// Apply the operator to the top of the stack
    pub fn apply(&self, stack: &mut Vec<f64>) -> CalcResult<()> {
        let needed = self.arity();
        if stack.len() < needed {
            return Err(CalcError::StackUnderflow {
                op: self.to_string(),
                needed,
                available: stack.len(),
            });
        }

        match self {
            Self::If => {
                let otherwise = pop(stack);
                let then = pop(stack);
                let cond = pop(stack);
                stack.push(if cond != 0.0 && !cond.is_nan() {
                    then
                } else {
                    otherwise
                });
            }
            Self::Dup => {
                let top = stack[stack.len() - 1];
                stack.push(top);
            }
            Self::Pop => {
                pop(stack);
            }
            Self::Exc => {
                let len = stack.len();
                stack.swap(len - 1, len - 2);
            }
            op if op.arity() == 1 => {
                let a = pop(stack);
                stack.push(op.unary(a));
            }
            op => {
                let b = pop(stack);
                let a = pop(stack);
                stack.push(op.binary(a, b));
            }
        }
        Ok(())
    }

    fn unary(&self, a: f64) -> f64 {
        match self {
            Self::Abs => a.abs(),
            Self::Neg => -a,
            Self::Sqrt => a.sqrt(),
            Self::Log => a.ln(),
            Self::Exp => a.exp(),
            Self::Floor => a.floor(),
            Self::Ceil => a.ceil(),
            _ => f64::NAN,
        }
    }

    fn binary(&self, a: f64, b: f64) -> f64 {
        let truth = |c: bool| if c { 1.0 } else { 0.0 };
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Mod => a % b,
            Self::Pow => a.powf(b),
            Self::Lt => truth(a < b),
            Self::Le => truth(a <= b),
            Self::Gt => truth(a > b),
            Self::Ge => truth(a >= b),
            Self::Eq => truth(a == b),
            Self::Ne => truth(a != b),
            Self::Min if a.is_nan() || b.is_nan() => f64::NAN,
            Self::Min => a.min(b),
            Self::Max if a.is_nan() || b.is_nan() => f64::NAN,
            Self::Max => a.max(b),
            _ => f64::NAN,
        }
    }
}

fn pop(stack: &mut Vec<f64>) -> f64 {
    stack.pop().unwrap_or(f64::NAN)
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::If => "IF",
            Self::Abs => "ABS",
            Self::Neg => "NEG",
            Self::Sqrt => "SQRT",
            Self::Log => "LOG",
            Self::Exp => "EXP",
            Self::Floor => "FLOOR",
            Self::Ceil => "CEIL",
            Self::Dup => "DUP",
            Self::Pop => "POP",
            Self::Exc => "EXC",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(op: Op, stack: &[f64]) -> Vec<f64> {
        let mut stack = stack.to_vec();
        op.apply(&mut stack).unwrap();
        stack
    }

    #[test]
    fn test_binary_operand_order() {
        assert_eq!(run(Op::Sub, &[10.0, 4.0]), vec![6.0]);
        assert_eq!(run(Op::Div, &[10.0, 4.0]), vec![2.5]);
        assert_eq!(run(Op::Pow, &[2.0, 3.0]), vec![8.0]);
        assert_eq!(run(Op::Lt, &[1.0, 2.0]), vec![1.0]);
        assert_eq!(run(Op::Ge, &[1.0, 2.0]), vec![0.0]);
    }

    #[test]
    fn test_if() {
        assert_eq!(run(Op::If, &[1.0, 10.0, 20.0]), vec![10.0]);
        assert_eq!(run(Op::If, &[0.0, 10.0, 20.0]), vec![20.0]);
        assert_eq!(run(Op::If, &[f64::NAN, 10.0, 20.0]), vec![20.0]);
    }

    #[test]
    fn test_stack_ops() {
        assert_eq!(run(Op::Dup, &[3.0]), vec![3.0, 3.0]);
        assert_eq!(run(Op::Pop, &[1.0, 2.0]), vec![1.0]);
        assert_eq!(run(Op::Exc, &[1.0, 2.0]), vec![2.0, 1.0]);
    }

    #[test]
    fn test_min_max_propagate_nan() {
        assert_eq!(run(Op::Min, &[3.0, 1.0]), vec![1.0]);
        assert!(run(Op::Max, &[f64::NAN, 1.0])[0].is_nan());
    }

    #[test]
    fn test_underflow() {
        let mut stack = vec![1.0];
        let err = Op::Add.apply(&mut stack).unwrap_err();
        assert_eq!(
            err,
            CalcError::StackUnderflow {
                op: "+".to_string(),
                needed: 2,
                available: 1
            }
        );
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(Op::from_keyword("max"), Some(Op::Max));
        assert_eq!(Op::from_keyword("If"), Some(Op::If));
        assert_eq!(Op::from_keyword("cpu"), None);
    }
}
