//! Expression Parser
//!
//! Compiles RPN expression strings into an `Expression`.
//!
//! # Supported Syntax
//!
//! ```text
//! token [, token ...]        tokens separated by commas and/or whitespace
//!
//! 42  -1.5  2e3              numeric literals
//! UNKN NAN INF NEGINF PI     named constants
//! + - * / % ^                arithmetic
//! LT LE GT GE EQ NE          comparisons (1 or 0)
//! MIN MAX IF                 selection
//! ABS NEG SQRT LOG EXP       unary math
//! FLOOR CEIL DUP POP EXC     rounding and stack handling
//! anything else              a reference, e.g. `cpu.user` or `time`
//! ```
//!
//! # Examples
//!
//! ```text
//! a,b,+
//! 100,*
//! used,total,/,100,*
//! in,out,GT,in,out,IF
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    sequence::{pair, tuple},
    IResult,
};

use super::ast::{Expression, Op, Token};
use super::error::{CalcError, CalcResult};

/// Compile an expression string
pub fn parse_expression(input: &str) -> CalcResult<Expression> {
    let source = input.trim();

    let tokens = source
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| {
            parse_token(t).map_err(|_| CalcError::Parse {
                token: t.to_string(),
                expression: source.to_string(),
            })
        })
        .collect::<CalcResult<Vec<Token>>>()?;

    if tokens.is_empty() {
        return Err(CalcError::EmptyExpression);
    }

    Ok(Expression {
        source: source.to_string(),
        tokens,
    })
}

/// Parse one whole token
fn parse_token(input: &str) -> Result<Token, nom::Err<nom::error::Error<&str>>> {
    let (_, token) = alt((
        all_consuming(map(parse_number, Token::Literal)),
        all_consuming(map(parse_symbol, Token::Op)),
        all_consuming(map(parse_word, word_token)),
    ))(input)?;
    Ok(token)
}

/// Classify an identifier as constant, keyword operator or reference
fn word_token(word: &str) -> Token {
    match word.to_uppercase().as_str() {
        "UNKN" | "NAN" => Token::Literal(f64::NAN),
        "INF" => Token::Literal(f64::INFINITY),
        "NEGINF" => Token::Literal(f64::NEG_INFINITY),
        "PI" => Token::Literal(std::f64::consts::PI),
        _ => match Op::from_keyword(word) {
            Some(op) => Token::Op(op),
            None => Token::Reference(word.to_string()),
        },
    }
}

/// Parse arithmetic operator symbols
fn parse_symbol(input: &str) -> IResult<&str, Op> {
    alt((
        value(Op::Add, tag("+")),
        value(Op::Sub, tag("-")),
        value(Op::Mul, tag("*")),
        value(Op::Div, tag("/")),
        value(Op::Mod, tag("%")),
        value(Op::Pow, tag("^")),
    ))(input)
}

/// Parse identifier (reference name or keyword)
fn parse_word(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || matches!(c, '_' | '.' | '-')),
    ))(input)
}

/// Parse floating point number with optional sign and exponent
fn parse_number(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((
            opt(one_of("+-")),
            alt((
                recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                recognize(pair(char('.'), digit1)),
            )),
            opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
        ))),
        |s: &str| s.parse::<f64>(),
    )(input)
}
