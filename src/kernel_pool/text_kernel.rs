//! Parser for the text kernel format.
//!
//! A text kernel alternates free-form comment blocks with data blocks:
//!
//! ```text
//! Anything here is a comment.
//! \begindata
//!    INS-1234_FOV_FRAME     = 'DART_DRACO'
//!    INS-1234_BORESIGHT     = ( 0.0, 0.0, 1.0 )
//!    KERNELS_TO_LOAD       += ( '$ROOT/ik/draco.ti' )
//!    LAUNCH_DATE            = @2021-NOV-24/06:21:02
//! \begintext
//! More comments.
//! ```
//!
//! Inside a data block every assignment is `NAME = value` or `NAME += value`, where
//! `value` is a scalar or a parenthesised list separated by commas and/or whitespace.
//! Scalars are single-quoted strings (`''` escapes a quote), numbers (`D` exponents
//! allowed) or `@`-prefixed calendar dates, stored as ET seconds past J2000.
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res},
    multi::many0,
    sequence::{delimited, preceded},
    IResult, Parser,
};

use super::KernelValues;
use crate::time::utc_to_et;

const BEGIN_DATA: &str = "\\begindata";
const BEGIN_TEXT: &str = "\\begintext";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOp {
    /// `=`
    Replace,
    /// `+=`
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub op: AssignmentOp,
    pub values: KernelValues,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
}

/// Keep only the lines that belong to `\begindata` blocks.
fn data_sections(text: &str) -> String {
    let mut in_data = false;
    let mut data = String::new();
    for line in text.lines() {
        match line.trim() {
            BEGIN_DATA => in_data = true,
            BEGIN_TEXT => in_data = false,
            _ if in_data => {
                data.push_str(line);
                data.push('\n');
            }
            _ => {}
        }
    }
    data
}

fn separator(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c.is_whitespace() || c == ',')(input)
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    let (mut input, _) = char('\'')(input)?;
    let mut text = String::new();
    loop {
        let (rest, chunk) = take_until("'")(input)?;
        text.push_str(chunk);
        let rest = &rest[1..];
        match rest.strip_prefix('\'') {
            Some(escaped) => {
                text.push('\'');
                input = escaped;
            }
            None => return Ok((rest, text)),
        }
    }
}

fn number(input: &str) -> IResult<&str, f64> {
    map_res(
        take_while1(|c: char| {
            c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E' | 'd' | 'D')
        }),
        |s: &str| s.replace(['d', 'D'], "e").parse::<f64>(),
    )
    .parse(input)
}

fn date(input: &str) -> IResult<&str, f64> {
    map_res(
        preceded(
            char('@'),
            take_while1(|c: char| !c.is_whitespace() && c != ',' && c != ')'),
        ),
        utc_to_et,
    )
    .parse(input)
}

fn scalar(input: &str) -> IResult<&str, Token> {
    alt((
        map(quoted_string, Token::Text),
        map(date, Token::Number),
        map(number, Token::Number),
    ))
    .parse(input)
}

fn list(input: &str) -> IResult<&str, Vec<Token>> {
    delimited(
        char('('),
        many0(preceded(separator, scalar)),
        preceded(separator, char(')')),
    )
    .parse(input)
}

fn name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace() && !matches!(c, '=' | '+' | '(' | ')' | '\''))(input)
}

fn operator(input: &str) -> IResult<&str, AssignmentOp> {
    alt((
        map(tag("+="), |_| AssignmentOp::Append),
        map(char('='), |_| AssignmentOp::Replace),
    ))
    .parse(input)
}

fn raw_assignment(input: &str) -> IResult<&str, (&str, AssignmentOp, Vec<Token>)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = name(input)?;
    let (input, _) = multispace0(input)?;
    let (input, op) = operator(input)?;
    let (input, _) = multispace0(input)?;
    let (input, tokens) = alt((list, map(scalar, |t| vec![t]))).parse(input)?;
    Ok((input, (name, op, tokens)))
}

fn into_values(name: &str, tokens: Vec<Token>) -> Result<KernelValues, String> {
    if tokens.iter().all(|t| matches!(t, Token::Number(_))) {
        Ok(KernelValues::Numbers(
            tokens
                .into_iter()
                .filter_map(|t| match t {
                    Token::Number(n) => Some(n),
                    Token::Text(_) => None,
                })
                .collect(),
        ))
    } else if tokens.iter().all(|t| matches!(t, Token::Text(_))) {
        Ok(KernelValues::Strings(
            tokens
                .into_iter()
                .filter_map(|t| match t {
                    Token::Text(s) => Some(s),
                    Token::Number(_) => None,
                })
                .collect(),
        ))
    } else {
        Err(format!("{name} mixes numeric and string values"))
    }
}

/// Parse every assignment in the data blocks of `text`, in file order.
///
/// Return
/// ----------
/// * The assignments, or a human readable reason pointing at the first line that
///   could not be parsed.
pub fn parse_text_kernel(text: &str) -> Result<Vec<Assignment>, String> {
    let data = data_sections(text);
    let (rest, raw) = many0(raw_assignment)
        .parse(data.as_str())
        .map_err(|e| format!("{e}"))?;

    let rest = rest.trim_start();
    if !rest.is_empty() {
        let line = rest.lines().next().unwrap_or_default();
        return Err(format!("unexpected input near \"{line}\""));
    }

    raw.into_iter()
        .map(|(name, op, tokens)| {
            Ok(Assignment {
                name: name.to_string(),
                op,
                values: into_values(name, tokens)?,
            })
        })
        .collect()
}
