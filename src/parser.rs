//! # Filter Parser Module
//!
//! This module parses the `tags` filter of image listings into an
//! [`ImageQueryExpr`] that can be rendered to SQL or evaluated in memory.
//! It supports boolean logic with `AND`, `OR` and `NOT`, parentheses, and
//! comparisons on the creation time.
//!
//! ## Supported Expressions
//!
//! - **OR Expression**: Multiple `AND` expressions separated by the `OR` keyword.
//! - **AND Expression**: Multiple `NOT` expressions separated by the `AND` keyword.
//! - **NOT Expression**: An optional negation, followed by a primary expression.
//! - **Primary Expression**: A creation-time comparison, a tag, or a nested expression.
//!
//! Keywords are case-sensitive and only match whole words, so `NOTE` is a tag.
//!
//! ## Example Usage
//!
//! ```rust
//! # use imgreg::parser::parse_query;
//! # use chrono::DateTime;
//! # use std::str::FromStr;
//! # use imgreg::query::ImageQueryExpr;
//! let input = "ubuntu AND (lts OR NOT beta) AND created >= 2025-05-02T01:18:49Z";
//! assert_eq!(
//!     ImageQueryExpr::tag("ubuntu")
//!         .and(
//!             ImageQueryExpr::tag("lts").or(ImageQueryExpr::not(ImageQueryExpr::tag("beta")))
//!         )
//!         .and(ImageQueryExpr::created_since(
//!             DateTime::from_str("2025-05-02T01:18:49Z").unwrap()
//!         )),
//!     parse_query(input).unwrap()
//! );
//! ```

use crate::query::ImageQueryExpr;
use chrono::{DateTime, Utc};
use nom::{
    AsChar, IResult, Parser,
    branch::alt,
    bytes::complete::{tag as t, take_while1},
    character::complete::{char, multispace0, satisfy},
    combinator::{not, opt},
    multi::many0,
    sequence::{delimited, preceded, terminated},
};
use thiserror::Error;

// <query>    ::= <or_expr>
// <or_expr>  ::= <and_expr> { "OR" <and_expr> }
// <and_expr> ::= <not_expr> { "AND" <not_expr> }
// <not_expr> ::= [ "NOT" ] <primary>
// <primary>  ::= <date_expr>
//              | "(" <query> ")"
//              | <tag>
pub fn parse_query(input: &str) -> Result<ImageQueryExpr, ParseErrorDetail> {
    let (rest, query) = query_expr(input).map_err(|e| match e {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: "<incomplete>".to_string(),
        },
    })?;

    if !rest.trim().is_empty() {
        return Err(ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: rest.to_string(),
        });
    }

    Ok(query)
}

fn is_tag_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'
}

fn query_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
    fn or_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        let (input, init) = and_expr(input)?;
        many0(preceded(keyword("OR"), and_expr))
            .parse(input)
            .map(|(input, rest)| {
                let expr = rest.into_iter().fold(init, |acc, e| acc.or(e));
                (input, expr)
            })
    }

    fn and_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        let (input, init) = not_expr(input)?;
        many0(preceded(keyword("AND"), not_expr))
            .parse(input)
            .map(|(input, rest)| {
                let expr = rest.into_iter().fold(init, |acc, e| acc.and(e));
                (input, expr)
            })
    }

    fn not_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        let (input, not_opt) = opt(preceded(keyword("NOT"), primary)).parse(input)?;
        match not_opt {
            Some(expr) => Ok((input, ImageQueryExpr::not(expr))),
            None => primary(input),
        }
    }

    fn primary(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        alt((date_expr, paren_expr, tag)).parse(input)
    }

    fn tag(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        ws(take_while1(is_tag_char))
            .parse(input)
            .map(|(i, tag_str)| (i, ImageQueryExpr::Tag(tag_str.to_string())))
            .map_err(|e| {
                e.map(|d| ParseErrorDetail {
                    kind: ParseErrorKind::ExpectedTag,
                    ..d
                })
            })
    }

    fn date_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        let is_datetime_char = |c: char| {
            AsChar::is_dec_digit(c)
                || c == '-'
                || c == '+'
                || c == ':'
                || c == '.'
                || c == 'T'
                || c == 'Z'
        };

        let (rest, (_field, op, date_str)) = (
            keyword("created"),
            ws(alt((t(">="), t("<=")))),
            ws(take_while1(is_datetime_char)),
        )
            .parse(input)?;

        let dt = DateTime::parse_from_rfc3339(date_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| {
                nom::Err::Failure(ParseErrorDetail {
                    kind: ParseErrorKind::InvalidDateFormat,
                    location: date_str.to_string(),
                })
            })?;

        match op {
            ">=" => Ok((rest, ImageQueryExpr::created_since(dt))),
            _ => Ok((rest, ImageQueryExpr::created_until(dt))),
        }
    }

    fn paren_expr(input: &str) -> IResult<&str, ImageQueryExpr, ParseErrorDetail> {
        delimited(ws(char('(')), query_expr, ws(char(')'))).parse(input)
    }

    or_expr(input)
}

/// Matches `word` as a whole word surrounded by optional whitespace.
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = ParseErrorDetail> {
    ws(terminated(t(word), not(satisfy(is_tag_char))))
}

fn ws<'a, F>(inner: F) -> impl Parser<&'a str, Output = F::Output, Error = ParseErrorDetail>
where
    F: Parser<&'a str, Error = ParseErrorDetail>,
{
    delimited(multispace0, inner, multispace0)
}

#[derive(Debug, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken,
    ExpectedTag,
    InvalidDateFormat,
}

#[derive(Debug, PartialEq, Error)]
#[error("{kind:?} at `{location}`")]
pub struct ParseErrorDetail {
    pub kind: ParseErrorKind,
    pub location: String,
}

impl nom::error::ParseError<&str> for ParseErrorDetail {
    fn from_error_kind(input: &str, _kind: nom::error::ErrorKind) -> Self {
        ParseErrorDetail {
            kind: ParseErrorKind::UnexpectedToken,
            location: input.to_string(),
        }
    }

    fn append(_input: &str, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}
