// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recursive-descent parser producing an ordered list of query segments.
//!
//! Accepted subset: `$`, member `.name`, descendant `..name`, wildcard
//! (`.*`, `[*]`, `.[*]`), bracketed index `[n]`, bracketed range `[a:b]`.

use nj_core::error::QueryError;

use crate::lexer::{Lexer, Token, TokenKind};

/// One path segment of a parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name` - select an object member.
    Member(String),
    /// `[n]` - select one array element.
    Index(usize),
    /// `[a:b]` - select elements with index in the half-open range `a..b`.
    Range(usize, usize),
    /// `.*` / `[*]` - select every child.
    Wildcard,
    /// `..name` - descendant selection (parsed, unsupported downstream).
    Descendant(String),
}

/// A parsed query: the ordered segments after the root selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    /// Segments in path order.
    pub segments: Vec<Segment>,
}

impl Query {
    /// Parse `input` into a segment list.
    ///
    /// # Errors
    ///
    /// Fails when the query does not start at the root or contains an
    /// unexpected token.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let mut lexer = Lexer::new(input);

        let first = lexer.consume()?;
        if first.kind != TokenKind::Root {
            return Err(QueryError::MissingRoot);
        }

        let mut segments = Vec::new();
        while !lexer.is_at_end() {
            segments.push(parse_segment(&mut lexer)?);
        }
        Ok(Self { segments })
    }
}

fn parse_segment(lexer: &mut Lexer<'_>) -> Result<Segment, QueryError> {
    let token = lexer.consume()?;
    match token.kind {
        TokenKind::Member => {
            if lexer.peek()?.kind == TokenKind::OpenBracket {
                lexer.consume()?;
                return parse_bracketed(lexer);
            }
            parse_member(lexer)
        }
        TokenKind::Descendant => {
            let name = lexer.consume()?;
            expect(&name, TokenKind::Name)?;
            Ok(Segment::Descendant(name.text))
        }
        TokenKind::OpenBracket => parse_bracketed(lexer),
        _ => Err(unexpected(&token)),
    }
}

fn parse_member(lexer: &mut Lexer<'_>) -> Result<Segment, QueryError> {
    let token = lexer.consume()?;
    match token.kind {
        TokenKind::Name => Ok(Segment::Member(token.text)),
        TokenKind::Wildcard => Ok(Segment::Wildcard),
        _ => Err(unexpected(&token)),
    }
}

/// Selector inside brackets: `*`, `n`, or `a:b`. Consumes the closing
/// bracket.
fn parse_bracketed(lexer: &mut Lexer<'_>) -> Result<Segment, QueryError> {
    let token = lexer.consume()?;
    let segment = match token.kind {
        TokenKind::Wildcard => Segment::Wildcard,
        TokenKind::Number => {
            let start = parse_number(&token)?;
            if lexer.peek()?.kind == TokenKind::Colon {
                lexer.consume()?;
                let end_token = lexer.consume()?;
                expect(&end_token, TokenKind::Number)?;
                let end = parse_number(&end_token)?;
                if start >= end {
                    return Err(QueryError::EmptyRange { start, end });
                }
                Segment::Range(start, end)
            } else {
                Segment::Index(start)
            }
        }
        _ => return Err(unexpected(&token)),
    };
    let close = lexer.consume()?;
    expect(&close, TokenKind::CloseBracket)?;
    Ok(segment)
}

fn parse_number(token: &Token) -> Result<usize, QueryError> {
    token.text.parse().map_err(|_| QueryError::InvalidNumber {
        text: token.text.clone(),
        pos: token.pos,
    })
}

fn expect(token: &Token, kind: TokenKind) -> Result<(), QueryError> {
    if token.kind == kind {
        Ok(())
    } else {
        Err(unexpected(token))
    }
}

fn unexpected(token: &Token) -> QueryError {
    QueryError::UnexpectedToken {
        kind: token.kind.name(),
        pos: token.pos,
    }
}
