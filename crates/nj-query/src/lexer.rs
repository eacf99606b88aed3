// SPDX-License-Identifier: MIT OR Apache-2.0
//! Tokenizer for the JSONPath subset.

use nj_core::error::QueryError;

/// Token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `$`
    Root,
    /// `.`
    Member,
    /// `..`
    Descendant,
    /// A bare name.
    Name,
    /// A non-negative integer.
    Number,
    /// `[`
    OpenBracket,
    /// `]`
    CloseBracket,
    /// `*`
    Wildcard,
    /// `:` inside a bracketed slice.
    Colon,
}

impl TokenKind {
    /// Human-readable kind, used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Member => "member",
            Self::Descendant => "descendant",
            Self::Name => "name",
            Self::Number => "number",
            Self::OpenBracket => "open bracket",
            Self::CloseBracket => "close bracket",
            Self::Wildcard => "wildcard",
            Self::Colon => "colon",
        }
    }
}

/// One lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind of token.
    pub kind: TokenKind,
    /// Byte offset into the query string.
    pub pos: usize,
    /// The token's text.
    pub text: String,
}

/// Hand-rolled lexer with single-token lookahead.
#[derive(Debug)]
pub struct Lexer<'q> {
    input: &'q str,
    pos: usize,
    peeked: Option<Token>,
}

impl<'q> Lexer<'q> {
    /// Lex `query`.
    #[must_use]
    pub const fn new(query: &'q str) -> Self {
        Self {
            input: query,
            pos: 0,
            peeked: None,
        }
    }

    /// Whether all input (and lookahead) has been consumed.
    #[must_use]
    pub fn is_at_end(&self) -> bool {
        self.peeked.is_none() && self.rest().trim_start().is_empty()
    }

    /// Consume and return the next token.
    ///
    /// # Errors
    ///
    /// Fails on an unexpected character or on end of input.
    pub fn consume(&mut self) -> Result<Token, QueryError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.next_token()
    }

    /// Look at the next token without consuming it.
    ///
    /// # Errors
    ///
    /// Same failures as [`consume`](Self::consume).
    pub fn peek(&mut self) -> Result<Token, QueryError> {
        if let Some(token) = &self.peeked {
            return Ok(token.clone());
        }
        let token = self.next_token()?;
        self.peeked = Some(token.clone());
        Ok(token)
    }

    fn rest(&self) -> &'q str {
        &self.input[self.pos..]
    }

    fn next_token(&mut self) -> Result<Token, QueryError> {
        let bytes = self.input.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b' ' | b'\t' => self.pos += 1,
                b'$' => return Ok(self.single(TokenKind::Root)),
                b'.' => {
                    if bytes.get(self.pos + 1) == Some(&b'.') {
                        return Ok(self.double(TokenKind::Descendant));
                    }
                    return Ok(self.single(TokenKind::Member));
                }
                b'[' => return Ok(self.single(TokenKind::OpenBracket)),
                b']' => return Ok(self.single(TokenKind::CloseBracket)),
                b'*' => return Ok(self.single(TokenKind::Wildcard)),
                b':' => return Ok(self.single(TokenKind::Colon)),
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    let start = self.pos;
                    while self
                        .input
                        .as_bytes()
                        .get(self.pos)
                        .is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_')
                    {
                        self.pos += 1;
                    }
                    return Ok(self.span(TokenKind::Name, start));
                }
                c if c.is_ascii_digit() => {
                    let start = self.pos;
                    while self
                        .input
                        .as_bytes()
                        .get(self.pos)
                        .is_some_and(u8::is_ascii_digit)
                    {
                        self.pos += 1;
                    }
                    return Ok(self.span(TokenKind::Number, start));
                }
                c => {
                    return Err(QueryError::UnexpectedCharacter {
                        ch: char::from(c),
                        pos: self.pos,
                    });
                }
            }
        }
        Err(QueryError::UnexpectedEnd)
    }

    fn single(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 1;
        self.span(kind, start)
    }

    fn double(&mut self, kind: TokenKind) -> Token {
        let start = self.pos;
        self.pos += 2;
        self.span(kind, start)
    }

    fn span(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            pos: start,
            text: self.input[start..self.pos].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(query: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(query);
        let mut out = Vec::new();
        while !lexer.is_at_end() {
            out.push(lexer.consume().unwrap().kind);
        }
        out
    }

    #[test]
    fn lexes_member_chain() {
        assert_eq!(
            kinds("$.hello.world"),
            [
                TokenKind::Root,
                TokenKind::Member,
                TokenKind::Name,
                TokenKind::Member,
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn lexes_descendant_as_one_token() {
        assert_eq!(
            kinds("$..a"),
            [TokenKind::Root, TokenKind::Descendant, TokenKind::Name]
        );
    }

    #[test]
    fn lexes_bracketed_slice() {
        assert_eq!(
            kinds("$[1:4]"),
            [
                TokenKind::Root,
                TokenKind::OpenBracket,
                TokenKind::Number,
                TokenKind::Colon,
                TokenKind::Number,
                TokenKind::CloseBracket,
            ]
        );
    }

    #[test]
    fn peek_does_not_consume() {
        let mut lexer = Lexer::new("$.a");
        assert_eq!(lexer.peek().unwrap().kind, TokenKind::Root);
        assert_eq!(lexer.consume().unwrap().kind, TokenKind::Root);
        assert_eq!(lexer.consume().unwrap().kind, TokenKind::Member);
    }

    #[test]
    fn rejects_unexpected_characters() {
        let mut lexer = Lexer::new("$!");
        lexer.consume().unwrap();
        assert_eq!(
            lexer.consume(),
            Err(QueryError::UnexpectedCharacter { ch: '!', pos: 1 })
        );
    }

    #[test]
    fn names_may_contain_underscores_and_digits() {
        let mut lexer = Lexer::new("$.snake_case2");
        lexer.consume().unwrap();
        lexer.consume().unwrap();
        let name = lexer.consume().unwrap();
        assert_eq!(name.kind, TokenKind::Name);
        assert_eq!(name.text, "snake_case2");
    }
}
