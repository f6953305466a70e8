//! Token stream for parsing.
//!
//! Wraps the lexer output and provides lookahead, matching, and error
//! construction. Errors carry the offending token text and its 1-based
//! column.

use crate::lex::{Token, TokenKind};
use rserv_core::error::Error;

/// A stream of tokens for parsing.
#[derive(Debug)]
pub struct TokenStream<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> TokenStream<'a> {
    /// Create a new token stream. The token vector always ends with EOF.
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    /// Current position for backtracking.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Restore a saved position.
    pub fn restore(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Peek at the current token without consuming it.
    pub fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream always ends with EOF")
        })
    }

    /// Peek at the nth token ahead (0 = current).
    pub fn peek_n(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or_else(|| {
            self.tokens
                .last()
                .expect("token stream always ends with EOF")
        })
    }

    /// Is the stream exhausted?
    pub fn is_eof(&self) -> bool {
        self.peek().is_eof()
    }

    /// Consume and return the current token.
    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        token
    }

    /// Check the current token kind by discriminant.
    pub fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    /// Consume the current token if it matches, returning true.
    pub fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect and consume a token kind, or fail with a syntax error.
    pub fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, Error> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// Consume an identifier-like word (identifiers, plus keywords usable
    /// as names).
    pub fn expect_word(&mut self, what: &str) -> Result<String, Error> {
        match self.peek().kind.as_word() {
            Some(word) => {
                let word = word.to_string();
                self.advance();
                Ok(word)
            }
            None => Err(self.error(format!("expected {what}"))),
        }
    }

    /// Build a syntax error at the current token.
    pub fn error(&self, message: impl Into<String>) -> Error {
        let token = self.peek();
        Error::QuerySyntax {
            message: message.into(),
            token: token.text(self.source),
            column: token.span.column(self.source),
        }
    }
}
