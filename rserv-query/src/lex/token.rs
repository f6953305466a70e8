//! Sulpher token types.
//!
//! Tokens are the output of lexical analysis; each carries its source span
//! for diagnostics.

use crate::span::SourceSpan;

/// A token with its source span.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The token kind
    pub kind: TokenKind,
    /// Source location
    pub span: SourceSpan,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    /// Check if this is an EOF token.
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    /// The token's text for diagnostics and canonicalisation.
    pub fn text(&self, source: &str) -> String {
        match &self.kind {
            TokenKind::Eof => "<end of query>".to_string(),
            _ => self.span.slice(source).to_string(),
        }
    }
}

/// Token kinds for Sulpher.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Variable, type, label, or field name
    Ident(String),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal, single or double quoted (unescaped content)
    Str(String),

    // Keywords (case-insensitive)
    KwBfs,
    KwDfs,
    KwMatch,
    KwWhere,
    KwWith,
    KwReturn,
    KwOrder,
    KwBy,
    KwLimit,
    KwAsc,
    KwDesc,
    KwAnd,
    KwOr,
    KwNot,
    KwCount,
    KwSum,
    KwAvg,
    KwMin,
    KwMax,
    KwDistinct,
    KwTrue,
    KwFalse,
    KwNull,

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `-` (edge introducer, unary minus)
    Minus,
    /// `->`
    Arrow,
    Colon,
    Pipe,
    Comma,
    Dot,
    /// `..` (variable-length range)
    DotDot,
    Star,
    Eq,
    /// `!=`
    Ne,
    Lt,
    /// `<=`
    Le,
    Gt,
    /// `>=`
    Ge,

    /// End of input
    Eof,
    /// Unlexable input
    Error(String),
}

impl TokenKind {
    /// Identifier text, treating keywords as plain words where the grammar
    /// expects a name (e.g. a field called `count`).
    pub fn as_word(&self) -> Option<&str> {
        match self {
            TokenKind::Ident(s) => Some(s),
            TokenKind::KwCount => Some("count"),
            TokenKind::KwSum => Some("sum"),
            TokenKind::KwAvg => Some("avg"),
            TokenKind::KwMin => Some("min"),
            TokenKind::KwMax => Some("max"),
            TokenKind::KwOrder => Some("order"),
            TokenKind::KwBy => Some("by"),
            TokenKind::KwLimit => Some("limit"),
            _ => None,
        }
    }
}

/// Map a word to its keyword kind, case-insensitively.
pub fn keyword_from_str(word: &str) -> Option<TokenKind> {
    match word.to_uppercase().as_str() {
        "BFS" => Some(TokenKind::KwBfs),
        "DFS" => Some(TokenKind::KwDfs),
        "MATCH" => Some(TokenKind::KwMatch),
        "WHERE" => Some(TokenKind::KwWhere),
        "WITH" => Some(TokenKind::KwWith),
        "RETURN" => Some(TokenKind::KwReturn),
        "ORDER" => Some(TokenKind::KwOrder),
        "BY" => Some(TokenKind::KwBy),
        "LIMIT" => Some(TokenKind::KwLimit),
        "ASC" => Some(TokenKind::KwAsc),
        "DESC" => Some(TokenKind::KwDesc),
        "AND" => Some(TokenKind::KwAnd),
        "OR" => Some(TokenKind::KwOr),
        "NOT" => Some(TokenKind::KwNot),
        "COUNT" => Some(TokenKind::KwCount),
        "SUM" => Some(TokenKind::KwSum),
        "AVG" => Some(TokenKind::KwAvg),
        "MIN" => Some(TokenKind::KwMin),
        "MAX" => Some(TokenKind::KwMax),
        "DISTINCT" => Some(TokenKind::KwDistinct),
        "TRUE" => Some(TokenKind::KwTrue),
        "FALSE" => Some(TokenKind::KwFalse),
        "NULL" => Some(TokenKind::KwNull),
        _ => None,
    }
}
