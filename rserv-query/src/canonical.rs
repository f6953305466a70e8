//! Query canonicalisation for result caching.
//!
//! Two spellings of the same query must map to one cache key: whitespace is
//! normalised to single spaces and everything outside string literals is
//! case-folded. String literals keep their case and are re-quoted in a
//! single canonical form.

use crate::lex::{Lexer, TokenKind};

/// Canonicalise a query string into its cache key.
///
/// Works on any input, including queries that will later fail to parse;
/// unlexable characters pass through lowercased so the key stays
/// deterministic.
pub fn canonicalize(source: &str) -> String {
    let tokens = Lexer::new(source).tokenize();
    let mut parts = Vec::with_capacity(tokens.len());

    for token in &tokens {
        match &token.kind {
            TokenKind::Eof => break,
            TokenKind::Str(content) => {
                let escaped = content.replace('\\', "\\\\").replace('\'', "\\'");
                parts.push(format!("'{escaped}'"));
            }
            _ => parts.push(token.span.slice(source).to_lowercase()),
        }
    }

    parts.join(" ")
}
