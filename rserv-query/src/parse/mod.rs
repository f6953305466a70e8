//! Parsing for Sulpher.
//!
//! The parser is a hand-written recursive descent over a [`TokenStream`]
//! with single-token lookahead and save/restore backtracking for the one
//! ambiguous production (`NOT (x)-[:L]->()` vs. a parenthesised
//! expression).

mod query;
mod stream;

pub use query::parse_query;
pub use stream::TokenStream;
