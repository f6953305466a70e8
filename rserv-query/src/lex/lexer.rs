//! Sulpher lexer implementation using winnow.
//!
//! Tokenizes query text into a stream of tokens with source spans. Bad
//! input becomes an `Error` token so the parser can report the offending
//! text and column instead of panicking.

use winnow::combinator::{alt, delimited, opt, preceded};
use winnow::error::ContextError;
use winnow::stream::{Location, Stream};
use winnow::token::{any, take_till, take_while};
use winnow::{LocatingSlice, ModalResult, Parser};

use super::token::{keyword_from_str, Token, TokenKind};
use crate::span::SourceSpan;

/// Input type for the lexer - tracks position for spans.
pub type Input<'a> = LocatingSlice<&'a str>;

/// Lexer for Sulpher queries.
pub struct Lexer<'a> {
    input: &'a str,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given input.
    pub fn new(input: &'a str) -> Self {
        Self { input }
    }

    /// Tokenize the entire input.
    pub fn tokenize(self) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut input = LocatingSlice::new(self.input);

        loop {
            let _: ModalResult<&str, ContextError> =
                take_while(0.., char::is_whitespace).parse_next(&mut input);

            if input.is_empty() {
                let pos = input.current_token_start();
                tokens.push(Token::new(TokenKind::Eof, SourceSpan::point(pos)));
                break;
            }

            let start = input.current_token_start();
            match next_token(&mut input) {
                Ok(kind) => {
                    let end = input.current_token_start();
                    tokens.push(Token::new(kind, SourceSpan::new(start, end)));
                }
                Err(_) => {
                    let c = any::<_, ContextError>.parse_next(&mut input).unwrap_or('?');
                    let end = input.current_token_start();
                    tokens.push(Token::new(
                        TokenKind::Error(format!("unexpected character: '{c}'")),
                        SourceSpan::new(start, end),
                    ));
                }
            }
        }

        tokens
    }
}

/// Parse the next token.
fn next_token(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        // Multi-char operators before their single-char prefixes
        "->".value(TokenKind::Arrow),
        "..".value(TokenKind::DotDot),
        "!=".value(TokenKind::Ne),
        "<=".value(TokenKind::Le),
        ">=".value(TokenKind::Ge),
        parse_number,
        parse_word,
        parse_string,
        parse_punctuation,
    ))
    .parse_next(input)
}

/// Identifier or keyword: `[A-Za-z_][A-Za-z0-9_]*`.
fn parse_word(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let word: &str = (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)?;

    Ok(keyword_from_str(word).unwrap_or_else(|| TokenKind::Ident(word.to_string())))
}

/// Integer or float literal. The sign is handled by the parser so `-` can
/// also introduce an edge.
fn parse_number(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let text: &str = (
        take_while(1.., |c: char| c.is_ascii_digit()),
        // A lone `.` may start a `..` range; only consume when digits follow
        opt(preceded(
            ('.', winnow::combinator::peek(any.verify(|c: &char| c.is_ascii_digit()))),
            take_while(0.., |c: char| c.is_ascii_digit()),
        )),
    )
        .take()
        .parse_next(input)?;

    if text.contains('.') {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| winnow::error::ErrMode::Cut(ContextError::new()))
    } else {
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| winnow::error::ErrMode::Cut(ContextError::new()))
    }
}

/// Single- or double-quoted string literal with backslash escapes.
fn parse_string(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((parse_quoted::<'\''>, parse_quoted::<'"'>)).parse_next(input)
}

fn parse_quoted<const Q: char>(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    delimited(Q, string_content::<Q>, Q)
        .map(TokenKind::Str)
        .parse_next(input)
}

fn string_content<const Q: char>(input: &mut Input<'_>) -> ModalResult<String> {
    let mut result = String::new();
    loop {
        let chunk: &str = take_till(0.., |c| c == Q || c == '\\').parse_next(input)?;
        result.push_str(chunk);
        if !input.starts_with('\\') {
            break;
        }
        '\\'.parse_next(input)?;
        let escaped = any.parse_next(input)?;
        match escaped {
            'n' => result.push('\n'),
            't' => result.push('\t'),
            'r' => result.push('\r'),
            other => result.push(other),
        }
    }
    Ok(result)
}

fn parse_punctuation(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let c = any.parse_next(input)?;
    let kind = match c {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        '{' => TokenKind::LBrace,
        '}' => TokenKind::RBrace,
        '-' => TokenKind::Minus,
        ':' => TokenKind::Colon,
        '|' => TokenKind::Pipe,
        ',' => TokenKind::Comma,
        '.' => TokenKind::Dot,
        '*' => TokenKind::Star,
        '=' => TokenKind::Eq,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        _ => return Err(winnow::error::ErrMode::Backtrack(ContextError::new())),
    };
    Ok(kind)
}
