//! Source spans for diagnostics.
//!
//! Every token carries its byte span so parse errors can report the
//! offending token and column.

/// A byte range in the query text: `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    /// Byte offset of the start (inclusive)
    pub start: usize,
    /// Byte offset of the end (exclusive)
    pub end: usize,
}

impl SourceSpan {
    /// Span from start to end byte offsets.
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty span at a single position.
    pub const fn point(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// The covered substring, clamped to the source bounds.
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        let len = source.len();
        let start = self.start.min(len);
        let end = self.end.min(len).max(start);
        &source[start..end]
    }

    /// 1-based column of the span start. Sulpher queries are expected on a
    /// single line; newlines reset the count.
    pub fn column(&self, source: &str) -> usize {
        let upto = &source[..self.start.min(source.len())];
        match upto.rfind('\n') {
            Some(nl) => self.start - nl,
            None => self.start + 1,
        }
    }
}
