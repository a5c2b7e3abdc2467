use std::sync::Arc;

use ariadne::Span;

const NOWHERE: &str = "<nowhere>";

/// Byte span inside a named source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub filename: Arc<str>,
    pub start: usize,
    pub end: usize,
}

impl Position {
    pub fn new(filename: Arc<str>, start: usize, end: usize) -> Self {
        Position {
            filename,
            start,
            end,
        }
    }

    pub fn nowhere() -> Self {
        Self {
            filename: Arc::from(NOWHERE),
            start: 0,
            end: 0,
        }
    }

    pub fn generator(filename: Arc<str>) -> PositionGenerator {
        PositionGenerator { filename }
    }
}

impl Span for Position {
    type SourceId = Arc<str>;

    fn source(&self) -> &Self::SourceId {
        &self.filename
    }

    fn start(&self) -> usize {
        self.start
    }

    fn end(&self) -> usize {
        self.end
    }
}

/// Hands out positions inside one source document.
#[derive(Debug, Clone)]
pub struct PositionGenerator {
    filename: Arc<str>,
}

impl PositionGenerator {
    pub fn make(&self, start: usize, end: usize) -> Position {
        Position {
            filename: self.filename.clone(),
            start,
            end,
        }
    }

    /// Position of the first string literal `"name"` at or after byte
    /// `from` of `source`, or the start of the document if there is none.
    pub fn literal(&self, source: &str, name: &str, from: usize) -> Position {
        let needle = format!("\"{name}\"");
        match source.get(from..).and_then(|rest| rest.find(&needle)) {
            Some(start) => self.make(from + start, from + start + needle.len()),
            None => self.make(0, 0),
        }
    }

    /// Position of a one-based line/column pair, as reported by JSON decoders.
    pub fn line_col(&self, source: &str, line: usize, column: usize) -> Position {
        let line_start: usize = source
            .split_inclusive('\n')
            .take(line.saturating_sub(1))
            .map(str::len)
            .sum();
        let start = (line_start + column.saturating_sub(1)).min(source.len());
        self.make(start, (start + 1).min(source.len()))
    }
}
