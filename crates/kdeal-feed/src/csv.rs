//! Line-oriented CSV reader for the Awin datafeed.
//!
//! Quoted fields may contain commas and `""` escapes but not line breaks;
//! the feed never emits multi-line cells.

use kdeal_core::RawFeedRow;

/// Split one CSV line into trimmed fields.
///
/// A `"` toggles quote mode, `""` inside quotes is a literal quote, and a
/// comma only separates fields outside quotes.
#[must_use]
pub fn parse_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_owned());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    fields.push(current.trim().to_owned());
    fields
}

/// Rows read from some span of a feed, plus what was dropped on the way.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub rows: Vec<RawFeedRow>,
    /// Data lines examined, blank lines included.
    pub lines_scanned: usize,
    /// Lines whose field count did not match the header.
    pub skipped_rows: usize,
}

impl ParsedFeed {
    /// Drop rows missing an external id or a title. Returns how many were dropped.
    pub fn retain_identified(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(RawFeedRow::has_identity);
        before - self.rows.len()
    }
}

/// A feed body split into a header and its data lines.
///
/// Lines are only split into fields when a caller asks for them, so a
/// bounded read or a window never pays for the rest of the file.
#[derive(Debug)]
pub struct FeedDocument<'a> {
    header: Vec<String>,
    lines: Vec<&'a str>,
}

impl<'a> FeedDocument<'a> {
    /// Uses the first non-empty line as the header.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let mut lines = text.lines();
        let header = lines
            .by_ref()
            .find(|line| !line.trim().is_empty())
            .map(|line| parse_line(line.trim_start_matches('\u{feff}')))
            .unwrap_or_default();
        Self {
            header,
            lines: lines.collect(),
        }
    }

    #[must_use]
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of lines after the header, blank lines included.
    #[must_use]
    pub fn data_line_count(&self) -> usize {
        self.lines.len()
    }

    /// Rows that parse against the header and carry an id and a title.
    #[must_use]
    pub fn identified_row_count(&self) -> usize {
        let mut parsed = self.rows(None);
        parsed.retain_identified();
        parsed.rows.len()
    }

    /// Parse data lines from the start, stopping once `max_rows` rows exist.
    #[must_use]
    pub fn rows(&self, max_rows: Option<usize>) -> ParsedFeed {
        self.parse_lines(0, self.lines.len(), max_rows)
    }

    /// Parse the data lines in `[start, start + len)`.
    #[must_use]
    pub fn window(&self, start: usize, len: usize) -> ParsedFeed {
        self.parse_lines(start, len, None)
    }

    fn parse_lines(&self, start: usize, len: usize, max_rows: Option<usize>) -> ParsedFeed {
        let mut parsed = ParsedFeed::default();
        if self.header.is_empty() {
            return parsed;
        }
        let limit = max_rows.unwrap_or(usize::MAX);
        let end = start.saturating_add(len).min(self.lines.len());

        for line in self.lines.get(start..end).unwrap_or_default() {
            if parsed.rows.len() >= limit {
                break;
            }
            parsed.lines_scanned += 1;
            if line.trim().is_empty() {
                continue;
            }
            let values = parse_line(line);
            if values.len() != self.header.len() {
                parsed.skipped_rows += 1;
                continue;
            }
            parsed
                .rows
                .push(self.header.iter().cloned().zip(values).collect());
        }
        parsed
    }
}

/// Parse a whole feed body, optionally bounded to `max_rows` rows.
#[must_use]
pub fn parse_feed(text: &str, max_rows: Option<usize>) -> ParsedFeed {
    FeedDocument::new(text).rows(max_rows)
}

#[cfg(test)]
#[path = "csv_test.rs"]
mod tests;
