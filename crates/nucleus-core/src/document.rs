//! The document the session is queried against (§3 "Document").
//!
//! A `Document` is immutable once loaded: every tool (grep, fuzzy search,
//! line-range, text stats) reads from it but nothing in the pipeline ever
//! mutates its bytes. Lines are 1-indexed throughout, matching the way a
//! human (or an LLM quoting a line number back) would refer to them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    text: String,
    lines: Vec<(usize, usize)>,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let lines = line_spans(&text);
        Self { text, lines }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Returns the 1-indexed line's text, without its trailing newline.
    pub fn line(&self, line_num: usize) -> Option<&str> {
        let (start, end) = *self.lines.get(line_num.checked_sub(1)?)?;
        Some(&self.text[start..end])
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(move |(i, &(start, end))| (i + 1, &self.text[start..end]))
    }

    /// The inclusive 1-indexed `[start, end]` range of lines, clamped to the
    /// document's bounds (§4.4 "lines" never errors on an out-of-range
    /// request, it just returns fewer lines).
    pub fn line_range(&self, start: usize, end: usize) -> Vec<(usize, &str)> {
        let start = start.max(1);
        let end = end.min(self.line_count());
        if start > end {
            return Vec::new();
        }
        (start..=end)
            .filter_map(|n| self.line(n).map(|l| (n, l)))
            .collect()
    }

    /// A short, deterministic preview: the first `max_chars` characters,
    /// with a `…` suffix if the document was truncated.
    pub fn sample(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let truncated: String = self.text.chars().take(max_chars).collect();
        format!("{truncated}…")
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

fn line_spans(text: &str) -> Vec<(usize, usize)> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            let end = if i > start && text.as_bytes()[i - 1] == b'\r' {
                i - 1
            } else {
                i
            };
            spans.push((start, end));
            start = i + 1;
        }
    }
    if start <= text.len() {
        spans.push((start, text.len()));
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_numbers_are_one_indexed() {
        let doc = Document::new("alpha\nbeta\ngamma");
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(1), Some("alpha"));
        assert_eq!(doc.line(3), Some("gamma"));
        assert_eq!(doc.line(0), None);
        assert_eq!(doc.line(4), None);
    }

    #[test]
    fn line_range_clamps_to_bounds() {
        let doc = Document::new("a\nb\nc");
        assert_eq!(
            doc.line_range(0, 100),
            vec![(1, "a"), (2, "b"), (3, "c")]
        );
        assert!(doc.line_range(5, 10).is_empty());
    }

    #[test]
    fn crlf_line_endings_strip_carriage_return() {
        let doc = Document::new("a\r\nb\r\n");
        assert_eq!(doc.line(1), Some("a"));
        assert_eq!(doc.line(2), Some("b"));
    }

    #[test]
    fn sample_truncates_with_ellipsis() {
        let doc = Document::new("0123456789");
        assert_eq!(doc.sample(4), "0123…");
        assert_eq!(doc.sample(100), "0123456789");
    }
}
