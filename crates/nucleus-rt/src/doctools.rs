//! Document tools: grep, fuzzy search, stats, and line-range access
//! (§4.4 "Document tools", §6.2 "Document-tools contract").

use nucleus_core::{Document, FuzzyRecord, GrepRecord, NucleusError, NucleusResult};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::Mutex;

/// A per-session cache of compiled patterns, since the same `grep`/`match`
/// pattern is frequently re-used across turns.
static PATTERN_CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn compiled_pattern(pattern: &str) -> NucleusResult<Regex> {
    if let Some(re) = PATTERN_CACHE.lock().unwrap().get(pattern) {
        return Ok(re.clone());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|e| NucleusError::InvalidPattern(format!("{pattern}: {e}")))?;
    PATTERN_CACHE
        .lock()
        .unwrap()
        .insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// A snapshot of document statistics, per §6.2's `text_stats` contract.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStats {
    pub length: usize,
    pub line_count: usize,
    pub sample_start: String,
    pub sample_middle: String,
    pub sample_end: String,
}

/// The collaborator the evaluator drives for every document-reading
/// built-in. Kept as a trait (rather than a concrete struct baked into
/// the evaluator) so tests can substitute a smaller fixture document.
pub trait DocumentTools {
    fn grep(&self, pattern: &str) -> NucleusResult<Vec<GrepRecord>>;
    fn fuzzy_search(&self, query: &str, limit: usize) -> Vec<FuzzyRecord>;
    fn text_stats(&self) -> TextStats;
    fn lines(&self, start: usize, end: usize) -> Vec<String>;
    fn context(&self) -> &str;
}

/// The default `DocumentTools` implementation backed by an in-memory
/// [`Document`].
pub struct DocumentToolkit {
    document: Document,
}

impl DocumentToolkit {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl DocumentTools for DocumentToolkit {
    /// Case-insensitive, multiline, global match; line numbers are derived
    /// by counting newlines before the match offset (§4.4).
    fn grep(&self, pattern: &str) -> NucleusResult<Vec<GrepRecord>> {
        let re = compiled_pattern(pattern)?;
        let text = self.document.text();
        let mut out = Vec::new();
        for (index, m) in re.find_iter(text).enumerate() {
            let line_num = text[..m.start()].bytes().filter(|&b| b == b'\n').count() + 1;
            let line = self.document.line(line_num).unwrap_or("").to_string();
            let groups = re
                .captures(m.as_str())
                .map(|caps| {
                    (1..caps.len())
                        .map(|i| caps.get(i).map(|g| g.as_str().to_string()))
                        .collect()
                })
                .unwrap_or_default();
            out.push(GrepRecord {
                matched: m.as_str().to_string(),
                line,
                line_num,
                index,
                groups,
            });
        }
        Ok(out)
    }

    /// Scores every line by (normalized) longest-common-subsequence length
    /// against the query, descending, ties broken by ascending `lineNum`.
    fn fuzzy_search(&self, query: &str, limit: usize) -> Vec<FuzzyRecord> {
        let query_lower = query.to_lowercase();
        let mut scored: Vec<FuzzyRecord> = self
            .document
            .lines()
            .map(|(line_num, line)| FuzzyRecord {
                line: line.to_string(),
                line_num,
                score: fuzzy_score(&query_lower, &line.to_lowercase()),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.line_num.cmp(&b.line_num))
        });
        scored.truncate(limit);
        scored
    }

    fn text_stats(&self) -> TextStats {
        const SAMPLE_WINDOW: usize = 3;
        let line_count = self.document.line_count();
        let mid = (line_count / 2).max(1);
        let window = |center: usize| -> String {
            let half = SAMPLE_WINDOW / 2;
            let start = center.saturating_sub(half).max(1);
            let end = start + SAMPLE_WINDOW - 1;
            self.document
                .line_range(start, end)
                .into_iter()
                .map(|(_, l)| l)
                .collect::<Vec<_>>()
                .join("\n")
        };
        TextStats {
            length: self.document.len(),
            line_count,
            sample_start: window(1),
            sample_middle: window(mid),
            sample_end: window(line_count.max(1)),
        }
    }

    fn lines(&self, start: usize, end: usize) -> Vec<String> {
        self.document
            .line_range(start, end)
            .into_iter()
            .map(|(_, l)| l.to_string())
            .collect()
    }

    fn context(&self) -> &str {
        self.document.text()
    }
}

/// Longest-common-subsequence length normalized by the longer string's
/// length, giving a score in `[0, 1]`.
fn fuzzy_score(query: &str, candidate: &str) -> f64 {
    if query.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let q: Vec<char> = query.chars().collect();
    let c: Vec<char> = candidate.chars().collect();
    let mut dp = vec![vec![0usize; c.len() + 1]; q.len() + 1];
    for i in 1..=q.len() {
        for j in 1..=c.len() {
            dp[i][j] = if q[i - 1] == c[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    let lcs = dp[q.len()][c.len()] as f64;
    lcs / q.len().max(c.len()) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolkit(text: &str) -> DocumentToolkit {
        DocumentToolkit::new(Document::new(text))
    }

    #[test]
    fn grep_finds_case_insensitive_matches_in_document_order() {
        let tk = toolkit("Sales: $100\nsales: $200\nOther: $300");
        let records = tk.grep("sales").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line_num, 1);
        assert_eq!(records[1].line_num, 2);
    }

    #[test]
    fn grep_invalid_pattern_is_an_error() {
        let tk = toolkit("text");
        assert!(tk.grep("(unterminated").is_err());
    }

    #[test]
    fn fuzzy_search_respects_limit_and_ordering() {
        let tk = toolkit("apple\napply\nbanana\napricot");
        let results = tk.fuzzy_search("appl", 2);
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn text_stats_reports_length_and_line_count() {
        let tk = toolkit("a\nb\nc");
        let stats = tk.text_stats();
        assert_eq!(stats.line_count, 3);
        assert_eq!(stats.length, 5);
    }

    #[test]
    fn text_stats_samples_span_multiple_lines() {
        let tk = toolkit("l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9");
        let stats = tk.text_stats();
        assert!(stats.sample_start.lines().count() > 1);
        assert!(stats.sample_middle.lines().count() > 1);
        assert!(stats.sample_end.lines().count() > 1);
    }

    #[test]
    fn lines_returns_requested_range() {
        let tk = toolkit("a\nb\nc\nd");
        assert_eq!(tk.lines(2, 3), vec!["b".to_string(), "c".to_string()]);
    }
}
