//! The handle registry and its handle-to-handle operations (§4.7).
//!
//! Handles let the evaluator hand the calling model a short textual stub
//! instead of a potentially huge array, while still letting it chain
//! `count`/`filter`/`map`/`sum`/`sort` across turns without ever shipping
//! the underlying data back and forth.

use crate::predicate_compiler;
use nucleus_core::{NucleusError, NucleusResult, Value};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;

/// Opaque identifier `$resN`. `N` is strictly increasing; deleted handles
/// are never reused (§3 "Handle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "$res{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Describe {
    pub count: usize,
    pub fields: Vec<String>,
    pub first_few: Vec<Value>,
}

/// Snapshot of the live-handle table and the `RESULTS` pointer, keyed by
/// turn number (§4.7 "Checkpoint manager").
#[derive(Debug, Clone, Default)]
struct Checkpoint {
    handles: HashMap<Handle, Vec<Value>>,
    results: Option<Handle>,
}

#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: HashMap<Handle, Vec<Value>>,
    next_id: u64,
    results: Option<Handle>,
    checkpoints: HashMap<u64, Checkpoint>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `store(seq) -> $resK`, K strictly increasing.
    pub fn store(&mut self, seq: Vec<Value>) -> Handle {
        self.next_id += 1;
        let handle = Handle(self.next_id);
        tracing::debug!(handle = %handle, len = seq.len(), "handle stored");
        self.handles.insert(handle, seq);
        handle
    }

    pub fn get(&self, handle: Handle) -> Option<&[Value]> {
        self.handles.get(&handle).map(Vec::as_slice)
    }

    fn require(&self, handle: Handle) -> NucleusResult<&[Value]> {
        self.get(handle)
            .ok_or_else(|| NucleusError::Unbound(format!("unknown handle {handle}")))
    }

    /// Short textual summary: the handle name, `Array(N)`, and a truncated
    /// preview of the first element's principal text (§6.4).
    pub fn get_stub(&self, handle: Handle) -> Option<String> {
        let seq = self.handles.get(&handle)?;
        let preview = seq
            .first()
            .map(|v| truncate(&v.principal_text(), 80))
            .unwrap_or_default();
        Some(format!("{handle}: Array({}) [{preview}]", seq.len()))
    }

    /// One line per live handle, plus a trailing `RESULTS: -> $resK` line
    /// if a results pointer is set (§6.4).
    pub fn build_context(&self) -> String {
        let mut ids: Vec<&Handle> = self.handles.keys().collect();
        ids.sort();
        let mut lines: Vec<String> = ids
            .into_iter()
            .filter_map(|h| self.get_stub(*h))
            .collect();
        if let Some(results) = self.results {
            lines.push(format!("RESULTS: -> {results}"));
        }
        lines.join("\n")
    }

    pub fn set_results(&mut self, handle: Handle) {
        self.results = Some(handle);
    }

    pub fn get_results(&self) -> Option<Handle> {
        self.results
    }

    /// Resolves the `RESULTS` pointer to its stored sequence, if any is set
    /// and still live.
    pub fn resolve_results(&self) -> Option<&[Value]> {
        self.results.and_then(|h| self.get(h))
    }

    pub fn count(&self, handle: Handle) -> NucleusResult<i64> {
        Ok(self.require(handle)?.len() as i64)
    }

    /// Sums a named numeric field across every element (§4.7 `sum(h,
    /// field)`); non-numeric or absent fields contribute zero.
    pub fn sum(&self, handle: Handle, field: &str) -> NucleusResult<f64> {
        let seq = self.require(handle)?;
        let total = seq
            .iter()
            .map(|v| field_or_self(v, field))
            .filter_map(|v| v.as_number())
            .sum();
        Ok(total)
    }

    /// Extracts the first numeric token (optionally `$`-prefixed,
    /// comma-thousanded) from each element's `line` field and sums them
    /// (§4.7 `sumFromLine`).
    pub fn sum_from_line(&self, handle: Handle) -> NucleusResult<f64> {
        let seq = self.require(handle)?;
        let mut total = 0.0;
        for value in seq {
            let line = match predicate_compiler::field_value(value, "line") {
                Value::String(s) => s,
                _ => value.principal_text(),
            };
            if let Some(n) = first_numeric_token(&line) {
                total += n;
            }
        }
        Ok(total)
    }

    /// `filter(h, predicate-source) -> $res*` — the predicate is compiled
    /// by the closed safe predicate compiler (§4.8) and run against each
    /// element in input order.
    pub fn filter(&mut self, handle: Handle, predicate_source: &str) -> NucleusResult<Handle> {
        let compiled = predicate_compiler::compile(predicate_source)?;
        let seq = self.require(handle)?.to_vec();
        let mut kept = Vec::new();
        for value in seq {
            if compiled.eval_predicate(&value)? {
                kept.push(value);
            }
        }
        Ok(self.store(kept))
    }

    /// `map(h, expression-source) -> $res*`, same compiler as `filter`.
    pub fn map(&mut self, handle: Handle, expression_source: &str) -> NucleusResult<Handle> {
        let compiled = predicate_compiler::compile(expression_source)?;
        let seq = self.require(handle)?.to_vec();
        let mut mapped = Vec::with_capacity(seq.len());
        for value in &seq {
            mapped.push(compiled.eval(value)?);
        }
        Ok(self.store(mapped))
    }

    /// Numeric comparator if both sides parse as numbers, else lexicographic
    /// on `principal_text`; `desc` inverts (§4.7 `sort`).
    pub fn sort(&mut self, handle: Handle, field: &str, desc: bool) -> NucleusResult<Handle> {
        let mut seq = self.require(handle)?.to_vec();
        seq.sort_by(|a, b| {
            let fa = field_or_self(a, field);
            let fb = field_or_self(b, field);
            let ordering = match (fa.as_number(), fb.as_number()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
                _ => fa.principal_text().cmp(&fb.principal_text()),
            };
            if desc {
                ordering.reverse()
            } else {
                ordering
            }
        });
        Ok(self.store(seq))
    }

    /// Returns the first `n` elements, raw — one of the two operations the
    /// registry lets materialize data (§4.7 `preview`).
    pub fn preview(&self, handle: Handle, n: usize) -> NucleusResult<Vec<Value>> {
        let seq = self.require(handle)?;
        Ok(seq.iter().take(n).cloned().collect())
    }

    /// Fisher-Yates sample of up to `n` elements, capped at the sequence
    /// length (§4.7 `sample`).
    pub fn sample(&self, handle: Handle, n: usize) -> NucleusResult<Vec<Value>> {
        let seq = self.require(handle)?;
        let cap = n.min(seq.len());
        let mut indices: Vec<usize> = (0..seq.len()).collect();
        indices.shuffle(&mut thread_rng());
        Ok(indices[..cap].iter().map(|&i| seq[i].clone()).collect())
    }

    /// `{count, fields, first-few}` (§4.7 `describe`).
    pub fn describe(&self, handle: Handle) -> NucleusResult<Describe> {
        let seq = self.require(handle)?;
        let mut fields = Vec::new();
        if let Some(first) = seq.first() {
            for name in ["match", "line", "lineNum", "index", "groups", "score"] {
                if !matches!(predicate_compiler::field_value(first, name), Value::Null) {
                    fields.push(name.to_string());
                }
            }
        }
        Ok(Describe {
            count: seq.len(),
            fields,
            first_few: seq.iter().take(3).cloned().collect(),
        })
    }

    /// Snapshots the live-handle table and `RESULTS` pointer under `turn`;
    /// overwrites any existing checkpoint at the same key.
    pub fn checkpoint(&mut self, turn: u64) {
        self.checkpoints.insert(
            turn,
            Checkpoint {
                handles: self.handles.clone(),
                results: self.results,
            },
        );
    }

    /// Re-installs a prior checkpoint's live-handle table and `RESULTS`
    /// pointer, discarding any handles created since (§4.7 "Checkpoint
    /// manager" only covers those two, not the monotonic counter).
    /// `next_id` is deliberately left untouched: rewinding it would let a
    /// later `store()` reissue a handle number already shown to the
    /// caller before the restore, violating "deleted handles are never
    /// re-used" (§3, §5).
    pub fn restore(&mut self, turn: u64) -> bool {
        if let Some(checkpoint) = self.checkpoints.get(&turn).cloned() {
            self.handles = checkpoint.handles;
            self.results = checkpoint.results;
            true
        } else {
            false
        }
    }

    /// Clears every handle, the `RESULTS` pointer, and every checkpoint,
    /// and rewinds the monotonic handle counter (§5 "Global counters...
    /// per-session and reset on reset() or close()").
    pub fn reset(&mut self) {
        tracing::debug!(cleared = self.handles.len(), "handle registry reset");
        self.handles.clear();
        self.results = None;
        self.checkpoints.clear();
        self.next_id = 0;
    }
}

/// `sum`/`sort` accept an empty field name for sequences of bare scalars
/// (no record to project a field out of); everything else projects the
/// named field the same way the predicate compiler does.
fn field_or_self(v: &Value, field: &str) -> Value {
    if field.is_empty() {
        v.clone()
    } else {
        predicate_compiler::field_value(v, field)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

fn first_numeric_token(line: &str) -> Option<f64> {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_digit() || (chars[i] == '$' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit())
        {
            let start = if chars[i] == '$' { i + 1 } else { i };
            let mut j = start;
            let mut raw = String::new();
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == ',' || chars[j] == '.') {
                if chars[j] != ',' {
                    raw.push(chars[j]);
                }
                j += 1;
            }
            if let Ok(n) = raw.parse::<f64>() {
                return Some(n);
            }
            i = j.max(i + 1);
        } else {
            i += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleus_core::GrepRecord;

    fn record(line: &str, line_num: usize) -> Value {
        Value::GrepRecord(GrepRecord {
            matched: line.to_string(),
            line: line.to_string(),
            line_num,
            index: 0,
            groups: vec![],
        })
    }

    #[test]
    fn store_returns_strictly_increasing_handles() {
        let mut registry = HandleRegistry::new();
        let a = registry.store(vec![Value::Number(1.0)]);
        let b = registry.store(vec![Value::Number(2.0)]);
        assert!(b.0 > a.0);
    }

    #[test]
    fn stub_contains_count_and_preview() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![Value::String("hello".into())]);
        let stub = registry.get_stub(h).unwrap();
        assert!(stub.contains("Array(1)"));
        assert!(stub.contains("hello"));
    }

    #[test]
    fn build_context_includes_results_pointer() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![Value::Number(1.0)]);
        registry.set_results(h);
        let ctx = registry.build_context();
        assert!(ctx.contains(&format!("RESULTS: -> {h}")));
    }

    #[test]
    fn count_and_sum_from_line_work() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![record("Revenue: $1,000", 1), record("Revenue: $2,500", 2)]);
        assert_eq!(registry.count(h).unwrap(), 2);
        assert_eq!(registry.sum_from_line(h).unwrap(), 3500.0);
    }

    #[test]
    fn filter_creates_a_new_handle_preserving_order() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![record("ERROR one", 1), record("info two", 2), record("ERROR three", 3)]);
        let filtered = registry.filter(h, "item.line.includes(\"ERROR\")").unwrap();
        assert_eq!(registry.count(filtered).unwrap(), 2);
        let preview = registry.preview(filtered, 10).unwrap();
        assert_eq!(preview[0].principal_text(), "ERROR one");
    }

    #[test]
    fn sort_numeric_then_reversed_for_desc() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![Value::Number(3.0), Value::Number(1.0), Value::Number(2.0)]);
        let asc = registry.sort(h, "", false).unwrap();
        let values = registry.preview(asc, 10).unwrap();
        assert_eq!(values, vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]);
    }

    #[test]
    fn sample_never_exceeds_sequence_length() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![Value::Number(1.0), Value::Number(2.0)]);
        let sampled = registry.sample(h, 100).unwrap();
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn checkpoint_and_restore_round_trip() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![Value::Number(1.0)]);
        registry.set_results(h);
        registry.checkpoint(1);
        registry.store(vec![Value::Number(2.0)]);
        registry.set_results(Handle(2));
        registry.restore(1);
        assert_eq!(registry.get_results(), Some(h));
        assert!(registry.get(Handle(2)).is_none());
    }

    #[test]
    fn restore_never_lets_a_shown_handle_number_be_reissued() {
        let mut registry = HandleRegistry::new();
        registry.store(vec![Value::Number(1.0)]);
        registry.checkpoint(1);
        registry.store(vec![Value::Number(2.0)]); // $res2, shown to the caller
        registry.restore(1);
        let next = registry.store(vec![Value::Number(3.0)]);
        assert_eq!(next, Handle(3), "restore must not rewind next_id and let $res2 be reissued");
    }

    #[test]
    fn reset_rewinds_the_handle_counter() {
        let mut registry = HandleRegistry::new();
        registry.store(vec![Value::Number(1.0)]);
        registry.reset();
        let h = registry.store(vec![Value::Number(2.0)]);
        assert_eq!(h, Handle(1));
    }

    #[test]
    fn describe_reports_count_fields_and_first_few() {
        let mut registry = HandleRegistry::new();
        let h = registry.store(vec![record("a", 1), record("b", 2)]);
        let d = registry.describe(h).unwrap();
        assert_eq!(d.count, 2);
        assert!(d.fields.contains(&"line".to_string()));
        assert_eq!(d.first_few.len(), 2);
    }
}
