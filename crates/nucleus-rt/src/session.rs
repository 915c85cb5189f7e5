//! The surface API a host adapter drives a conversation through (§6.1).
//!
//! `Session` is the one stateful object a host holds on to: it owns the
//! loaded document, the binding environment, the handle registry, the
//! knowledge base, and the turn counter. Everything else in this crate is
//! a stateless collaborator `Session` wires together per call.

use crate::deadline::Deadline;
use crate::doctools::{DocumentToolkit, DocumentTools};
use crate::eval::Evaluator;
use crate::handles::{Handle, HandleRegistry};
use crate::symbols::{NullSymbolIndexer, SymbolIndexer};
use chrono::Utc;
use nucleus_compiler::CompileError;
use nucleus_core::{Document, Environment, Type, Value};
use std::time::Duration;

/// Tunable knobs a host adapter can override at `Session` construction
/// time. Defaults match the spec's literal defaults exactly.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `fuzzy_search`'s limit when the command omits one (§4.4: default 10).
    pub fuzzy_search_default_limit: usize,
    /// `run(goal, maxResults)`'s cap inside the relational core (§4.5.1).
    pub max_results: usize,
    /// Upper bound on extractor-search candidates considered per
    /// synthesis call, independent of the DSL's own depth bound.
    pub synthesis_candidate_budget: usize,
    /// Cooperative cancellation granularity for one `execute` call (§5).
    pub turn_deadline: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fuzzy_search_default_limit: 10,
            max_results: 10,
            synthesis_candidate_budget: 64,
            turn_deadline: Duration::from_secs(5),
        }
    }
}

/// `load(document-bytes|path)`'s return shape: the stats a host shows
/// immediately after opening a document, before any command runs.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadStats {
    pub length: usize,
    pub line_count: usize,
}

/// `execute(source-text)`'s return shape (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteOutcome {
    pub success: bool,
    pub value: Option<Value>,
    pub logs: Vec<String>,
    pub error: Option<String>,
    pub inferred_type: Option<Type>,
    /// Set when `value` was a sequence and the session auto-registered it
    /// in the handle registry — the adapter may show `{handle, stub}`
    /// instead of the raw array (§6.1).
    pub handle: Option<Handle>,
    pub stub: Option<String>,
}

impl ExecuteOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            logs: Vec::new(),
            error: Some(error.into()),
            inferred_type: None,
            handle: None,
            stub: None,
        }
    }
}

/// What `expand(handle, ...)` hands back: a page of raw elements plus
/// whether more remain beyond the requested window.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandPage {
    pub items: Vec<Value>,
    pub total: usize,
    pub truncated: bool,
}

const COMMAND_REFERENCE: &str = "\
Nucleus DSL command reference
==============================
(grep \"pattern\")                          case-insensitive, multiline search
(fuzzy_search \"query\" limit)               best-effort search, ranked by similarity
(text_stats)                               document length/line-count/sample
(lines start end)                          a 1-indexed line range
(count seq) (sum seq)                      aggregate a handle or inline sequence
(filter seq predicate) (map seq fn)        lambda-driven transforms
(reduce seq init fn)                       left fold
(parseInt s) (parseFloat s) (parseNumber s) (parseDate s) (parseCurrency s)
                                           best-effort parse, :examples fall back to synthesis
(match s pattern group) (replace s from to) (split s delim index)
(if cond then else) (lambda param body) (app fn arg)
(classify examples) (predicate s examples) (define-fn name examples) (apply-fn name arg)
(extract s pattern group targetType? examples?)
(coerce term targetType)
(list_symbols kind?) (get_symbol_body sym) (find_references name)

Results of a sequence-typed command bind to RESULTS and to a handle
($resK). Handles support count/sum/sumFromLine/filter/map/sort/preview/
sample/describe without re-shipping the underlying data.
";

/// The stateful object a host adapter holds for one document conversation.
pub struct Session {
    config: SessionConfig,
    tools: DocumentToolkit,
    env: Environment,
    evaluator: Evaluator,
    handles: HandleRegistry,
    symbols: Box<dyn SymbolIndexer>,
}

impl Session {
    /// `load(document-bytes|path)`. The caller is responsible for reading
    /// bytes/paths into a string; this constructor takes the text itself so
    /// the crate stays free of filesystem/encoding concerns.
    pub fn load(text: &str) -> (Self, LoadStats) {
        Self::load_with_config(text, SessionConfig::default())
    }

    pub fn load_with_config(text: &str, config: SessionConfig) -> (Self, LoadStats) {
        let document = Document::new(text);
        let stats = LoadStats {
            length: document.len(),
            line_count: document.line_count(),
        };
        tracing::info!(length = stats.length, line_count = stats.line_count, "session loaded");
        let evaluator = Evaluator::new().with_default_fuzzy_limit(config.fuzzy_search_default_limit);
        let session = Self {
            config,
            tools: DocumentToolkit::new(document),
            env: Environment::new(),
            evaluator,
            handles: HandleRegistry::new(),
            symbols: Box::new(NullSymbolIndexer),
        };
        (session, stats)
    }

    /// Installs a host-supplied symbol indexer in place of the default
    /// empty-answer one (§4.4 "Document tools").
    pub fn with_symbol_indexer(mut self, symbols: Box<dyn SymbolIndexer>) -> Self {
        self.symbols = symbols;
        self
    }

    /// `execute(source-text)` → `{success, value, logs, error,
    /// inferredType}`; on a sequence result, registers a handle and
    /// surfaces its stub alongside the raw value (§6.1).
    #[tracing::instrument(level = "debug", skip(self, source))]
    pub fn execute(&mut self, source: &str) -> ExecuteOutcome {
        let compiled = match nucleus_compiler::compile(source) {
            Ok(compiled) => compiled,
            Err(e) => {
                tracing::warn!(error = %e, "compile failed");
                return ExecuteOutcome::failure(compile_error_message(&e));
            }
        };

        let deadline = Deadline::after(self.config.turn_deadline);
        let now = Utc::now();
        match self.evaluator.evaluate_turn(
            &compiled.term,
            &self.env,
            &self.tools,
            self.symbols.as_ref(),
            Some(&deadline),
            now,
        ) {
            Ok((outcome, next_env)) => {
                self.env = next_env;
                let (handle, stub) = match &outcome.value {
                    Value::Array(items) => {
                        let h = self.handles.store(items.clone());
                        self.handles.set_results(h);
                        let stub = self.handles.get_stub(h);
                        tracing::debug!(handle = %h, len = items.len(), "turn produced a sequence, stored as handle");
                        (Some(h), stub)
                    }
                    _ => (None, None),
                };
                ExecuteOutcome {
                    success: true,
                    value: Some(outcome.value),
                    logs: outcome.logs,
                    error: None,
                    inferred_type: Some(compiled.inferred_type),
                    handle,
                    stub,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "evaluation failed");
                ExecuteOutcome {
                    success: false,
                    value: None,
                    logs: Vec::new(),
                    error: Some(e.to_string()),
                    inferred_type: Some(compiled.inferred_type),
                    handle: None,
                    stub: None,
                }
            }
        }
    }

    /// `expand(handle, limit, offset, format)` — the one place the
    /// registry materializes data back to the caller (§6.1). `format` is
    /// left to the adapter; this returns the raw page it would render.
    pub fn expand(&self, handle: Handle, limit: Option<usize>, offset: usize) -> Option<ExpandPage> {
        let all = self.handles.get(handle)?;
        let total = all.len();
        let window = all.iter().skip(offset);
        let items: Vec<Value> = match limit {
            Some(n) => window.take(n).cloned().collect(),
            None => window.cloned().collect(),
        };
        let truncated = offset + items.len() < total;
        Some(ExpandPage { items, total, truncated })
    }

    /// `reset()` clears bindings and handles but keeps the document.
    pub fn reset(&mut self) {
        tracing::info!("session reset: bindings and handles cleared");
        self.env = Environment::new();
        self.handles.reset();
        self.evaluator = Evaluator::new().with_default_fuzzy_limit(self.config.fuzzy_search_default_limit);
    }

    /// `close()` frees the session. Nothing here owns external resources,
    /// so this is just an explicit, discoverable drop point for adapters
    /// that want a symmetrical open/close pair.
    pub fn close(self) {
        tracing::info!("session closed");
        drop(self);
    }

    /// `commandReference()` returns the static help text.
    pub fn command_reference(&self) -> &'static str {
        COMMAND_REFERENCE
    }

    /// The live-handle context block a host can prepend to a prompt
    /// (`build_context` plus the `RESULTS` pointer line, §6.4).
    pub fn handle_context(&self) -> String {
        self.handles.build_context()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

fn compile_error_message(e: &CompileError) -> String {
    e.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_length_and_line_count() {
        let (_, stats) = Session::load("a\nb\nc");
        assert_eq!(stats.line_count, 3);
        assert_eq!(stats.length, 5);
    }

    #[test]
    fn execute_grep_registers_a_handle_and_stub() {
        let (mut session, _) = Session::load("Sales: $100\nOther: $200\nSales: $300");
        let outcome = session.execute(r#"(grep "Sales")"#);
        assert!(outcome.success);
        assert!(outcome.handle.is_some());
        assert!(outcome.stub.unwrap().starts_with("$res1: Array(2)"));
    }

    #[test]
    fn execute_surfaces_parse_errors_without_panicking() {
        let (mut session, _) = Session::load("text");
        let outcome = session.execute("");
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn expand_pages_through_a_stored_handle() {
        let (mut session, _) = Session::load("a\nb\na\nc\na");
        let outcome = session.execute(r#"(grep "a")"#);
        let handle = outcome.handle.unwrap();
        let page = session.expand(handle, Some(2), 0).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 3);
        assert!(page.truncated);
    }

    #[test]
    fn reset_clears_bindings_but_keeps_the_document() {
        let (mut session, _) = Session::load("x\ny");
        session.execute(r#"(grep "x")"#);
        session.reset();
        assert!(session.handle_context().is_empty());
        assert_eq!(session.tools.context(), "x\ny");
    }

    #[test]
    fn command_reference_is_non_empty_static_text() {
        let (session, _) = Session::load("text");
        assert!(session.command_reference().contains("grep"));
    }
}
