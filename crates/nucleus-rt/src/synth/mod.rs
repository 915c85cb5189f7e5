//! The synthesis integrator: the evaluator's single entry point into the
//! synthesis engine (§6.3 "Synthesis integrator contract").
//!
//! Wires together strategy dispatch (§4.5.2), the knowledge base's
//! extractor-first consultation, and the idempotent `(operation,
//! examples)` cache the surface API requires.

pub mod extractor_dsl;
pub mod minikanren;
pub mod strategies;

use crate::kb::{Component, ComponentKind, KnowledgeBase};
use chrono::{DateTime, Utc};
use extractor_dsl::ExtractorExpr;
use nucleus_core::{Example, NucleusError};
use std::collections::HashMap;
use strategies::{literal_text, ClassifierRule, SynthesizedProgram};

/// What a strategy hands back, in a shape the evaluator can apply
/// directly without depending on `strategies`' internal types.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizedCallable {
    Extractor(ExtractorExpr),
    Classifier(Vec<ClassifierRule>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOutcome {
    pub success: bool,
    pub callable: Option<SynthesizedCallable>,
    pub code: String,
    pub cache_key: String,
    pub error: Option<String>,
}

impl SynthesisOutcome {
    fn failure(cache_key: String, error: NucleusError) -> Self {
        Self {
            success: false,
            callable: None,
            code: String::new(),
            cache_key,
            error: Some(error.to_string()),
        }
    }
}

/// Dispatches `synthesizeOnFailure` by operation name, caches both the
/// callable and its source, and consults the knowledge base before
/// running the extractor strategy (§4.5.2, §6.3).
#[derive(Debug, Default)]
pub struct SynthesisIntegrator {
    cache: HashMap<String, SynthesisOutcome>,
}

impl SynthesisIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `synthesizeOnFailure({operation, examples, ...}) -> {success, fn,
    /// code, cacheKey, error}`. Idempotent for equal `(operation,
    /// examples)` — a second call with the same inputs returns the cached
    /// outcome without re-running any strategy.
    pub fn synthesize_on_failure(
        &mut self,
        operation: &str,
        examples: &[Example],
        kb: &mut KnowledgeBase,
        now: DateTime<Utc>,
    ) -> SynthesisOutcome {
        let cache_key = cache_key_for(operation, examples);
        if let Some(cached) = self.cache.get(&cache_key) {
            tracing::debug!(operation, cache_key, "synthesis cache hit");
            return cached.clone();
        }
        tracing::info!(operation, example_count = examples.len(), "dispatching synthesis strategy");
        let outcome = self.run(operation, examples, kb, &cache_key, now);
        if !outcome.success {
            tracing::warn!(operation, error = outcome.error.as_deref().unwrap_or(""), "synthesis failed");
        }
        self.cache.insert(cache_key, outcome.clone());
        outcome
    }

    fn run(
        &self,
        operation: &str,
        examples: &[Example],
        kb: &mut KnowledgeBase,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> SynthesisOutcome {
        match operation {
            "parseCurrency" => from_program(cache_key, strategies::synthesize_currency(examples)),
            "parseDate" => from_program(cache_key, strategies::synthesize_date(examples)),
            "parseInt" | "parseFloat" | "parseNumber" => {
                from_program(cache_key, strategies::synthesize_number(examples))
            }
            "predicate" | "classify-boolean" => {
                from_program(cache_key, strategies::synthesize_predicate(examples))
            }
            "classify" => match strategies::synthesize_classifier(examples) {
                Ok(rules) => SynthesisOutcome {
                    success: true,
                    code: format!("{} classifier rule(s)", rules.len()),
                    callable: Some(SynthesizedCallable::Classifier(rules)),
                    cache_key: cache_key.to_string(),
                    error: None,
                },
                Err(e) => SynthesisOutcome::failure(cache_key.to_string(), e),
            },
            "extract" | "define-fn" => self.synthesize_extractor_with_kb(examples, kb, cache_key, now),
            other => SynthesisOutcome::failure(
                cache_key.to_string(),
                NucleusError::Internal(format!("no synthesis strategy registered for '{other}'")),
            ),
        }
    }

    /// Extractor synthesis consults the knowledge base before running the
    /// backward search (§4.5.2 "first consults the knowledge base").
    fn synthesize_extractor_with_kb(
        &self,
        examples: &[Example],
        kb: &mut KnowledgeBase,
        cache_key: &str,
        now: DateTime<Utc>,
    ) -> SynthesisOutcome {
        let sample_texts: Vec<String> = examples.iter().map(|e| e.input.clone()).collect();
        let candidates: Vec<(String, ExtractorExpr)> = kb
            .rank_for(&sample_texts)
            .into_iter()
            .filter(|(c, score)| c.kind == ComponentKind::Extractor && *score > 0.0)
            .filter_map(|(c, _)| extractor_from_component(c).map(|expr| (c.id.clone(), expr)))
            .collect();
        for (id, expr) in candidates {
            if examples
                .iter()
                .all(|e| extractor_dsl::eval(&expr, &e.input).matches_expected(&literal_text(&e.output)))
            {
                kb.record_usage(&id, true, now);
                return SynthesisOutcome {
                    success: true,
                    code: format!("reused knowledge-base component {id}"),
                    callable: Some(SynthesizedCallable::Extractor(expr)),
                    cache_key: cache_key.to_string(),
                    error: None,
                };
            }
        }

        match strategies::synthesize_extractor(examples) {
            Ok(program) => {
                kb.insert(
                    ComponentKind::Extractor,
                    program.strategy,
                    program.source.clone(),
                    component_code(&program.expr),
                    sample_texts,
                    Vec::new(),
                    now,
                );
                SynthesisOutcome {
                    success: true,
                    code: program.source,
                    callable: Some(SynthesizedCallable::Extractor(program.expr)),
                    cache_key: cache_key.to_string(),
                    error: None,
                }
            }
            Err(e) => SynthesisOutcome::failure(cache_key.to_string(), e),
        }
    }
}

fn from_program(cache_key: &str, result: Result<SynthesizedProgram, NucleusError>) -> SynthesisOutcome {
    match result {
        Ok(program) => SynthesisOutcome {
            success: true,
            code: program.source,
            callable: Some(SynthesizedCallable::Extractor(program.expr)),
            cache_key: cache_key.to_string(),
            error: None,
        },
        Err(e) => SynthesisOutcome::failure(cache_key.to_string(), e),
    }
}

/// `(operation, examples)` joined into a stable cache key — not a
/// cryptographic hash, just a deterministic text encoding, which is all
/// §6.3's idempotence requirement needs.
fn cache_key_for(operation: &str, examples: &[Example]) -> String {
    let mut key = operation.to_string();
    for e in examples {
        key.push('|');
        key.push_str(&e.input);
        key.push('=');
        key.push_str(&e.output.to_string());
    }
    key
}

/// Serializes the restricted subset of [`ExtractorExpr`] the knowledge
/// base can round-trip: `Match` forms, which is what every built-in
/// strategy (currency/date/number/predicate) and the common case of
/// backward search actually produce.
fn component_code(expr: &ExtractorExpr) -> String {
    match expr {
        ExtractorExpr::Match { pattern, group } => format!("match/{pattern}/{group}"),
        _ => "unrepresentable".to_string(),
    }
}

fn extractor_from_component(component: &Component) -> Option<ExtractorExpr> {
    let rest = component.pattern_or_code.strip_prefix("match/")?;
    let (pattern, group) = rest.rsplit_once('/')?;
    let group: usize = group.parse().ok()?;
    Some(ExtractorExpr::Match {
        pattern: pattern.to_string(),
        group,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nucleus_core::Literal;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn currency_dispatch_succeeds() {
        let mut integrator = SynthesisIntegrator::new();
        let mut kb = KnowledgeBase::new();
        let examples = vec![
            Example::new("$1,500", Literal::Number(1500.0)),
            Example::new("$2,300", Literal::Number(2300.0)),
        ];
        let outcome = integrator.synthesize_on_failure("parseCurrency", &examples, &mut kb, now());
        assert!(outcome.success);
    }

    #[test]
    fn repeated_calls_with_equal_inputs_are_idempotent() {
        let mut integrator = SynthesisIntegrator::new();
        let mut kb = KnowledgeBase::new();
        let examples = vec![Example::new("name: Alice", Literal::String("Alice".into()))];
        let first = integrator.synthesize_on_failure("extract", &examples, &mut kb, now());
        let kb_len_before = kb.len();
        let second = integrator.synthesize_on_failure("extract", &examples, &mut kb, now());
        assert_eq!(first, second);
        assert_eq!(kb.len(), kb_len_before);
    }

    #[test]
    fn unknown_operation_is_a_structured_failure() {
        let mut integrator = SynthesisIntegrator::new();
        let mut kb = KnowledgeBase::new();
        let outcome = integrator.synthesize_on_failure("not-a-real-op", &[], &mut kb, now());
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn extractor_synthesis_populates_the_knowledge_base_for_reuse() {
        let mut integrator = SynthesisIntegrator::new();
        let mut kb = KnowledgeBase::new();
        let examples = vec![
            Example::new("name: Alice", Literal::String("Alice".into())),
            Example::new("name: Bob", Literal::String("Bob".into())),
        ];
        let outcome = integrator.synthesize_on_failure("extract", &examples, &mut kb, now());
        assert!(outcome.success);
        assert_eq!(kb.by_kind(ComponentKind::Extractor).len(), 1);
    }
}
