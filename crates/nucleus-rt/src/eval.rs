//! The Lattice evaluator: a strict, left-to-right, applicative-order
//! tree-walking interpreter over a resolved, type-checked [`Term`] (§4.4).

use crate::deadline::Deadline;
use crate::doctools::DocumentTools;
use crate::kb::KnowledgeBase;
use crate::symbols::SymbolIndexer;
use crate::synth::extractor_dsl::{self, ExtractorValue};
use crate::synth::strategies::ClassifierRule;
use crate::synth::{SynthesisIntegrator, SynthesizedCallable};
use chrono::{DateTime, Utc};
use nucleus_core::{
    fn_binding_name, turn_binding_name, Closure, Environment, Example, Literal, NucleusError,
    NucleusResult, SynthesizedFn, Term, TypeTag, Value, RESULTS_BINDING,
};
use std::collections::BTreeMap;
use std::rc::Rc;

/// The value and accumulated human-readable log lines a successful
/// evaluation produces (§4.4 "produce `(value, logs)`").
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub value: Value,
    pub logs: Vec<String>,
}

/// Owns the state a single evaluation needs beyond the term and
/// environment: the knowledge base, the synthesis cache, and the
/// side-table backing synthesized callables bound under `_fn_<name>`
/// (§4.4 `define-fn`/`apply-fn`, §4.6).
///
/// `Value::SynthesizedFn` (in `nucleus-core`) is deliberately just a
/// metadata marker — name, source, optional component id — so that
/// cloning an `Environment` never clones executable code. The actual
/// callable (an extractor expression or a classifier rule list) lives
/// here, keyed by the same name the environment binding carries.
#[derive(Debug)]
pub struct Evaluator {
    pub kb: KnowledgeBase,
    synth: SynthesisIntegrator,
    fn_table: std::collections::HashMap<String, SynthesizedCallable>,
    turn: u64,
    default_fuzzy_limit: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            kb: KnowledgeBase::default(),
            synth: SynthesisIntegrator::default(),
            fn_table: std::collections::HashMap::new(),
            turn: 0,
            default_fuzzy_limit: 10,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session built from a non-default [`crate::session::SessionConfig`]
    /// wires its `fuzzy_search_default_limit` in here, so `fuzzy_search`
    /// without an explicit limit argument honors the host's configured
    /// default rather than the spec's bare `10` (§6.1, §4.4 "fuzzy_search").
    pub fn with_default_fuzzy_limit(mut self, limit: usize) -> Self {
        self.default_fuzzy_limit = limit;
        self
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Evaluates one resolved term and performs the post-evaluation
    /// environment binding described in §4.4: `RESULTS` for sequence
    /// results, `_<turn>` for any result, `_fn_<name>` for
    /// synthesized-fn results, with the turn counter advanced on success.
    pub fn evaluate_turn(
        &mut self,
        term: &Term,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
    ) -> NucleusResult<(EvalOutcome, Environment)> {
        let mut logs = Vec::new();
        let value = self.eval(term, env, tools, symbols, deadline, now, &mut logs)?;

        self.turn += 1;
        let mut next_env = env.bind(turn_binding_name(self.turn), value.clone());
        if matches!(value, Value::Array(_)) {
            next_env = next_env.bind(RESULTS_BINDING, value.clone());
        }
        if let Value::SynthesizedFn(ref f) = value {
            next_env = next_env.bind(fn_binding_name(&f.name), value.clone());
        }

        Ok((EvalOutcome { value, logs }, next_env))
    }

    fn eval(
        &mut self,
        term: &Term,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
    ) -> NucleusResult<Value> {
        match term {
            Term::Input => Ok(Value::String(tools.context().to_string())),
            Term::Lit(lit) => Ok(literal_to_value(lit)),
            Term::Var(name) => env
                .get(name)
                .cloned()
                .ok_or_else(|| NucleusError::Unbound(name.clone())),
            Term::TextStats => {
                let stats = tools.text_stats();
                let mut map = BTreeMap::new();
                map.insert("length".to_string(), Value::Number(stats.length as f64));
                map.insert("lineCount".to_string(), Value::Number(stats.line_count as f64));
                let mut sample = BTreeMap::new();
                sample.insert("start".to_string(), Value::String(stats.sample_start));
                sample.insert("middle".to_string(), Value::String(stats.sample_middle));
                sample.insert("end".to_string(), Value::String(stats.sample_end));
                map.insert("sample".to_string(), Value::Map(sample));
                Ok(Value::Map(map))
            }
            Term::Grep(pattern) => {
                check_deadline(deadline, "grep")?;
                let pattern = self.eval_string(pattern, env, tools, symbols, deadline, now, logs, "grep", 0)?;
                logs.push(format!("Searching for pattern: {pattern}"));
                let records = tools.grep(&pattern)?;
                logs.push(format!("Found {} matches", records.len()));
                Ok(Value::Array(records.into_iter().map(Value::GrepRecord).collect()))
            }
            Term::FuzzySearch(query, limit) => {
                let query = self.eval_string(query, env, tools, symbols, deadline, now, logs, "fuzzy_search", 0)?;
                let limit = match limit {
                    Some(l) => self.eval_number(l, env, tools, symbols, deadline, now, logs, "fuzzy_search", 1)? as usize,
                    None => self.default_fuzzy_limit,
                };
                logs.push(format!("Fuzzy searching for: {query}"));
                let records = tools.fuzzy_search(&query, limit);
                Ok(Value::Array(records.into_iter().map(Value::FuzzyRecord).collect()))
            }
            Term::Lines(start, end) => {
                let start = self.eval_number(start, env, tools, symbols, deadline, now, logs, "lines", 0)? as usize;
                let end = self.eval_number(end, env, tools, symbols, deadline, now, logs, "lines", 1)? as usize;
                let lines = tools.lines(start, end);
                Ok(Value::Array(lines.into_iter().map(Value::String).collect()))
            }
            Term::ParseInt(s, examples) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "parseInt", 0)?;
                match text.trim().parse::<i64>() {
                    Ok(n) => Ok(Value::Number(n as f64)),
                    Err(_) => self.fallback_numeric("parseInt", &text, examples, env, tools, symbols, deadline, now, logs),
                }
            }
            Term::ParseFloat(s, examples) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "parseFloat", 0)?;
                match text.trim().parse::<f64>() {
                    Ok(n) => Ok(Value::Number(n)),
                    Err(_) => self.fallback_numeric("parseFloat", &text, examples, env, tools, symbols, deadline, now, logs),
                }
            }
            Term::ParseNumber(s, examples) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "parseNumber", 0)?;
                match parse_plain_number(&text) {
                    Some(n) => Ok(Value::Number(n)),
                    None => self.fallback_numeric("parseNumber", &text, examples, env, tools, symbols, deadline, now, logs),
                }
            }
            Term::ParseCurrency(s, examples) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "parseCurrency", 0)?;
                match parse_currency_heuristic(&text) {
                    Some(n) => Ok(Value::Number(n)),
                    None => self.fallback_numeric("parseCurrency", &text, examples, env, tools, symbols, deadline, now, logs),
                }
            }
            Term::ParseDate(s, _format_hint, examples) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "parseDate", 0)?;
                match parse_date_heuristic(&text) {
                    Some(iso) => Ok(Value::String(iso)),
                    None => {
                        if examples.is_empty() {
                            Ok(Value::Null)
                        } else {
                            let outcome = self.synth.synthesize_on_failure("parseDate", examples, &mut self.kb, now);
                            apply_synth_outcome(outcome, &text)
                        }
                    }
                }
            }
            Term::Count(seq) => {
                let items = self.eval_array(seq, env, tools, symbols, deadline, now, logs, "count", 0)?;
                Ok(Value::Number(items.len() as f64))
            }
            Term::Sum(seq) => {
                let items = self.eval_array(seq, env, tools, symbols, deadline, now, logs, "sum", 0)?;
                let total: f64 = items
                    .iter()
                    .map(|v| extract_numeric(&v.principal_text()).unwrap_or(0.0))
                    .sum();
                Ok(Value::Number(total))
            }
            Term::Add(a, b) => {
                let a = self.eval_number(a, env, tools, symbols, deadline, now, logs, "add", 0)?;
                let b = self.eval_number(b, env, tools, symbols, deadline, now, logs, "add", 1)?;
                Ok(Value::Number(a + b))
            }
            Term::Match(s, pattern, group) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "match", 0)?;
                let pattern = self.eval_string(pattern, env, tools, symbols, deadline, now, logs, "match", 1)?;
                let group = self.eval_number(group, env, tools, symbols, deadline, now, logs, "match", 2)? as usize;
                let re = regex::Regex::new(&pattern)
                    .map_err(|e| NucleusError::InvalidPattern(format!("{pattern}: {e}")))?;
                Ok(match re.captures(&text) {
                    Some(caps) => caps
                        .get(group)
                        .map(|m| Value::String(m.as_str().to_string()))
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                })
            }
            Term::Replace(s, from, to) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "replace", 0)?;
                let from = self.eval_string(from, env, tools, symbols, deadline, now, logs, "replace", 1)?;
                let to = self.eval_string(to, env, tools, symbols, deadline, now, logs, "replace", 2)?;
                let re = regex::Regex::new(&from).map_err(|e| NucleusError::InvalidPattern(format!("{from}: {e}")))?;
                Ok(Value::String(re.replace_all(&text, to.as_str()).to_string()))
            }
            Term::Split(s, delim, index) => {
                let text = self.eval_string(s, env, tools, symbols, deadline, now, logs, "split", 0)?;
                let delim = self.eval_string(delim, env, tools, symbols, deadline, now, logs, "split", 1)?;
                let index = self.eval_number(index, env, tools, symbols, deadline, now, logs, "split", 2)? as usize;
                let parts: Vec<&str> = text.split(delim.as_str()).collect();
                Ok(parts.get(index).map(|p| Value::String(p.to_string())).unwrap_or(Value::Null))
            }
            Term::Filter(seq, predicate) => {
                let items = self.eval_array(seq, env, tools, symbols, deadline, now, logs, "filter", 0)?;
                let predicate = self.eval(predicate, env, tools, symbols, deadline, now, logs)?;
                let mut kept = Vec::new();
                for item in items {
                    check_deadline(deadline, "filter")?;
                    let result = self.apply_callable(&predicate, item.clone(), env, tools, symbols, deadline, now, logs)?;
                    // Truthy-coerced per `if`'s rule, not a strict boolean
                    // check: a predicate lambda commonly closes over `match`
                    // (string-or-null), and the type inferencer — not this
                    // runtime check — is what rejects statically-provable
                    // non-boolean predicates (§4.4 "filter").
                    if result.is_truthy() {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            Term::Map(seq, transform) => {
                let items = self.eval_array(seq, env, tools, symbols, deadline, now, logs, "map", 0)?;
                let transform = self.eval(transform, env, tools, symbols, deadline, now, logs)?;
                let mut mapped = Vec::with_capacity(items.len());
                for item in items {
                    check_deadline(deadline, "map")?;
                    mapped.push(self.apply_callable(&transform, item, env, tools, symbols, deadline, now, logs)?);
                }
                Ok(Value::Array(mapped))
            }
            Term::Reduce(seq, init, f) => {
                let items = self.eval_array(seq, env, tools, symbols, deadline, now, logs, "reduce", 0)?;
                let mut acc = self.eval(init, env, tools, symbols, deadline, now, logs)?;
                let f = self.eval(f, env, tools, symbols, deadline, now, logs)?;
                for item in items {
                    check_deadline(deadline, "reduce")?;
                    let partial = self.apply_callable(&f, acc, env, tools, symbols, deadline, now, logs)?;
                    acc = self.apply_callable(&partial, item, env, tools, symbols, deadline, now, logs)?;
                }
                Ok(acc)
            }
            Term::If(c, t, e) => {
                let cond = self.eval(c, env, tools, symbols, deadline, now, logs)?;
                if cond.is_truthy() {
                    self.eval(t, env, tools, symbols, deadline, now, logs)
                } else {
                    self.eval(e, env, tools, symbols, deadline, now, logs)
                }
            }
            Term::Lambda(param, body) => Ok(Value::Closure(Closure {
                param: param.clone(),
                body: Rc::new((**body).clone()),
                captured_env: env.clone(),
            })),
            Term::App(f, a) => {
                let f = self.eval(f, env, tools, symbols, deadline, now, logs)?;
                let a = self.eval(a, env, tools, symbols, deadline, now, logs)?;
                self.apply_callable(&f, a, env, tools, symbols, deadline, now, logs)
            }
            Term::Classify(examples) => {
                let outcome = self.synth.synthesize_on_failure("classify", examples, &mut self.kb, now);
                self.register_callable("classify", outcome)
            }
            Term::Predicate(subject, examples) => {
                let text = self.eval_string(subject, env, tools, symbols, deadline, now, logs, "predicate", 0)?;
                let outcome = self.synth.synthesize_on_failure("predicate", examples, &mut self.kb, now);
                if !outcome.success {
                    return Err(synth_failure_error(outcome, "predicate"));
                }
                match outcome.callable {
                    Some(SynthesizedCallable::Extractor(expr)) => Ok(Value::Boolean(matches!(
                        extractor_dsl::eval(&expr, &text),
                        ExtractorValue::Str(_) | ExtractorValue::Num(_)
                    ))),
                    _ => Ok(Value::Boolean(false)),
                }
            }
            Term::DefineFn(name, examples) => {
                let outcome = self.synth.synthesize_on_failure("define-fn", examples, &mut self.kb, now);
                if !outcome.success {
                    return Err(synth_failure_error(outcome, "define-fn"));
                }
                let code = outcome.code.clone();
                if let Some(callable) = outcome.callable {
                    self.fn_table.insert(name.clone(), callable);
                }
                Ok(Value::SynthesizedFn(SynthesizedFn {
                    name: name.clone(),
                    source_code: code,
                    component_id: None,
                }))
            }
            Term::ApplyFn(name, arg) => {
                let arg_value = self.eval(arg, env, tools, symbols, deadline, now, logs)?;
                let arg_text = arg_value.principal_text();
                let callable = self
                    .fn_table
                    .get(name)
                    .cloned()
                    .ok_or_else(|| NucleusError::Unbound(format!("function '{name}'")))?;
                apply_synthesized_callable(&callable, &arg_text)
            }
            Term::Extract(subject, pattern, group, type_tag, examples) => {
                let text = self.eval_string(subject, env, tools, symbols, deadline, now, logs, "extract", 0)?;
                let pattern_text = self.eval_string(pattern, env, tools, symbols, deadline, now, logs, "extract", 1)?;
                let group = self.eval_number(group, env, tools, symbols, deadline, now, logs, "extract", 2)? as usize;
                let re = regex::Regex::new(&pattern_text)
                    .map_err(|e| NucleusError::InvalidPattern(format!("{pattern_text}: {e}")))?;
                let extracted = re
                    .captures(&text)
                    .and_then(|caps| caps.get(group))
                    .map(|m| m.as_str().to_string());
                match extracted {
                    Some(raw) => {
                        let value = Value::String(raw);
                        match type_tag {
                            Some(tag) => coerce_value(&value, tag),
                            None => Ok(value),
                        }
                    }
                    None if !examples.is_empty() => {
                        let outcome = self.synth.synthesize_on_failure("extract", examples, &mut self.kb, now);
                        apply_synth_outcome(outcome, &text)
                    }
                    None => Ok(Value::Null),
                }
            }
            Term::Coerce(inner, tag) => {
                let value = self.eval(inner, env, tools, symbols, deadline, now, logs)?;
                coerce_value(&value, tag)
            }
            Term::Constrained(_name, inner) => self.eval(inner, env, tools, symbols, deadline, now, logs),
            Term::Synthesize(examples) => {
                let operation = infer_synthesis_operation(examples);
                let outcome = self.synth.synthesize_on_failure(operation, examples, &mut self.kb, now);
                self.register_callable(operation, outcome)
            }
            Term::ListSymbols(kind) => Ok(Value::Array(
                symbols
                    .list_symbols(kind.as_deref())
                    .into_iter()
                    .map(|s| {
                        let mut m = BTreeMap::new();
                        m.insert("name".to_string(), Value::String(s.name));
                        m.insert("kind".to_string(), Value::String(s.kind));
                        m.insert("startLine".to_string(), Value::Number(s.start_line as f64));
                        m.insert("endLine".to_string(), Value::Number(s.end_line as f64));
                        Value::Map(m)
                    })
                    .collect(),
            )),
            Term::GetSymbolBody(name) => {
                let name = self.eval_string(name, env, tools, symbols, deadline, now, logs, "get_symbol_body", 0)?;
                Ok(symbols.get_symbol_body(&name).map(Value::String).unwrap_or(Value::Null))
            }
            Term::FindReferences(name) => {
                let name = self.eval_string(name, env, tools, symbols, deadline, now, logs, "find_references", 0)?;
                Ok(Value::Array(
                    symbols
                        .find_references(&name)
                        .into_iter()
                        .map(|r| {
                            let mut m = BTreeMap::new();
                            m.insert("line".to_string(), Value::Number(r.line as f64));
                            m.insert("column".to_string(), Value::Number(r.column as f64));
                            m.insert("context".to_string(), Value::String(r.context));
                            Value::Map(m)
                        })
                        .collect(),
                ))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_string(
        &mut self,
        term: &Term,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
        operator: &str,
        arg_index: usize,
    ) -> NucleusResult<String> {
        let value = self
            .eval(term, env, tools, symbols, deadline, now, logs)
            .map_err(|e| e.with_context(operator, arg_index))?;
        match &value {
            Value::String(s) => Ok(s.clone()),
            other => Ok(other.principal_text()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_number(
        &mut self,
        term: &Term,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
        operator: &str,
        arg_index: usize,
    ) -> NucleusResult<f64> {
        let value = self
            .eval(term, env, tools, symbols, deadline, now, logs)
            .map_err(|e| e.with_context(operator, arg_index))?;
        value
            .as_number()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .ok_or_else(|| {
                NucleusError::Type(format!("expected a number, found {}", value.type_name()))
                    .with_context(operator, arg_index)
            })
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_array(
        &mut self,
        term: &Term,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
        operator: &str,
        arg_index: usize,
    ) -> NucleusResult<Vec<Value>> {
        let value = self
            .eval(term, env, tools, symbols, deadline, now, logs)
            .map_err(|e| e.with_context(operator, arg_index))?;
        match value {
            Value::Array(items) => Ok(items),
            other => Err(NucleusError::Type(format!("expected an array, found {}", other.type_name()))
                .with_context(operator, arg_index)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_callable(
        &mut self,
        callable: &Value,
        arg: Value,
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
    ) -> NucleusResult<Value> {
        match callable {
            Value::Closure(closure) => {
                let call_env = closure.captured_env.bind(closure.param.clone(), arg);
                self.eval(&closure.body, &call_env, tools, symbols, deadline, now, logs)
            }
            Value::SynthesizedFn(f) => {
                let table_entry = self.fn_table.get(&f.name).cloned();
                match table_entry {
                    Some(callable) => apply_synthesized_callable(&callable, &arg.principal_text()),
                    None => Err(NucleusError::Unbound(format!("function '{}'", f.name))),
                }
            }
            other => {
                let _ = env;
                Err(NucleusError::Type(format!("cannot apply non-function value of type {}", other.type_name())))
            }
        }
    }

    fn register_callable(&mut self, name: &str, outcome: crate::synth::SynthesisOutcome) -> NucleusResult<Value> {
        if !outcome.success {
            return Err(synth_failure_error(outcome, name));
        }
        let code = outcome.code.clone();
        let generated_name = format!("{name}-{}", self.fn_table.len());
        if let Some(callable) = outcome.callable {
            self.fn_table.insert(generated_name.clone(), callable);
        }
        Ok(Value::SynthesizedFn(SynthesizedFn {
            name: generated_name,
            source_code: code,
            component_id: None,
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn fallback_numeric(
        &mut self,
        operation: &str,
        text: &str,
        examples: &[Example],
        env: &Environment,
        tools: &dyn DocumentTools,
        symbols: &dyn SymbolIndexer,
        deadline: Option<&Deadline>,
        now: DateTime<Utc>,
        logs: &mut Vec<String>,
    ) -> NucleusResult<Value> {
        let _ = (env, tools, symbols, deadline, logs);
        if examples.is_empty() {
            return Ok(Value::Null);
        }
        let outcome = self.synth.synthesize_on_failure(operation, examples, &mut self.kb, now);
        apply_synth_outcome(outcome, text)
    }
}

fn apply_synth_outcome(outcome: crate::synth::SynthesisOutcome, text: &str) -> NucleusResult<Value> {
    if !outcome.success {
        return Err(synth_failure_error(outcome, "synthesis"));
    }
    match outcome.callable {
        Some(SynthesizedCallable::Extractor(expr)) => Ok(extractor_value_to_value(&extractor_dsl::eval(&expr, text))),
        Some(SynthesizedCallable::Classifier(rules)) => Ok(apply_classifier_rules(&rules, text)),
        None => Ok(Value::Null),
    }
}

fn apply_synthesized_callable(callable: &SynthesizedCallable, text: &str) -> NucleusResult<Value> {
    Ok(match callable {
        SynthesizedCallable::Extractor(expr) => extractor_value_to_value(&extractor_dsl::eval(expr, text)),
        SynthesizedCallable::Classifier(rules) => apply_classifier_rules(rules, text),
    })
}

fn apply_classifier_rules(rules: &[ClassifierRule], text: &str) -> Value {
    for rule in rules {
        if let Ok(re) = regex::Regex::new(&rule.pattern) {
            if re.is_match(text) {
                return literal_to_value(&rule.output);
            }
        }
    }
    Value::Null
}

fn synth_failure_error(outcome: crate::synth::SynthesisOutcome, fallback_operation: &str) -> NucleusError {
    let _ = fallback_operation;
    NucleusError::SynthesisFailed {
        reason: outcome.error.unwrap_or_else(|| "synthesis failed".to_string()),
        attempts: 1,
        strategies_tried: 1,
    }
}

fn extractor_value_to_value(v: &ExtractorValue) -> Value {
    match v {
        ExtractorValue::Str(s) => Value::String(s.clone()),
        ExtractorValue::Num(n) => Value::Number(*n),
        ExtractorValue::Null => Value::Null,
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => Value::Number(*n),
        Literal::Boolean(b) => Value::Boolean(*b),
    }
}

fn coerce_value(value: &Value, tag: &TypeTag) -> NucleusResult<Value> {
    match tag {
        TypeTag::String => Ok(Value::String(value.principal_text())),
        TypeTag::Number => extract_numeric(&value.principal_text())
            .map(Value::Number)
            .ok_or_else(|| NucleusError::Type(format!("cannot coerce {} to number", value.type_name()))),
        TypeTag::Boolean => Ok(Value::Boolean(value.is_truthy())),
        TypeTag::Date => parse_date_heuristic(&value.principal_text())
            .map(Value::String)
            .ok_or_else(|| NucleusError::Type(format!("cannot coerce {} to date", value.type_name()))),
        TypeTag::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            other => Ok(Value::Array(vec![other.clone()])),
        },
    }
}

fn check_deadline(deadline: Option<&Deadline>, operation: &str) -> NucleusResult<()> {
    if let Some(d) = deadline {
        if d.is_expired() {
            tracing::warn!(operation, "deadline expired, cancelling");
            return Err(NucleusError::Cancelled {
                operation: operation.to_string(),
            });
        }
    }
    Ok(())
}

/// First numeric token in `text`, tolerating a leading currency symbol and
/// comma thousands separators — the coercion `sum` uses for mixed
/// sequences of records and strings (§4.4 "sum").
fn extract_numeric(text: &str) -> Option<f64> {
    let re = regex_cache::currency_or_number();
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

fn parse_plain_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Some(stripped) = trimmed.strip_suffix('%') {
        return stripped.trim().replace(',', "").parse::<f64>().ok().map(|n| n / 100.0);
    }
    trimmed.replace(',', "").parse().ok()
}

fn parse_currency_heuristic(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| !"$€£¥".contains(*c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.contains('\'') {
        return cleaned.replace('\'', "").parse().ok();
    }
    let comma = cleaned.rfind(',');
    let dot = cleaned.rfind('.');
    match (comma, dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', ".").parse().ok(),
        _ => cleaned.replace(',', "").parse().ok(),
    }
}

fn parse_date_heuristic(text: &str) -> Option<String> {
    let text = text.trim();
    if let Ok(date) = chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }
    for fmt in ["%d/%m/%Y", "%m/%d/%Y", "%d.%m.%Y", "%d-%m-%Y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(text, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

fn infer_synthesis_operation(examples: &[Example]) -> &'static str {
    if examples.is_empty() {
        return "extract";
    }
    if examples.iter().all(|e| matches!(e.output, Literal::Boolean(_))) {
        return "predicate";
    }
    let distinct: std::collections::HashSet<String> = examples.iter().map(|e| e.output.to_string()).collect();
    if distinct.len() < examples.len() && distinct.len() > 1 {
        "classify"
    } else {
        "extract"
    }
}

mod regex_cache {
    use once_cell::sync::Lazy;
    use regex::Regex;

    pub fn currency_or_number() -> &'static Regex {
        static PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\$€£¥]?\s*(-?[\d,]+(?:\.\d+)?)").unwrap());
        &PATTERN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctools::DocumentToolkit;
    use crate::symbols::NullSymbolIndexer;
    use chrono::TimeZone;
    use nucleus_core::Document;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn toolkit(text: &str) -> DocumentToolkit {
        DocumentToolkit::new(Document::new(text))
    }

    fn run(evaluator: &mut Evaluator, term: &Term, tools: &dyn DocumentTools) -> NucleusResult<(EvalOutcome, Environment)> {
        evaluator.evaluate_turn(term, &Environment::new(), tools, &NullSymbolIndexer, None, now())
    }

    #[test]
    fn grep_binds_results_and_turn() {
        let tk = toolkit("Sales: $100\nOther: $200\nSales: $300");
        let mut evaluator = Evaluator::new();
        let term = Term::Grep(Box::new(Term::lit_str("Sales")));
        let (outcome, env) = run(&mut evaluator, &term, &tk).unwrap();
        assert!(matches!(outcome.value, Value::Array(ref v) if v.len() == 2));
        assert!(env.get("RESULTS").is_some());
        assert!(env.get("_1").is_some());
        assert_eq!(evaluator.turn(), 1);
    }

    #[test]
    fn sum_over_grep_records_extracts_currency() {
        let tk = toolkit("Revenue: $1,000\nRevenue: $2,500");
        let mut evaluator = Evaluator::new();
        let term = Term::Sum(Box::new(Term::Grep(Box::new(Term::lit_str("Revenue")))));
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Number(3500.0));
    }

    #[test]
    fn filter_then_count_matches_chain_example() {
        let tk = toolkit("FATAL disk\nFATAL network\ninfo ok");
        let mut evaluator = Evaluator::new();
        let grep_term = Term::Grep(Box::new(Term::lit_str("FATAL")));
        let (grep_outcome, env) = run(&mut evaluator, &grep_term, &tk).unwrap();
        let _ = grep_outcome;
        let predicate = Term::Lambda(
            "x".into(),
            Box::new(Term::Match(
                Box::new(Term::Var("x".into())),
                Box::new(Term::lit_str("network")),
                Box::new(Term::lit_num(0.0)),
            )),
        );
        let filter_term = Term::Count(Box::new(Term::Filter(
            Box::new(Term::Var(RESULTS_BINDING.into())),
            Box::new(predicate),
        )));
        let mut logs = Vec::new();
        let result = evaluator
            .eval(&filter_term, &env, &tk, &NullSymbolIndexer, None, now(), &mut logs)
            .unwrap();
        assert_eq!(result, Value::Number(1.0));
    }

    #[test]
    fn if_short_circuits_the_untaken_branch() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let term = Term::If(
            Box::new(Term::lit_bool(false)),
            Box::new(Term::lit_num(1.0)),
            Box::new(Term::lit_num(2.0)),
        );
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Number(2.0));
    }

    #[test]
    fn parse_currency_without_examples_uses_the_heuristic() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let term = Term::ParseCurrency(Box::new(Term::lit_str("$1,234.50")), vec![]);
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Number(1234.50));
    }

    #[test]
    fn parse_int_falls_back_to_synthesis_with_examples() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let examples = vec![
            Example::new("abc42", Literal::Number(42.0)),
            Example::new("abc7", Literal::Number(7.0)),
        ];
        let term = Term::ParseInt(Box::new(Term::lit_str("abc99")), examples);
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Number(99.0));
    }

    #[test]
    fn unbound_variable_is_a_runtime_error() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let term = Term::Var("nope".into());
        let err = run(&mut evaluator, &term, &tk).unwrap_err();
        assert!(matches!(err, NucleusError::Unbound(_)));
    }

    #[test]
    fn lambda_application_binds_the_parameter() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let term = Term::App(
            Box::new(Term::Lambda("x".into(), Box::new(Term::Var("x".into())))),
            Box::new(Term::lit_num(5.0)),
        );
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Number(5.0));
    }

    #[test]
    fn match_out_of_range_group_normalizes_to_null() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let term = Term::Match(
            Box::new(Term::lit_str("hello")),
            Box::new(Term::lit_str("(h)(e)")),
            Box::new(Term::lit_num(9.0)),
        );
        let (outcome, _) = run(&mut evaluator, &term, &tk).unwrap();
        assert_eq!(outcome.value, Value::Null);
    }

    #[test]
    fn define_fn_then_apply_fn_round_trips() {
        let tk = toolkit("text");
        let mut evaluator = Evaluator::new();
        let examples = vec![
            Example::new("name: Alice", Literal::String("Alice".into())),
            Example::new("name: Bob", Literal::String("Bob".into())),
        ];
        let define_term = Term::DefineFn("greeting".into(), examples);
        let (outcome, env) = run(&mut evaluator, &define_term, &tk).unwrap();
        assert!(matches!(outcome.value, Value::SynthesizedFn(_)));
        let apply_term = Term::ApplyFn("greeting".into(), Box::new(Term::lit_str("name: Carol")));
        let mut logs = Vec::new();
        let applied = evaluator
            .eval(&apply_term, &env, &tk, &NullSymbolIndexer, None, now(), &mut logs)
            .unwrap();
        assert_eq!(applied, Value::String("Carol".into()));
    }

    #[test]
    fn cancelled_deadline_short_circuits_grep() {
        let tk = toolkit("a\nb\nc");
        let mut evaluator = Evaluator::new();
        let expired = Deadline::after(std::time::Duration::from_secs(0));
        std::thread::sleep(std::time::Duration::from_millis(1));
        let term = Term::Grep(Box::new(Term::lit_str("a")));
        let err = evaluator
            .evaluate_turn(&term, &Environment::new(), &tk, &NullSymbolIndexer, Some(&expired), now())
            .unwrap_err();
        assert!(matches!(err, NucleusError::Cancelled { .. }));
    }
}
