//! The Nucleus DSL's typed abstract syntax tree (§3 "Term (AST node)").
//!
//! `Term` is a tagged variant (a sum type) rather than a polymorphic object
//! hierarchy, per the design note "Tagged variants vs. inheritance" — a
//! compact enum dispatch is preferred over an indirect one. Terms are
//! immutable after construction; every rewrite (constraint resolution,
//! constant folding) produces a new tree rather than mutating in place.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal scalar, as it appears in source or as an `extract`/`coerce`
/// target value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Boolean(b) => write!(f, "{b}"),
        }
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// A named type annotation used by `coerce` and the optional `extract`
/// target type — kept as plain strings (rather than the full [`crate::Type`])
/// because only scalar leaf types appear in source-level annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Date,
    Array,
}

impl TypeTag {
    pub fn parse(name: &str) -> Option<TypeTag> {
        match name {
            "string" => Some(TypeTag::String),
            "number" => Some(TypeTag::Number),
            "boolean" => Some(TypeTag::Boolean),
            "date" => Some(TypeTag::Date),
            "array" => Some(TypeTag::Array),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::String => write!(f, "string"),
            TypeTag::Number => write!(f, "number"),
            TypeTag::Boolean => write!(f, "boolean"),
            TypeTag::Date => write!(f, "date"),
            TypeTag::Array => write!(f, "array"),
        }
    }
}

/// A single labelled input/output pair, as consumed by `classify`,
/// `predicate`, `define-fn`, `synthesize`, and the `:examples` tail of
/// `extract`/`parseInt`/`parseFloat`/`parseDate`/`parseCurrency`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: Literal,
}

impl Example {
    pub fn new(input: impl Into<String>, output: Literal) -> Self {
        Self {
            input: input.into(),
            output,
        }
    }

    pub fn is_true_output(&self) -> bool {
        matches!(self.output, Literal::Boolean(true))
    }

    pub fn is_false_output(&self) -> bool {
        matches!(self.output, Literal::Boolean(false))
    }
}

/// A parsed Nucleus DSL term. See §3 and the GLOSSARY's Nucleus entry for
/// the closed set of head symbols this corresponds to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    // ── Leaves ──
    Input,
    Lit(Literal),
    Var(String),
    TextStats,
    Grep(Box<Term>),
    FuzzySearch(Box<Term>, Option<Box<Term>>),
    Lines(Box<Term>, Box<Term>),

    // ── Unary ──
    ParseInt(Box<Term>, Vec<Example>),
    ParseFloat(Box<Term>, Vec<Example>),
    ParseDate(Box<Term>, Option<Box<Term>>, Vec<Example>),
    ParseCurrency(Box<Term>, Vec<Example>),
    ParseNumber(Box<Term>, Vec<Example>),
    Count(Box<Term>),
    Sum(Box<Term>),

    // ── Binary / n-ary ──
    Add(Box<Term>, Box<Term>),
    Match(Box<Term>, Box<Term>, Box<Term>),
    Replace(Box<Term>, Box<Term>, Box<Term>),
    Split(Box<Term>, Box<Term>, Box<Term>),
    Filter(Box<Term>, Box<Term>),
    Map(Box<Term>, Box<Term>),
    Reduce(Box<Term>, Box<Term>, Box<Term>),
    If(Box<Term>, Box<Term>, Box<Term>),
    Lambda(String, Box<Term>),
    App(Box<Term>, Box<Term>),
    Classify(Vec<Example>),
    Predicate(Box<Term>, Vec<Example>),
    DefineFn(String, Vec<Example>),
    ApplyFn(String, Box<Term>),
    Extract(Box<Term>, Box<Term>, Box<Term>, Option<TypeTag>, Vec<Example>),
    Coerce(Box<Term>, TypeTag),
    Constrained(String, Box<Term>),
    Synthesize(Vec<Example>),
    ListSymbols(Option<String>),
    GetSymbolBody(Box<Term>),
    FindReferences(Box<Term>),
}

impl Term {
    pub fn lit_str(s: impl Into<String>) -> Term {
        Term::Lit(Literal::String(s.into()))
    }

    pub fn lit_num(n: f64) -> Term {
        Term::Lit(Literal::Number(n))
    }

    pub fn lit_bool(b: bool) -> Term {
        Term::Lit(Literal::Boolean(b))
    }

    /// The DSL head symbol a term would parse back from, used by the
    /// pretty-printer and by diagnostics.
    pub fn head_symbol(&self) -> &'static str {
        match self {
            Term::Input => "input",
            Term::Lit(_) => "lit",
            Term::Var(_) => "var",
            Term::TextStats => "text_stats",
            Term::Grep(_) => "grep",
            Term::FuzzySearch(_, _) => "fuzzy_search",
            Term::Lines(_, _) => "lines",
            Term::ParseInt(_, _) => "parseInt",
            Term::ParseFloat(_, _) => "parseFloat",
            Term::ParseDate(_, _, _) => "parseDate",
            Term::ParseCurrency(_, _) => "parseCurrency",
            Term::ParseNumber(_, _) => "parseNumber",
            Term::Count(_) => "count",
            Term::Sum(_) => "sum",
            Term::Add(_, _) => "add",
            Term::Match(_, _, _) => "match",
            Term::Replace(_, _, _) => "replace",
            Term::Split(_, _, _) => "split",
            Term::Filter(_, _) => "filter",
            Term::Map(_, _) => "map",
            Term::Reduce(_, _, _) => "reduce",
            Term::If(_, _, _) => "if",
            Term::Lambda(_, _) => "lambda",
            Term::App(_, _) => "app",
            Term::Classify(_) => "classify",
            Term::Predicate(_, _) => "predicate",
            Term::DefineFn(_, _) => "define-fn",
            Term::ApplyFn(_, _) => "apply-fn",
            Term::Extract(_, _, _, _, _) => "extract",
            Term::Coerce(_, _) => "coerce",
            Term::Constrained(_, _) => "constrained",
            Term::Synthesize(_) => "synthesize",
            Term::ListSymbols(_) => "list_symbols",
            Term::GetSymbolBody(_) => "get_symbol_body",
            Term::FindReferences(_) => "find_references",
        }
    }

    /// Structural children, used by the constraint resolver's generic
    /// tree-walk (e.g. "simplify-and-compress" recursion) without needing
    /// a hand-written case per variant at every call site.
    pub fn children(&self) -> Vec<&Term> {
        match self {
            Term::Input | Term::Lit(_) | Term::Var(_) | Term::TextStats => vec![],
            Term::Grep(p) => vec![p],
            Term::FuzzySearch(q, limit) => {
                let mut v = vec![q.as_ref()];
                if let Some(l) = limit {
                    v.push(l);
                }
                v
            }
            Term::Lines(s, e) => vec![s, e],
            Term::ParseInt(s, _)
            | Term::ParseFloat(s, _)
            | Term::ParseCurrency(s, _)
            | Term::ParseNumber(s, _)
            | Term::Count(s)
            | Term::Sum(s) => vec![s],
            Term::ParseDate(s, fmt, _) => {
                let mut v = vec![s.as_ref()];
                if let Some(f) = fmt {
                    v.push(f);
                }
                v
            }
            Term::Add(a, b) => vec![a, b],
            Term::Match(s, p, g) => vec![s, p, g],
            Term::Replace(s, a, b) => vec![s, a, b],
            Term::Split(s, d, i) => vec![s, d, i],
            Term::Filter(c, p) => vec![c, p],
            Term::Map(c, f) => vec![c, f],
            Term::Reduce(c, i, f) => vec![c, i, f],
            Term::If(c, t, e) => vec![c, t, e],
            Term::Lambda(_, b) => vec![b],
            Term::App(f, a) => vec![f, a],
            Term::Classify(_) => vec![],
            Term::Predicate(s, _) => vec![s],
            Term::DefineFn(_, _) => vec![],
            Term::ApplyFn(_, a) => vec![a],
            Term::Extract(s, p, g, _, _) => vec![s, p, g],
            Term::Coerce(t, _) => vec![t],
            Term::Constrained(_, t) => vec![t],
            Term::Synthesize(_) => vec![],
            Term::ListSymbols(_) => vec![],
            Term::GetSymbolBody(s) => vec![s],
            Term::FindReferences(n) => vec![n],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_symbol_round_trips_known_names() {
        assert_eq!(Term::Grep(Box::new(Term::lit_str("x"))).head_symbol(), "grep");
        assert_eq!(
            Term::Lambda("x".into(), Box::new(Term::Var("x".into()))).head_symbol(),
            "lambda"
        );
    }

    #[test]
    fn children_arity_matches_shape() {
        let t = Term::If(
            Box::new(Term::lit_bool(true)),
            Box::new(Term::lit_num(1.0)),
            Box::new(Term::lit_num(2.0)),
        );
        assert_eq!(t.children().len(), 3);
    }

    #[test]
    fn example_true_false_classification() {
        let t = Example::new("x", Literal::Boolean(true));
        let f = Example::new("y", Literal::Boolean(false));
        assert!(t.is_true_output());
        assert!(!t.is_false_output());
        assert!(f.is_false_output());
    }
}
