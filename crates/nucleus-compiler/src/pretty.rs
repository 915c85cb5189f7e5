//! Renders a `Term` back to Nucleus source (§4.1 "Pretty-printer").
//!
//! A total inverse for every constraint-free term: `parse(print(t)) == t`
//! structurally. `constrained` nodes print too (diagnostic use, logging),
//! but round-trip is not guaranteed for them since the parser's
//! `__example__` sentinel encoding is an implementation detail, not
//! surface syntax.

use nucleus_core::{Example, Literal, Term, TypeTag};
use std::fmt::Write as _;

pub fn print(term: &Term) -> String {
    let mut out = String::new();
    write_term(&mut out, term);
    out
}

fn write_term(out: &mut String, term: &Term) {
    match term {
        Term::Input => out.push_str("(input)"),
        Term::Lit(lit) => write_literal(out, lit),
        Term::Var(name) => out.push_str(name),
        Term::TextStats => out.push_str("(text_stats)"),
        Term::Grep(p) => write_call(out, "grep", &[p]),
        Term::FuzzySearch(q, limit) => {
            let mut args: Vec<&Term> = vec![q];
            if let Some(l) = limit {
                args.push(l);
            }
            write_call(out, "fuzzy_search", &args);
        }
        Term::Lines(s, e) => write_call(out, "lines", &[s, e]),
        Term::ParseInt(s, ex) => write_call_with_examples(out, "parseInt", &[s], ex),
        Term::ParseFloat(s, ex) => write_call_with_examples(out, "parseFloat", &[s], ex),
        Term::ParseCurrency(s, ex) => write_call_with_examples(out, "parseCurrency", &[s], ex),
        Term::ParseNumber(s, ex) => write_call_with_examples(out, "parseNumber", &[s], ex),
        Term::ParseDate(s, fmt, ex) => {
            let mut args: Vec<&Term> = vec![s];
            if let Some(f) = fmt {
                args.push(f);
            }
            write_call_with_examples(out, "parseDate", &args, ex);
        }
        Term::Count(s) => write_call(out, "count", &[s]),
        Term::Sum(s) => write_call(out, "sum", &[s]),
        Term::Add(a, b) => write_call(out, "add", &[a, b]),
        Term::Match(s, p, g) => write_call(out, "match", &[s, p, g]),
        Term::Replace(s, a, b) => write_call(out, "replace", &[s, a, b]),
        Term::Split(s, d, i) => write_call(out, "split", &[s, d, i]),
        Term::Filter(c, p) => write_call(out, "filter", &[c, p]),
        Term::Map(c, f) => write_call(out, "map", &[c, f]),
        Term::Reduce(c, i, f) => write_call(out, "reduce", &[c, i, f]),
        Term::If(c, t, e) => write_call(out, "if", &[c, t, e]),
        Term::Lambda(param, body) => {
            out.push_str("(lambda ");
            out.push_str(param);
            out.push(' ');
            write_term(out, body);
            out.push(')');
        }
        Term::App(f, a) => write_call(out, "app", &[f, a]),
        Term::Classify(ex) => write_call_with_examples(out, "classify", &[], ex),
        Term::Predicate(s, ex) => write_call_with_examples(out, "predicate", &[s], ex),
        Term::DefineFn(name, ex) => {
            let name_term = Term::Var(name.clone());
            write_call_with_examples(out, "define-fn", &[&name_term], ex);
        }
        Term::ApplyFn(name, a) => {
            let name_term = Term::Var(name.clone());
            write_call(out, "apply-fn", &[&name_term, a]);
        }
        Term::Extract(s, p, g, target, ex) => {
            let target_term = target.as_ref().map(|t| Term::Var(t.to_string()));
            let mut args: Vec<&Term> = vec![s, p, g];
            if let Some(t) = &target_term {
                args.push(t);
            }
            write_call_with_examples(out, "extract", &args, ex);
        }
        Term::Coerce(t, target) => {
            let target_term = Term::Var(target.to_string());
            write_call(out, "coerce", &[t, &target_term]);
        }
        Term::Constrained(tag, inner) => {
            let _ = write!(out, "[{tag}] ⊗ ");
            write_term(out, inner);
        }
        Term::Synthesize(ex) => write_call_with_examples(out, "synthesize", &[], ex),
        Term::ListSymbols(kind) => {
            out.push_str("(list_symbols");
            if let Some(k) = kind {
                out.push(' ');
                out.push_str(k);
            }
            out.push(')');
        }
        Term::GetSymbolBody(s) => write_call(out, "get_symbol_body", &[s]),
        Term::FindReferences(n) => write_call(out, "find_references", &[n]),
    }
}

fn write_literal(out: &mut String, lit: &Literal) {
    let _ = write!(out, "{lit}");
}

fn write_call(out: &mut String, head: &str, args: &[&Term]) {
    out.push('(');
    out.push_str(head);
    for a in args {
        out.push(' ');
        write_term(out, a);
    }
    out.push(')');
}

fn write_call_with_examples(out: &mut String, head: &str, args: &[&Term], examples: &[Example]) {
    out.push('(');
    out.push_str(head);
    for a in args {
        out.push(' ');
        write_term(out, a);
    }
    for e in examples {
        let _ = write!(out, " (example \"{}\" {})", escape(&e.input), e.output);
    }
    out.push(')');
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trips(term: &Term) {
        let printed = print(term);
        let reparsed = parse(&printed).term.expect("should reparse");
        assert_eq!(&reparsed, term, "round-trip mismatch for {printed}");
    }

    #[test]
    fn grep_round_trips() {
        round_trips(&Term::Grep(Box::new(Term::lit_str("Sales"))));
    }

    #[test]
    fn nested_filter_lambda_round_trips() {
        let term = Term::Filter(
            Box::new(Term::Var("RESULTS".into())),
            Box::new(Term::Lambda(
                "x".into(),
                Box::new(Term::Match(
                    Box::new(Term::Var("x".into())),
                    Box::new(Term::lit_str("Network")),
                    Box::new(Term::lit_num(0.0)),
                )),
            )),
        );
        round_trips(&term);
    }

    #[test]
    fn coerce_round_trips_type_tag() {
        round_trips(&Term::Coerce(Box::new(Term::Input), TypeTag::Number));
    }

    #[test]
    fn constrained_node_prints_with_brackets() {
        let term = Term::Constrained(
            "Σ⚡μ".into(),
            Box::new(Term::Grep(Box::new(Term::lit_str("x")))),
        );
        assert_eq!(print(&term), "[Σ⚡μ] ⊗ (grep \"x\")");
    }
}
