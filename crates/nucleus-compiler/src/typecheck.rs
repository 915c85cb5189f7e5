//! Bottom-up structural type inference for Nucleus terms (§4.3).

use nucleus_core::{Term, Type};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
    #[error("'{0}' applied to a non-function")]
    NotAFunction(String),
    #[error("unbound name '{0}'")]
    Unbound(String),
}

/// The result of a single inference pass: the call never panics, it
/// either returns a type or an error describing the unambiguous mismatch
/// that rules out a type.
pub struct TypeChecker {
    /// Names bound by enclosing `lambda`s, consulted the same way the
    /// evaluator's `Environment` is, but carrying types instead of values.
    scope: HashMap<String, Type>,
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeChecker {
    pub fn new() -> Self {
        Self {
            scope: HashMap::new(),
        }
    }

    pub fn infer(&mut self, term: &Term) -> Result<Type, TypeError> {
        match term {
            Term::Input => Ok(Type::String),
            Term::Lit(lit) => Ok(match lit {
                nucleus_core::Literal::String(_) => Type::String,
                nucleus_core::Literal::Number(_) => Type::Number,
                nucleus_core::Literal::Boolean(_) => Type::Boolean,
            }),
            Term::Var(name) => Ok(self.scope.get(name).cloned().unwrap_or(Type::Any)),
            Term::TextStats => Ok(Type::Any),
            Term::Grep(p) => {
                self.expect(p, &Type::String)?;
                Ok(Type::array_of(Type::Any))
            }
            Term::FuzzySearch(q, limit) => {
                self.expect(q, &Type::String)?;
                if let Some(l) = limit {
                    self.expect(l, &Type::Number)?;
                }
                Ok(Type::array_of(Type::Any))
            }
            Term::Lines(s, e) => {
                self.expect(s, &Type::Number)?;
                self.expect(e, &Type::Number)?;
                Ok(Type::array_of(Type::String))
            }
            Term::ParseInt(s, _)
            | Term::ParseFloat(s, _)
            | Term::ParseCurrency(s, _)
            | Term::ParseNumber(s, _) => {
                self.expect(s, &Type::String)?;
                Ok(Type::Number)
            }
            Term::ParseDate(s, fmt, _) => {
                self.expect(s, &Type::String)?;
                if let Some(f) = fmt {
                    self.expect(f, &Type::String)?;
                }
                Ok(Type::Date)
            }
            Term::Count(s) => {
                self.infer(s)?;
                Ok(Type::Number)
            }
            Term::Sum(s) => {
                self.infer(s)?;
                Ok(Type::Number)
            }
            Term::Add(a, b) => {
                self.expect(a, &Type::Number)?;
                self.expect(b, &Type::Number)?;
                Ok(Type::Number)
            }
            Term::Match(s, p, g) => {
                self.expect(s, &Type::String)?;
                self.expect(p, &Type::String)?;
                self.expect(g, &Type::Number)?;
                Ok(Type::String)
            }
            Term::Replace(s, from, to) => {
                self.expect(s, &Type::String)?;
                self.expect(from, &Type::String)?;
                self.expect(to, &Type::String)?;
                Ok(Type::String)
            }
            Term::Split(s, d, i) => {
                self.expect(s, &Type::String)?;
                self.expect(d, &Type::String)?;
                self.expect(i, &Type::Number)?;
                Ok(Type::String)
            }
            Term::Filter(c, p) => {
                let elem = self.element_type(c)?;
                self.check_predicate(p, &elem)?;
                Ok(Type::array_of(elem))
            }
            Term::Map(c, f) => {
                let elem = self.element_type(c)?;
                let mapped = self.infer_applied(f, &elem)?;
                Ok(Type::array_of(mapped))
            }
            Term::Reduce(c, init, f) => {
                let elem = self.element_type(c)?;
                let acc = self.infer(init)?;
                let _ = self.infer_binary_applied(f, &acc, &elem)?;
                Ok(acc)
            }
            Term::If(cond, then, els) => {
                self.infer(cond)?;
                let t = self.infer(then)?;
                let e = self.infer(els)?;
                Ok(t.join(&e))
            }
            Term::Lambda(param, body) => {
                let prior = self.scope.insert(param.clone(), Type::Any);
                let body_ty = self.infer(body)?;
                match prior {
                    Some(t) => {
                        self.scope.insert(param.clone(), t);
                    }
                    None => {
                        self.scope.remove(param);
                    }
                }
                Ok(Type::function(Type::Any, body_ty))
            }
            Term::App(f, arg) => {
                let f_ty = self.infer(f)?;
                self.infer(arg)?;
                match f_ty {
                    Type::Function(_, ret) => Ok(*ret),
                    Type::Any => Ok(Type::Any),
                    other => Err(TypeError::NotAFunction(other.to_string())),
                }
            }
            Term::Classify(_) | Term::Predicate(_, _) | Term::DefineFn(_, _) => {
                Ok(Type::function(Type::String, Type::Any))
            }
            Term::ApplyFn(_, arg) => {
                self.infer(arg)?;
                Ok(Type::Any)
            }
            Term::Extract(s, p, g, target, _) => {
                self.expect(s, &Type::String)?;
                self.expect(p, &Type::String)?;
                self.infer(g)?;
                Ok(target
                    .as_ref()
                    .and_then(type_of_tag)
                    .unwrap_or(Type::String))
            }
            Term::Coerce(t, target) => {
                self.infer(t)?;
                Ok(type_of_tag(target).unwrap_or(Type::Any))
            }
            Term::Constrained(_, inner) => self.infer(inner),
            Term::Synthesize(_) => Ok(Type::function(Type::String, Type::Any)),
            Term::ListSymbols(_) => Ok(Type::array_of(Type::Any)),
            Term::GetSymbolBody(s) => {
                self.infer(s)?;
                Ok(Type::String)
            }
            Term::FindReferences(n) => {
                self.infer(n)?;
                Ok(Type::array_of(Type::Any))
            }
        }
    }

    fn element_type(&mut self, collection: &Term) -> Result<Type, TypeError> {
        match self.infer(collection)? {
            Type::Array(elem) => Ok(*elem),
            Type::Any => Ok(Type::Any),
            other => Err(TypeError::Mismatch {
                expected: "array<T>".into(),
                found: other.to_string(),
            }),
        }
    }

    fn check_predicate(&mut self, predicate: &Term, elem: &Type) -> Result<(), TypeError> {
        let result = self.infer_applied(predicate, elem)?;
        match result {
            Type::Boolean | Type::Any => Ok(()),
            other => Err(TypeError::Mismatch {
                expected: Type::Boolean.to_string(),
                found: other.to_string(),
            }),
        }
    }

    /// Infers the type a `lambda` (or any callable term) produces when
    /// applied to a single argument of `arg_ty`, without requiring the
    /// caller to build an explicit `app` node (used by `filter`/`map`).
    fn infer_applied(&mut self, callee: &Term, arg_ty: &Type) -> Result<Type, TypeError> {
        if let Term::Lambda(param, body) = callee {
            let prior = self.scope.insert(param.clone(), arg_ty.clone());
            let result = self.infer(body);
            match prior {
                Some(t) => {
                    self.scope.insert(param.clone(), t);
                }
                None => {
                    self.scope.remove(param);
                }
            }
            return result;
        }
        match self.infer(callee)? {
            Type::Function(_, ret) => Ok(*ret),
            Type::Any => Ok(Type::Any),
            other => Err(TypeError::NotAFunction(other.to_string())),
        }
    }

    fn infer_binary_applied(
        &mut self,
        callee: &Term,
        acc_ty: &Type,
        elem_ty: &Type,
    ) -> Result<Type, TypeError> {
        if let Term::Lambda(param, body) = callee {
            // `reduce`'s `fn` is a two-argument lambda curried as
            // `lambda(acc, lambda(x, body))`, mirroring how `app` always
            // takes exactly one argument in this DSL.
            if let Term::Lambda(inner_param, inner_body) = body.as_ref() {
                let prior_acc = self.scope.insert(param.clone(), acc_ty.clone());
                let prior_elem = self.scope.insert(inner_param.clone(), elem_ty.clone());
                let result = self.infer(inner_body);
                restore(&mut self.scope, param, prior_acc);
                restore(&mut self.scope, inner_param, prior_elem);
                return result;
            }
            let prior = self.scope.insert(param.clone(), acc_ty.clone());
            let result = self.infer(body);
            restore(&mut self.scope, param, prior);
            return result;
        }
        Ok(Type::Any)
    }

    fn expect(&mut self, term: &Term, expected: &Type) -> Result<(), TypeError> {
        let found = self.infer(term)?;
        if found.compatible_with(expected) {
            Ok(())
        } else {
            Err(TypeError::Mismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }
}

fn restore(scope: &mut HashMap<String, Type>, name: &str, prior: Option<Type>) {
    match prior {
        Some(t) => {
            scope.insert(name.to_string(), t);
        }
        None => {
            scope.remove(name);
        }
    }
}

fn type_of_tag(tag: &nucleus_core::TypeTag) -> Option<Type> {
    use nucleus_core::TypeTag;
    Some(match tag {
        TypeTag::String => Type::String,
        TypeTag::Number => Type::Number,
        TypeTag::Boolean => Type::Boolean,
        TypeTag::Date => Type::Date,
        TypeTag::Array => Type::array_of(Type::Any),
    })
}

/// Heuristic expected-type guess from a natural-language query, per the
/// "public helpers" note: looks for "find"/"list" (array), "count"
/// (number), "sum"/"total" (number), "extract" (string).
pub fn infer_expected_type(query_text: &str) -> Type {
    let lower = query_text.to_lowercase();
    if lower.contains("count") {
        Type::Number
    } else if lower.contains("sum") || lower.contains("total") {
        Type::Number
    } else if lower.contains("find") || lower.contains("list") {
        Type::array_of(Type::Any)
    } else if lower.contains("extract") {
        Type::String
    } else {
        Type::Any
    }
}

/// Runs inference on `term` and checks the result is compatible with
/// `expected`, returning a structured mismatch rather than a bool so
/// callers can surface a helpful message.
pub fn verify_output_type(term: &Term, expected: &Type) -> Result<Type, TypeError> {
    let mut checker = TypeChecker::new();
    let found = checker.infer(term)?;
    if found.compatible_with(expected) {
        Ok(found)
    } else {
        Err(TypeError::Mismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleus_core::Literal;

    #[test]
    fn grep_infers_array_of_any() {
        let mut tc = TypeChecker::new();
        let ty = tc
            .infer(&Term::Grep(Box::new(Term::lit_str("x"))))
            .unwrap();
        assert_eq!(ty, Type::array_of(Type::Any));
    }

    #[test]
    fn sum_and_count_infer_number() {
        let mut tc = TypeChecker::new();
        let collection = Term::Grep(Box::new(Term::lit_str("Sales")));
        assert_eq!(tc.infer(&Term::Sum(Box::new(collection.clone()))).unwrap(), Type::Number);
        assert_eq!(tc.infer(&Term::Count(Box::new(collection))).unwrap(), Type::Number);
    }

    #[test]
    fn if_join_widens_differing_branches_to_any() {
        let mut tc = TypeChecker::new();
        let term = Term::If(
            Box::new(Term::Lit(Literal::Boolean(true))),
            Box::new(Term::lit_num(1.0)),
            Box::new(Term::lit_str("x")),
        );
        assert_eq!(tc.infer(&term).unwrap(), Type::Any);
    }

    #[test]
    fn applying_a_non_function_is_a_type_error() {
        let mut tc = TypeChecker::new();
        let term = Term::App(Box::new(Term::lit_num(1.0)), Box::new(Term::lit_num(2.0)));
        assert!(tc.infer(&term).is_err());
    }

    #[test]
    fn filter_predicate_must_be_boolean() {
        let mut tc = TypeChecker::new();
        let term = Term::Filter(
            Box::new(Term::Grep(Box::new(Term::lit_str("x")))),
            Box::new(Term::Lambda("x".into(), Box::new(Term::lit_num(1.0)))),
        );
        assert!(tc.infer(&term).is_err());
    }

    #[test]
    fn expected_type_heuristic_recognizes_keywords() {
        assert_eq!(infer_expected_type("count the errors"), Type::Number);
        assert_eq!(infer_expected_type("list all the dates"), Type::array_of(Type::Any));
        assert_eq!(infer_expected_type("total sales"), Type::Number);
    }
}
