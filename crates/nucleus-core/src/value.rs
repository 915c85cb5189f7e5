//! Runtime values, environments, and closures (§3 "Value", "Environment").

use crate::term::Term;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A single grep hit, in the shape document tools hand back to the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct GrepRecord {
    pub matched: String,
    pub line: String,
    pub line_num: usize,
    pub index: usize,
    pub groups: Vec<Option<String>>,
}

/// A single fuzzy-search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyRecord {
    pub line: String,
    pub line_num: usize,
    pub score: f64,
}

/// A closure captures its parameter, its body term, and the environment
/// visible at the moment the `lambda` term was evaluated. Per the design
/// note, the environment is captured by value at creation time (the
/// environment type itself is a cheap-to-clone persistent map) so later
/// mutation of the outer bindings never reaches back into the closure.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub param: String,
    pub body: Rc<Term>,
    pub captured_env: Environment,
}

/// Marker left behind by `define-fn`/successful synthesis, bound under
/// `_fn_<name>` per the Environment "special names" rule.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedFn {
    pub name: String,
    pub source_code: String,
    pub component_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    GrepRecord(GrepRecord),
    FuzzyRecord(FuzzyRecord),
    Closure(Closure),
    SynthesizedFn(SynthesizedFn),
}

impl Value {
    /// Values `null`, `false`, `0`, and `""` are false; everything else is
    /// true (§4.4 "if").
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::GrepRecord(_) => "grep-record",
            Value::FuzzyRecord(_) => "fuzzy-record",
            Value::Closure(_) => "function",
            Value::SynthesizedFn(_) => "synthesized-fn",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The textual content the evaluator pulls numbers/currency out of for
    /// `sum` over mixed sequences of records and strings (§4.4 "sum").
    pub fn principal_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::GrepRecord(r) => r.line.clone(),
            Value::FuzzyRecord(r) => r.line.clone(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Null => String::new(),
            other => format!("{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::GrepRecord(r) => write!(f, "{}", r.line),
            Value::FuzzyRecord(r) => write!(f, "{}", r.line),
            Value::Closure(_) => write!(f, "<function>"),
            Value::SynthesizedFn(s) => write!(f, "<synthesized-fn {}>", s.name),
        }
    }
}

/// A cross-turn binding environment.
///
/// Backed by a reference-counted map so that capturing the environment in
/// a closure (see [`Closure`]) is a cheap `Rc` clone; mutating the *outer*
/// environment after the fact (via [`Environment::bind`]) clones the
/// underlying map and rewraps it in a fresh `Rc`, so closures that captured
/// an earlier `Environment` never observe later bindings.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: Rc<BTreeMap<String, Value>>,
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        *self.bindings == *other.bindings
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Returns a new environment with `name` bound to `value`. The receiver
    /// is left untouched — callers that want mutation-in-place reassign
    /// their handle to the returned environment.
    pub fn bind(&self, name: impl Into<String>, value: Value) -> Environment {
        let mut map = (*self.bindings).clone();
        map.insert(name.into(), value);
        Environment {
            bindings: Rc::new(map),
        }
    }

    pub fn bind_mut(&mut self, name: impl Into<String>, value: Value) {
        let map = Rc::make_mut(&mut self.bindings);
        map.insert(name.into(), value);
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

pub const RESULTS_BINDING: &str = "RESULTS";
pub const CONTEXT_BINDING: &str = "context";

pub fn turn_binding_name(turn: u64) -> String {
    format!("_{turn}")
}

pub fn fn_binding_name(name: &str) -> String {
    format!("_fn_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values_match_spec() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
    }

    #[test]
    fn truthy_values() {
        assert!(Value::Boolean(true).is_truthy());
        assert!(Value::Number(1.0).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn environment_bind_is_immutable_for_prior_clones() {
        let env0 = Environment::new();
        let env1 = env0.bind("x", Value::Number(1.0));
        let env2 = env1.bind("x", Value::Number(2.0));

        assert_eq!(env0.get("x"), None);
        assert_eq!(env1.get("x"), Some(&Value::Number(1.0)));
        assert_eq!(env2.get("x"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn closure_capture_is_unaffected_by_later_bindings() {
        let env = Environment::new().bind("x", Value::Number(1.0));
        let closure = Closure {
            param: "y".into(),
            body: Rc::new(Term::Var("x".into())),
            captured_env: env.clone(),
        };
        let _env_after = env.bind("x", Value::Number(99.0));
        assert_eq!(
            closure.captured_env.get("x"),
            Some(&Value::Number(1.0))
        );
    }

    #[test]
    fn turn_and_fn_binding_names() {
        assert_eq!(turn_binding_name(3), "_3");
        assert_eq!(fn_binding_name("parseAmount"), "_fn_parseAmount");
    }
}
