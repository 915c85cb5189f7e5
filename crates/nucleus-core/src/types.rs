//! The structural type system assigned to DSL terms (§3 "Type").
//!
//! Types are structural tags, not names: there is no user-defined
//! nominal type here, only the closed set the DSL can produce.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    String,
    Number,
    Boolean,
    Date,
    Array(Box<Type>),
    Function(Box<Type>, Box<Type>),
    Any,
    Void,
}

impl Type {
    pub fn array_of(elem: Type) -> Type {
        Type::Array(Box::new(elem))
    }

    pub fn function(param: Type, ret: Type) -> Type {
        Type::Function(Box::new(param), Box::new(ret))
    }

    /// Join two types under `if`-branch unification (§4.3 "if").
    /// Equal types join to themselves; anything else widens to `Any`.
    pub fn join(&self, other: &Type) -> Type {
        if self == other {
            self.clone()
        } else {
            Type::Any
        }
    }

    /// True if a value of `self` may be used wherever `expected` is required.
    /// `Any` is compatible with everything in both directions: inference
    /// widens to `Any` rather than guessing, so it must never reject.
    pub fn compatible_with(&self, expected: &Type) -> bool {
        match (self, expected) {
            (Type::Any, _) | (_, Type::Any) => true,
            (Type::Array(a), Type::Array(b)) => a.compatible_with(b),
            (Type::Function(p1, r1), Type::Function(p2, r2)) => {
                p1.compatible_with(p2) && r1.compatible_with(r2)
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::String => write!(f, "string"),
            Type::Number => write!(f, "number"),
            Type::Boolean => write!(f, "boolean"),
            Type::Date => write!(f, "date"),
            Type::Array(t) => write!(f, "array<{t}>"),
            Type::Function(p, r) => write!(f, "function<{p},{r}>"),
            Type::Any => write!(f, "any"),
            Type::Void => write!(f, "void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_equal_types_keeps_type() {
        assert_eq!(Type::Number.join(&Type::Number), Type::Number);
    }

    #[test]
    fn join_different_types_widens_to_any() {
        assert_eq!(Type::Number.join(&Type::String), Type::Any);
    }

    #[test]
    fn any_is_compatible_with_everything() {
        assert!(Type::Any.compatible_with(&Type::Number));
        assert!(Type::Number.compatible_with(&Type::Any));
    }

    #[test]
    fn arrays_compatible_structurally() {
        assert!(Type::array_of(Type::Number).compatible_with(&Type::array_of(Type::Number)));
        assert!(!Type::array_of(Type::Number).compatible_with(&Type::array_of(Type::String)));
    }

    #[test]
    fn display_matches_spec_notation() {
        assert_eq!(Type::array_of(Type::String).to_string(), "array<string>");
        assert_eq!(
            Type::function(Type::String, Type::Boolean).to_string(),
            "function<string,boolean>"
        );
    }
}
