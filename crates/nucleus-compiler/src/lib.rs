//! The Nucleus DSL front end: lexer, parser, constraint resolver, and
//! type inferencer. Produces a fully resolved, type-checked `Term` that
//! `nucleus-rt`'s evaluator can run without re-examining syntax.

pub mod constraints;
pub mod lexer;
pub mod parser;
pub mod pretty;
pub mod tokens;
pub mod typecheck;

pub use constraints::{resolve_constraints, ConstraintError, ResolveOutcome};
pub use parser::{parse, ParseResult};
pub use pretty::print;
pub use typecheck::{infer_expected_type, verify_output_type, TypeChecker, TypeError};

use nucleus_core::Term;

/// Errors at any of the three front-end stages, collapsed into one enum
/// for callers that just want to know whether a source string compiles.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("{0}")]
    Parse(String),
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// A fully compiled command: a resolved term, the constraints that were
/// applied during resolution, and its inferred type.
pub struct Compiled {
    pub term: Term,
    pub applied_constraints: Vec<String>,
    pub inferred_type: nucleus_core::Type,
}

/// Runs the full front end (lex, parse, resolve constraints, infer type)
/// over a source string in one call.
pub fn compile(source: &str) -> Result<Compiled, CompileError> {
    let parsed = parse(source);
    let term = parsed
        .term
        .ok_or_else(|| CompileError::Parse(parsed.error.unwrap_or_else(|| "parse error".into())))?;
    let resolved = resolve_constraints(&term)?;
    let inferred_type = verify_output_type(&resolved.term, &nucleus_core::Type::Any)?;
    Ok(Compiled {
        term: resolved.term,
        applied_constraints: resolved.applied,
        inferred_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_simple_grep_command() {
        let compiled = compile(r#"(grep "Sales")"#).unwrap();
        assert_eq!(
            compiled.inferred_type,
            nucleus_core::Type::array_of(nucleus_core::Type::Any)
        );
        assert!(compiled.applied_constraints.is_empty());
    }

    #[test]
    fn unknown_constraint_surfaces_as_compile_error() {
        let err = compile("[not-a-constraint] ⊗ (grep \"x\")").unwrap_err();
        assert!(matches!(err, CompileError::Constraint(_)));
    }

    #[test]
    fn empty_source_surfaces_as_parse_error() {
        let err = compile("").unwrap_err();
        assert!(matches!(err, CompileError::Parse(_)));
    }
}
