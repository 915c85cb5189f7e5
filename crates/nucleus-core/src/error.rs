//! The error taxonomy shared by every stage of the pipeline.
//!
//! Every fallible operation in the workspace resolves to a
//! [`NucleusError`] (or a narrower enum with a `From` conversion into
//! it). Nothing in non-test code panics across an API boundary: the
//! parser returns a `ParseResult`, the evaluator threads `Result`, and
//! synthesis reports structured failure instead of throwing.

use thiserror::Error;

/// The closed taxonomy from the design's error handling section.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NucleusError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("unbound name '{0}'")]
    Unbound(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("insufficient examples: {0}")]
    InsufficientExamples(String),

    #[error("synthesis failed after {attempts} attempt(s) across {strategies_tried} strateg(y/ies): {reason}")]
    SynthesisFailed {
        reason: String,
        attempts: usize,
        strategies_tried: usize,
    },

    #[error("cancelled: deadline expired during '{operation}'")]
    Cancelled { operation: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl NucleusError {
    pub fn internal(msg: impl Into<String>) -> Self {
        NucleusError::Internal(msg.into())
    }

    /// Wrap an error with the operator name and argument index that was
    /// being evaluated when it surfaced, per §7 "Propagation".
    pub fn with_context(self, operator: &str, arg_index: usize) -> Self {
        let context = format!("in '{operator}' argument #{arg_index}");
        match self {
            NucleusError::Parse(m) => NucleusError::Parse(format!("{m} ({context})")),
            NucleusError::Type(m) => NucleusError::Type(format!("{m} ({context})")),
            NucleusError::Unbound(m) => NucleusError::Unbound(format!("{m} ({context})")),
            NucleusError::InvalidPattern(m) => {
                NucleusError::InvalidPattern(format!("{m} ({context})"))
            }
            NucleusError::InsufficientExamples(m) => {
                NucleusError::InsufficientExamples(format!("{m} ({context})"))
            }
            other => other,
        }
    }
}

pub type NucleusResult<T> = Result<T, NucleusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_annotates_message() {
        let err = NucleusError::Unbound("x".into()).with_context("app", 0);
        assert_eq!(
            err.to_string(),
            "unbound name 'x (in 'app' argument #0)'"
        );
    }

    #[test]
    fn cancelled_preserves_operation_name() {
        let err = NucleusError::Cancelled {
            operation: "grep".into(),
        };
        assert_eq!(err.to_string(), "cancelled: deadline expired during 'grep'");
    }
}
