//! Shared types used across the Nucleus compiler and runtime: the `Term`
//! AST, the structural `Type` system, runtime `Value`s and `Environment`,
//! the `Document` model, and the common error taxonomy.

pub mod document;
pub mod error;
pub mod term;
pub mod types;
pub mod value;

pub use document::Document;
pub use error::{NucleusError, NucleusResult};
pub use term::{Example, Literal, Term, TypeTag};
pub use types::Type;
pub use value::{
    fn_binding_name, turn_binding_name, Closure, Environment, FuzzyRecord, GrepRecord,
    SynthesizedFn, Value, CONTEXT_BINDING, RESULTS_BINDING,
};
