//! The Lattice evaluator, relational synthesis engine, handle registry,
//! and session surface for the Nucleus DSL runtime.
//!
//! `nucleus-compiler` turns source text into a resolved, type-checked
//! [`nucleus_core::Term`]; this crate runs it. [`session::Session`] is
//! the entry point most host adapters want — it wires the document
//! tools, the evaluator, the handle registry, and the knowledge base
//! together behind the surface API in §6.1.

pub mod deadline;
pub mod doctools;
pub mod eval;
pub mod fulltext;
pub mod handles;
pub mod kb;
pub mod predicate_compiler;
pub mod session;
pub mod symbols;
pub mod synth;

pub use deadline::Deadline;
pub use doctools::{DocumentTools, DocumentToolkit, TextStats};
pub use eval::{EvalOutcome, Evaluator};
pub use fulltext::FullTextIndex;
pub use handles::{Describe, Handle, HandleRegistry};
pub use kb::{Component, ComponentKind, KnowledgeBase, StructuralSignature};
pub use session::{ExecuteOutcome, ExpandPage, LoadStats, Session, SessionConfig};
pub use symbols::{NullSymbolIndexer, ReferenceInfo, SymbolIndexer, SymbolInfo};
pub use synth::{SynthesisIntegrator, SynthesisOutcome, SynthesizedCallable};
