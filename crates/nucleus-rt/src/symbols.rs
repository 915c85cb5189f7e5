//! The symbol-indexer collaborator contract (§1 non-goals, §4.4's
//! `list_symbols`/`get_symbol_body`/`find_references` row).
//!
//! The concrete source-code symbol indexer built on top of a third-party
//! incremental-parsing library is explicitly out of scope for this core
//! (§1 "Explicit non-goals / external collaborators"). What *is* in scope
//! is the trait the evaluator drives it through, so a host adapter can
//! plug its own indexer in without the evaluator knowing anything about
//! the parsing library underneath.

/// One symbol as the indexer reports it: a name, a kind tag (`function`,
/// `struct`, `const`, ...; left as a plain string since the closed set is
/// language-specific and owned by the indexer, not this core), and the
/// 1-indexed line range the symbol spans.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolInfo {
    pub name: String,
    pub kind: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A single use-site the indexer found for a name.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceInfo {
    pub line: usize,
    pub column: usize,
    pub context: String,
}

/// External collaborator contract for `list_symbols`, `get_symbol_body`,
/// and `find_references`. §4.4's table specifies the edge case explicitly:
/// when the session's document is not recognized as a source file, every
/// method here returns an empty sequence rather than an error.
pub trait SymbolIndexer {
    fn list_symbols(&self, kind: Option<&str>) -> Vec<SymbolInfo>;
    fn get_symbol_body(&self, name: &str) -> Option<String>;
    fn find_references(&self, name: &str) -> Vec<ReferenceInfo>;
}

/// The indexer a session uses when no host-supplied implementation is
/// wired in, or when the loaded document isn't source code: every query
/// answers with the empty sequence, matching the "not a source file"
/// edge case in §4.4's built-ins table without the evaluator needing a
/// special case of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSymbolIndexer;

impl SymbolIndexer for NullSymbolIndexer {
    fn list_symbols(&self, _kind: Option<&str>) -> Vec<SymbolInfo> {
        Vec::new()
    }

    fn get_symbol_body(&self, _name: &str) -> Option<String> {
        None
    }

    fn find_references(&self, _name: &str) -> Vec<ReferenceInfo> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_indexer_reports_empty_for_everything() {
        let idx = NullSymbolIndexer;
        assert!(idx.list_symbols(None).is_empty());
        assert!(idx.get_symbol_body("anything").is_none());
        assert!(idx.find_references("anything").is_empty());
    }
}
