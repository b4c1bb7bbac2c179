//! Semantic analysis for the Mason build-script language.
//!
//! Builds nested scopes over a parsed script, declares and resolves
//! symbols (with closure-capture conversion and overload-aware
//! redefinition checks), and annotates the AST through side tables the
//! IR builder consumes.

pub mod analyzer;
pub mod scope;
pub mod symbols;

pub use analyzer::{analyze, Analysis, Capture, SemanticAnalyzer};
pub use scope::{LookupResult, Scope, ScopeId, ScopeKind, ScopeTree};
pub use symbols::{Symbol, SymbolArena, SymbolId, SymbolKind, VariableKind};
