//! Nested scopes and name lookup.
//!
//! Scopes form a tree indexed by [`ScopeId`]; each frame holds a
//! name → symbols multimap (functions and methods overload, so one name
//! can carry several symbols). Lookup distinguishes the current frame
//! from the parent chain so the analyzer can detect closure captures.

use rustc_hash::FxHashMap;

use crate::symbols::{SymbolArena, SymbolId, SymbolKind};

/// Index of a scope in a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// What construct opened the scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Function,
    Class,
    Method,
    Closure,
    Block,
    Loop,
    Try,
    Except,
    Finally,
}

/// Result of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    NotFound,
    FoundInScope,
    FoundOutOfScope,
    /// Found a symbol with the same name but an incompatible shape.
    FoundRedefinition,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub depth: u32,
    symbols: FxHashMap<String, Vec<SymbolId>>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, depth: u32) -> Self {
        Self {
            kind,
            parent,
            depth,
            symbols: FxHashMap::default(),
        }
    }

    pub fn symbols_named(&self, name: &str) -> &[SymbolId] {
        self.symbols.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SymbolId)> {
        self.symbols
            .iter()
            .flat_map(|(name, ids)| ids.iter().map(move |id| (name.as_str(), *id)))
    }
}

/// Tree of all scopes created by one analysis; the root is the global
/// scope.
#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(ScopeKind::Global, None, 0)],
        }
    }

    pub const GLOBAL: ScopeId = ScopeId(0);

    /// Open a child scope.
    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let depth = self.get(parent).depth + 1;
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, Some(parent), depth));
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn add_symbol(&mut self, scope: ScopeId, name: impl Into<String>, symbol: SymbolId) {
        self.scopes[scope.0 as usize]
            .symbols
            .entry(name.into())
            .or_default()
            .push(symbol);
    }

    /// Search the given scope only.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> (LookupResult, Option<SymbolId>) {
        match self.get(scope).symbols_named(name).first() {
            Some(&id) => (LookupResult::FoundInScope, Some(id)),
            None => (LookupResult::NotFound, None),
        }
    }

    /// Arity-aware search of the given scope, for overload sets.
    ///
    /// Functions and methods match on (argc, vararg); hitting any other
    /// symbol with the same name is a redefinition.
    pub fn lookup_local_overload(
        &self,
        scope: ScopeId,
        name: &str,
        argc: usize,
        vararg: bool,
        arena: &SymbolArena,
    ) -> (LookupResult, Option<SymbolId>) {
        for &id in self.get(scope).symbols_named(name) {
            match arena.get(id).kind {
                SymbolKind::Function {
                    argc: have_argc,
                    vararg: have_vararg,
                }
                | SymbolKind::Method {
                    argc: have_argc,
                    vararg: have_vararg,
                    ..
                } => {
                    if have_argc != argc || have_vararg != vararg {
                        continue;
                    }
                    return (LookupResult::FoundInScope, Some(id));
                }
                _ => return (LookupResult::FoundRedefinition, Some(id)),
            }
        }
        (LookupResult::NotFound, None)
    }

    /// Walk the parent chain; the result tells whether the hit was in the
    /// starting scope or above it.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> (LookupResult, Option<SymbolId>) {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let (LookupResult::FoundInScope, found) = self.lookup_local(id, name) {
                let result = if id == scope {
                    LookupResult::FoundInScope
                } else {
                    LookupResult::FoundOutOfScope
                };
                return (result, found);
            }
            current = self.get(id).parent;
        }
        (LookupResult::NotFound, None)
    }

    /// Like [`lookup`](Self::lookup) but also reports the defining scope.
    pub fn lookup_with_origin(&self, scope: ScopeId, name: &str) -> Option<(SymbolId, ScopeId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(&found) = self.get(id).symbols_named(name).first() {
                return Some((found, id));
            }
            current = self.get(id).parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}
