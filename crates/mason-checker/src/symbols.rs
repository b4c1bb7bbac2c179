//! Declared symbols.
//!
//! Symbols live in an arena indexed by [`SymbolId`]; scopes and AST side
//! tables refer to them by id, so owner links and capture chains never
//! form owning cycles. Each symbol exposes a descriptive name for
//! diagnostics and a mangled name for link-time identity.

use std::fmt;

use mason_parser::source::SourcePosition;

/// Reserved method name of instance initializers.
pub const INITIALIZER_NAME: &str = "init";
/// Reserved method name of deinitializers.
pub const DEINITIALIZER_NAME: &str = "deinit";
/// Reserved method name of the static class initializer.
pub const CLASS_INITIALIZER_NAME: &str = "<class-init>";

/// Name of the implicit `self` variable.
pub const SELF_NAME: &str = "<self>";
/// Name of the implicit `super` variable.
pub const SUPER_NAME: &str = "<super>";

const ARGUMENT_SEPARATOR: char = '$';
const MEMBER_SEPARATOR: &str = "::";
const VARIADIC_SUFFIX: char = '…';
const BOUNDED_PREFIX: &str = "bounded$";

/// Index of a symbol in a [`SymbolArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// Sub-kind of a variable symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Global,
    Local,
    Exported,
    Parameter,
    Exception,
    Implicit,
}

impl VariableKind {
    fn describe(self) -> &'static str {
        match self {
            VariableKind::Global => "global variable",
            VariableKind::Local => "variable",
            VariableKind::Exported => "exported variable",
            VariableKind::Parameter => "parameter",
            VariableKind::Exception => "caught exception variable",
            VariableKind::Implicit => "implicit variable",
        }
    }
}

/// What a symbol denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A name that resolved nowhere; bound late by the runtime.
    Undeclared,
    Variable {
        kind: VariableKind,
        readonly: bool,
    },
    /// A local captured by a closure; refers to the captured original.
    BoundedLocal {
        original: SymbolId,
    },
    Type,
    Function {
        argc: usize,
        vararg: bool,
    },
    Class,
    Task,
    Field {
        owner: SymbolId,
    },
    Method {
        owner: SymbolId,
        argc: usize,
        vararg: bool,
    },
    Property {
        owner: SymbolId,
        getter: bool,
    },
    /// An anonymous callable; its name is `<closure#N>`.
    Closure,
}

/// A declared identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub pos: SourcePosition,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, pos: SourcePosition, kind: SymbolKind) -> Self {
        Self {
            name: name.into(),
            pos,
            kind,
        }
    }

    pub fn is_readonly(&self) -> bool {
        matches!(
            self.kind,
            SymbolKind::Variable { readonly: true, .. }
                | SymbolKind::Function { .. }
                | SymbolKind::Class
                | SymbolKind::Task
                | SymbolKind::Type
        )
    }

    /// Arity of a callable symbol.
    pub fn argc(&self) -> Option<usize> {
        match self.kind {
            SymbolKind::Function { argc, .. } | SymbolKind::Method { argc, .. } => Some(argc),
            _ => None,
        }
    }
}

/// Arena of all symbols created by one analysis.
#[derive(Debug, Default)]
pub struct SymbolArena {
    symbols: Vec<Symbol>,
}

impl SymbolArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (SymbolId(index as u32), symbol))
    }

    /// Human-readable name for diagnostics.
    pub fn descriptive_name(&self, id: SymbolId) -> String {
        let symbol = self.get(id);
        match &symbol.kind {
            SymbolKind::Undeclared => format!("external variable '{}'", symbol.name),
            SymbolKind::Variable { kind, .. } => {
                format!("{} '{}'", kind.describe(), symbol.name)
            }
            SymbolKind::BoundedLocal { .. } => {
                format!("bounded local variable '{}'", symbol.name)
            }
            SymbolKind::Type => format!("type '{}'", symbol.name),
            SymbolKind::Function { .. } => format!("function '{}'", symbol.name),
            SymbolKind::Class => format!("class '{}'", symbol.name),
            SymbolKind::Task => format!("task '{}'", symbol.name),
            SymbolKind::Field { .. } => format!("field '{}'", symbol.name),
            SymbolKind::Method { .. } => match symbol.name.as_str() {
                CLASS_INITIALIZER_NAME => "class initializer".to_string(),
                INITIALIZER_NAME => "initializer".to_string(),
                DEINITIALIZER_NAME => "deinitializer".to_string(),
                name => format!("method '{}'", name),
            },
            SymbolKind::Property { .. } => format!("property '{}'", symbol.name),
            SymbolKind::Closure => format!("closure '{}'", symbol.name),
        }
    }

    /// Link-time identity.
    pub fn mangled_name(&self, id: SymbolId) -> String {
        let symbol = self.get(id);
        match &symbol.kind {
            SymbolKind::Function { argc, vararg } => {
                let mut name = format!("{}{}{}", symbol.name, ARGUMENT_SEPARATOR, argc);
                if *vararg {
                    name.push(VARIADIC_SUFFIX);
                }
                name
            }
            SymbolKind::Method {
                owner,
                argc,
                vararg,
            } => {
                let mut name = format!(
                    "{}{}{}{}{}",
                    self.get(*owner).name,
                    MEMBER_SEPARATOR,
                    symbol.name,
                    ARGUMENT_SEPARATOR,
                    argc
                );
                if *vararg {
                    name.push(VARIADIC_SUFFIX);
                }
                name
            }
            SymbolKind::Field { owner } | SymbolKind::Property { owner, .. } => {
                format!("{}{}{}", self.get(*owner).name, MEMBER_SEPARATOR, symbol.name)
            }
            SymbolKind::BoundedLocal { original } => {
                format!("{}{}", BOUNDED_PREFIX, self.mangled_name(*original))
            }
            _ => symbol.name.clone(),
        }
    }
}
