//! Semantic analysis.
//!
//! A second walk over the AST that builds the scope tree, declares and
//! resolves symbols, converts out-of-scope locals referenced from
//! closures into bounded locals, and raises flow diagnostics. Analysis
//! always runs to completion; errors accumulate in the reporter.
//!
//! Scope lifetime is stack-disciplined: [`SemanticAnalyzer::in_scope`]
//! restores the parent frame on every exit path.

use rustc_hash::FxHashMap;

use mason_parser::ast::*;
use mason_parser::diag::{ErrorReporter, ReportId};
use mason_parser::source::SourcePosition;

use crate::scope::{LookupResult, ScopeId, ScopeKind, ScopeTree};
use crate::symbols::{
    Symbol, SymbolArena, SymbolId, SymbolKind, VariableKind, CLASS_INITIALIZER_NAME,
    DEINITIALIZER_NAME, INITIALIZER_NAME, SELF_NAME, SUPER_NAME,
};

/// One captured variable of a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// The bounded local created inside the closure.
    pub bounded: SymbolId,
    /// The symbol captured from the enclosing scope; may itself be a
    /// bounded local of an outer closure.
    pub original: SymbolId,
}

/// Output of semantic analysis: the symbol arena, the scope tree and the
/// side tables annotating AST nodes with symbols.
#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolArena,
    pub scopes: ScopeTree,
    /// Node → resolved or declared symbol.
    pub bindings: FxHashMap<NodeId, SymbolId>,
    /// Closure node → captured variables, in capture order.
    pub captures: FxHashMap<NodeId, Vec<Capture>>,
    /// Class node → synthesized static class initializer.
    pub class_inits: FxHashMap<NodeId, SymbolId>,
    /// Method-like node → implicit `self` symbol.
    pub selfs: FxHashMap<NodeId, SymbolId>,
    /// Method-like node → implicit `super` symbol.
    pub supers: FxHashMap<NodeId, SymbolId>,
    /// Type scope: builtin names plus user classes.
    pub types: FxHashMap<String, SymbolId>,
}

impl Analysis {
    pub fn symbol_of(&self, node: NodeId) -> Option<SymbolId> {
        self.bindings.get(&node).copied()
    }

    pub fn captures_of(&self, node: NodeId) -> &[Capture] {
        self.captures.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Names in the builtin type scope.
const BUILTIN_TYPES: &[&str] = &["int", "float", "string", "bool", "none", "list", "map"];

pub struct SemanticAnalyzer<'a> {
    reporter: &'a ErrorReporter,

    symbols: SymbolArena,
    scopes: ScopeTree,
    bindings: FxHashMap<NodeId, SymbolId>,
    captures: FxHashMap<NodeId, Vec<Capture>>,
    class_inits: FxHashMap<NodeId, SymbolId>,
    selfs: FxHashMap<NodeId, SymbolId>,
    supers: FxHashMap<NodeId, SymbolId>,
    types: FxHashMap<String, SymbolId>,

    current: ScopeId,
    loop_depth: u32,
    function_depth: u32,
    except_depth: u32,

    /// Numbers `<closure#N>` names; per compile, not process-wide.
    closure_counter: u32,
    /// Closure scope → closure expression node.
    closure_nodes: FxHashMap<ScopeId, NodeId>,
    /// (closure scope, captured symbol) → bounded local, for dedup.
    capture_cache: FxHashMap<(ScopeId, SymbolId), SymbolId>,
    /// Unresolved names, deduplicated per spelling.
    undeclared: FxHashMap<String, SymbolId>,
}

/// Run semantic analysis over a parsed script.
pub fn analyze(script: &Script, reporter: &ErrorReporter) -> Analysis {
    let mut analyzer = SemanticAnalyzer::new(reporter);
    analyzer.walk_members(&script.members);
    analyzer.finish()
}

impl<'a> SemanticAnalyzer<'a> {
    pub fn new(reporter: &'a ErrorReporter) -> Self {
        let mut symbols = SymbolArena::new();
        let mut types = FxHashMap::default();
        for name in BUILTIN_TYPES {
            let id = symbols.alloc(Symbol::new(
                *name,
                SourcePosition::invalid(),
                SymbolKind::Type,
            ));
            types.insert((*name).to_string(), id);
        }

        Self {
            reporter,
            symbols,
            scopes: ScopeTree::new(),
            bindings: FxHashMap::default(),
            captures: FxHashMap::default(),
            class_inits: FxHashMap::default(),
            selfs: FxHashMap::default(),
            supers: FxHashMap::default(),
            types,
            current: ScopeTree::GLOBAL,
            loop_depth: 0,
            function_depth: 0,
            except_depth: 0,
            closure_counter: 0,
            closure_nodes: FxHashMap::default(),
            capture_cache: FxHashMap::default(),
            undeclared: FxHashMap::default(),
        }
    }

    pub fn finish(self) -> Analysis {
        Analysis {
            symbols: self.symbols,
            scopes: self.scopes,
            bindings: self.bindings,
            captures: self.captures,
            class_inits: self.class_inits,
            selfs: self.selfs,
            supers: self.supers,
            types: self.types,
        }
    }

    // ------------------------------------------------------------------
    // Scope discipline
    // ------------------------------------------------------------------

    fn in_scope<T>(&mut self, kind: ScopeKind, f: impl FnOnce(&mut Self) -> T) -> T {
        let parent = self.current;
        self.current = self.scopes.push(parent, kind);
        let result = f(self);
        self.current = parent;
        result
    }

    /// Enter a callable body: loop/except state does not leak inside.
    fn in_callable<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let (loops, excepts) = (self.loop_depth, self.except_depth);
        self.loop_depth = 0;
        self.except_depth = 0;
        self.function_depth += 1;

        let result = f(self);

        self.function_depth -= 1;
        self.loop_depth = loops;
        self.except_depth = excepts;
        result
    }

    fn at_global_scope(&self) -> bool {
        self.current == ScopeTree::GLOBAL
    }

    // ------------------------------------------------------------------
    // Declaration
    // ------------------------------------------------------------------

    /// Allocate a symbol, check this scope for redefinitions, and insert.
    fn declare(&mut self, name: &Identifier, kind: SymbolKind, node: NodeId) -> SymbolId {
        let overload = match &kind {
            SymbolKind::Function { argc, vararg }
            | SymbolKind::Method { argc, vararg, .. } => Some((*argc, *vararg)),
            _ => None,
        };
        let accessor = match &kind {
            SymbolKind::Property { getter, .. } => Some(*getter),
            _ => None,
        };
        let symbol = self
            .symbols
            .alloc(Symbol::new(name.name.clone(), name.range.begin, kind));

        if name.is_valid() {
            let (_, previous) = match overload {
                Some((argc, vararg)) => self.scopes.lookup_local_overload(
                    self.current,
                    &name.name,
                    argc,
                    vararg,
                    &self.symbols,
                ),
                None => self.scopes.lookup_local(self.current, &name.name),
            };

            // A getter and a setter of the same name form one property.
            let previous = previous.filter(|&previous| {
                let paired = match (&self.symbols.get(previous).kind, accessor) {
                    (SymbolKind::Property { getter, .. }, Some(new_getter)) => {
                        *getter != new_getter
                    }
                    _ => false,
                };
                !paired
            });

            if let Some(previous) = previous {
                self.reporter.report_args(
                    name.range.begin,
                    ReportId::SemaRedefinition,
                    &[
                        &self.symbols.descriptive_name(symbol),
                        &self.symbols.descriptive_name(previous),
                    ],
                );
            }

            self.scopes.add_symbol(self.current, name.name.clone(), symbol);
        }

        if node != NodeId::INVALID {
            self.bindings.insert(node, symbol);
        }
        symbol
    }

    fn declare_parameters(&mut self, params: &ParameterList) {
        for param in &params.params {
            self.declare(
                &param.name,
                SymbolKind::Variable {
                    kind: VariableKind::Parameter,
                    readonly: false,
                },
                param.id,
            );
        }
    }

    /// Declare the implicit `self`/`super` of a method-like body.
    fn declare_implicits(&mut self, node: NodeId, pos: SourcePosition) {
        let self_sym = self.symbols.alloc(Symbol::new(
            SELF_NAME,
            pos,
            SymbolKind::Variable {
                kind: VariableKind::Implicit,
                readonly: false,
            },
        ));
        let super_sym = self.symbols.alloc(Symbol::new(
            SUPER_NAME,
            pos,
            SymbolKind::Variable {
                kind: VariableKind::Implicit,
                readonly: false,
            },
        ));
        self.scopes.add_symbol(self.current, SELF_NAME, self_sym);
        self.scopes.add_symbol(self.current, SUPER_NAME, super_sym);
        self.selfs.insert(node, self_sym);
        self.supers.insert(node, super_sym);
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    /// Walk a member list: hoist callable declarations first, then visit
    /// everything in order.
    fn walk_members(&mut self, members: &[Node]) {
        for member in members {
            if let Node::Decl(decl) = member {
                self.hoist_decl(decl);
            }
        }
        for member in members {
            self.walk_node(member);
        }
    }

    fn hoist_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Function(func) => {
                self.declare(
                    &func.name,
                    SymbolKind::Function {
                        argc: func.params.arity(),
                        vararg: func.params.is_vararg(),
                    },
                    func.id,
                );
            }
            Declaration::Class(class) => {
                let symbol = self.declare(&class.name, SymbolKind::Class, class.id);
                if class.name.is_valid() {
                    self.types.insert(class.name.name.clone(), symbol);
                }
            }
            Declaration::Task(task) => {
                self.declare(&task.name, SymbolKind::Task, task.id);
            }
            _ => {}
        }
    }

    fn walk_node(&mut self, node: &Node) {
        match node {
            Node::Decl(decl) => self.walk_decl(decl),
            Node::Stmt(stmt) => self.walk_stmt(stmt),
        }
    }

    fn walk_decl(&mut self, decl: &Declaration) {
        match decl {
            Declaration::Import(import) => {
                self.walk_expr(&import.path);
                if let Some(alias) = &import.alias {
                    let kind = if self.at_global_scope() {
                        VariableKind::Global
                    } else {
                        VariableKind::Local
                    };
                    self.declare(
                        alias,
                        SymbolKind::Variable {
                            kind,
                            readonly: false,
                        },
                        import.id,
                    );
                }
            }
            Declaration::Export(export) => {
                if let Some(value) = &export.value {
                    self.walk_expr(value);
                }
                self.declare(
                    &export.name,
                    SymbolKind::Variable {
                        kind: VariableKind::Exported,
                        readonly: false,
                    },
                    export.id,
                );
            }
            Declaration::Function(func) => {
                self.in_scope(ScopeKind::Function, |a| {
                    a.in_callable(|a| {
                        a.declare_parameters(&func.params);
                        a.walk_body(&func.body);
                    });
                });
            }
            Declaration::Class(class) => self.walk_class(class),
            Declaration::Task(task) => self.walk_task(task),
            Declaration::Variable(var) => self.walk_variable(var),
            Declaration::Error(_) => {}
        }
    }

    fn walk_variable(&mut self, var: &VariableDecl) {
        // The initializer sees the enclosing binding, not the new one.
        self.walk_expr(&var.value);

        let kind = if self.at_global_scope() {
            VariableKind::Global
        } else {
            VariableKind::Local
        };
        self.declare(
            &var.name,
            SymbolKind::Variable {
                kind,
                readonly: var.readonly,
            },
            var.id,
        );
    }

    fn walk_class(&mut self, class: &ClassDecl) {
        let owner = match self.bindings.get(&class.id).copied() {
            Some(symbol) => symbol,
            None => self.declare(&class.name, SymbolKind::Class, class.id),
        };

        if let Some(extends) = &class.extends {
            self.resolve_type_name(extends);
        }

        self.in_scope(ScopeKind::Class, |a| {
            let mut has_static_init = false;

            // Declare all members before walking bodies so methods see
            // each other regardless of order.
            for member in &class.members {
                match member {
                    ClassMember::Init(init) => {
                        a.declare(
                            &Identifier::new(init.range, INITIALIZER_NAME),
                            SymbolKind::Method {
                                owner,
                                argc: init.params.arity(),
                                vararg: init.params.is_vararg(),
                            },
                            init.id,
                        );
                    }
                    ClassMember::Deinit(deinit) => {
                        a.declare(
                            &Identifier::new(deinit.range, DEINITIALIZER_NAME),
                            SymbolKind::Method {
                                owner,
                                argc: 0,
                                vararg: false,
                            },
                            deinit.id,
                        );
                    }
                    ClassMember::Field(field) => {
                        a.declare(&field.name, SymbolKind::Field { owner }, field.id);
                        if field.modifiers.is_static && field.value.is_some() {
                            has_static_init = true;
                        }
                    }
                    ClassMember::Method(method) => {
                        a.declare(
                            &method.name,
                            SymbolKind::Method {
                                owner,
                                argc: method.params.arity(),
                                vararg: method.params.is_vararg(),
                            },
                            method.id,
                        );
                    }
                    ClassMember::Property(property) => {
                        a.declare(
                            &property.name,
                            SymbolKind::Property {
                                owner,
                                getter: property.is_getter,
                            },
                            property.id,
                        );
                    }
                    ClassMember::Error(_) => {}
                }
            }

            if has_static_init {
                let symbol = a.symbols.alloc(Symbol::new(
                    CLASS_INITIALIZER_NAME,
                    class.range.begin,
                    SymbolKind::Method {
                        owner,
                        argc: 0,
                        vararg: false,
                    },
                ));
                a.class_inits.insert(class.id, symbol);
            }

            for member in &class.members {
                match member {
                    ClassMember::Init(init) => {
                        a.in_scope(ScopeKind::Method, |a| {
                            a.declare_implicits(init.id, init.range.begin);
                            a.in_callable(|a| {
                                a.declare_parameters(&init.params);
                                a.walk_body(&init.body);
                            });
                        });
                    }
                    ClassMember::Deinit(deinit) => {
                        a.in_scope(ScopeKind::Method, |a| {
                            a.declare_implicits(deinit.id, deinit.range.begin);
                            a.in_callable(|a| a.walk_body(&deinit.body));
                        });
                    }
                    ClassMember::Field(field) => {
                        if let Some(value) = &field.value {
                            if field.modifiers.is_static {
                                a.walk_expr(value);
                            } else {
                                a.in_scope(ScopeKind::Method, |a| {
                                    a.declare_implicits(field.id, field.range.begin);
                                    a.walk_expr(value);
                                });
                            }
                        }
                    }
                    ClassMember::Method(method) => {
                        a.in_scope(ScopeKind::Method, |a| {
                            a.declare_implicits(method.id, method.range.begin);
                            a.in_callable(|a| {
                                a.declare_parameters(&method.params);
                                a.walk_body(&method.body);
                            });
                        });
                    }
                    ClassMember::Property(property) => {
                        a.in_scope(ScopeKind::Method, |a| {
                            a.declare_implicits(property.id, property.range.begin);
                            a.in_callable(|a| {
                                a.declare_parameters(&property.params);
                                a.walk_body(&property.body);
                            });
                        });
                    }
                    ClassMember::Error(_) => {}
                }
            }
        });
    }

    fn walk_task(&mut self, task: &TaskDecl) {
        let owner = match self.bindings.get(&task.id).copied() {
            Some(symbol) => symbol,
            None => self.declare(&task.name, SymbolKind::Task, task.id),
        };

        if let Some(extends) = &task.extends {
            self.resolve_plain_name(extends);
        }
        for depend in &task.depends {
            self.resolve_plain_name(depend);
        }

        self.in_scope(ScopeKind::Class, |a| {
            for member in &task.members {
                match member {
                    TaskMember::Action(action) => {
                        a.declare(
                            &Identifier::new(action.range, action.action.name()),
                            SymbolKind::Method {
                                owner,
                                argc: 0,
                                vararg: false,
                            },
                            action.id,
                        );
                    }
                    TaskMember::Variable(var) => {
                        a.declare(&var.name, SymbolKind::Field { owner }, var.id);
                    }
                    _ => {}
                }
            }

            for member in &task.members {
                match member {
                    TaskMember::Inputs(_, exprs) | TaskMember::Outputs(_, exprs) => {
                        for expr in exprs {
                            a.walk_expr(expr);
                        }
                    }
                    TaskMember::Action(action) => {
                        a.in_scope(ScopeKind::Method, |a| {
                            a.declare_implicits(action.id, action.range.begin);
                            a.in_callable(|a| a.walk_body(&action.body));
                        });
                    }
                    TaskMember::Variable(var) => {
                        a.walk_expr(&var.value);
                    }
                    TaskMember::Error(_) => {}
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn walk_body(&mut self, body: &Body) {
        match body {
            Body::Block(block) => self.walk_members(&block.members),
            Body::Arrow(_, expr) => self.walk_expr(expr),
        }
    }

    fn walk_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(block) => {
                self.in_scope(ScopeKind::Block, |a| a.walk_members(&block.members));
            }
            Statement::If(stmt) => self.walk_if(stmt),
            Statement::Match(stmt) => {
                self.walk_expr(&stmt.condition);
                for case in &stmt.cases {
                    for label in &case.labels {
                        if let Some(value) = &label.value {
                            self.walk_expr(value);
                        }
                    }
                    self.in_scope(ScopeKind::Block, |a| a.walk_members(&case.members));
                }
            }
            Statement::For(stmt) => {
                self.walk_expr(&stmt.sequence);
                self.in_scope(ScopeKind::Loop, |a| {
                    a.declare(
                        &stmt.binding,
                        SymbolKind::Variable {
                            kind: VariableKind::Local,
                            readonly: false,
                        },
                        stmt.id,
                    );
                    a.loop_depth += 1;
                    a.walk_loop_body(&stmt.body);
                    a.loop_depth -= 1;
                });
            }
            Statement::While(stmt) => {
                self.walk_expr(&stmt.condition);
                self.in_scope(ScopeKind::Loop, |a| {
                    a.loop_depth += 1;
                    a.walk_loop_body(&stmt.body);
                    a.loop_depth -= 1;
                });
            }
            Statement::Try(stmt) => self.walk_try(stmt),
            Statement::With(stmt) => {
                self.walk_expr(&stmt.resource);
                self.in_scope(ScopeKind::Block, |a| {
                    if let Some(binding) = &stmt.binding {
                        a.declare(
                            binding,
                            SymbolKind::Variable {
                                kind: VariableKind::Local,
                                readonly: false,
                            },
                            stmt.id,
                        );
                    }
                    a.walk_body(&stmt.body);
                });
            }
            Statement::Break(stmt) => {
                if self.loop_depth == 0 {
                    self.reporter
                        .report(stmt.range.begin, ReportId::SemaBreakOutsideLoop);
                }
            }
            Statement::Continue(stmt) => {
                if self.loop_depth == 0 {
                    self.reporter
                        .report(stmt.range.begin, ReportId::SemaContinueOutsideLoop);
                }
            }
            Statement::Return(stmt) => {
                if self.function_depth == 0 {
                    self.reporter
                        .report(stmt.range.begin, ReportId::SemaReturnOutsideFunction);
                }
                if let Some(value) = &stmt.value {
                    self.walk_expr(value);
                }
            }
            Statement::Raise(stmt) => {
                if stmt.value.is_none() && self.except_depth == 0 {
                    self.reporter
                        .report(stmt.range.begin, ReportId::SemaRaiseWithoutExpression);
                }
                if let Some(value) = &stmt.value {
                    self.walk_expr(value);
                }
            }
            Statement::Assert(stmt) => {
                self.walk_expr(&stmt.condition);
                if let Some(message) = &stmt.message {
                    self.walk_expr(message);
                }
            }
            Statement::Pass(_) => {}
            Statement::Labeled(stmt) => self.walk_stmt(&stmt.statement),
            Statement::Assign(stmt) => {
                self.walk_expr(&stmt.value);
                self.walk_expr(&stmt.target);
                self.check_assign_target(&stmt.target);
            }
            Statement::Expression(stmt) => self.walk_expr(&stmt.expr),
            Statement::Error(_) => {}
        }
    }

    /// Loop bodies share the loop scope (the `for` binding lives there),
    /// so block bodies are walked without opening another block frame.
    fn walk_loop_body(&mut self, body: &Body) {
        match body {
            Body::Block(block) => self.walk_members(&block.members),
            Body::Arrow(_, expr) => self.walk_expr(expr),
        }
    }

    fn walk_if(&mut self, stmt: &IfStatement) {
        self.walk_expr(&stmt.condition);
        self.in_scope(ScopeKind::Block, |a| a.walk_body(&stmt.then_body));
        match &stmt.else_body {
            Some(ElseBody::ElseIf(next)) => self.walk_if(next),
            Some(ElseBody::Else(body)) => {
                self.in_scope(ScopeKind::Block, |a| a.walk_body(body));
            }
            None => {}
        }
    }

    fn walk_try(&mut self, stmt: &TryStatement) {
        self.in_scope(ScopeKind::Try, |a| a.walk_body(&stmt.body));

        for clause in &stmt.excepts {
            if let Some(type_name) = &clause.type_name {
                self.resolve_type_name(type_name);
            }
            self.in_scope(ScopeKind::Except, |a| {
                if let Some(binding) = &clause.binding {
                    a.declare(
                        binding,
                        SymbolKind::Variable {
                            kind: VariableKind::Exception,
                            readonly: false,
                        },
                        clause.id,
                    );
                }
                a.except_depth += 1;
                a.walk_body(&clause.body);
                a.except_depth -= 1;
            });
        }

        if let Some(finally) = &stmt.finally {
            self.in_scope(ScopeKind::Finally, |a| a.walk_body(finally));
        }
    }

    fn check_assign_target(&mut self, target: &Expression) {
        if let Expression::Name(name) = target {
            if let Some(symbol) = self.bindings.get(&name.id).copied() {
                if self.symbols.get(symbol).is_readonly() {
                    self.reporter.report_args(
                        name.name.range.begin,
                        ReportId::SemaAssignToReadonly,
                        &[&self.symbols.descriptive_name(symbol)],
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn walk_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Ternary(e) => {
                self.walk_expr(&e.condition);
                self.walk_expr(&e.on_true);
                self.walk_expr(&e.on_false);
            }
            Expression::Binary(e) => {
                self.walk_expr(&e.left);
                self.walk_expr(&e.right);
            }
            Expression::Unary(e) => self.walk_expr(&e.operand),
            Expression::Defined(e) => self.resolve_name(e.id, &e.name, false),
            Expression::Call(e) => {
                self.walk_expr(&e.target);
                for arg in &e.args {
                    self.walk_expr(arg);
                }
            }
            Expression::Invoke(e) => {
                self.walk_expr(&e.target);
                for arg in &e.args {
                    self.walk_expr(arg);
                }
            }
            Expression::Member(e) => self.walk_expr(&e.target),
            Expression::Subscript(e) => {
                self.walk_expr(&e.target);
                self.walk_expr(&e.index);
            }
            Expression::Literal(_) => {}
            Expression::InterpolatedString(e) => {
                for part in &e.parts {
                    if let StringPart::Expr(expr) = part {
                        self.walk_expr(expr);
                    }
                }
            }
            Expression::Name(e) => self.resolve_name(e.id, &e.name, true),
            Expression::SelfRef(_) | Expression::SuperRef(_) => {}
            Expression::List(e) => {
                for item in &e.items {
                    self.walk_expr(item);
                }
            }
            Expression::Map(e) => {
                for (key, value) in &e.entries {
                    self.walk_expr(key);
                    self.walk_expr(value);
                }
            }
            Expression::Closure(e) => self.walk_closure(e),
            Expression::Paren(e) => self.walk_expr(&e.inner),
            Expression::Error(_) => {}
        }
    }

    fn walk_closure(&mut self, closure: &ClosureExpr) {
        let name = format!("<closure#{}>", self.closure_counter);
        self.closure_counter += 1;

        let symbol = self.symbols.alloc(Symbol::new(
            name,
            closure.range.begin,
            SymbolKind::Closure,
        ));
        self.bindings.insert(closure.id, symbol);
        self.captures.entry(closure.id).or_default();

        self.in_scope(ScopeKind::Closure, |a| {
            a.closure_nodes.insert(a.current, closure.id);
            a.in_callable(|a| {
                a.declare_parameters(&closure.params);
                a.walk_body(&closure.body);
            });
        });
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    fn resolve_name(&mut self, node: NodeId, name: &Identifier, report: bool) {
        if !name.is_valid() {
            return;
        }

        if let Some((symbol, origin)) = self.scopes.lookup_with_origin(self.current, &name.name) {
            let resolved = self.capture_if_needed(symbol, origin, name.range.begin);
            self.bindings.insert(node, resolved);
            return;
        }

        if let Some(&type_symbol) = self.types.get(&name.name) {
            self.bindings.insert(node, type_symbol);
            return;
        }

        if report {
            self.reporter.report_args(
                name.range.begin,
                ReportId::SemaUndeclaredName,
                &[&name.name],
            );
        }

        let undeclared = match self.undeclared.get(&name.name) {
            Some(&id) => id,
            None => {
                let id = self.symbols.alloc(Symbol::new(
                    name.name.clone(),
                    name.range.begin,
                    SymbolKind::Undeclared,
                ));
                self.undeclared.insert(name.name.clone(), id);
                id
            }
        };
        self.bindings.insert(node, undeclared);
    }

    /// Resolve a name that must already exist (task dependencies).
    fn resolve_plain_name(&mut self, name: &Identifier) {
        if !name.is_valid() {
            return;
        }
        let (result, _) = self.scopes.lookup(self.current, &name.name);
        if result == LookupResult::NotFound {
            self.reporter.report_args(
                name.range.begin,
                ReportId::SemaUndeclaredName,
                &[&name.name],
            );
        }
    }

    /// Resolve a type identifier against the type scope.
    fn resolve_type_name(&mut self, name: &Identifier) {
        if name.is_valid() && !self.types.contains_key(&name.name) {
            self.reporter
                .report_args(name.range.begin, ReportId::SemaUnknownType, &[&name.name]);
        }
    }

    /// Convert an out-of-scope local resolved from inside a closure into
    /// a bounded local, one per crossed closure boundary, outermost
    /// first. Repeated references reuse the same bounded local.
    fn capture_if_needed(
        &mut self,
        symbol: SymbolId,
        origin: ScopeId,
        pos: SourcePosition,
    ) -> SymbolId {
        if !self.is_capturable(symbol) {
            return symbol;
        }

        // Closure scopes crossed between the use and the definition.
        let mut boundaries = Vec::new();
        let mut walker = self.current;
        while walker != origin {
            if self.scopes.get(walker).kind == ScopeKind::Closure {
                boundaries.push(walker);
            }
            match self.scopes.get(walker).parent {
                Some(parent) => walker = parent,
                None => break,
            }
        }

        if boundaries.is_empty() {
            return symbol;
        }

        let mut captured = symbol;
        for &closure_scope in boundaries.iter().rev() {
            let key = (closure_scope, captured);
            if let Some(&bounded) = self.capture_cache.get(&key) {
                captured = bounded;
                continue;
            }

            let name = self.symbols.get(captured).name.clone();
            let bounded = self.symbols.alloc(Symbol::new(
                name.clone(),
                pos,
                SymbolKind::BoundedLocal { original: captured },
            ));
            self.capture_cache.insert(key, bounded);
            self.scopes.add_symbol(closure_scope, name.clone(), bounded);

            let closure_node = self.closure_nodes[&closure_scope];
            self.captures.entry(closure_node).or_default().push(Capture {
                bounded,
                original: captured,
            });
            self.reporter
                .report_args(pos, ReportId::SemaShadowedByCapture, &[&name]);

            captured = bounded;
        }

        captured
    }

    fn is_capturable(&self, symbol: SymbolId) -> bool {
        matches!(
            self.symbols.get(symbol).kind,
            SymbolKind::Variable {
                kind: VariableKind::Local
                    | VariableKind::Parameter
                    | VariableKind::Exception
                    | VariableKind::Implicit,
                ..
            } | SymbolKind::BoundedLocal { .. }
        )
    }
}
