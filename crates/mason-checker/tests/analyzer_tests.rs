//! Semantic analyzer integration tests.

use mason_checker::{analyze, Analysis, SymbolKind, VariableKind};
use mason_parser::ast::*;
use mason_parser::diag::{ErrorReporter, Severity};
use mason_parser::encoding;
use mason_parser::parser::Parser;
use mason_parser::source::SourceText;

fn check(source: &str) -> (Script, Analysis, ErrorReporter) {
    let reporter = ErrorReporter::new();
    let script = {
        let text = SourceText::new("test.mason", source.as_bytes().to_vec(), encoding::utf8(), 4);
        Parser::new(text, &reporter).parse()
    };
    let analysis = analyze(&script, &reporter);
    (script, analysis, reporter)
}

fn first_variable(script: &Script) -> &VariableDecl {
    script
        .members
        .iter()
        .find_map(|member| match member {
            Node::Decl(Declaration::Variable(var)) => Some(var.as_ref()),
            _ => None,
        })
        .expect("variable declaration")
}

#[test]
fn declares_and_binds_globals() {
    let (script, analysis, reporter) = check("var x = 1\n");
    assert!(!reporter.has_error());

    let var = first_variable(&script);
    let symbol = analysis.symbol_of(var.id).expect("bound symbol");
    match &analysis.symbols.get(symbol).kind {
        SymbolKind::Variable { kind, readonly } => {
            assert_eq!(*kind, VariableKind::Global);
            assert!(!readonly);
        }
        other => panic!("unexpected symbol kind {:?}", other),
    }
}

#[test]
fn redefinition_reports_once_and_keeps_both_nodes() {
    let (script, _, reporter) = check("var x = 1\nvar x = 2\n");

    assert_eq!(reporter.error_count(), 1);
    let entries = reporter.entries();
    assert!(entries[0].message.contains("redefinition"));
    // the error points at the second `x`
    assert_eq!(entries[0].pos.line, 2);
    assert_eq!(entries[0].pos.column, 5);

    // both declarations survive in the AST
    let vars = script
        .members
        .iter()
        .filter(|m| matches!(m, Node::Decl(Declaration::Variable(_))))
        .count();
    assert_eq!(vars, 2);
}

#[test]
fn shadowing_across_scopes_is_silent() {
    let (_, _, reporter) = check("var x = 1\ndef f() {\nvar x = 2\nreturn x\n}\n");
    assert!(!reporter.has_error(), "{:?}", reporter.entries());
}

#[test]
fn undeclared_name_is_an_error() {
    let (_, _, reporter) = check("var x = missing\n");
    assert_eq!(reporter.error_count(), 1);
    assert!(reporter.entries()[0].message.contains("missing"));
}

#[test]
fn defined_probe_never_errors() {
    let (_, _, reporter) = check("var x = defined missing\n");
    assert!(!reporter.has_error());
}

#[test]
fn functions_overload_by_arity() {
    let source = "def f(a) { pass }\ndef f(a, b) { pass }\n";
    let (_, _, reporter) = check(source);
    assert!(!reporter.has_error());

    let (_, _, reporter) = check("def f(a) { pass }\ndef f(b) { pass }\n");
    assert_eq!(reporter.error_count(), 1);
}

#[test]
fn forward_references_resolve_at_same_level() {
    let (_, _, reporter) = check("def main() { helper() }\ndef helper() { pass }\n");
    assert!(!reporter.has_error(), "{:?}", reporter.entries());
}

#[test]
fn break_and_continue_need_a_loop() {
    let (_, _, reporter) = check("break\ncontinue\n");
    assert_eq!(reporter.error_count(), 2);

    let (_, _, reporter) = check("while true {\nbreak\ncontinue\n}\n");
    assert!(!reporter.has_error());
}

#[test]
fn loop_state_does_not_leak_into_closures() {
    // break inside a closure inside a loop is outside any loop
    let (_, _, reporter) = check("while true {\nvar f = () => 1\nbreak\n}\n");
    assert!(!reporter.has_error());

    let (_, _, reporter) = check("while true {\nvar f = () {\nbreak\n}\n}\n");
    assert_eq!(reporter.error_count(), 1);
}

#[test]
fn return_needs_a_function() {
    let (_, _, reporter) = check("return 1\n");
    assert_eq!(reporter.error_count(), 1);

    let (_, _, reporter) = check("def f() { return 1 }\n");
    assert!(!reporter.has_error());
}

#[test]
fn bare_raise_needs_except_body() {
    let (_, _, reporter) = check("raise\n");
    assert_eq!(reporter.error_count(), 1);

    let (_, _, reporter) = check("try { pass } except { raise }\n");
    assert!(!reporter.has_error(), "{:?}", reporter.entries());
}

#[test]
fn assignment_to_const_is_an_error() {
    let (_, _, reporter) = check("const c = 1\nc = 2\n");
    assert_eq!(reporter.error_count(), 1);
    assert!(reporter.entries()[0].message.contains("cannot assign"));
}

#[test]
fn closure_captures_become_bounded_locals() {
    let source = "def counter() {\nvar n = 0\nvar inc = () => n + 1\nreturn inc\n}\n";
    let (script, analysis, reporter) = check(source);
    assert!(!reporter.has_error());

    // find the closure node
    fn find_closure(members: &[Node]) -> Option<&ClosureExpr> {
        for member in members {
            if let Node::Decl(Declaration::Function(func)) = member {
                if let Body::Block(block) = &func.body {
                    for inner in &block.members {
                        if let Node::Decl(Declaration::Variable(var)) = inner {
                            if let Expression::Closure(closure) = &var.value {
                                return Some(closure);
                            }
                        }
                    }
                }
            }
        }
        None
    }

    let closure = find_closure(&script.members).expect("closure");
    let captures = analysis.captures_of(closure.id);
    assert_eq!(captures.len(), 1);

    let bounded = analysis.symbols.get(captures[0].bounded);
    assert!(matches!(bounded.kind, SymbolKind::BoundedLocal { .. }));
    assert_eq!(bounded.name, "n");
    assert_eq!(analysis.symbols.mangled_name(captures[0].bounded), "bounded$n");

    // the reference inside the closure is bound to the bounded local
    let info_count = reporter
        .entries()
        .iter()
        .filter(|e| e.severity == Severity::Info)
        .count();
    assert_eq!(info_count, 1);
}

#[test]
fn repeated_capture_reuses_bounded_local() {
    let source = "def f() {\nvar n = 0\nvar g = () => n + n\nreturn g\n}\n";
    let (_, analysis, reporter) = check(source);
    assert!(!reporter.has_error());

    let captures: Vec<_> = analysis.captures.values().flatten().collect();
    assert_eq!(captures.len(), 1);
}

#[test]
fn nested_closures_chain_captures() {
    let source = "def f() {\nvar n = 0\nvar outer = () => (() => n)()\nreturn outer\n}\n";
    let (_, analysis, reporter) = check(source);
    assert!(!reporter.has_error());

    // one capture per crossed closure boundary
    let all: Vec<_> = analysis.captures.values().flatten().collect();
    assert_eq!(all.len(), 2);

    // the inner capture's original is the outer bounded local
    let chained = all.iter().any(|capture| {
        matches!(
            analysis.symbols.get(capture.original).kind,
            SymbolKind::BoundedLocal { .. }
        )
    });
    assert!(chained);
}

#[test]
fn closures_get_numbered_names() {
    let source = "var a = () => 1\nvar b = () => 2\n";
    let (script, analysis, reporter) = check(source);
    assert!(!reporter.has_error());

    let mut names = Vec::new();
    for member in &script.members {
        if let Node::Decl(Declaration::Variable(var)) = member {
            if let Expression::Closure(closure) = &var.value {
                let symbol = analysis.symbol_of(closure.id).unwrap();
                names.push(analysis.symbols.get(symbol).name.clone());
            }
        }
    }
    assert_eq!(names, vec!["<closure#0>", "<closure#1>"]);
}

#[test]
fn class_members_and_mangling() {
    let source = "class Point {\n\
                  init(x, y) { pass }\n\
                  var x = 0\n\
                  def move(dx, dy) { pass }\n\
                  get size { return 0 }\n\
                  }\n";
    let (script, analysis, reporter) = check(source);
    assert!(!reporter.has_error(), "{:?}", reporter.entries());

    let class = match &script.members[0] {
        Node::Decl(Declaration::Class(class)) => class,
        other => panic!("unexpected member {:?}", other),
    };

    for member in &class.members {
        match member {
            ClassMember::Init(init) => {
                let id = analysis.symbol_of(init.id).unwrap();
                assert_eq!(analysis.symbols.mangled_name(id), "Point::init$2");
            }
            ClassMember::Field(field) => {
                let id = analysis.symbol_of(field.id).unwrap();
                assert_eq!(analysis.symbols.mangled_name(id), "Point::x");
            }
            ClassMember::Method(method) => {
                let id = analysis.symbol_of(method.id).unwrap();
                assert_eq!(analysis.symbols.mangled_name(id), "Point::move$2");
            }
            ClassMember::Property(property) => {
                let id = analysis.symbol_of(property.id).unwrap();
                assert_eq!(analysis.symbols.mangled_name(id), "Point::size");
            }
            other => panic!("unexpected member {:?}", other),
        }
    }
}

#[test]
fn class_with_static_field_gets_class_init() {
    let source = "class Config {\nstatic var level = 3\n}\n";
    let (script, analysis, reporter) = check(source);
    assert!(!reporter.has_error());

    let class_id = match &script.members[0] {
        Node::Decl(Declaration::Class(class)) => class.id,
        other => panic!("unexpected member {:?}", other),
    };

    let init = analysis.class_inits.get(&class_id).copied().expect("class init");
    assert_eq!(analysis.symbols.get(init).name, "<class-init>");
    assert_eq!(
        analysis.symbols.descriptive_name(init),
        "class initializer"
    );
}

#[test]
fn classes_join_the_type_scope() {
    let source = "class Widget { }\nvar w = x is Widget if defined x else false\n";
    // `x` is undeclared; only that one error should surface.
    let (_, analysis, reporter) = check(source);
    assert!(analysis.types.contains_key("Widget"));
    assert!(analysis.types.contains_key("int"));
    assert_eq!(reporter.error_count(), 1);
}

#[test]
fn task_members_resolve() {
    let source = "task clean { do { pass } }\n\
                  task build dependsOn clean {\n\
                  inputs \"src\"\n\
                  var tmp = 1\n\
                  do { pass }\n\
                  }\n";
    let (script, analysis, reporter) = check(source);
    assert!(!reporter.has_error(), "{:?}", reporter.entries());

    let task = match &script.members[1] {
        Node::Decl(Declaration::Task(task)) => task,
        other => panic!("unexpected member {:?}", other),
    };

    for member in &task.members {
        if let TaskMember::Action(action) = member {
            let id = analysis.symbol_of(action.id).unwrap();
            assert_eq!(analysis.symbols.mangled_name(id), "build::do$0");
        }
    }
}

#[test]
fn unknown_dependency_is_an_error() {
    let (_, _, reporter) = check("task build dependsOn ghost { do { pass } }\n");
    assert_eq!(reporter.error_count(), 1);
}

#[test]
fn except_binding_is_an_exception_variable() {
    let source = "try { pass } except IOError as e {\nvar m = e\n}\n";
    let (script, analysis, reporter) = check(source);
    // IOError is not a known type: one warning, no errors.
    assert!(!reporter.has_error());
    assert!(reporter.has_warning());

    let clause = match &script.members[0] {
        Node::Stmt(Statement::Try(stmt)) => &stmt.excepts[0],
        other => panic!("unexpected member {:?}", other),
    };
    let symbol = analysis.symbol_of(clause.id).unwrap();
    assert!(matches!(
        analysis.symbols.get(symbol).kind,
        SymbolKind::Variable {
            kind: VariableKind::Exception,
            ..
        }
    ));
}
