//! Parser integration tests.

use mason_parser::ast::*;
use mason_parser::diag::ErrorReporter;
use mason_parser::encoding;
use mason_parser::parser::Parser;
use mason_parser::source::SourceText;

fn parse(source: &str) -> (Script, ErrorReporter) {
    let reporter = ErrorReporter::new();
    let script = {
        let text = SourceText::new("test.mason", source.as_bytes().to_vec(), encoding::utf8(), 4);
        Parser::new(text, &reporter).parse()
    };
    (script, reporter)
}

fn expect_function(script: &Script, index: usize) -> &FunctionDecl {
    match &script.members[index] {
        Node::Decl(Declaration::Function(f)) => f,
        other => panic!("expected function declaration, got {:?}", other),
    }
}

#[test]
fn parses_variable_declaration() {
    let (script, reporter) = parse("var x = 1 + 2\n");
    assert!(!reporter.has_error());
    assert_eq!(script.members.len(), 1);

    match &script.members[0] {
        Node::Decl(Declaration::Variable(var)) => {
            assert_eq!(var.name.name, "x");
            assert!(!var.readonly);
            assert!(matches!(var.value, Expression::Binary(_)));
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_function_with_params() {
    let (script, reporter) = parse("def add(a, b) { return a + b }\n");
    assert!(!reporter.has_error());

    let func = expect_function(&script, 0);
    assert_eq!(func.name.name, "add");
    assert_eq!(func.params.arity(), 2);
    assert_eq!(func.params.commas.len(), 1);
    assert!(!func.params.is_vararg());
}

#[test]
fn parses_variadic_parameter() {
    let (script, reporter) = parse("def log(fmt, args...) { pass }\n");
    assert!(!reporter.has_error());

    let func = expect_function(&script, 0);
    assert_eq!(func.params.arity(), 2);
    assert!(func.params.is_vararg());
}

#[test]
fn heals_missing_comma_in_parameters() {
    // One diagnostic with an inserted comma; the declaration still has
    // both parameters, and nothing else goes wrong.
    let (script, reporter) = parse("def f(a b) { return a + b }\n");

    assert_eq!(reporter.error_count(), 1);
    let entries = reporter.entries();
    assert_eq!(entries[0].message, "expected ','");
    assert_eq!(entries[0].fixits.len(), 1);
    assert_eq!(entries[0].fixits[0].text, ",");
    // position of `b`
    assert_eq!(entries[0].pos.column, 9);

    let func = expect_function(&script, 0);
    assert_eq!(func.params.arity(), 2);
    assert_eq!(func.params.commas.len(), 1);
}

#[test]
fn parses_arrow_body() {
    let (script, reporter) = parse("def double(x) => x * 2\n");
    assert!(!reporter.has_error());

    let func = expect_function(&script, 0);
    assert!(matches!(func.body, Body::Arrow(..)));
}

#[test]
fn parses_if_else_chain() {
    let source = "if a { pass } else if b { pass } else { pass }\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Stmt(Statement::If(stmt)) => {
            assert!(matches!(stmt.else_body, Some(ElseBody::ElseIf(_))));
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_match_with_cases() {
    let source = "match x {\ncase 1:\npass\ncase 2: case 3:\npass\ndefault:\npass\n}\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Stmt(Statement::Match(stmt)) => {
            assert_eq!(stmt.cases.len(), 3);
            assert_eq!(stmt.cases[1].labels.len(), 2);
            assert!(stmt.cases[2].is_default());
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_try_except_finally() {
    let source = "try { work() } except IOError as e { pass } except { pass } finally { pass }\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Stmt(Statement::Try(stmt)) => {
            assert_eq!(stmt.excepts.len(), 2);
            assert_eq!(stmt.excepts[0].type_name.as_ref().unwrap().name, "IOError");
            assert_eq!(stmt.excepts[0].binding.as_ref().unwrap().name, "e");
            assert!(stmt.excepts[1].type_name.is_none());
            assert!(stmt.finally.is_some());
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_class_with_members() {
    let source = "class Point extends Base {\n\
                  init(x, y) { pass }\n\
                  deinit { pass }\n\
                  var x = 0\n\
                  static const origin = 0\n\
                  def move(dx, dy) { pass }\n\
                  get size { return 2 }\n\
                  set size(value) { pass }\n\
                  }\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error(), "{:?}", reporter.entries());

    match &script.members[0] {
        Node::Decl(Declaration::Class(class)) => {
            assert_eq!(class.name.name, "Point");
            assert_eq!(class.extends.as_ref().unwrap().name, "Base");
            assert_eq!(class.members.len(), 7);
            assert!(matches!(class.members[0], ClassMember::Init(_)));
            assert!(matches!(class.members[1], ClassMember::Deinit(_)));
            match &class.members[3] {
                ClassMember::Field(field) => {
                    assert!(field.modifiers.is_static);
                    assert!(field.modifiers.is_const);
                }
                other => panic!("expected static field, got {:?}", other),
            }
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_task_declaration() {
    let source = "task build extends base dependsOn clean, prepare {\n\
                  inputs \"src\"\n\
                  outputs \"out\"\n\
                  doFirst { pass }\n\
                  do { run() }\n\
                  doLast { pass }\n\
                  var tmp = 1\n\
                  }\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error(), "{:?}", reporter.entries());

    match &script.members[0] {
        Node::Decl(Declaration::Task(task)) => {
            assert_eq!(task.name.name, "build");
            assert_eq!(task.depends.len(), 2);
            assert_eq!(task.members.len(), 6);
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_closures_and_paren_expressions() {
    let (script, reporter) = parse("var f = (a, b) => a + b\nvar g = (1 + 2) * 3\n");
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Decl(Declaration::Variable(var)) => {
            assert!(matches!(var.value, Expression::Closure(_)));
        }
        other => panic!("unexpected member {:?}", other),
    }
    match &script.members[1] {
        Node::Decl(Declaration::Variable(var)) => {
            assert!(matches!(var.value, Expression::Binary(_)));
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_interpolated_string() {
    let (script, reporter) = parse("var s = \"v=${x + 1}!\"\n");
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Decl(Declaration::Variable(var)) => match &var.value {
            Expression::InterpolatedString(interp) => {
                assert_eq!(interp.parts.len(), 3);
                assert!(matches!(&interp.parts[0], StringPart::Text(t) if t == "v="));
                assert!(matches!(&interp.parts[1], StringPart::Expr(Expression::Binary(_))));
                assert!(matches!(&interp.parts[2], StringPart::Text(t) if t == "!"));
            }
            other => panic!("expected interpolated string, got {:?}", other),
        },
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_postfix_chain() {
    let (script, reporter) = parse("obj.field.method(1, 2)[3] = 4\n");
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Stmt(Statement::Assign(assign)) => {
            assert!(matches!(assign.target, Expression::Subscript(_)));
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_conditional_expression() {
    let (script, reporter) = parse("var m = a if a > b else b\n");
    assert!(!reporter.has_error());

    match &script.members[0] {
        Node::Decl(Declaration::Variable(var)) => {
            assert!(matches!(var.value, Expression::Ternary(_)));
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn parses_not_in_and_is_not() {
    let (script, reporter) = parse("var a = x not in xs\nvar b = y is not int\n");
    assert!(!reporter.has_error());

    let ops: Vec<BinaryOp> = script
        .members
        .iter()
        .map(|member| match member {
            Node::Decl(Declaration::Variable(var)) => match &var.value {
                Expression::Binary(b) => b.op,
                other => panic!("expected binary, got {:?}", other),
            },
            other => panic!("unexpected member {:?}", other),
        })
        .collect();
    assert_eq!(ops, vec![BinaryOp::NotIn, BinaryOp::IsNot]);
}

#[test]
fn ill_formed_input_still_yields_structured_ast() {
    // Parser totality: bad input produces an AST with an Error node and
    // at least one diagnostic, and the rest of the script survives.
    let (script, reporter) = parse("var = 3\n+\nvar ok = 1\n");
    assert!(reporter.has_error());
    assert_eq!(script.members.len(), 3);

    assert!(matches!(
        &script.members[1],
        Node::Stmt(Statement::Error(_))
    ));
    match &script.members[2] {
        Node::Decl(Declaration::Variable(var)) => assert_eq!(var.name.name, "ok"),
        other => panic!("expected recovery to reach second decl, got {:?}", other),
    }
}

#[test]
fn missing_newline_gets_fixit() {
    let (_, reporter) = parse("var a = 1 var b = 2\n");
    let entries = reporter.entries();
    let entry = entries
        .iter()
        .find(|e| e.message == "expected a new line")
        .expect("missing-newline diagnostic");
    assert_eq!(entry.fixits[0].text, "<enter>");
}

#[test]
fn import_and_export_forms() {
    let source = "import \"lib/util\" as util\nexport version = 3\nexport name\n";
    let (script, reporter) = parse(source);
    assert!(!reporter.has_error());
    assert_eq!(script.members.len(), 3);

    match &script.members[0] {
        Node::Decl(Declaration::Import(import)) => {
            assert_eq!(import.alias.as_ref().unwrap().name, "util");
        }
        other => panic!("unexpected member {:?}", other),
    }
}

#[test]
fn ast_dump_is_stable() {
    let (script, _) = parse("def f(a) => a\n");
    let dump = dump_script(&script);
    assert!(dump.contains("FunctionDeclaration 'f'"));
    assert!(dump.contains("Parameters (a)"));
    assert!(dump.contains("Arrow"));
}
