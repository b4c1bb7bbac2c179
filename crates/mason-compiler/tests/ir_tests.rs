//! IR construction integration tests.

use mason_compiler::ir::{CodeUnit, IrOp};
use mason_compiler::{Compilation, Context};
use mason_parser::options::{CompileOptions, OptimizeLevel};

fn compile(source: &str) -> (Compilation, Context) {
    // Raw IR: optimization off so the built shape is observable.
    let mut options = CompileOptions::default();
    options.optimize_level = OptimizeLevel::None;
    let context = Context::new(options);
    let compilation = context.compile("t.mason", source.as_bytes());
    (compilation, context)
}

fn unit_named<'a>(compilation: &'a Compilation, name: &str) -> &'a CodeUnit {
    compilation
        .units
        .iter()
        .find(|unit| unit.name == name)
        .unwrap_or_else(|| {
            let names: Vec<_> = compilation.units.iter().map(|u| u.name.as_str()).collect();
            panic!("no unit named '{}' in {:?}", name, names)
        })
}

fn ops_of(unit: &CodeUnit) -> Vec<&IrOp> {
    unit.blocks()
        .flat_map(|(_, block)| block.statements.iter().map(|s| &s.op))
        .collect()
}

#[test]
fn every_unit_validates() {
    let source = "def f(n) {\n\
                  var x = 1\n\
                  if n { x = 2 }\n\
                  return x\n\
                  }\n\
                  var r = f(3)\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    for unit in &compilation.units {
        assert!(unit.validate().is_ok(), "{:?}", unit.validate());
    }
}

#[test]
fn if_merge_gets_select_over_both_edges() {
    // The classic SSA diamond: the return block merges the constant 1
    // (false edge) with the constant 2 (true edge).
    let source = "def f(n) {\n\
                  var x = 1\n\
                  if n { x = 2 }\n\
                  return x\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "f$1");
    assert!(unit.validate().is_ok());

    // find the Select and the constants its operands load
    let mut select_operands = None;
    for (_, block) in unit.blocks() {
        for statement in &block.statements {
            if let IrOp::Select { operands, .. } = &statement.op {
                select_operands = Some(operands.clone());
            }
        }
    }
    let operands = select_operands.expect("merge Select missing");
    assert_eq!(operands.len(), 2);

    let mut loaded = Vec::new();
    for operand in &operands {
        for op in ops_of(unit) {
            if let IrOp::LoadConst { dest, value } = op {
                if dest == operand {
                    loaded.push(value.clone());
                }
            }
        }
    }
    assert_eq!(
        loaded,
        vec![
            mason_compiler::ir::Constant::Int(1),
            mason_compiler::ir::Constant::Int(2)
        ]
    );

    // both Select operands dominate the merge by construction; the
    // validator has already checked single definitions
}

#[test]
fn terminator_and_edge_invariants_hold_across_constructs() {
    let source = "def f(items) {\n\
                  var total = 0\n\
                  for item in items {\n\
                  if item > 10 { continue }\n\
                  total = total + item\n\
                  }\n\
                  while total > 100 {\n\
                  total = total - 1\n\
                  }\n\
                  return total\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "f$1");
    assert!(unit.validate().is_ok(), "{:?}", unit.validate());

    // every block ends with exactly one terminator
    for (_, block) in unit.blocks() {
        let terminators = block
            .statements
            .iter()
            .filter(|s| s.op.is_terminator())
            .count();
        assert_eq!(terminators, 1);
    }
}

#[test]
fn empty_fallthrough_returns_none() {
    let (compilation, context) = compile("def f() { pass }\n");
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "f$0");
    let ops = ops_of(unit);
    assert!(matches!(ops.last(), Some(IrOp::Return { .. })));
    assert!(ops
        .iter()
        .any(|op| matches!(op, IrOp::LoadConst { value, .. }
            if matches!(value, mason_compiler::ir::Constant::None))));
}

#[test]
fn arrow_body_returns_expression() {
    let (compilation, context) = compile("def double(x) => x * 2\n");
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "double$1");
    let ops = ops_of(unit);
    assert!(ops.iter().any(|op| matches!(op, IrOp::Binary { .. })));
    assert!(matches!(ops.last(), Some(IrOp::Return { .. })));
}

#[test]
fn constants_are_pooled_per_block() {
    let (compilation, context) = compile("var a = 1 + 1\n");
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "<script>");
    let ones = ops_of(unit)
        .iter()
        .filter(|op| {
            matches!(op, IrOp::LoadConst { value, .. }
                if matches!(value, mason_compiler::ir::Constant::Int(1)))
        })
        .count();
    assert_eq!(ones, 1);
}

#[test]
fn try_lowering_builds_handler_table() {
    let source = "try {\n\
                  work()\n\
                  } except IOError as e {\n\
                  handle(e)\n\
                  } finally {\n\
                  cleanup()\n\
                  }\n\
                  def work() { pass }\n\
                  def handle(e) { pass }\n\
                  def cleanup() { pass }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error(), "{:?}", context.reporter().entries());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok(), "{:?}", unit.validate());
    assert_eq!(unit.handlers.len(), 1);

    let info = &unit.handlers[0];
    // the except clause plus the finally re-raise handler
    assert_eq!(info.handlers.len(), 2);

    // finally body is duplicated: normal exit, except exit, unwind exit
    let cleanup_calls = ops_of(unit)
        .iter()
        .filter(|op| matches!(op, IrOp::Call { .. }))
        .count();
    // work() + handle() + three cleanup() copies
    assert_eq!(cleanup_calls, 5);
}

#[test]
fn finally_runs_before_return_inside_try() {
    let source = "def f() {\n\
                  try {\n\
                  return 1\n\
                  } finally {\n\
                  cleanup()\n\
                  }\n\
                  }\n\
                  def cleanup() { pass }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "f$0");
    assert!(unit.validate().is_ok());

    // on the return path, the cleanup call precedes the Return
    let mut saw_call_before_return = false;
    for (_, block) in unit.blocks() {
        let mut call_seen = false;
        for statement in &block.statements {
            match &statement.op {
                IrOp::Call { .. } => call_seen = true,
                IrOp::Return { .. } if call_seen => saw_call_before_return = true,
                _ => {}
            }
        }
    }
    assert!(saw_call_before_return);
}

#[test]
fn with_lowers_to_acquire_try_release() {
    let source = "with open() as f {\n\
                  use(f)\n\
                  }\n\
                  def open() { pass }\n\
                  def use(f) { pass }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error(), "{:?}", context.reporter().entries());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok());
    assert_eq!(unit.handlers.len(), 1);

    // close() is invoked on both the normal and the unwind path
    let closes = ops_of(unit)
        .iter()
        .filter(|op| matches!(op, IrOp::Invoke { member, .. } if member == "close"))
        .count();
    assert_eq!(closes, 2);

    // the unwind path re-raises
    assert!(ops_of(unit).iter().any(|op| matches!(op, IrOp::Raise { .. })));
}

#[test]
fn dense_match_uses_jump_table() {
    let source = "var code = 1\n\
                  match code {\n\
                  case 1:\n\
                  pass\n\
                  case 2:\n\
                  pass\n\
                  case 3:\n\
                  pass\n\
                  default:\n\
                  pass\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error(), "{:?}", context.reporter().entries());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok());
    assert!(ops_of(unit)
        .iter()
        .any(|op| matches!(op, IrOp::JumpTable { cases, .. } if cases.len() == 3)));
}

#[test]
fn sparse_match_chains_tests() {
    let source = "var code = 1\n\
                  match code {\n\
                  case 1:\n\
                  pass\n\
                  case 1000:\n\
                  pass\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok());
    assert!(!ops_of(unit).iter().any(|op| matches!(op, IrOp::JumpTable { .. })));
    let tests = ops_of(unit)
        .iter()
        .filter(|op| matches!(op, IrOp::Test { .. }))
        .count();
    assert_eq!(tests, 2);
}

#[test]
fn closure_lowering_captures_in_order() {
    let source = "def make() {\n\
                  var a = 1\n\
                  var b = 2\n\
                  var f = () => a + b\n\
                  return f\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    // the closure became its own unit with captured arguments
    let closure_unit = compilation
        .units
        .iter()
        .find(|unit| unit.name.starts_with("<closure#"))
        .expect("closure unit");
    assert_eq!(closure_unit.argc(), 2);
    assert!(closure_unit.validate().is_ok());

    // the creation site loads both captures
    let make = unit_named(&compilation, "make$0");
    let make_closure = ops_of(make)
        .into_iter()
        .find(|op| matches!(op, IrOp::MakeClosure { .. }))
        .expect("MakeClosure");
    if let IrOp::MakeClosure { captures, unit, .. } = make_closure {
        assert_eq!(captures.len(), 2);
        assert_eq!(unit, &closure_unit.name);
    }
}

#[test]
fn logical_operators_short_circuit() {
    let (compilation, context) = compile("var a = true\nvar b = false\nvar c = a and b\n");
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok());
    // no IR binary op for `and`; a branch and a Select instead
    assert!(ops_of(unit).iter().any(|op| matches!(op, IrOp::BrCond { .. })));
    assert!(ops_of(unit).iter().any(|op| matches!(op, IrOp::Select { .. })));
}

#[test]
fn for_loop_uses_iterator_protocol() {
    let source = "var xs = [1, 2, 3]\nfor x in xs { use(x) }\ndef use(x) { pass }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "<script>");
    assert!(unit.validate().is_ok());

    for member in ["iter", "hasNext", "next"] {
        assert!(
            ops_of(unit)
                .iter()
                .any(|op| matches!(op, IrOp::Invoke { member: m, .. } if m == member)),
            "missing {} invoke",
            member
        );
    }
}

#[test]
fn export_and_import_lower_to_their_opcodes() {
    let source = "import \"lib\" as util\nexport version = 3\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let unit = unit_named(&compilation, "<script>");
    assert!(ops_of(unit).iter().any(|op| matches!(op, IrOp::Import { .. })));
    assert!(ops_of(unit).iter().any(|op| matches!(op, IrOp::Export { .. })));
    assert!(ops_of(unit)
        .iter()
        .any(|op| matches!(op, IrOp::DeclareSymbol { .. })));
}

#[test]
fn method_units_carry_mangled_names() {
    let source = "class Point {\n\
                  init(x, y) { pass }\n\
                  def move(dx, dy) { pass }\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error());

    let names: Vec<_> = compilation.units.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"Point::init$2"));
    assert!(names.contains(&"Point::move$2"));

    // methods receive self ahead of their parameters
    let method = unit_named(&compilation, "Point::move$2");
    assert_eq!(method.argc(), 3);
}

#[test]
fn task_configuration_lowers_into_script_unit() {
    let source = "task clean { do { pass } }\n\
                  task build dependsOn clean {\n\
                  inputs \"src\"\n\
                  do { pass }\n\
                  }\n";
    let (compilation, context) = compile(source);
    assert!(!context.has_error(), "{:?}", context.reporter().entries());

    let script = unit_named(&compilation, "<script>");
    assert!(ops_of(script)
        .iter()
        .any(|op| matches!(op, IrOp::Invoke { member, .. } if member == "dependsOn")));
    assert!(ops_of(script)
        .iter()
        .any(|op| matches!(op, IrOp::Invoke { member, .. } if member == "inputs")));

    let names: Vec<_> = compilation.units.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"clean::do$0"));
    assert!(names.contains(&"build::do$0"));
}

#[test]
fn debug_info_keeps_positions() {
    let mut options = CompileOptions::default();
    options.generate_debug_info = true;
    options.optimize_level = OptimizeLevel::None;
    let context = Context::new(options);
    let compilation = context.compile("t.mason", b"var x = 1\n");

    let unit = &compilation.units[0];
    let has_position = unit
        .blocks()
        .flat_map(|(_, block)| block.statements.iter())
        .any(|statement| statement.pos.is_valid());
    assert!(has_position);

    // and without the flag, positions are suppressed
    let (compilation, _) = compile("var x = 1\n");
    let unit = &compilation.units[0];
    let has_position = unit
        .blocks()
        .flat_map(|(_, block)| block.statements.iter())
        .any(|statement| statement.pos.is_valid());
    assert!(!has_position);
}

#[test]
fn ir_dump_uses_uppercase_mnemonics() {
    let (compilation, _) = compile("var x = 1 + 2\n");
    let analysis = compilation.analysis.as_ref().unwrap();
    let text = mason_compiler::ir::dump_units(&compilation.units, &analysis.symbols);

    assert!(text.contains("unit <script>"));
    assert!(text.contains("entry:"));
    assert!(text.contains("LOADCONST"));
    assert!(text.contains("ADD"));
    assert!(text.contains("DECLARESYMBOL x"));
    assert!(text.contains("RETURN"));
}
