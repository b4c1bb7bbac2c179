//! AST to SSA lowering.
//!
//! Each code unit gets its own [`IrBuilder`] holding the current block,
//! the fresh-value counter and the per-block SSA rename state; the
//! [`IrGenerator`] drives a builder stack so nested units (functions,
//! methods, closures) lower with their own state. `Select` statements
//! materialize merged values at structured join points.

mod expr;
mod stmt;

use mason_checker::analyzer::Analysis;
use mason_checker::symbols::{Symbol, SymbolKind, VariableKind};
use mason_checker::SymbolId;
use mason_parser::ast::{Body, Script};
use mason_parser::diag::ErrorReporter;
use mason_parser::source::SourcePosition;

use crate::ir::{BlockId, CodeUnit, Constant, IrOp, IrStatement, IrValue};

/// Per-unit builder: current block, fresh counters and SSA maps.
pub(crate) struct IrBuilder {
    unit: CodeUnit,
    current: BlockId,
}

impl IrBuilder {
    fn new(name: impl Into<String>, args: Vec<SymbolId>, vararg: bool) -> Self {
        let mut unit = CodeUnit::new(name, args, vararg);
        let entry = unit.new_block("entry");
        Self {
            unit,
            current: entry,
        }
    }

    fn new_value(&mut self) -> IrValue {
        let value = IrValue::new(self.unit.value_count);
        self.unit.value_count += 1;
        value
    }

    fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        self.unit.new_block(label)
    }

    fn current_block(&self) -> BlockId {
        self.current
    }

    fn set_current(&mut self, block: BlockId) {
        self.current = block;
    }

    fn is_terminated(&self) -> bool {
        self.unit.block(self.current).is_terminated()
    }

    /// Statements may only ever follow an open block; anything lowered
    /// after a terminator lands in a fresh unreachable block.
    fn ensure_open(&mut self) {
        if self.unit.block(self.current).is_terminated() {
            let label = format!("unreachable.{}", self.unit.block_count());
            self.current = self.unit.new_block(label);
        }
    }

    fn emit(&mut self, pos: SourcePosition, op: IrOp) {
        self.ensure_open();
        self.unit
            .block_mut(self.current)
            .push(IrStatement::new(op, pos));
    }

    /// Load a constant, deduplicated through the block's constant pool.
    fn load_const(&mut self, pos: SourcePosition, value: Constant) -> IrValue {
        self.ensure_open();
        if let Some(&existing) = self.unit.block(self.current).consts.get(&value) {
            return existing;
        }

        let dest = self.new_value();
        self.emit(
            pos,
            IrOp::LoadConst {
                dest,
                value: value.clone(),
            },
        );
        self.unit
            .block_mut(self.current)
            .consts
            .insert(value, dest);
        dest
    }

    /// Current SSA value of a symbol in this block, loading it if no
    /// earlier statement in the block defined one.
    fn read_symbol(&mut self, pos: SourcePosition, symbol: SymbolId) -> IrValue {
        self.ensure_open();
        if let Some(&value) = self.unit.block(self.current).defined.get(&symbol) {
            return value;
        }

        let dest = self.new_value();
        self.emit(pos, IrOp::LoadSymbol { dest, symbol });
        self.unit
            .block_mut(self.current)
            .defined
            .insert(symbol, dest);
        dest
    }

    /// Record a symbol write: updates the rename state and emits the
    /// store so reads from other blocks have a source.
    fn write_symbol(&mut self, pos: SourcePosition, symbol: SymbolId, value: IrValue, declare: bool) {
        let op = if declare {
            IrOp::DeclareSymbol { symbol, value }
        } else {
            IrOp::StoreSymbol { symbol, value }
        };
        self.emit(pos, op);
        self.unit
            .block_mut(self.current)
            .defined
            .insert(symbol, value);
    }

    fn branch(&mut self, pos: SourcePosition, target: BlockId) {
        debug_assert!(!self.is_terminated());
        let from = self.current;
        self.emit(pos, IrOp::Br { target });
        self.unit.link(from, target);
    }

    fn branch_cond(
        &mut self,
        pos: SourcePosition,
        condition: IrValue,
        on_true: BlockId,
        on_false: BlockId,
    ) {
        debug_assert!(!self.is_terminated());
        let from = self.current;
        self.emit(
            pos,
            IrOp::BrCond {
                condition,
                on_true,
                on_false,
            },
        );
        self.unit.link(from, on_true);
        self.unit.link(from, on_false);
    }

    fn jump_table(
        &mut self,
        pos: SourcePosition,
        condition: IrValue,
        cases: Vec<(Constant, BlockId)>,
        default: BlockId,
    ) {
        debug_assert!(!self.is_terminated());
        let from = self.current;
        let targets: Vec<BlockId> = cases.iter().map(|(_, block)| *block).collect();
        self.emit(
            pos,
            IrOp::JumpTable {
                condition,
                cases,
                default,
            },
        );
        for target in targets {
            self.unit.link(from, target);
        }
        self.unit.link(from, default);
    }

    fn ret(&mut self, pos: SourcePosition, value: IrValue) {
        self.emit(pos, IrOp::Return { value });
    }

    fn raise(&mut self, pos: SourcePosition, value: IrValue) {
        self.emit(pos, IrOp::Raise { value });
    }

    /// Record an exceptional edge from a protected region to a handler.
    fn link_exception_edge(&mut self, from: BlockId, to: BlockId) {
        self.unit.link(from, to);
    }

    /// Seal a merge block once all predecessors are known.
    ///
    /// A single-predecessor block inherits the rename state and constant
    /// pool; a real merge receives a `Select` per symbol whose incoming
    /// values differ, in predecessor order.
    fn seal_merge(&mut self, join: BlockId, pos: SourcePosition) {
        let mut preds: Vec<BlockId> = self.unit.block(join).preds.iter().copied().collect();
        preds.sort_unstable();

        match preds.as_slice() {
            [] => {}
            [only] => {
                let defined = self.unit.block(*only).defined.clone();
                let consts = self.unit.block(*only).consts.clone();
                let block = self.unit.block_mut(join);
                block.defined = defined;
                block.consts = consts;
            }
            _ => {
                // Symbols live on every incoming edge, in stable order.
                let mut symbols: Vec<SymbolId> = self
                    .unit
                    .block(preds[0])
                    .defined
                    .keys()
                    .copied()
                    .filter(|symbol| {
                        preds[1..]
                            .iter()
                            .all(|pred| self.unit.block(*pred).defined.contains_key(symbol))
                    })
                    .collect();
                symbols.sort_unstable();

                for symbol in symbols {
                    let values: Vec<IrValue> = preds
                        .iter()
                        .map(|pred| self.unit.block(*pred).defined[&symbol])
                        .collect();

                    if values.iter().all(|value| *value == values[0]) {
                        self.unit
                            .block_mut(join)
                            .defined
                            .insert(symbol, values[0]);
                    } else {
                        let dest = self.new_value();
                        self.unit.block_mut(join).push(IrStatement::new(
                            IrOp::Select {
                                dest,
                                operands: values,
                            },
                            pos,
                        ));
                        self.unit.block_mut(join).defined.insert(symbol, dest);
                    }
                }
            }
        }
    }

    /// Finish the unit: synthesize `Return None` into every block the
    /// lowering left open (the fall-through exit and recovery leftovers).
    fn finalize(mut self) -> CodeUnit {
        let open: Vec<BlockId> = self
            .unit
            .block_ids()
            .filter(|id| !self.unit.block(*id).is_terminated())
            .collect();

        for block in open {
            self.current = block;
            let none = self.new_value();
            self.unit.block_mut(block).push(IrStatement::new(
                IrOp::LoadConst {
                    dest: none,
                    value: Constant::None,
                },
                SourcePosition::invalid(),
            ));
            self.unit.block_mut(block).push(IrStatement::new(
                IrOp::Return { value: none },
                SourcePosition::invalid(),
            ));
        }

        self.unit
    }
}

/// An entry of the active `finally` stack: either a user-written body or
/// the synthesized resource release of a `with` statement.
#[derive(Clone, Copy)]
enum FinallyKind<'ast> {
    Body(&'ast Body),
    Release(IrValue),
}

#[derive(Clone, Copy)]
struct LoopInfo {
    break_to: BlockId,
    continue_to: BlockId,
    /// Depth of the finally stack when the loop was entered; exits
    /// duplicate everything above it.
    finally_depth: usize,
}

struct SavedState<'ast> {
    loops: Vec<LoopInfo>,
    finallys: Vec<FinallyKind<'ast>>,
    self_symbol: Option<SymbolId>,
    super_symbol: Option<SymbolId>,
    exception_symbol: Option<SymbolId>,
}

/// Lowers a semantically-checked AST into SSA code units.
pub struct IrGenerator<'ast, 'ctx> {
    analysis: &'ctx mut Analysis,
    #[allow(dead_code)]
    reporter: &'ctx ErrorReporter,
    debug_info: bool,

    builders: Vec<IrBuilder>,
    codes: Vec<CodeUnit>,

    loops: Vec<LoopInfo>,
    finallys: Vec<FinallyKind<'ast>>,
    self_symbol: Option<SymbolId>,
    super_symbol: Option<SymbolId>,
    /// The caught-exception symbol of the enclosing `except` body, the
    /// source of a bare `raise`.
    exception_symbol: Option<SymbolId>,
    saved: Vec<SavedState<'ast>>,
    labels: u32,
}

/// Lower a script into its code units. `debug_info` keeps source
/// positions on the produced statements.
pub fn generate<'ast>(
    script: &'ast Script,
    analysis: &mut Analysis,
    reporter: &ErrorReporter,
    debug_info: bool,
) -> Vec<CodeUnit> {
    let mut generator = IrGenerator {
        analysis,
        reporter,
        debug_info,
        builders: Vec::new(),
        codes: Vec::new(),
        loops: Vec::new(),
        finallys: Vec::new(),
        self_symbol: None,
        super_symbol: None,
        exception_symbol: None,
        saved: Vec::new(),
        labels: 0,
    };

    generator.push_builder("<script>", Vec::new(), false);
    generator.lower_members(&script.members);
    generator.pop_builder();
    generator.codes
}

impl<'ast, 'ctx> IrGenerator<'ast, 'ctx> {
    fn builder(&mut self) -> &mut IrBuilder {
        self.builders.last_mut().expect("builder stack is empty")
    }

    fn pos(&self, pos: SourcePosition) -> SourcePosition {
        if self.debug_info {
            pos
        } else {
            SourcePosition::invalid()
        }
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let label = format!("{}.{}", prefix, self.labels);
        self.labels += 1;
        label
    }

    /// Open a nested code unit; loop/finally state stays with the outer
    /// builder.
    fn push_builder(&mut self, name: impl Into<String>, args: Vec<SymbolId>, vararg: bool) {
        self.saved.push(SavedState {
            loops: std::mem::take(&mut self.loops),
            finallys: std::mem::take(&mut self.finallys),
            self_symbol: self.self_symbol.take(),
            super_symbol: self.super_symbol.take(),
            exception_symbol: self.exception_symbol.take(),
        });
        self.builders.push(IrBuilder::new(name, args, vararg));
    }

    /// Close the innermost unit and append it to the output list.
    fn pop_builder(&mut self) {
        let builder = self.builders.pop().expect("builder stack is empty");
        self.codes.push(builder.finalize());

        let saved = self.saved.pop().expect("saved state missing");
        self.loops = saved.loops;
        self.finallys = saved.finallys;
        self.self_symbol = saved.self_symbol;
        self.super_symbol = saved.super_symbol;
        self.exception_symbol = saved.exception_symbol;
    }

    /// Lower a function-like body: blocks fall through to `Return None`,
    /// arrow bodies return their expression.
    fn lower_unit_body(&mut self, body: &'ast Body) {
        match body {
            Body::Block(block) => {
                self.lower_members(&block.members);
                if !self.builder().is_terminated() {
                    let pos = SourcePosition::invalid();
                    let none = self.builder().load_const(pos, Constant::None);
                    self.builder().ret(pos, none);
                }
            }
            Body::Arrow(range, expr) => {
                let value = self.lower_expr(expr);
                let pos = self.pos(range.begin);
                self.builder().ret(pos, value);
            }
        }
    }

    /// Duplicate the pending finally bodies from `depth` upward,
    /// innermost first. Used on break/continue/return exits.
    fn run_finallys_from(&mut self, depth: usize) {
        let pending: Vec<FinallyKind<'ast>> = self.finallys[depth..].to_vec();
        for entry in pending.into_iter().rev() {
            self.lower_finally_entry(entry);
        }
    }

    fn lower_finally_entry(&mut self, entry: FinallyKind<'ast>) {
        match entry {
            FinallyKind::Body(body) => self.lower_stmt_body(body),
            FinallyKind::Release(resource) => {
                let pos = SourcePosition::invalid();
                let dest = self.builder().new_value();
                self.builder().emit(
                    pos,
                    IrOp::Invoke {
                        dest,
                        target: resource,
                        member: "close".to_string(),
                        args: Vec::new(),
                    },
                );
            }
        }
    }

    /// The current unit's `self` value.
    fn read_self(&mut self, pos: SourcePosition) -> IrValue {
        match self.self_symbol {
            Some(symbol) => self.builder().read_symbol(pos, symbol),
            None => self.builder().load_const(pos, Constant::None),
        }
    }

    /// Synthesize a caught-exception symbol for re-raise paths.
    fn synth_exception_symbol(&mut self, pos: SourcePosition) -> SymbolId {
        self.analysis.symbols.alloc(Symbol::new(
            "<exception>",
            pos,
            SymbolKind::Variable {
                kind: VariableKind::Exception,
                readonly: false,
            },
        ))
    }

    /// Synthesize an implicit `self` symbol for generated initializers.
    fn synth_self_symbol(&mut self, pos: SourcePosition) -> SymbolId {
        self.analysis.symbols.alloc(Symbol::new(
            mason_checker::symbols::SELF_NAME,
            pos,
            SymbolKind::Variable {
                kind: VariableKind::Implicit,
                readonly: false,
            },
        ))
    }
}
