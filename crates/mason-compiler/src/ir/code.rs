//! Code units: one compilable body as a list of basic blocks.

use rustc_hash::FxHashMap;
use thiserror::Error;

use mason_checker::SymbolId;

use super::block::{BasicBlock, BlockId};
use super::value::IrValue;

/// One registered exception handler of a guarded region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptHandler {
    pub block: BlockId,
    /// The caught-exception symbol the runtime binds on entry.
    pub symbol: SymbolId,
}

/// A guarded region of the handler table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptInfo {
    pub begin: BlockId,
    pub end: BlockId,
    pub handlers: Vec<ExceptHandler>,
}

/// Violation found by [`CodeUnit::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidateError(pub String);

/// A single executable unit (function, method, initializer, closure or
/// the script body) in SSA form.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    pub name: String,
    pub vararg: bool,
    pub args: Vec<SymbolId>,
    pub handlers: Vec<ExceptInfo>,
    blocks: Vec<BasicBlock>,
    /// Number of SSA values assigned so far.
    pub value_count: u32,
}

impl CodeUnit {
    pub fn new(name: impl Into<String>, args: Vec<SymbolId>, vararg: bool) -> Self {
        Self {
            name: name.into(),
            vararg,
            args,
            handlers: Vec::new(),
            blocks: Vec::new(),
            value_count: 0,
        }
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn new_block(&mut self, label: impl Into<String>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(label));
        id
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| (BlockId(index as u32), block))
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = (BlockId, &mut BasicBlock)> {
        self.blocks
            .iter_mut()
            .enumerate()
            .map(|(index, block)| (BlockId(index as u32), block))
    }

    /// Record a control-flow edge in both directions.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.insert(to);
        self.blocks[to.index()].preds.insert(from);
    }

    /// Remove a control-flow edge in both directions.
    pub fn unlink(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.index()].succs.remove(&to);
        self.blocks[to.index()].preds.remove(&from);
    }

    /// Replace the block vector wholesale (used by block-removal passes).
    pub(crate) fn replace_blocks(&mut self, blocks: Vec<BasicBlock>) {
        self.blocks = blocks;
    }

    pub(crate) fn take_blocks(&mut self) -> Vec<BasicBlock> {
        std::mem::take(&mut self.blocks)
    }

    /// Whether `id` appears in the exception-handler table (as region
    /// boundary or handler entry).
    pub fn is_handler_block(&self, id: BlockId) -> bool {
        self.handlers.iter().any(|info| {
            info.begin == id
                || info.end == id
                || info.handlers.iter().any(|handler| handler.block == id)
        })
    }

    /// Check the structural invariants of a finalized unit:
    ///
    /// - every block ends with exactly one terminator, and no terminator
    ///   appears elsewhere;
    /// - every branch target is a recorded edge, and every edge is
    ///   symmetric;
    /// - every SSA value is assigned exactly once, `INVALID` never
    ///   appears as an operand, and every operand has a definition.
    pub fn validate(&self) -> Result<(), ValidateError> {
        let mut defined: FxHashMap<IrValue, BlockId> = FxHashMap::default();

        for (id, block) in self.blocks() {
            if !block.is_terminated() {
                return Err(ValidateError(format!(
                    "block {} ('{}') is not terminated",
                    id, block.label
                )));
            }

            for (index, statement) in block.statements.iter().enumerate() {
                if statement.op.is_terminator() && index + 1 != block.statements.len() {
                    return Err(ValidateError(format!(
                        "terminator in the middle of block {} ('{}')",
                        id, block.label
                    )));
                }

                if let Some(dest) = statement.op.dest() {
                    if !dest.is_valid() {
                        return Err(ValidateError(format!(
                            "invalid destination in block {}",
                            id
                        )));
                    }
                    if defined.insert(dest, id).is_some() {
                        return Err(ValidateError(format!(
                            "value {} defined more than once",
                            dest
                        )));
                    }
                }
            }

            // Edge consistency, branch targets against recorded edges.
            let terminator = block.terminator().expect("checked above");
            for target in terminator.op.branch_targets() {
                if target.index() >= self.blocks.len() {
                    return Err(ValidateError(format!(
                        "block {} branches to non-existent {}",
                        id, target
                    )));
                }
                if !block.succs.contains(&target) {
                    return Err(ValidateError(format!(
                        "branch target {} of block {} missing from successors",
                        target, id
                    )));
                }
                if !self.block(target).preds.contains(&id) {
                    return Err(ValidateError(format!(
                        "block {} missing from predecessors of {}",
                        id, target
                    )));
                }
            }

            for &succ in &block.succs {
                if succ.index() >= self.blocks.len() {
                    return Err(ValidateError(format!(
                        "successor {} of block {} does not exist",
                        succ, id
                    )));
                }
                if !self.block(succ).preds.contains(&id) {
                    return Err(ValidateError(format!(
                        "edge {} -> {} not symmetric",
                        id, succ
                    )));
                }
            }
            for &pred in &block.preds {
                if pred.index() >= self.blocks.len() {
                    return Err(ValidateError(format!(
                        "predecessor {} of block {} does not exist",
                        pred, id
                    )));
                }
                if !self.block(pred).succs.contains(&id) {
                    return Err(ValidateError(format!(
                        "edge {} <- {} not symmetric",
                        id, pred
                    )));
                }
            }
        }

        // Uses: every operand valid and defined somewhere in the unit.
        for (id, block) in self.blocks() {
            for statement in &block.statements {
                for operand in statement.op.operands() {
                    if !operand.is_valid() {
                        return Err(ValidateError(format!(
                            "INVALID used as an operand in block {}",
                            id
                        )));
                    }
                    if !defined.contains_key(&operand) {
                        return Err(ValidateError(format!(
                            "value {} used in block {} but never defined",
                            operand, id
                        )));
                    }
                }
            }
        }

        // Handler table references must stay in range.
        for info in &self.handlers {
            for block in [info.begin, info.end]
                .into_iter()
                .chain(info.handlers.iter().map(|handler| handler.block))
            {
                if block.index() >= self.blocks.len() {
                    return Err(ValidateError(format!(
                        "handler table references non-existent {}",
                        block
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::{IrOp, IrStatement};
    use crate::ir::value::Constant;
    use mason_parser::source::SourcePosition;

    fn stmt(op: IrOp) -> IrStatement {
        IrStatement::new(op, SourcePosition::invalid())
    }

    fn ret_none(unit: &mut CodeUnit, block: BlockId) {
        let dest = IrValue::new(unit.value_count);
        unit.value_count += 1;
        unit.block_mut(block).push(stmt(IrOp::LoadConst {
            dest,
            value: Constant::None,
        }));
        unit.block_mut(block).push(stmt(IrOp::Return { value: dest }));
    }

    #[test]
    fn test_validate_ok() {
        let mut unit = CodeUnit::new("test", vec![], false);
        let entry = unit.new_block("entry");
        ret_none(&mut unit, entry);
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn test_validate_unterminated() {
        let mut unit = CodeUnit::new("test", vec![], false);
        unit.new_block("entry");
        assert!(unit.validate().is_err());
    }

    #[test]
    fn test_validate_edges() {
        let mut unit = CodeUnit::new("test", vec![], false);
        let entry = unit.new_block("entry");
        let exit = unit.new_block("exit");

        unit.block_mut(entry).push(stmt(IrOp::Br { target: exit }));
        ret_none(&mut unit, exit);

        // Missing edge record: invalid.
        assert!(unit.validate().is_err());

        unit.link(entry, exit);
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn test_validate_double_definition() {
        let mut unit = CodeUnit::new("test", vec![], false);
        let entry = unit.new_block("entry");
        let dest = IrValue::new(0);
        unit.value_count = 1;

        unit.block_mut(entry).push(stmt(IrOp::LoadConst {
            dest,
            value: Constant::Int(1),
        }));
        unit.block_mut(entry).push(stmt(IrOp::LoadConst {
            dest,
            value: Constant::Int(2),
        }));
        unit.block_mut(entry).push(stmt(IrOp::Return { value: dest }));

        let err = unit.validate().unwrap_err();
        assert!(err.0.contains("more than once"));
    }

    #[test]
    fn test_validate_undefined_use() {
        let mut unit = CodeUnit::new("test", vec![], false);
        let entry = unit.new_block("entry");
        unit.block_mut(entry).push(stmt(IrOp::Return {
            value: IrValue::new(7),
        }));

        let err = unit.validate().unwrap_err();
        assert!(err.0.contains("never defined"));
    }
}
