//! Basic blocks.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use mason_checker::SymbolId;

use super::instr::{IrOp, IrStatement};
use super::value::{Constant, IrValue};

/// Index of a basic block within its code unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A maximal straight-line statement sequence ending in one terminator.
///
/// Edges are id sets owned by the block vector of the code unit; no block
/// owns another. The `defined` map carries the SSA rename state (symbol →
/// current value) and `consts` the per-block constant pool.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub statements: Vec<IrStatement>,
    pub preds: FxHashSet<BlockId>,
    pub succs: FxHashSet<BlockId>,
    pub defined: FxHashMap<SymbolId, IrValue>,
    pub consts: FxHashMap<Constant, IrValue>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            statements: Vec::new(),
            preds: FxHashSet::default(),
            succs: FxHashSet::default(),
            defined: FxHashMap::default(),
            consts: FxHashMap::default(),
        }
    }

    /// Whether the block ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.statements
            .last()
            .map(|statement| statement.op.is_terminator())
            .unwrap_or(false)
    }

    pub fn terminator(&self) -> Option<&IrStatement> {
        self.statements
            .last()
            .filter(|statement| statement.op.is_terminator())
    }

    pub fn terminator_mut(&mut self) -> Option<&mut IrStatement> {
        self.statements
            .last_mut()
            .filter(|statement| statement.op.is_terminator())
    }

    pub fn push(&mut self, statement: IrStatement) {
        debug_assert!(
            !self.is_terminated(),
            "statement pushed after terminator in block '{}'",
            self.label
        );
        self.statements.push(statement);
    }

    /// Whether the block's only statement is an unconditional branch.
    pub fn is_trivial_branch(&self) -> Option<BlockId> {
        match self.statements.as_slice() {
            [IrStatement {
                op: IrOp::Br { target },
                ..
            }] => Some(*target),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
