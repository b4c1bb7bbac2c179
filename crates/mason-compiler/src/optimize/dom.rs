//! Dominator computation for the loop passes.
//!
//! The iterative algorithm over a reverse postorder; small CFGs make
//! anything fancier pointless.

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, CodeUnit};

pub(crate) struct Dominators {
    /// Immediate dominator per block; the entry maps to itself.
    idom: FxHashMap<BlockId, BlockId>,
}

impl Dominators {
    pub(crate) fn compute(unit: &CodeUnit) -> Self {
        let entry = unit.entry();
        let rpo = reverse_postorder(unit);
        let order: FxHashMap<BlockId, usize> = rpo
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index))
            .collect();

        let mut idom: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        idom.insert(entry, entry);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &unit.block(block).preds {
                    if !idom.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order, pred, current),
                    });
                }

                if let Some(new_idom) = new_idom {
                    if idom.get(&block) != Some(&new_idom) {
                        idom.insert(block, new_idom);
                        changed = true;
                    }
                }
            }
        }

        Self { idom }
    }

    /// Whether `a` dominates `b`.
    pub(crate) fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            match self.idom.get(&current) {
                Some(&parent) if parent != current => current = parent,
                _ => return false,
            }
        }
    }
}

fn intersect(
    idom: &FxHashMap<BlockId, BlockId>,
    order: &FxHashMap<BlockId, usize>,
    a: BlockId,
    b: BlockId,
) -> BlockId {
    let mut a = a;
    let mut b = b;
    while a != b {
        while order[&a] > order[&b] {
            a = idom[&a];
        }
        while order[&b] > order[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Blocks reachable from the entry, in reverse postorder.
pub(crate) fn reverse_postorder(unit: &CodeUnit) -> Vec<BlockId> {
    let mut visited = vec![false; unit.block_count()];
    let mut postorder = Vec::new();

    // Iterative DFS with an explicit completion marker.
    let mut stack = vec![(unit.entry(), false)];
    while let Some((block, done)) = stack.pop() {
        if done {
            postorder.push(block);
            continue;
        }
        if visited[block.index()] {
            continue;
        }
        visited[block.index()] = true;
        stack.push((block, true));

        let mut succs: Vec<BlockId> = unit.block(block).succs.iter().copied().collect();
        succs.sort_unstable();
        for succ in succs {
            if !visited[succ.index()] {
                stack.push((succ, false));
            }
        }
    }

    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, IrOp, IrStatement, IrValue};
    use mason_parser::source::SourcePosition;

    fn stmt(op: IrOp) -> IrStatement {
        IrStatement::new(op, SourcePosition::invalid())
    }

    /// entry -> a -> join, entry -> b -> join
    fn diamond() -> CodeUnit {
        let mut unit = CodeUnit::new("t", vec![], false);
        let entry = unit.new_block("entry");
        let a = unit.new_block("a");
        let b = unit.new_block("b");
        let join = unit.new_block("join");

        let cond = IrValue::new(0);
        unit.value_count = 2;
        unit.block_mut(entry).push(stmt(IrOp::LoadConst {
            dest: cond,
            value: Constant::Bool(true),
        }));
        unit.block_mut(entry).push(stmt(IrOp::BrCond {
            condition: cond,
            on_true: a,
            on_false: b,
        }));
        unit.link(entry, a);
        unit.link(entry, b);

        unit.block_mut(a).push(stmt(IrOp::Br { target: join }));
        unit.link(a, join);
        unit.block_mut(b).push(stmt(IrOp::Br { target: join }));
        unit.link(b, join);

        unit.block_mut(join).push(stmt(IrOp::LoadConst {
            dest: IrValue::new(1),
            value: Constant::None,
        }));
        unit.block_mut(join).push(stmt(IrOp::Return {
            value: IrValue::new(1),
        }));
        unit
    }

    #[test]
    fn test_diamond_dominators() {
        let unit = diamond();
        let dom = Dominators::compute(&unit);

        let entry = BlockId(0);
        let a = BlockId(1);
        let b = BlockId(2);
        let join = BlockId(3);

        assert!(dom.dominates(entry, join));
        assert!(dom.dominates(entry, a));
        assert!(!dom.dominates(a, join));
        assert!(!dom.dominates(b, join));
        assert!(dom.dominates(join, join));
    }

    #[test]
    fn test_rpo_starts_at_entry() {
        let unit = diamond();
        let rpo = reverse_postorder(&unit);
        assert_eq!(rpo[0], BlockId(0));
        assert_eq!(rpo.len(), 4);
    }
}
