//! Redundant branch removal.
//!
//! Forwards empty branch-only blocks by re-pointing their predecessors,
//! then drops blocks no longer reachable from the entry, renumbering ids
//! and rewriting terminators, edges and the handler table.

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, CodeUnit};

use super::Pass;

pub struct RemoveRedundantBranches;

impl Pass for RemoveRedundantBranches {
    fn name(&self) -> &'static str {
        "remove-redundant-branches"
    }

    fn run(&self, unit: &mut CodeUnit) {
        forward_trivial_blocks(unit);
        drop_unreachable_blocks(unit);
    }
}

/// Re-point predecessors of blocks whose only statement is `Br(T)`.
fn forward_trivial_blocks(unit: &mut CodeUnit) {
    let ids: Vec<BlockId> = unit.block_ids().collect();

    for id in ids {
        if id == unit.entry() || unit.is_handler_block(id) {
            continue;
        }
        let Some(target) = unit.block(id).is_trivial_branch() else {
            continue;
        };
        if target == id {
            continue;
        }

        let preds: Vec<BlockId> = unit.block(id).preds.iter().copied().collect();
        for pred in preds {
            if let Some(terminator) = unit.block_mut(pred).terminator_mut() {
                terminator.op.retarget(id, target);
            }
            unit.unlink(pred, id);
            unit.link(pred, target);
        }
        // the trivial block keeps its own Br edge; reachability cleanup
        // collects it once no predecessor remains
    }
}

/// Remove blocks unreachable from the entry and renumber the survivors.
/// Blocks named by the exception-handler table are kept regardless;
/// the table must stay intact.
fn drop_unreachable_blocks(unit: &mut CodeUnit) {
    let mut reachable = vec![false; unit.block_count()];
    let mut worklist = vec![unit.entry()];
    for info in &unit.handlers {
        worklist.push(info.begin);
        worklist.push(info.end);
        worklist.extend(info.handlers.iter().map(|handler| handler.block));
    }
    while let Some(block) = worklist.pop() {
        if reachable[block.index()] {
            continue;
        }
        reachable[block.index()] = true;
        for &succ in &unit.block(block).succs {
            if !reachable[succ.index()] {
                worklist.push(succ);
            }
        }
    }

    if reachable.iter().all(|&alive| alive) {
        return;
    }

    prune_dead_select_operands(unit, &reachable);

    // Old id -> new id for surviving blocks.
    let mut remap: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut next = 0u32;
    for (index, &alive) in reachable.iter().enumerate() {
        if alive {
            remap.insert(BlockId(index as u32), BlockId(next));
            next += 1;
        }
    }

    let old_blocks = unit.take_blocks();
    let mut new_blocks = Vec::with_capacity(remap.len());
    for (index, mut block) in old_blocks.into_iter().enumerate() {
        if !reachable[index] {
            continue;
        }

        if let Some(terminator) = block
            .statements
            .last_mut()
            .filter(|statement| statement.op.is_terminator())
        {
            // Reachable blocks only branch to reachable blocks.
            match &mut terminator.op {
                crate::ir::IrOp::Br { target } => *target = remap[target],
                crate::ir::IrOp::BrCond {
                    on_true, on_false, ..
                } => {
                    *on_true = remap[on_true];
                    *on_false = remap[on_false];
                }
                crate::ir::IrOp::JumpTable { cases, default, .. } => {
                    for (_, case) in cases {
                        *case = remap[case];
                    }
                    *default = remap[default];
                }
                _ => {}
            }
        }

        block.preds = block
            .preds
            .iter()
            .filter_map(|pred| remap.get(pred).copied())
            .collect();
        block.succs = block
            .succs
            .iter()
            .filter_map(|succ| remap.get(succ).copied())
            .collect();

        new_blocks.push(block);
    }
    unit.replace_blocks(new_blocks);

    // The handler table survives only where its blocks do.
    let handlers = std::mem::take(&mut unit.handlers);
    unit.handlers = handlers
        .into_iter()
        .filter_map(|mut info| {
            info.begin = remap.get(&info.begin).copied()?;
            info.end = remap.get(&info.end).copied()?;
            let mut handlers = Vec::new();
            for mut handler in info.handlers {
                handler.block = remap.get(&handler.block).copied()?;
                handlers.push(handler);
            }
            info.handlers = handlers;
            Some(info)
        })
        .collect();
}

/// A `Select` merging an edge from a dead block still names the value
/// defined there. Drop those operands; a single survivor forwards.
fn prune_dead_select_operands(unit: &mut CodeUnit, reachable: &[bool]) {
    use crate::ir::{IrOp, IrValue};
    use rustc_hash::FxHashSet;

    let mut dead_values: FxHashSet<IrValue> = FxHashSet::default();
    for (id, block) in unit.blocks() {
        if reachable[id.index()] {
            continue;
        }
        for statement in &block.statements {
            if let Some(dest) = statement.op.dest() {
                dead_values.insert(dest);
            }
        }
    }
    if dead_values.is_empty() {
        return;
    }

    let mut replacements: FxHashMap<IrValue, IrValue> = FxHashMap::default();
    for (id, block) in unit.blocks_mut() {
        if !reachable[id.index()] {
            continue;
        }
        block.statements.retain_mut(|statement| {
            if let IrOp::Select { dest, operands } = &mut statement.op {
                operands.retain(|operand| !dead_values.contains(operand));
                if operands.len() == 1 {
                    replacements.insert(*dest, operands[0]);
                    return false;
                }
            }
            true
        });
    }

    let resolve = |mut value: IrValue| {
        while let Some(&next) = replacements.get(&value) {
            value = next;
        }
        value
    };
    let resolved: Vec<(IrValue, IrValue)> = replacements
        .keys()
        .map(|&from| (from, resolve(from)))
        .collect();

    for (_, block) in unit.blocks_mut() {
        for statement in &mut block.statements {
            for &(from, to) in &resolved {
                statement.op.replace_value(from, to);
            }
        }
        for value in block.defined.values_mut() {
            for &(from, to) in &resolved {
                if *value == from {
                    *value = to;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Constant, IrOp, IrStatement, IrValue};
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
    fn test_forwarding_removes_hop() {
        // entry -> hop -> exit becomes entry -> exit.
        let mut unit = CodeUnit::new("t", vec![], false);
        let entry = unit.new_block("entry");
        let hop = unit.new_block("hop");
        let exit = unit.new_block("exit");

        unit.block_mut(entry).push(stmt(IrOp::Br { target: hop }));
        unit.link(entry, hop);
        unit.block_mut(hop).push(stmt(IrOp::Br { target: exit }));
        unit.link(hop, exit);
        ret_none(&mut unit, exit);

        assert!(unit.validate().is_ok());
        RemoveRedundantBranches.run(&mut unit);
        assert!(unit.validate().is_ok());

        assert_eq!(unit.block_count(), 2);
        assert!(matches!(
            unit.block(unit.entry()).terminator().map(|t| &t.op),
            Some(IrOp::Br { target }) if *target == BlockId(1)
        ));
        assert_eq!(unit.block(BlockId(1)).label, "exit");
    }

    #[test]
    fn test_unreachable_block_dropped() {
        let mut unit = CodeUnit::new("t", vec![], false);
        let entry = unit.new_block("entry");
        let dead = unit.new_block("dead");
        ret_none(&mut unit, entry);
        ret_none(&mut unit, dead);

        RemoveRedundantBranches.run(&mut unit);
        assert_eq!(unit.block_count(), 1);
        assert!(unit.validate().is_ok());
        let _ = dead;
    }
}
