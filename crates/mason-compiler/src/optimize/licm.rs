//! Loop-invariant code motion.
//!
//! Natural loops are found through back edges (a predecessor the header
//! dominates); a pure statement whose operands are all defined outside
//! the loop moves to the end of the preheader, ahead of its branch.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, CodeUnit, IrOp, IrStatement, IrValue};

use super::dom::Dominators;
use super::Pass;

pub struct LoopInvariantMotion;

struct Loop {
    body: FxHashSet<BlockId>,
    preheader: BlockId,
}

impl Pass for LoopInvariantMotion {
    fn name(&self) -> &'static str {
        "loop-invariant-motion"
    }

    fn run(&self, unit: &mut CodeUnit) {
        let dominators = Dominators::compute(unit);
        let loops = find_loops(unit, &dominators);
        if loops.is_empty() {
            return;
        }

        let defining_block = collect_definitions(unit);

        for looop in &loops {
            let mut hoisted: Vec<IrStatement> = Vec::new();

            for &block in &looop.body {
                let body = &looop.body;
                let statements = &mut unit.block_mut(block).statements;

                let mut index = 0;
                while index < statements.len() {
                    let statement = &statements[index];
                    let invariant = statement.op.is_pure()
                        && statement.op.operands().iter().all(|operand| {
                            defining_block
                                .get(operand)
                                .map(|def| !body.contains(def))
                                .unwrap_or(false)
                        });

                    if invariant {
                        hoisted.push(statements.remove(index));
                    } else {
                        index += 1;
                    }
                }
            }

            if hoisted.is_empty() {
                continue;
            }

            // Insert ahead of the preheader's terminator.
            let preheader = unit.block_mut(looop.preheader);
            let terminator_at = preheader.statements.len() - 1;
            for (offset, statement) in hoisted.into_iter().enumerate() {
                preheader.statements.insert(terminator_at + offset, statement);
            }
        }
    }
}

/// Value -> block that defines it.
fn collect_definitions(unit: &CodeUnit) -> FxHashMap<IrValue, BlockId> {
    let mut map = FxHashMap::default();
    for (id, block) in unit.blocks() {
        for statement in &block.statements {
            if let Some(dest) = statement.op.dest() {
                map.insert(dest, id);
            }
        }
    }
    map
}

fn find_loops(unit: &CodeUnit, dominators: &Dominators) -> Vec<Loop> {
    let mut loops = Vec::new();

    for (id, block) in unit.blocks() {
        // Back edges out of this block.
        for &target in &block.succs {
            if !dominators.dominates(target, id) {
                continue;
            }

            let header = target;
            let latch = id;

            // Natural loop: blocks reaching the latch without passing
            // the header.
            let mut body: FxHashSet<BlockId> = FxHashSet::default();
            body.insert(header);
            body.insert(latch);
            let mut worklist = vec![latch];
            while let Some(node) = worklist.pop() {
                if node == header {
                    continue;
                }
                for &pred in &unit.block(node).preds {
                    if body.insert(pred) {
                        worklist.push(pred);
                    }
                }
            }

            // A usable preheader: the single outside predecessor ending
            // in an unconditional branch to the header.
            let outside: Vec<BlockId> = unit
                .block(header)
                .preds
                .iter()
                .copied()
                .filter(|pred| !body.contains(pred))
                .collect();
            let [preheader] = outside.as_slice() else {
                continue;
            };
            let ends_in_plain_branch = matches!(
                unit.block(*preheader).terminator().map(|t| &t.op),
                Some(IrOp::Br { .. })
            );
            if !ends_in_plain_branch {
                continue;
            }

            loops.push(Loop {
                body,
                preheader: *preheader,
            });
        }
    }

    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryIrOp, Constant};
    use mason_parser::source::SourcePosition;

    fn stmt(op: IrOp) -> IrStatement {
        IrStatement::new(op, SourcePosition::invalid())
    }

    /// entry -> header -> body -> header, header -> exit;
    /// body computes `c = a + b` from values defined in the entry.
    #[test]
    fn test_hoists_invariant_binary() {
        let mut unit = CodeUnit::new("t", vec![], false);
        let entry = unit.new_block("entry");
        let header = unit.new_block("header");
        let body = unit.new_block("body");
        let exit = unit.new_block("exit");
        unit.value_count = 6;

        let a = IrValue::new(0);
        let b = IrValue::new(1);
        let cond = IrValue::new(2);
        unit.block_mut(entry).push(stmt(IrOp::LoadConst {
            dest: a,
            value: Constant::Int(4),
        }));
        unit.block_mut(entry).push(stmt(IrOp::LoadConst {
            dest: b,
            value: Constant::Int(5),
        }));
        unit.block_mut(entry).push(stmt(IrOp::Br { target: header }));
        unit.link(entry, header);

        unit.block_mut(header).push(stmt(IrOp::Call {
            dest: cond,
            target: a,
            args: vec![],
        }));
        unit.block_mut(header).push(stmt(IrOp::BrCond {
            condition: cond,
            on_true: body,
            on_false: exit,
        }));
        unit.link(header, body);
        unit.link(header, exit);

        let c = IrValue::new(3);
        unit.block_mut(body).push(stmt(IrOp::Binary {
            dest: c,
            op: BinaryIrOp::Mul,
            left: a,
            right: b,
        }));
        unit.block_mut(body).push(stmt(IrOp::Call {
            dest: IrValue::new(4),
            target: c,
            args: vec![],
        }));
        unit.block_mut(body).push(stmt(IrOp::Br { target: header }));
        unit.link(body, header);

        unit.block_mut(exit).push(stmt(IrOp::LoadConst {
            dest: IrValue::new(5),
            value: Constant::None,
        }));
        unit.block_mut(exit).push(stmt(IrOp::Return {
            value: IrValue::new(5),
        }));

        assert!(unit.validate().is_ok());
        LoopInvariantMotion.run(&mut unit);
        assert!(unit.validate().is_ok());

        // the multiply moved into the entry block, before its branch
        let in_entry = unit
            .block(entry)
            .statements
            .iter()
            .any(|s| matches!(s.op, IrOp::Binary { .. }));
        let in_body = unit
            .block(body)
            .statements
            .iter()
            .any(|s| matches!(s.op, IrOp::Binary { .. }));
        assert!(in_entry);
        assert!(!in_body);
        assert!(matches!(
            unit.block(entry).terminator().map(|t| &t.op),
            Some(IrOp::Br { .. })
        ));
    }

    /// A value defined inside the loop pins its uses there.
    #[test]
    fn test_variant_operand_stays() {
        let mut unit = CodeUnit::new("t", vec![], false);
        let entry = unit.new_block("entry");
        let header = unit.new_block("header");
        let body = unit.new_block("body");
        let exit = unit.new_block("exit");
        unit.value_count = 6;

        unit.block_mut(entry).push(stmt(IrOp::Br { target: header }));
        unit.link(entry, header);

        let cond = IrValue::new(0);
        unit.block_mut(header).push(stmt(IrOp::LoadConst {
            dest: cond,
            value: Constant::Bool(true),
        }));
        unit.block_mut(header).push(stmt(IrOp::BrCond {
            condition: cond,
            on_true: body,
            on_false: exit,
        }));
        unit.link(header, body);
        unit.link(header, exit);

        // v1 = call; v2 = v1 + v1  (variant)
        let v1 = IrValue::new(1);
        unit.block_mut(body).push(stmt(IrOp::Call {
            dest: v1,
            target: cond,
            args: vec![],
        }));
        unit.block_mut(body).push(stmt(IrOp::Binary {
            dest: IrValue::new(2),
            op: BinaryIrOp::Add,
            left: v1,
            right: v1,
        }));
        unit.block_mut(body).push(stmt(IrOp::Br { target: header }));
        unit.link(body, header);

        unit.block_mut(exit).push(stmt(IrOp::LoadConst {
            dest: IrValue::new(3),
            value: Constant::None,
        }));
        unit.block_mut(exit).push(stmt(IrOp::Return {
            value: IrValue::new(3),
        }));

        LoopInvariantMotion.run(&mut unit);

        let in_body = unit
            .block(body)
            .statements
            .iter()
            .any(|s| matches!(s.op, IrOp::Binary { .. }));
        assert!(in_body);
    }
}
