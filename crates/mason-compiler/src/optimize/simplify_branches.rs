//! Branch simplification.
//!
//! Rewrites conditional branches on known conditions to unconditional
//! ones, collapses branches whose arms agree, and folds `Select`s whose
//! operands are all the same value.

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, CodeUnit, Constant, IrOp, IrValue};

use super::Pass;

pub struct SimplifyBranches;

impl Pass for SimplifyBranches {
    fn name(&self) -> &'static str {
        "simplify-branches"
    }

    fn run(&self, unit: &mut CodeUnit) {
        let constants = collect_constants(unit);

        // BrCond(const, t, f) -> Br; BrCond(x, L, L) -> Br(L).
        let mut edge_fixes: Vec<(BlockId, BlockId)> = Vec::new();
        for (id, block) in unit.blocks_mut() {
            let Some(terminator) = block.terminator_mut() else {
                continue;
            };

            if let IrOp::BrCond {
                condition,
                on_true,
                on_false,
            } = terminator.op.clone()
            {
                let taken = if on_true == on_false {
                    Some(on_true)
                } else {
                    constants
                        .get(&condition)
                        .and_then(|constant| constant.truthiness())
                        .map(|truth| if truth { on_true } else { on_false })
                };

                if let Some(target) = taken {
                    terminator.op = IrOp::Br { target };
                    let dropped = if target == on_true { on_false } else { on_true };
                    if dropped != target {
                        edge_fixes.push((id, dropped));
                    }
                }
            }
        }
        for (from, dropped) in edge_fixes {
            unit.unlink(from, dropped);
        }

        // Select with all-equal operands forwards its operand.
        let mut replacements: FxHashMap<IrValue, IrValue> = FxHashMap::default();
        for (_, block) in unit.blocks_mut() {
            block.statements.retain(|statement| {
                if let IrOp::Select { dest, operands } = &statement.op {
                    if !operands.is_empty() && operands.iter().all(|v| *v == operands[0]) {
                        replacements.insert(*dest, operands[0]);
                        return false;
                    }
                }
                true
            });
        }

        if !replacements.is_empty() {
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
    }
}

fn collect_constants(unit: &CodeUnit) -> FxHashMap<IrValue, Constant> {
    let mut constants = FxHashMap::default();
    for (_, block) in unit.blocks() {
        for statement in &block.statements {
            if let IrOp::LoadConst { dest, value } = &statement.op {
                constants.insert(*dest, value.clone());
            }
        }
    }
    constants
}
