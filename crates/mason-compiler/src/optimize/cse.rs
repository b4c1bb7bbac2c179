//! Common sub-expression elimination.
//!
//! Within each block, pure statements are hashed by opcode and operands;
//! a later equivalent statement is dropped and its result replaced by
//! the earlier one through the value replacer.

use rustc_hash::FxHashMap;

use crate::ir::{BinaryIrOp, CodeUnit, Constant, IrOp, IrValue, TestKind, UnaryIrOp};

use super::Pass;

pub struct CommonSubexpressionElimination;

/// Hashable identity of a pure statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CseKey {
    Const(Constant),
    Binary(BinaryIrOp, IrValue, IrValue),
    Unary(UnaryIrOp, IrValue),
    Test(TestKind, IrValue, IrValue),
}

fn key_of(op: &IrOp) -> Option<CseKey> {
    match op {
        IrOp::LoadConst { value, .. } => Some(CseKey::Const(value.clone())),
        IrOp::Binary {
            op, left, right, ..
        } => Some(CseKey::Binary(*op, *left, *right)),
        IrOp::Unary { op, value, .. } => Some(CseKey::Unary(*op, *value)),
        IrOp::Test {
            kind, left, right, ..
        } => Some(CseKey::Test(*kind, *left, *right)),
        _ => None,
    }
}

impl Pass for CommonSubexpressionElimination {
    fn name(&self) -> &'static str {
        "common-subexpression-elimination"
    }

    fn run(&self, unit: &mut CodeUnit) {
        // dropped duplicate dest -> surviving earlier dest
        let mut replacements: FxHashMap<IrValue, IrValue> = FxHashMap::default();

        for (_, block) in unit.blocks_mut() {
            let mut seen: FxHashMap<CseKey, IrValue> = FxHashMap::default();

            block.statements.retain(|statement| {
                if !statement.op.is_pure() {
                    return true;
                }
                let (Some(key), Some(dest)) = (key_of(&statement.op), statement.op.dest()) else {
                    return true;
                };

                match seen.get(&key) {
                    Some(&earlier) => {
                        replacements.insert(dest, earlier);
                        false
                    }
                    None => {
                        seen.insert(key, dest);
                        true
                    }
                }
            });
        }

        if replacements.is_empty() {
            return;
        }

        // Resolve chains (a -> b -> c) before substituting.
        let resolve = |mut value: IrValue, map: &FxHashMap<IrValue, IrValue>| {
            while let Some(&next) = map.get(&value) {
                value = next;
            }
            value
        };
        let resolved: Vec<(IrValue, IrValue)> = replacements
            .keys()
            .map(|&from| (from, resolve(from, &replacements)))
            .collect();

        for (_, block) in unit.blocks_mut() {
            for statement in &mut block.statements {
                for &(from, to) in &resolved {
                    statement.op.replace_value(from, to);
                }
            }
            // The rename state may still name dropped values.
            for value in block.defined.values_mut() {
                for &(from, to) in &resolved {
                    if *value == from {
                        *value = to;
                    }
                }
            }
            for value in block.consts.values_mut() {
                for &(from, to) in &resolved {
                    if *value == from {
                        *value = to;
                    }
                }
            }
        }
    }
}
