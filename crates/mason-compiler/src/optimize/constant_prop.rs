//! Constant propagation.
//!
//! Folds arithmetic over constant values and replaces `LoadSymbol` of
//! provably-constant symbols (declared once with a constant, never
//! stored again) with the folded constant. Constant knowledge is
//! per-block; back edges make cross-block propagation unsound here.

use rustc_hash::FxHashMap;

use mason_checker::SymbolId;

use crate::ir::{BinaryIrOp, CodeUnit, Constant, IrOp, IrValue, TestKind, UnaryIrOp};

use super::Pass;

pub struct ConstantPropagation;

impl Pass for ConstantPropagation {
    fn name(&self) -> &'static str {
        "constant-propagation"
    }

    fn run(&self, unit: &mut CodeUnit) {
        let const_symbols = collect_constant_symbols(unit);

        for (_, block) in unit.blocks_mut() {
            let mut known: FxHashMap<IrValue, Constant> = FxHashMap::default();

            for statement in &mut block.statements {
                match &statement.op {
                    IrOp::LoadConst { dest, value } => {
                        known.insert(*dest, value.clone());
                    }
                    IrOp::LoadSymbol { dest, symbol } => {
                        if let Some(value) = const_symbols.get(symbol) {
                            let dest = *dest;
                            known.insert(dest, value.clone());
                            statement.op = IrOp::LoadConst {
                                dest,
                                value: value.clone(),
                            };
                        }
                    }
                    IrOp::Binary {
                        dest,
                        op,
                        left,
                        right,
                    } => {
                        if let (Some(left), Some(right)) = (known.get(left), known.get(right)) {
                            if let Some(folded) = eval_binary(*op, left, right) {
                                let dest = *dest;
                                known.insert(dest, folded.clone());
                                statement.op = IrOp::LoadConst {
                                    dest,
                                    value: folded,
                                };
                            }
                        }
                    }
                    IrOp::Unary { dest, op, value } => {
                        if let Some(value) = known.get(value) {
                            if let Some(folded) = eval_unary(*op, value) {
                                let dest = *dest;
                                known.insert(dest, folded.clone());
                                statement.op = IrOp::LoadConst {
                                    dest,
                                    value: folded,
                                };
                            }
                        }
                    }
                    IrOp::Test {
                        dest,
                        kind,
                        left,
                        right,
                    } => {
                        if let (Some(left), Some(right)) = (known.get(left), known.get(right)) {
                            if let Some(folded) = eval_test(*kind, left, right) {
                                let dest = *dest;
                                known.insert(dest, Constant::Bool(folded));
                                statement.op = IrOp::LoadConst {
                                    dest,
                                    value: Constant::Bool(folded),
                                };
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Symbols declared exactly once with a constant and never stored again.
fn collect_constant_symbols(unit: &CodeUnit) -> FxHashMap<SymbolId, Constant> {
    let mut declared: FxHashMap<SymbolId, usize> = FxHashMap::default();
    let mut stored: FxHashMap<SymbolId, usize> = FxHashMap::default();
    let mut constants: FxHashMap<IrValue, Constant> = FxHashMap::default();
    let mut declared_value: FxHashMap<SymbolId, IrValue> = FxHashMap::default();

    for (_, block) in unit.blocks() {
        for statement in &block.statements {
            match &statement.op {
                IrOp::LoadConst { dest, value } => {
                    constants.insert(*dest, value.clone());
                }
                IrOp::DeclareSymbol { symbol, value } => {
                    *declared.entry(*symbol).or_insert(0) += 1;
                    declared_value.insert(*symbol, *value);
                }
                IrOp::StoreSymbol { symbol, .. } => {
                    *stored.entry(*symbol).or_insert(0) += 1;
                }
                _ => {}
            }
        }
    }

    declared
        .into_iter()
        .filter(|(symbol, count)| *count == 1 && !stored.contains_key(symbol))
        .filter_map(|(symbol, _)| {
            let value = declared_value.get(&symbol)?;
            let constant = constants.get(value)?;
            Some((symbol, constant.clone()))
        })
        .collect()
}

pub(crate) fn eval_binary(op: BinaryIrOp, left: &Constant, right: &Constant) -> Option<Constant> {
    use Constant::*;

    let result = match (op, left, right) {
        (BinaryIrOp::Add, Int(a), Int(b)) => Int(a.wrapping_add(*b)),
        (BinaryIrOp::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(*b)),
        (BinaryIrOp::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(*b)),
        (BinaryIrOp::Div, Int(a), Int(b)) if *b != 0 => Int(a.wrapping_div(*b)),
        (BinaryIrOp::Mod, Int(a), Int(b)) if *b != 0 => Int(a.wrapping_rem(*b)),
        (BinaryIrOp::Shl, Int(a), Int(b)) if (0..64).contains(b) => Int(a.wrapping_shl(*b as u32)),
        (BinaryIrOp::Shr, Int(a), Int(b)) if (0..64).contains(b) => Int(a.wrapping_shr(*b as u32)),
        (BinaryIrOp::And, Int(a), Int(b)) => Int(a & b),
        (BinaryIrOp::Or, Int(a), Int(b)) => Int(a | b),
        (BinaryIrOp::Xor, Int(a), Int(b)) => Int(a ^ b),

        (BinaryIrOp::Add, Float(a), Float(b)) => Float(a + b),
        (BinaryIrOp::Sub, Float(a), Float(b)) => Float(a - b),
        (BinaryIrOp::Mul, Float(a), Float(b)) => Float(a * b),
        (BinaryIrOp::Div, Float(a), Float(b)) if *b != 0.0 => Float(a / b),

        (BinaryIrOp::Add, String(a), String(b)) => String(format!("{}{}", a, b)),

        _ => return Option::None,
    };
    Some(result)
}

pub(crate) fn eval_unary(op: UnaryIrOp, value: &Constant) -> Option<Constant> {
    use Constant::*;

    let result = match (op, value) {
        (UnaryIrOp::Neg, Int(a)) => Int(a.wrapping_neg()),
        (UnaryIrOp::Neg, Float(a)) => Float(-a),
        (UnaryIrOp::Not, value) => Bool(!value.truthiness()?),
        (UnaryIrOp::BitNot, Int(a)) => Int(!a),
        _ => return Option::None,
    };
    Some(result)
}

pub(crate) fn eval_test(kind: TestKind, left: &Constant, right: &Constant) -> Option<bool> {
    use Constant::*;

    match kind {
        TestKind::Equal => Some(left == right),
        TestKind::NotEqual => Some(left != right),
        TestKind::Less | TestKind::LessOrEqual | TestKind::Greater | TestKind::GreaterOrEqual => {
            let ordering = match (left, right) {
                (Int(a), Int(b)) => a.partial_cmp(b),
                (Float(a), Float(b)) => a.partial_cmp(b),
                (String(a), String(b)) => a.partial_cmp(b),
                _ => Option::None,
            }?;
            Some(match kind {
                TestKind::Less => ordering.is_lt(),
                TestKind::LessOrEqual => ordering.is_le(),
                TestKind::Greater => ordering.is_gt(),
                TestKind::GreaterOrEqual => ordering.is_ge(),
                _ => unreachable!(),
            })
        }
        // Type and containment relations need runtime values.
        TestKind::Instance
        | TestKind::NotInstance
        | TestKind::Contains
        | TestKind::NotContains => Option::None,
    }
}
