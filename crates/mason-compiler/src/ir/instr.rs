//! IR statements.
//!
//! One closed union covers every opcode with its exact operand layout;
//! the helpers at the bottom (`dest`, `operands`, `replace_value`,
//! `retarget`) are written as exhaustive matches so adding an opcode
//! forces every pass to be revisited.

use std::fmt;

use mason_checker::SymbolId;
use mason_parser::source::SourcePosition;

use super::block::BlockId;
use super::value::{Constant, IrValue};

/// Arithmetic and bitwise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryIrOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinaryIrOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryIrOp::Add => "ADD",
            BinaryIrOp::Sub => "SUB",
            BinaryIrOp::Mul => "MUL",
            BinaryIrOp::Div => "DIV",
            BinaryIrOp::Mod => "MOD",
            BinaryIrOp::Shl => "SHL",
            BinaryIrOp::Shr => "SHR",
            BinaryIrOp::And => "AND",
            BinaryIrOp::Or => "OR",
            BinaryIrOp::Xor => "XOR",
        }
    }
}

/// Unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryIrOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryIrOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryIrOp::Neg => "NEG",
            UnaryIrOp::Not => "NOT",
            UnaryIrOp::BitNot => "BITNOT",
        }
    }
}

/// Relation tested by a `Test` statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestKind {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    Instance,
    NotInstance,
    Contains,
    NotContains,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TestKind::Greater => ">",
            TestKind::GreaterOrEqual => ">=",
            TestKind::Less => "<",
            TestKind::LessOrEqual => "<=",
            TestKind::Equal => "==",
            TestKind::NotEqual => "!=",
            TestKind::Instance => "is",
            TestKind::NotInstance => "is not",
            TestKind::Contains => "in",
            TestKind::NotContains => "not in",
        };
        f.write_str(text)
    }
}

/// An opcode with its operands.
#[derive(Debug, Clone, PartialEq)]
pub enum IrOp {
    LoadConst {
        dest: IrValue,
        value: Constant,
    },
    LoadSymbol {
        dest: IrValue,
        symbol: SymbolId,
    },
    StoreSymbol {
        symbol: SymbolId,
        value: IrValue,
    },
    DeclareSymbol {
        symbol: SymbolId,
        value: IrValue,
    },
    Binary {
        dest: IrValue,
        op: BinaryIrOp,
        left: IrValue,
        right: IrValue,
    },
    /// Compound-assignment form of a binary operation.
    Inplace {
        dest: IrValue,
        op: BinaryIrOp,
        target: IrValue,
        value: IrValue,
    },
    Unary {
        dest: IrValue,
        op: UnaryIrOp,
        value: IrValue,
    },
    Defined {
        dest: IrValue,
        symbol: SymbolId,
    },
    Test {
        dest: IrValue,
        kind: TestKind,
        left: IrValue,
        right: IrValue,
    },
    GetMember {
        dest: IrValue,
        target: IrValue,
        member: String,
    },
    GetSubscript {
        dest: IrValue,
        target: IrValue,
        index: IrValue,
    },
    SetMember {
        target: IrValue,
        member: String,
        value: IrValue,
    },
    SetSubscript {
        target: IrValue,
        index: IrValue,
        value: IrValue,
    },
    Call {
        dest: IrValue,
        target: IrValue,
        args: Vec<IrValue>,
    },
    Invoke {
        dest: IrValue,
        target: IrValue,
        member: String,
        args: Vec<IrValue>,
    },
    Br {
        target: BlockId,
    },
    BrCond {
        condition: IrValue,
        on_true: BlockId,
        on_false: BlockId,
    },
    JumpTable {
        condition: IrValue,
        cases: Vec<(Constant, BlockId)>,
        default: BlockId,
    },
    Return {
        value: IrValue,
    },
    Raise {
        value: IrValue,
    },
    Assert {
        condition: IrValue,
        message: Option<IrValue>,
    },
    /// Chooses among the incoming values at a merge block.
    Select {
        dest: IrValue,
        operands: Vec<IrValue>,
    },
    MakeList {
        dest: IrValue,
        items: Vec<IrValue>,
    },
    MakeMap {
        dest: IrValue,
        entries: Vec<(IrValue, IrValue)>,
    },
    MakeClosure {
        dest: IrValue,
        unit: String,
        captures: Vec<IrValue>,
    },
    Import {
        dest: IrValue,
        path: IrValue,
    },
    Export {
        symbol: SymbolId,
    },
}

/// One IR statement: an opcode at a source position.
#[derive(Debug, Clone, PartialEq)]
pub struct IrStatement {
    pub op: IrOp,
    pub pos: SourcePosition,
}

impl IrStatement {
    pub fn new(op: IrOp, pos: SourcePosition) -> Self {
        Self { op, pos }
    }
}

impl IrOp {
    /// The assigned value, for assign-producing statements.
    pub fn dest(&self) -> Option<IrValue> {
        match self {
            IrOp::LoadConst { dest, .. }
            | IrOp::LoadSymbol { dest, .. }
            | IrOp::Binary { dest, .. }
            | IrOp::Inplace { dest, .. }
            | IrOp::Unary { dest, .. }
            | IrOp::Defined { dest, .. }
            | IrOp::Test { dest, .. }
            | IrOp::GetMember { dest, .. }
            | IrOp::GetSubscript { dest, .. }
            | IrOp::Call { dest, .. }
            | IrOp::Invoke { dest, .. }
            | IrOp::Select { dest, .. }
            | IrOp::MakeList { dest, .. }
            | IrOp::MakeMap { dest, .. }
            | IrOp::MakeClosure { dest, .. }
            | IrOp::Import { dest, .. } => Some(*dest),
            IrOp::StoreSymbol { .. }
            | IrOp::DeclareSymbol { .. }
            | IrOp::SetMember { .. }
            | IrOp::SetSubscript { .. }
            | IrOp::Br { .. }
            | IrOp::BrCond { .. }
            | IrOp::JumpTable { .. }
            | IrOp::Return { .. }
            | IrOp::Raise { .. }
            | IrOp::Assert { .. }
            | IrOp::Export { .. } => None,
        }
    }

    /// Whether this statement ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            IrOp::Br { .. }
                | IrOp::BrCond { .. }
                | IrOp::JumpTable { .. }
                | IrOp::Return { .. }
                | IrOp::Raise { .. }
        )
    }

    /// Whether the statement has no effect beyond its result.
    pub fn is_pure(&self) -> bool {
        matches!(
            self,
            IrOp::LoadConst { .. }
                | IrOp::Binary { .. }
                | IrOp::Unary { .. }
                | IrOp::Test { .. }
        )
    }

    /// Every value read by this statement.
    pub fn operands(&self) -> Vec<IrValue> {
        match self {
            IrOp::LoadConst { .. }
            | IrOp::LoadSymbol { .. }
            | IrOp::Defined { .. }
            | IrOp::Br { .. }
            | IrOp::Export { .. } => Vec::new(),
            IrOp::StoreSymbol { value, .. } | IrOp::DeclareSymbol { value, .. } => vec![*value],
            IrOp::Binary { left, right, .. } | IrOp::Test { left, right, .. } => {
                vec![*left, *right]
            }
            IrOp::Inplace { target, value, .. } => vec![*target, *value],
            IrOp::Unary { value, .. } => vec![*value],
            IrOp::GetMember { target, .. } => vec![*target],
            IrOp::GetSubscript { target, index, .. } => vec![*target, *index],
            IrOp::SetMember { target, value, .. } => vec![*target, *value],
            IrOp::SetSubscript {
                target,
                index,
                value,
            } => vec![*target, *index, *value],
            IrOp::Call { target, args, .. } => {
                let mut operands = vec![*target];
                operands.extend(args.iter().copied());
                operands
            }
            IrOp::Invoke { target, args, .. } => {
                let mut operands = vec![*target];
                operands.extend(args.iter().copied());
                operands
            }
            IrOp::BrCond { condition, .. } | IrOp::JumpTable { condition, .. } => {
                vec![*condition]
            }
            IrOp::Return { value } | IrOp::Raise { value } => vec![*value],
            IrOp::Assert { condition, message } => {
                let mut operands = vec![*condition];
                operands.extend(message.iter().copied());
                operands
            }
            IrOp::Select { operands, .. } => operands.clone(),
            IrOp::MakeList { items, .. } => items.clone(),
            IrOp::MakeMap { entries, .. } => entries
                .iter()
                .flat_map(|(key, value)| [*key, *value])
                .collect(),
            IrOp::MakeClosure { captures, .. } => captures.clone(),
            IrOp::Import { path, .. } => vec![*path],
        }
    }

    /// Substitute `from` with `to` in every operand field. Destinations
    /// are never rewritten.
    pub fn replace_value(&mut self, from: IrValue, to: IrValue) {
        let replace = |slot: &mut IrValue| {
            if *slot == from {
                *slot = to;
            }
        };

        match self {
            IrOp::LoadConst { .. }
            | IrOp::LoadSymbol { .. }
            | IrOp::Defined { .. }
            | IrOp::Br { .. }
            | IrOp::Export { .. } => {}
            IrOp::StoreSymbol { value, .. } | IrOp::DeclareSymbol { value, .. } => replace(value),
            IrOp::Binary { left, right, .. } | IrOp::Test { left, right, .. } => {
                replace(left);
                replace(right);
            }
            IrOp::Inplace { target, value, .. } => {
                replace(target);
                replace(value);
            }
            IrOp::Unary { value, .. } => replace(value),
            IrOp::GetMember { target, .. } => replace(target),
            IrOp::GetSubscript { target, index, .. } => {
                replace(target);
                replace(index);
            }
            IrOp::SetMember { target, value, .. } => {
                replace(target);
                replace(value);
            }
            IrOp::SetSubscript {
                target,
                index,
                value,
            } => {
                replace(target);
                replace(index);
                replace(value);
            }
            IrOp::Call { target, args, .. } | IrOp::Invoke { target, args, .. } => {
                replace(target);
                for arg in args {
                    replace(arg);
                }
            }
            IrOp::BrCond { condition, .. } | IrOp::JumpTable { condition, .. } => {
                replace(condition)
            }
            IrOp::Return { value } | IrOp::Raise { value } => replace(value),
            IrOp::Assert { condition, message } => {
                replace(condition);
                if let Some(message) = message {
                    replace(message);
                }
            }
            IrOp::Select { operands, .. } => {
                for operand in operands {
                    replace(operand);
                }
            }
            IrOp::MakeList { items, .. } => {
                for item in items {
                    replace(item);
                }
            }
            IrOp::MakeMap { entries, .. } => {
                for (key, value) in entries {
                    replace(key);
                    replace(value);
                }
            }
            IrOp::MakeClosure { captures, .. } => {
                for capture in captures {
                    replace(capture);
                }
            }
            IrOp::Import { path, .. } => replace(path),
        }
    }

    /// Blocks this terminator may transfer control to.
    pub fn branch_targets(&self) -> Vec<BlockId> {
        match self {
            IrOp::Br { target } => vec![*target],
            IrOp::BrCond {
                on_true, on_false, ..
            } => vec![*on_true, *on_false],
            IrOp::JumpTable { cases, default, .. } => {
                let mut targets: Vec<_> = cases.iter().map(|(_, block)| *block).collect();
                targets.push(*default);
                targets
            }
            _ => Vec::new(),
        }
    }

    /// Re-point every branch edge from `from` to `to`.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            IrOp::Br { target } => {
                if *target == from {
                    *target = to;
                }
            }
            IrOp::BrCond {
                on_true, on_false, ..
            } => {
                if *on_true == from {
                    *on_true = to;
                }
                if *on_false == from {
                    *on_false = to;
                }
            }
            IrOp::JumpTable { cases, default, .. } => {
                for (_, block) in cases {
                    if *block == from {
                        *block = to;
                    }
                }
                if *default == from {
                    *default = to;
                }
            }
            _ => {}
        }
    }
}
