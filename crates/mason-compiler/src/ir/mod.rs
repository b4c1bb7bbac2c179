//! SSA intermediate representation.

mod block;
mod code;
mod instr;
mod pretty;
mod value;

pub use block::{BasicBlock, BlockId};
pub use code::{CodeUnit, ExceptHandler, ExceptInfo, ValidateError};
pub use instr::{BinaryIrOp, IrOp, IrStatement, TestKind, UnaryIrOp};
pub use pretty::{dump_unit, dump_units};
pub use value::{Constant, IrValue};
