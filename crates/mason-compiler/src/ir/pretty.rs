//! Textual IR, used by the `dump-ir` option.
//!
//! One line per statement, prefixed by the block label on a header line;
//! opcode mnemonics are the uppercase names of the IR statement kinds.

use std::fmt::Write;

use mason_checker::SymbolArena;

use super::code::CodeUnit;
use super::instr::IrOp;
use super::value::IrValue;

/// Render one code unit.
pub fn dump_unit(unit: &CodeUnit, symbols: &SymbolArena) -> String {
    let mut out = String::new();

    let mut signature = String::new();
    for (index, &arg) in unit.args.iter().enumerate() {
        if index > 0 {
            signature.push_str(", ");
        }
        signature.push_str(&symbols.mangled_name(arg));
    }
    if unit.vararg {
        signature.push_str("...");
    }
    let _ = writeln!(out, "unit {}({}):", unit.name, signature);

    for (_, block) in unit.blocks() {
        let _ = writeln!(out, "{}:", block.label);
        for statement in &block.statements {
            let _ = writeln!(out, "  {}", format_op(unit, symbols, &statement.op));
        }
    }

    if !unit.handlers.is_empty() {
        let _ = writeln!(out, "handlers:");
        for info in &unit.handlers {
            let mut entries = String::new();
            for (index, handler) in info.handlers.iter().enumerate() {
                if index > 0 {
                    entries.push_str(", ");
                }
                let _ = write!(
                    entries,
                    "{} ({})",
                    unit.block(handler.block).label,
                    symbols.mangled_name(handler.symbol)
                );
            }
            let _ = writeln!(
                out,
                "  {} .. {} -> [{}]",
                unit.block(info.begin).label,
                unit.block(info.end).label,
                entries
            );
        }
    }

    out
}

/// Render a whole compilation's units.
pub fn dump_units(units: &[CodeUnit], symbols: &SymbolArena) -> String {
    let mut out = String::new();
    for (index, unit) in units.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&dump_unit(unit, symbols));
    }
    out
}

fn list(values: &[IrValue]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_op(unit: &CodeUnit, symbols: &SymbolArena, op: &IrOp) -> String {
    let label = |block: &super::block::BlockId| unit.block(*block).label.clone();

    match op {
        IrOp::LoadConst { dest, value } => format!("{} = LOADCONST {}", dest, value),
        IrOp::LoadSymbol { dest, symbol } => {
            format!("{} = LOADSYMBOL {}", dest, symbols.mangled_name(*symbol))
        }
        IrOp::StoreSymbol { symbol, value } => {
            format!("STORESYMBOL {}, {}", symbols.mangled_name(*symbol), value)
        }
        IrOp::DeclareSymbol { symbol, value } => {
            format!("DECLARESYMBOL {}, {}", symbols.mangled_name(*symbol), value)
        }
        IrOp::Binary {
            dest,
            op,
            left,
            right,
        } => format!("{} = {} {}, {}", dest, op.mnemonic(), left, right),
        IrOp::Inplace {
            dest,
            op,
            target,
            value,
        } => format!("{} = INPLACE{} {}, {}", dest, op.mnemonic(), target, value),
        IrOp::Unary { dest, op, value } => {
            format!("{} = {} {}", dest, op.mnemonic(), value)
        }
        IrOp::Defined { dest, symbol } => {
            format!("{} = DEFINED {}", dest, symbols.mangled_name(*symbol))
        }
        IrOp::Test {
            dest,
            kind,
            left,
            right,
        } => format!("{} = TEST '{}' {}, {}", dest, kind, left, right),
        IrOp::GetMember {
            dest,
            target,
            member,
        } => format!("{} = GETMEMBER {}, {}", dest, target, member),
        IrOp::GetSubscript {
            dest,
            target,
            index,
        } => format!("{} = GETSUBSCRIPT {}, {}", dest, target, index),
        IrOp::SetMember {
            target,
            member,
            value,
        } => format!("SETMEMBER {}, {}, {}", target, member, value),
        IrOp::SetSubscript {
            target,
            index,
            value,
        } => format!("SETSUBSCRIPT {}, {}, {}", target, index, value),
        IrOp::Call { dest, target, args } => {
            format!("{} = CALL {} ({})", dest, target, list(args))
        }
        IrOp::Invoke {
            dest,
            target,
            member,
            args,
        } => format!("{} = INVOKE {}.{} ({})", dest, target, member, list(args)),
        IrOp::Br { target } => format!("BR {}", label(target)),
        IrOp::BrCond {
            condition,
            on_true,
            on_false,
        } => format!("BRCOND {}, {}, {}", condition, label(on_true), label(on_false)),
        IrOp::JumpTable {
            condition,
            cases,
            default,
        } => {
            let mut entries = String::new();
            for (index, (value, block)) in cases.iter().enumerate() {
                if index > 0 {
                    entries.push_str(", ");
                }
                let _ = write!(entries, "{} => {}", value, label(block));
            }
            format!(
                "JUMPTABLE {}, [{}], default {}",
                condition,
                entries,
                label(default)
            )
        }
        IrOp::Return { value } => format!("RETURN {}", value),
        IrOp::Raise { value } => format!("RAISE {}", value),
        IrOp::Assert { condition, message } => match message {
            Some(message) => format!("ASSERT {}, {}", condition, message),
            None => format!("ASSERT {}", condition),
        },
        IrOp::Select { dest, operands } => format!("{} = SELECT {}", dest, list(operands)),
        IrOp::MakeList { dest, items } => format!("{} = MAKELIST [{}]", dest, list(items)),
        IrOp::MakeMap { dest, entries } => {
            let mut rendered = String::new();
            for (index, (key, value)) in entries.iter().enumerate() {
                if index > 0 {
                    rendered.push_str(", ");
                }
                let _ = write!(rendered, "{}: {}", key, value);
            }
            format!("{} = MAKEMAP {{{}}}", dest, rendered)
        }
        IrOp::MakeClosure {
            dest,
            unit: name,
            captures,
        } => format!("{} = MAKECLOSURE {} [{}]", dest, name, list(captures)),
        IrOp::Import { dest, path } => format!("{} = IMPORT {}", dest, path),
        IrOp::Export { symbol } => format!("EXPORT {}", symbols.mangled_name(*symbol)),
    }
}
