//! Expression lowering.
//!
//! Bottom-up and strictly SSA: every sub-expression produces one value
//! in the current block. Logical operators and conditional expressions
//! lower through control flow with a `Select` at the join; constants go
//! through the block's pool.

use mason_checker::symbols::SymbolKind;
use mason_parser::ast::*;
use mason_parser::source::SourcePosition;

use crate::ir::{BinaryIrOp, Constant, IrOp, IrValue, TestKind, UnaryIrOp};

use super::IrGenerator;

impl<'ast, 'ctx> IrGenerator<'ast, 'ctx> {
    pub(super) fn lower_expr(&mut self, expr: &'ast Expression) -> IrValue {
        match expr {
            Expression::Ternary(e) => self.lower_ternary(e),
            Expression::Binary(e) => self.lower_binary(e),
            Expression::Unary(e) => {
                let pos = self.pos(e.op_pos);
                let value = self.lower_expr(&e.operand);
                let op = match e.op {
                    UnaryOp::Not => UnaryIrOp::Not,
                    UnaryOp::Neg => UnaryIrOp::Neg,
                    UnaryOp::BitNot => UnaryIrOp::BitNot,
                };
                let dest = self.builder().new_value();
                self.builder().emit(pos, IrOp::Unary { dest, op, value });
                dest
            }
            Expression::Defined(e) => {
                let pos = self.pos(e.range.begin);
                let dest = self.builder().new_value();
                match self.analysis.symbol_of(e.id) {
                    Some(symbol) => {
                        self.builder().emit(pos, IrOp::Defined { dest, symbol });
                        dest
                    }
                    None => self.builder().load_const(pos, Constant::Bool(false)),
                }
            }
            Expression::Call(e) => {
                let pos = self.pos(e.range.begin);
                let target = self.lower_expr(&e.target);
                let args: Vec<IrValue> = e.args.iter().map(|arg| self.lower_expr(arg)).collect();
                let dest = self.builder().new_value();
                self.builder().emit(pos, IrOp::Call { dest, target, args });
                dest
            }
            Expression::Invoke(e) => {
                let pos = self.pos(e.range.begin);
                let target = self.lower_expr(&e.target);
                let args: Vec<IrValue> = e.args.iter().map(|arg| self.lower_expr(arg)).collect();
                let dest = self.builder().new_value();
                self.builder().emit(
                    pos,
                    IrOp::Invoke {
                        dest,
                        target,
                        member: e.member.name.clone(),
                        args,
                    },
                );
                dest
            }
            Expression::Member(e) => {
                let pos = self.pos(e.range.begin);
                let target = self.lower_expr(&e.target);
                let dest = self.builder().new_value();
                self.builder().emit(
                    pos,
                    IrOp::GetMember {
                        dest,
                        target,
                        member: e.member.name.clone(),
                    },
                );
                dest
            }
            Expression::Subscript(e) => {
                let pos = self.pos(e.range.begin);
                let target = self.lower_expr(&e.target);
                let index = self.lower_expr(&e.index);
                let dest = self.builder().new_value();
                self.builder().emit(
                    pos,
                    IrOp::GetSubscript {
                        dest,
                        target,
                        index,
                    },
                );
                dest
            }
            Expression::Literal(e) => {
                let pos = self.pos(e.range.begin);
                let constant = constant_of_literal(&e.value);
                self.builder().load_const(pos, constant)
            }
            Expression::InterpolatedString(e) => self.lower_interpolation(e),
            Expression::Name(e) => self.lower_name(e),
            Expression::SelfRef(range) => {
                let pos = self.pos(range.begin);
                self.read_self(pos)
            }
            Expression::SuperRef(range) => {
                let pos = self.pos(range.begin);
                match self.super_symbol {
                    Some(symbol) => self.builder().read_symbol(pos, symbol),
                    None => self.builder().load_const(pos, Constant::None),
                }
            }
            Expression::List(e) => {
                let pos = self.pos(e.range.begin);
                let items: Vec<IrValue> =
                    e.items.iter().map(|item| self.lower_expr(item)).collect();
                let dest = self.builder().new_value();
                self.builder().emit(pos, IrOp::MakeList { dest, items });
                dest
            }
            Expression::Map(e) => {
                let pos = self.pos(e.range.begin);
                let entries: Vec<(IrValue, IrValue)> = e
                    .entries
                    .iter()
                    .map(|(key, value)| {
                        let key = self.lower_expr(key);
                        let value = self.lower_expr(value);
                        (key, value)
                    })
                    .collect();
                let dest = self.builder().new_value();
                self.builder().emit(pos, IrOp::MakeMap { dest, entries });
                dest
            }
            Expression::Closure(e) => self.lower_closure(e),
            Expression::Paren(e) => self.lower_expr(&e.inner),
            Expression::Error(range) => {
                // Reported during parsing; keep the data flow alive.
                let pos = self.pos(range.begin);
                self.builder().load_const(pos, Constant::None)
            }
        }
    }

    fn lower_name(&mut self, name: &NameExpr) -> IrValue {
        let pos = self.pos(name.name.range.begin);
        let Some(symbol) = self.analysis.symbol_of(name.id) else {
            return self.builder().load_const(pos, Constant::None);
        };

        match self.analysis.symbols.get(symbol).kind {
            // Unqualified member access inside a method body.
            SymbolKind::Field { .. } | SymbolKind::Property { .. } | SymbolKind::Method { .. } => {
                let target = self.read_self(pos);
                let dest = self.builder().new_value();
                self.builder().emit(
                    pos,
                    IrOp::GetMember {
                        dest,
                        target,
                        member: name.name.name.clone(),
                    },
                );
                dest
            }
            _ => self.builder().read_symbol(pos, symbol),
        }
    }

    fn lower_ternary(&mut self, expr: &'ast TernaryExpr) -> IrValue {
        let pos = self.pos(expr.range.begin);
        let condition = self.lower_expr(&expr.condition);

        let then_label = self.fresh_label("sel.then");
        let else_label = self.fresh_label("sel.else");
        let join_label = self.fresh_label("sel.join");
        let then_block = self.builder().new_block(then_label);
        let else_block = self.builder().new_block(else_label);
        let join = self.builder().new_block(join_label);

        self.builder().branch_cond(pos, condition, then_block, else_block);

        self.builder().set_current(then_block);
        self.builder().seal_merge(then_block, pos);
        let on_true = self.lower_expr(&expr.on_true);
        let true_exit_terminated = self.builder().is_terminated();
        if !true_exit_terminated {
            self.builder().branch(pos, join);
        }

        self.builder().set_current(else_block);
        self.builder().seal_merge(else_block, pos);
        let on_false = self.lower_expr(&expr.on_false);
        if !self.builder().is_terminated() {
            self.builder().branch(pos, join);
        }

        self.builder().set_current(join);
        self.builder().seal_merge(join, pos);

        if on_true == on_false {
            return on_true;
        }
        let dest = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Select {
                dest,
                operands: vec![on_true, on_false],
            },
        );
        dest
    }

    fn lower_binary(&mut self, expr: &'ast BinaryExpr) -> IrValue {
        let pos = self.pos(expr.op_pos);

        // Logical operators are short-circuiting control flow, not IR
        // binary ops.
        match expr.op {
            BinaryOp::LogicalAnd => return self.lower_logical(expr, true, pos),
            BinaryOp::LogicalOr => return self.lower_logical(expr, false, pos),
            _ => {}
        }

        let left = self.lower_expr(&expr.left);
        let right = self.lower_expr(&expr.right);

        if let Some(kind) = test_kind(expr.op) {
            let dest = self.builder().new_value();
            self.builder().emit(
                pos,
                IrOp::Test {
                    dest,
                    kind,
                    left,
                    right,
                },
            );
            return dest;
        }

        let op = match expr.op {
            BinaryOp::Add => BinaryIrOp::Add,
            BinaryOp::Sub => BinaryIrOp::Sub,
            BinaryOp::Mul => BinaryIrOp::Mul,
            BinaryOp::Div => BinaryIrOp::Div,
            BinaryOp::Mod => BinaryIrOp::Mod,
            BinaryOp::LeftShift => BinaryIrOp::Shl,
            BinaryOp::RightShift => BinaryIrOp::Shr,
            BinaryOp::BitAnd => BinaryIrOp::And,
            BinaryOp::BitOr => BinaryIrOp::Or,
            BinaryOp::BitXor => BinaryIrOp::Xor,
            _ => unreachable!("logical and comparison operators handled above"),
        };

        let dest = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Binary {
                dest,
                op,
                left,
                right,
            },
        );
        dest
    }

    /// `a and b` / `a or b` with a `Select` joining the short-circuit
    /// edge and the evaluated right-hand side.
    fn lower_logical(&mut self, expr: &'ast BinaryExpr, is_and: bool, pos: SourcePosition) -> IrValue {
        let left = self.lower_expr(&expr.left);

        let rhs_label = self.fresh_label(if is_and { "and.rhs" } else { "or.rhs" });
        let join_label = self.fresh_label(if is_and { "and.join" } else { "or.join" });
        let rhs = self.builder().new_block(rhs_label);
        let join = self.builder().new_block(join_label);

        if is_and {
            self.builder().branch_cond(pos, left, rhs, join);
        } else {
            self.builder().branch_cond(pos, left, join, rhs);
        }

        self.builder().set_current(rhs);
        self.builder().seal_merge(rhs, pos);
        let right = self.lower_expr(&expr.right);
        if !self.builder().is_terminated() {
            self.builder().branch(pos, join);
        }

        self.builder().set_current(join);
        self.builder().seal_merge(join, pos);

        let dest = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Select {
                dest,
                operands: vec![left, right],
            },
        );
        dest
    }

    /// Interpolated strings fold their pieces left to right with string
    /// concatenation.
    fn lower_interpolation(&mut self, expr: &'ast InterpolatedStringExpr) -> IrValue {
        let pos = self.pos(expr.range.begin);

        let mut accumulator: Option<IrValue> = None;
        for part in &expr.parts {
            let piece = match part {
                StringPart::Text(text) => self
                    .builder()
                    .load_const(pos, Constant::String(text.clone())),
                StringPart::Expr(expr) => self.lower_expr(expr),
            };

            accumulator = Some(match accumulator {
                None => piece,
                Some(current) => {
                    let dest = self.builder().new_value();
                    self.builder().emit(
                        pos,
                        IrOp::Binary {
                            dest,
                            op: BinaryIrOp::Add,
                            left: current,
                            right: piece,
                        },
                    );
                    dest
                }
            });
        }

        match accumulator {
            Some(value) => value,
            None => self
                .builder()
                .load_const(pos, Constant::String(String::new())),
        }
    }

    fn lower_closure(&mut self, expr: &'ast ClosureExpr) -> IrValue {
        let pos = self.pos(expr.range.begin);
        let Some(symbol) = self.analysis.symbol_of(expr.id) else {
            return self.builder().load_const(pos, Constant::None);
        };

        let name = self.analysis.symbols.get(symbol).name.clone();
        let captures = self.analysis.captures_of(expr.id).to_vec();

        // The inner unit receives the declared parameters first, then
        // one captured argument per bounded local.
        let mut args = Vec::new();
        for param in &expr.params.params {
            if let Some(param_symbol) = self.analysis.symbol_of(param.id) {
                args.push(param_symbol);
            }
        }
        for capture in &captures {
            args.push(capture.bounded);
        }

        self.push_builder(name.clone(), args, expr.params.is_vararg());
        self.lower_unit_body(&expr.body);
        self.pop_builder();

        // Capture reads happen at the creation site, in capture order.
        let capture_values: Vec<IrValue> = captures
            .iter()
            .map(|capture| self.builder().read_symbol(pos, capture.original))
            .collect();

        let dest = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::MakeClosure {
                dest,
                unit: name,
                captures: capture_values,
            },
        );
        dest
    }
}

fn constant_of_literal(literal: &Literal) -> Constant {
    match literal {
        Literal::Integer(value) => Constant::Int(*value),
        Literal::Float(value) => Constant::Float(*value),
        Literal::String(value) => Constant::String(value.clone()),
        Literal::True => Constant::Bool(true),
        Literal::False => Constant::Bool(false),
        Literal::None => Constant::None,
    }
}

fn test_kind(op: BinaryOp) -> Option<TestKind> {
    let kind = match op {
        BinaryOp::Equal => TestKind::Equal,
        BinaryOp::NotEqual => TestKind::NotEqual,
        BinaryOp::Less => TestKind::Less,
        BinaryOp::LessOrEqual => TestKind::LessOrEqual,
        BinaryOp::Greater => TestKind::Greater,
        BinaryOp::GreaterOrEqual => TestKind::GreaterOrEqual,
        BinaryOp::Is => TestKind::Instance,
        BinaryOp::IsNot => TestKind::NotInstance,
        BinaryOp::In => TestKind::Contains,
        BinaryOp::NotIn => TestKind::NotContains,
        _ => return None,
    };
    Some(kind)
}
