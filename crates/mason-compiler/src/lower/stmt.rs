//! Statement and declaration lowering.

use mason_checker::symbols::SymbolKind;
use mason_parser::ast::*;
use mason_parser::source::SourcePosition;

use crate::ir::{BinaryIrOp, Constant, ExceptHandler, ExceptInfo, IrOp, IrValue, TestKind};

use super::{FinallyKind, IrGenerator, LoopInfo};

impl<'ast, 'ctx> IrGenerator<'ast, 'ctx> {
    pub(super) fn lower_members(&mut self, members: &'ast [Node]) {
        for member in members {
            self.lower_node(member);
        }
    }

    fn lower_node(&mut self, node: &'ast Node) {
        match node {
            Node::Decl(decl) => self.lower_decl(decl),
            Node::Stmt(stmt) => self.lower_stmt(stmt),
        }
    }

    /// Lower a statement body: block bodies inline their members, arrow
    /// bodies evaluate and discard.
    pub(super) fn lower_stmt_body(&mut self, body: &'ast Body) {
        match body {
            Body::Block(block) => self.lower_members(&block.members),
            Body::Arrow(_, expr) => {
                let _ = self.lower_expr(expr);
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn lower_decl(&mut self, decl: &'ast Declaration) {
        match decl {
            Declaration::Import(import) => {
                let pos = self.pos(import.range.begin);
                let path = self.lower_expr(&import.path);
                let dest = self.builder().new_value();
                self.builder().emit(pos, IrOp::Import { dest, path });

                if import.alias.is_some() {
                    if let Some(symbol) = self.analysis.symbol_of(import.id) {
                        self.builder().write_symbol(pos, symbol, dest, true);
                    }
                }
            }
            Declaration::Export(export) => {
                let pos = self.pos(export.range.begin);
                let value = match &export.value {
                    Some(value) => self.lower_expr(value),
                    None => self.builder().load_const(pos, Constant::None),
                };
                if let Some(symbol) = self.analysis.symbol_of(export.id) {
                    self.builder().write_symbol(pos, symbol, value, true);
                    self.builder().emit(pos, IrOp::Export { symbol });
                }
            }
            Declaration::Function(func) => self.lower_function(func),
            Declaration::Class(class) => self.lower_class(class),
            Declaration::Task(task) => self.lower_task(task),
            Declaration::Variable(var) => self.lower_variable(var),
            Declaration::Error(_) => {}
        }
    }

    fn lower_variable(&mut self, var: &'ast VariableDecl) {
        let pos = self.pos(var.range.begin);
        let value = self.lower_expr(&var.value);
        if let Some(symbol) = self.analysis.symbol_of(var.id) {
            self.builder().write_symbol(pos, symbol, value, true);
        }
    }

    fn lower_function(&mut self, func: &'ast FunctionDecl) {
        let Some(symbol) = self.analysis.symbol_of(func.id) else {
            return;
        };
        let name = self.analysis.symbols.mangled_name(symbol);
        let args = self.param_symbols(&func.params);

        self.push_builder(name, args, func.params.is_vararg());
        self.lower_unit_body(&func.body);
        self.pop_builder();
    }

    fn param_symbols(&mut self, params: &ParameterList) -> Vec<mason_checker::SymbolId> {
        params
            .params
            .iter()
            .filter_map(|param| self.analysis.symbol_of(param.id))
            .collect()
    }

    fn lower_class(&mut self, class: &'ast ClassDecl) {
        let instance_fields: Vec<&'ast FieldDecl> = class
            .members
            .iter()
            .filter_map(|member| match member {
                ClassMember::Field(field)
                    if !field.modifiers.is_static && field.value.is_some() =>
                {
                    Some(field.as_ref())
                }
                _ => None,
            })
            .collect();

        let mut has_init = false;
        for member in &class.members {
            match member {
                ClassMember::Init(init) => {
                    has_init = true;
                    self.lower_initializer(init, &instance_fields);
                }
                ClassMember::Deinit(deinit) => {
                    let Some(symbol) = self.analysis.symbol_of(deinit.id) else {
                        continue;
                    };
                    let name = self.analysis.symbols.mangled_name(symbol);
                    let self_symbol = self.analysis.selfs.get(&deinit.id).copied();
                    let super_symbol = self.analysis.supers.get(&deinit.id).copied();

                    self.push_builder(name, self_symbol.into_iter().collect(), false);
                    self.self_symbol = self_symbol;
                    self.super_symbol = super_symbol;
                    self.lower_unit_body(&deinit.body);
                    self.pop_builder();
                }
                ClassMember::Method(method) => {
                    let Some(symbol) = self.analysis.symbol_of(method.id) else {
                        continue;
                    };
                    let name = self.analysis.symbols.mangled_name(symbol);
                    let self_symbol = self.analysis.selfs.get(&method.id).copied();
                    let super_symbol = self.analysis.supers.get(&method.id).copied();

                    let mut args: Vec<_> = self_symbol.into_iter().collect();
                    args.extend(self.param_symbols(&method.params));

                    self.push_builder(name, args, method.params.is_vararg());
                    self.self_symbol = self_symbol;
                    self.super_symbol = super_symbol;
                    self.lower_unit_body(&method.body);
                    self.pop_builder();
                }
                ClassMember::Property(property) => {
                    let Some(symbol) = self.analysis.symbol_of(property.id) else {
                        continue;
                    };
                    let suffix = if property.is_getter { "$get" } else { "$set" };
                    let name = format!("{}{}", self.analysis.symbols.mangled_name(symbol), suffix);
                    let self_symbol = self.analysis.selfs.get(&property.id).copied();
                    let super_symbol = self.analysis.supers.get(&property.id).copied();

                    let mut args: Vec<_> = self_symbol.into_iter().collect();
                    args.extend(self.param_symbols(&property.params));

                    self.push_builder(name, args, false);
                    self.self_symbol = self_symbol;
                    self.super_symbol = super_symbol;
                    self.lower_unit_body(&property.body);
                    self.pop_builder();
                }
                ClassMember::Field(_) | ClassMember::Error(_) => {}
            }
        }

        // A class without an initializer still needs one when instance
        // fields carry initial values.
        if !has_init && !instance_fields.is_empty() {
            let name = format!("{}::init$0", class.name.name);
            let self_symbol = self.synth_self_symbol(class.range.begin);

            self.push_builder(name, vec![self_symbol], false);
            self.self_symbol = Some(self_symbol);
            self.lower_field_prologue(&instance_fields);
            let pos = SourcePosition::invalid();
            let none = self.builder().load_const(pos, Constant::None);
            self.builder().ret(pos, none);
            self.pop_builder();
        }

        // Static class initializer.
        if let Some(&class_init) = self.analysis.class_inits.get(&class.id) {
            let name = self.analysis.symbols.mangled_name(class_init);
            let class_symbol = self.analysis.symbol_of(class.id);

            self.push_builder(name, Vec::new(), false);
            for member in &class.members {
                if let ClassMember::Field(field) = member {
                    if field.modifiers.is_static {
                        if let Some(value) = &field.value {
                            let pos = self.pos(field.range.begin);
                            let initial = self.lower_expr(value);
                            if let Some(class_symbol) = class_symbol {
                                let target = self.builder().read_symbol(pos, class_symbol);
                                self.builder().emit(
                                    pos,
                                    IrOp::SetMember {
                                        target,
                                        member: field.name.name.clone(),
                                        value: initial,
                                    },
                                );
                            }
                        }
                    }
                }
            }
            let pos = SourcePosition::invalid();
            let none = self.builder().load_const(pos, Constant::None);
            self.builder().ret(pos, none);
            self.pop_builder();
        }
    }

    fn lower_initializer(&mut self, init: &'ast InitDecl, fields: &[&'ast FieldDecl]) {
        let Some(symbol) = self.analysis.symbol_of(init.id) else {
            return;
        };
        let name = self.analysis.symbols.mangled_name(symbol);
        let self_symbol = self.analysis.selfs.get(&init.id).copied();
        let super_symbol = self.analysis.supers.get(&init.id).copied();

        let mut args: Vec<_> = self_symbol.into_iter().collect();
        args.extend(self.param_symbols(&init.params));

        self.push_builder(name, args, init.params.is_vararg());
        self.self_symbol = self_symbol;
        self.super_symbol = super_symbol;
        self.lower_field_prologue(fields);
        self.lower_unit_body(&init.body);
        self.pop_builder();
    }

    /// Evaluate instance field initializers at the top of an init unit.
    fn lower_field_prologue(&mut self, fields: &[&'ast FieldDecl]) {
        for &field in fields {
            let Some(value) = &field.value else { continue };
            let pos = self.pos(field.range.begin);
            let initial = self.lower_expr(value);
            let target = self.read_self(pos);
            self.builder().emit(
                pos,
                IrOp::SetMember {
                    target,
                    member: field.name.name.clone(),
                    value: initial,
                },
            );
        }
    }

    /// A task declaration configures the task object in the enclosing
    /// unit; its actions compile as separate units.
    fn lower_task(&mut self, task: &'ast TaskDecl) {
        let pos = self.pos(task.range.begin);
        let task_symbol = self.analysis.symbol_of(task.id);

        let target = match task_symbol {
            Some(symbol) => self.builder().read_symbol(pos, symbol),
            None => self.builder().load_const(pos, Constant::None),
        };

        for depend in &task.depends {
            let name = self
                .builder()
                .load_const(pos, Constant::String(depend.name.clone()));
            let dest = self.builder().new_value();
            self.builder().emit(
                pos,
                IrOp::Invoke {
                    dest,
                    target,
                    member: "dependsOn".to_string(),
                    args: vec![name],
                },
            );
        }

        for member in &task.members {
            match member {
                TaskMember::Inputs(range, exprs) | TaskMember::Outputs(range, exprs) => {
                    let member_name = match member {
                        TaskMember::Inputs(..) => "inputs",
                        _ => "outputs",
                    };
                    let pos = self.pos(range.begin);
                    let args: Vec<IrValue> =
                        exprs.iter().map(|expr| self.lower_expr(expr)).collect();
                    let dest = self.builder().new_value();
                    self.builder().emit(
                        pos,
                        IrOp::Invoke {
                            dest,
                            target,
                            member: member_name.to_string(),
                            args,
                        },
                    );
                }
                TaskMember::Variable(var) => {
                    let pos = self.pos(var.range.begin);
                    let value = self.lower_expr(&var.value);
                    self.builder().emit(
                        pos,
                        IrOp::SetMember {
                            target,
                            member: var.name.name.clone(),
                            value,
                        },
                    );
                }
                TaskMember::Action(action) => {
                    let Some(symbol) = self.analysis.symbol_of(action.id) else {
                        continue;
                    };
                    let name = self.analysis.symbols.mangled_name(symbol);
                    let self_symbol = self.analysis.selfs.get(&action.id).copied();
                    let super_symbol = self.analysis.supers.get(&action.id).copied();

                    self.push_builder(name, self_symbol.into_iter().collect(), false);
                    self.self_symbol = self_symbol;
                    self.super_symbol = super_symbol;
                    self.lower_unit_body(&action.body);
                    self.pop_builder();
                }
                TaskMember::Error(_) => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn lower_stmt(&mut self, stmt: &'ast Statement) {
        match stmt {
            Statement::Block(block) => self.lower_members(&block.members),
            Statement::If(stmt) => self.lower_if(stmt),
            Statement::Match(stmt) => self.lower_match(stmt),
            Statement::For(stmt) => self.lower_for(stmt),
            Statement::While(stmt) => self.lower_while(stmt),
            Statement::Try(stmt) => self.lower_try(stmt),
            Statement::With(stmt) => self.lower_with(stmt),
            Statement::Break(stmt) => {
                let pos = self.pos(stmt.range.begin);
                if let Some(info) = self.loops.last().copied() {
                    self.run_finallys_from(info.finally_depth);
                    if !self.builder().is_terminated() {
                        self.builder().branch(pos, info.break_to);
                    }
                    let label = self.fresh_label("after.break");
                    let dead = self.builder().new_block(label);
                    self.builder().set_current(dead);
                }
            }
            Statement::Continue(stmt) => {
                let pos = self.pos(stmt.range.begin);
                if let Some(info) = self.loops.last().copied() {
                    self.run_finallys_from(info.finally_depth);
                    if !self.builder().is_terminated() {
                        self.builder().branch(pos, info.continue_to);
                    }
                    let label = self.fresh_label("after.continue");
                    let dead = self.builder().new_block(label);
                    self.builder().set_current(dead);
                }
            }
            Statement::Return(stmt) => {
                let pos = self.pos(stmt.range.begin);
                let value = match &stmt.value {
                    Some(value) => self.lower_expr(value),
                    None => self.builder().load_const(pos, Constant::None),
                };
                self.run_finallys_from(0);
                if !self.builder().is_terminated() {
                    self.builder().ret(pos, value);
                }
                let label = self.fresh_label("after.return");
                let dead = self.builder().new_block(label);
                self.builder().set_current(dead);
            }
            Statement::Raise(stmt) => {
                let pos = self.pos(stmt.range.begin);
                let value = match &stmt.value {
                    Some(value) => self.lower_expr(value),
                    // A bare raise re-raises the exception the enclosing
                    // except body caught.
                    None => match self.exception_symbol {
                        Some(symbol) => self.builder().read_symbol(pos, symbol),
                        None => self.builder().load_const(pos, Constant::None),
                    },
                };
                self.builder().raise(pos, value);
                let label = self.fresh_label("after.raise");
                let dead = self.builder().new_block(label);
                self.builder().set_current(dead);
            }
            Statement::Assert(stmt) => {
                let pos = self.pos(stmt.range.begin);
                let condition = self.lower_expr(&stmt.condition);
                let message = stmt.message.as_ref().map(|message| self.lower_expr(message));
                self.builder().emit(pos, IrOp::Assert { condition, message });
            }
            Statement::Pass(_) => {}
            Statement::Labeled(stmt) => self.lower_stmt(&stmt.statement),
            Statement::Assign(stmt) => self.lower_assign(stmt),
            Statement::Expression(stmt) => {
                let _ = self.lower_expr(&stmt.expr);
            }
            Statement::Error(_) => {}
        }
    }

    fn lower_assign(&mut self, stmt: &'ast AssignStatement) {
        let pos = self.pos(stmt.op_pos);
        let inplace = binary_of_assign(stmt.op);

        match &stmt.target {
            Expression::Name(name) => {
                let Some(symbol) = self.analysis.symbol_of(name.id) else {
                    let _ = self.lower_expr(&stmt.value);
                    return;
                };

                let member_kind = matches!(
                    self.analysis.symbols.get(symbol).kind,
                    SymbolKind::Field { .. } | SymbolKind::Property { .. }
                );

                if member_kind {
                    // Unqualified field access inside a method body.
                    let target = self.read_self(pos);
                    let member = name.name.name.clone();
                    let value = match inplace {
                        Some(op) => {
                            let current = self.builder().new_value();
                            self.builder().emit(
                                pos,
                                IrOp::GetMember {
                                    dest: current,
                                    target,
                                    member: member.clone(),
                                },
                            );
                            let value = self.lower_expr(&stmt.value);
                            let dest = self.builder().new_value();
                            self.builder().emit(
                                pos,
                                IrOp::Inplace {
                                    dest,
                                    op,
                                    target: current,
                                    value,
                                },
                            );
                            dest
                        }
                        None => self.lower_expr(&stmt.value),
                    };
                    self.builder().emit(
                        pos,
                        IrOp::SetMember {
                            target,
                            member,
                            value,
                        },
                    );
                } else {
                    let value = match inplace {
                        Some(op) => {
                            let current = self.builder().read_symbol(pos, symbol);
                            let value = self.lower_expr(&stmt.value);
                            let dest = self.builder().new_value();
                            self.builder().emit(
                                pos,
                                IrOp::Inplace {
                                    dest,
                                    op,
                                    target: current,
                                    value,
                                },
                            );
                            dest
                        }
                        None => self.lower_expr(&stmt.value),
                    };
                    self.builder().write_symbol(pos, symbol, value, false);
                }
            }
            Expression::Member(member) => {
                let target = self.lower_expr(&member.target);
                let member_name = member.member.name.clone();
                let value = match inplace {
                    Some(op) => {
                        let current = self.builder().new_value();
                        self.builder().emit(
                            pos,
                            IrOp::GetMember {
                                dest: current,
                                target,
                                member: member_name.clone(),
                            },
                        );
                        let value = self.lower_expr(&stmt.value);
                        let dest = self.builder().new_value();
                        self.builder().emit(
                            pos,
                            IrOp::Inplace {
                                dest,
                                op,
                                target: current,
                                value,
                            },
                        );
                        dest
                    }
                    None => self.lower_expr(&stmt.value),
                };
                self.builder().emit(
                    pos,
                    IrOp::SetMember {
                        target,
                        member: member_name,
                        value,
                    },
                );
            }
            Expression::Subscript(subscript) => {
                let target = self.lower_expr(&subscript.target);
                let index = self.lower_expr(&subscript.index);
                let value = match inplace {
                    Some(op) => {
                        let current = self.builder().new_value();
                        self.builder().emit(
                            pos,
                            IrOp::GetSubscript {
                                dest: current,
                                target,
                                index,
                            },
                        );
                        let value = self.lower_expr(&stmt.value);
                        let dest = self.builder().new_value();
                        self.builder().emit(
                            pos,
                            IrOp::Inplace {
                                dest,
                                op,
                                target: current,
                                value,
                            },
                        );
                        dest
                    }
                    None => self.lower_expr(&stmt.value),
                };
                self.builder().emit(
                    pos,
                    IrOp::SetSubscript {
                        target,
                        index,
                        value,
                    },
                );
            }
            _ => {
                // The parser already rejected the target.
                let _ = self.lower_expr(&stmt.value);
            }
        }
    }

    fn lower_if(&mut self, stmt: &'ast IfStatement) {
        let pos = self.pos(stmt.range.begin);
        let condition = self.lower_expr(&stmt.condition);

        let then_label = self.fresh_label("if.then");
        let join_label = self.fresh_label("if.join");
        let then_block = self.builder().new_block(then_label);
        let join = self.builder().new_block(join_label);

        let else_block = if stmt.else_body.is_some() {
            let label = self.fresh_label("if.else");
            self.builder().new_block(label)
        } else {
            join
        };

        self.builder().branch_cond(pos, condition, then_block, else_block);

        self.builder().set_current(then_block);
        self.builder().seal_merge(then_block, pos);
        self.lower_stmt_body(&stmt.then_body);
        if !self.builder().is_terminated() {
            self.builder().branch(pos, join);
        }

        match &stmt.else_body {
            Some(ElseBody::ElseIf(nested)) => {
                self.builder().set_current(else_block);
                self.builder().seal_merge(else_block, pos);
                self.lower_if(nested);
                if !self.builder().is_terminated() {
                    self.builder().branch(pos, join);
                }
            }
            Some(ElseBody::Else(body)) => {
                self.builder().set_current(else_block);
                self.builder().seal_merge(else_block, pos);
                self.lower_stmt_body(body);
                if !self.builder().is_terminated() {
                    self.builder().branch(pos, join);
                }
            }
            None => {}
        }

        self.builder().set_current(join);
        self.builder().seal_merge(join, pos);
    }

    fn lower_while(&mut self, stmt: &'ast WhileStatement) {
        let pos = self.pos(stmt.range.begin);

        let header_label = self.fresh_label("while.cond");
        let body_label = self.fresh_label("while.body");
        let join_label = self.fresh_label("while.join");
        let header = self.builder().new_block(header_label);
        let body = self.builder().new_block(body_label);
        let join = self.builder().new_block(join_label);

        self.builder().branch(pos, header);

        // The header merges the entry edge with back edges, so it starts
        // from an empty rename state and reloads symbols.
        self.builder().set_current(header);
        let condition = self.lower_expr(&stmt.condition);
        self.builder().branch_cond(pos, condition, body, join);

        self.builder().set_current(body);
        self.builder().seal_merge(body, pos);
        self.loops.push(LoopInfo {
            break_to: join,
            continue_to: header,
            finally_depth: self.finallys.len(),
        });
        self.lower_stmt_body(&stmt.body);
        self.loops.pop();
        if !self.builder().is_terminated() {
            self.builder().branch(pos, header);
        }

        self.builder().set_current(join);
        self.builder().seal_merge(join, pos);
    }

    fn lower_for(&mut self, stmt: &'ast ForStatement) {
        let pos = self.pos(stmt.range.begin);
        let sequence = self.lower_expr(&stmt.sequence);

        // Iterator protocol: iter / hasNext / next.
        let iterator = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Invoke {
                dest: iterator,
                target: sequence,
                member: "iter".to_string(),
                args: Vec::new(),
            },
        );

        let header_label = self.fresh_label("for.cond");
        let body_label = self.fresh_label("for.body");
        let join_label = self.fresh_label("for.join");
        let header = self.builder().new_block(header_label);
        let body = self.builder().new_block(body_label);
        let join = self.builder().new_block(join_label);

        self.builder().branch(pos, header);

        self.builder().set_current(header);
        let has_next = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Invoke {
                dest: has_next,
                target: iterator,
                member: "hasNext".to_string(),
                args: Vec::new(),
            },
        );
        self.builder().branch_cond(pos, has_next, body, join);

        self.builder().set_current(body);
        self.builder().seal_merge(body, pos);
        let next = self.builder().new_value();
        self.builder().emit(
            pos,
            IrOp::Invoke {
                dest: next,
                target: iterator,
                member: "next".to_string(),
                args: Vec::new(),
            },
        );
        if let Some(symbol) = self.analysis.symbol_of(stmt.id) {
            self.builder().write_symbol(pos, symbol, next, true);
        }

        self.loops.push(LoopInfo {
            break_to: join,
            continue_to: header,
            finally_depth: self.finallys.len(),
        });
        self.lower_stmt_body(&stmt.body);
        self.loops.pop();
        if !self.builder().is_terminated() {
            self.builder().branch(pos, header);
        }

        self.builder().set_current(join);
        self.builder().seal_merge(join, pos);
    }

    fn lower_match(&mut self, stmt: &'ast MatchStatement) {
        let pos = self.pos(stmt.range.begin);
        let condition = self.lower_expr(&stmt.condition);

        let join_label = self.fresh_label("match.join");
        let join = self.builder().new_block(join_label);

        if let Some(table) = dense_int_labels(stmt) {
            // All labels are dense integers: one JumpTable.
            let mut cases = Vec::new();
            let mut blocks = Vec::new();
            let mut default = join;

            for case in &stmt.cases {
                let label = self.fresh_label("match.case");
                let block = self.builder().new_block(label);
                blocks.push(block);
                if case.is_default() {
                    default = block;
                }
            }

            for (value, case_index) in table {
                cases.push((Constant::Int(value), blocks[case_index]));
            }

            self.builder().jump_table(pos, condition, cases, default);

            for (case, block) in stmt.cases.iter().zip(blocks) {
                self.builder().set_current(block);
                self.lower_members(&case.members);
                if !self.builder().is_terminated() {
                    self.builder().branch(pos, join);
                }
            }
        } else {
            // General form: chained equality tests.
            let mut default_case: Option<&'ast MatchCase> = None;

            for case in &stmt.cases {
                if case.is_default() {
                    default_case = Some(case);
                    continue;
                }

                let body_label = self.fresh_label("match.case");
                let body_block = self.builder().new_block(body_label);

                for label in &case.labels {
                    let Some(value) = &label.value else { continue };
                    let label_value = self.lower_expr(value);
                    let test = self.builder().new_value();
                    self.builder().emit(
                        pos,
                        IrOp::Test {
                            dest: test,
                            kind: TestKind::Equal,
                            left: condition,
                            right: label_value,
                        },
                    );

                    let next_label = self.fresh_label("match.next");
                    let next = self.builder().new_block(next_label);
                    self.builder().branch_cond(pos, test, body_block, next);
                    self.builder().set_current(next);
                    self.builder().seal_merge(next, pos);
                }

                let fall = self.builder().current_block();
                self.builder().set_current(body_block);
                self.lower_members(&case.members);
                if !self.builder().is_terminated() {
                    self.builder().branch(pos, join);
                }
                self.builder().set_current(fall);
            }

            // Fallthrough: default body or straight to the join.
            if let Some(case) = default_case {
                self.lower_members(&case.members);
            }
            if !self.builder().is_terminated() {
                self.builder().branch(pos, join);
            }
        }

        self.builder().set_current(join);
    }

    fn lower_try(&mut self, stmt: &'ast TryStatement) {
        let pos = self.pos(stmt.range.begin);

        let body_label = self.fresh_label("try.body");
        let body_begin = self.builder().new_block(body_label);
        self.builder().branch(pos, body_begin);
        self.builder().set_current(body_begin);
        self.builder().seal_merge(body_begin, pos);

        if let Some(finally) = &stmt.finally {
            self.finallys.push(FinallyKind::Body(finally));
        }
        self.lower_stmt_body(&stmt.body);
        let body_end = self.builder().current_block();
        if stmt.finally.is_some() {
            self.finallys.pop();
        }

        let join_label = self.fresh_label("try.join");
        let join = self.builder().new_block(join_label);

        // Normal exit duplicates the finally body.
        if !self.builder().is_terminated() {
            if let Some(finally) = &stmt.finally {
                self.lower_stmt_body(finally);
            }
            if !self.builder().is_terminated() {
                self.builder().branch(pos, join);
            }
        }

        let mut handlers = Vec::new();
        for clause in &stmt.excepts {
            let handler_label = self.fresh_label("try.except");
            let handler = self.builder().new_block(handler_label);
            self.builder().link_exception_edge(body_begin, handler);

            let symbol = match self.analysis.symbol_of(clause.id) {
                Some(symbol) => symbol,
                None => self.synth_exception_symbol(clause.range.begin),
            };
            handlers.push(ExceptHandler {
                block: handler,
                symbol,
            });

            self.builder().set_current(handler);
            let previous_exception = self.exception_symbol.replace(symbol);
            self.lower_stmt_body(&clause.body);
            self.exception_symbol = previous_exception;
            if !self.builder().is_terminated() {
                if let Some(finally) = &stmt.finally {
                    self.lower_stmt_body(finally);
                }
                if !self.builder().is_terminated() {
                    self.builder().branch(pos, join);
                }
            }
        }

        // Exceptions no clause catches still run the finally body once,
        // then continue unwinding.
        if let Some(finally) = &stmt.finally {
            let handler_label = self.fresh_label("try.finally");
            let handler = self.builder().new_block(handler_label);
            self.builder().link_exception_edge(body_begin, handler);

            let symbol = self.synth_exception_symbol(stmt.range.begin);
            handlers.push(ExceptHandler {
                block: handler,
                symbol,
            });

            self.builder().set_current(handler);
            let exception = self.builder().read_symbol(pos, symbol);
            self.lower_stmt_body(finally);
            if !self.builder().is_terminated() {
                self.builder().raise(pos, exception);
            }
        }

        self.builder().unit.handlers.push(ExceptInfo {
            begin: body_begin,
            end: body_end,
            handlers,
        });

        self.builder().set_current(join);
    }

    /// `with r (as n) { body }` lowers to
    /// `acquire; try { body } finally { release }`.
    fn lower_with(&mut self, stmt: &'ast WithStatement) {
        let pos = self.pos(stmt.range.begin);
        let resource = self.lower_expr(&stmt.resource);
        if stmt.binding.is_some() {
            if let Some(symbol) = self.analysis.symbol_of(stmt.id) {
                self.builder().write_symbol(pos, symbol, resource, true);
            }
        }

        let body_label = self.fresh_label("with.body");
        let body_begin = self.builder().new_block(body_label);
        self.builder().branch(pos, body_begin);
        self.builder().set_current(body_begin);
        self.builder().seal_merge(body_begin, pos);

        self.finallys.push(FinallyKind::Release(resource));
        self.lower_stmt_body(&stmt.body);
        let body_end = self.builder().current_block();
        self.finallys.pop();

        let join_label = self.fresh_label("with.join");
        let join = self.builder().new_block(join_label);

        if !self.builder().is_terminated() {
            self.lower_finally_entry(FinallyKind::Release(resource));
            self.builder().branch(pos, join);
        }

        // Exceptional path: release, then keep unwinding.
        let handler_label = self.fresh_label("with.finally");
        let handler = self.builder().new_block(handler_label);
        self.builder().link_exception_edge(body_begin, handler);
        let symbol = self.synth_exception_symbol(stmt.range.begin);

        self.builder().set_current(handler);
        let exception = self.builder().read_symbol(pos, symbol);
        self.lower_finally_entry(FinallyKind::Release(resource));
        self.builder().raise(pos, exception);

        self.builder().unit.handlers.push(ExceptInfo {
            begin: body_begin,
            end: body_end,
            handlers: vec![ExceptHandler {
                block: handler,
                symbol,
            }],
        });

        self.builder().set_current(join);
    }
}

fn binary_of_assign(op: AssignOp) -> Option<BinaryIrOp> {
    match op {
        AssignOp::Assign => None,
        AssignOp::Add => Some(BinaryIrOp::Add),
        AssignOp::Sub => Some(BinaryIrOp::Sub),
        AssignOp::Mul => Some(BinaryIrOp::Mul),
        AssignOp::Div => Some(BinaryIrOp::Div),
        AssignOp::Mod => Some(BinaryIrOp::Mod),
        AssignOp::BitAnd => Some(BinaryIrOp::And),
        AssignOp::BitOr => Some(BinaryIrOp::Or),
        AssignOp::BitXor => Some(BinaryIrOp::Xor),
        AssignOp::LeftShift => Some(BinaryIrOp::Shl),
        AssignOp::RightShift => Some(BinaryIrOp::Shr),
    }
}

/// If every label of every case is an integer literal and the value set
/// is dense, return `(value, case index)` pairs for a jump table.
fn dense_int_labels(stmt: &MatchStatement) -> Option<Vec<(i64, usize)>> {
    let mut table = Vec::new();
    let mut min = i64::MAX;
    let mut max = i64::MIN;

    for (index, case) in stmt.cases.iter().enumerate() {
        for label in &case.labels {
            let Some(value) = &label.value else { continue };
            match value {
                Expression::Literal(literal) => match literal.value {
                    Literal::Integer(value) => {
                        min = min.min(value);
                        max = max.max(value);
                        table.push((value, index));
                    }
                    _ => return None,
                },
                _ => return None,
            }
        }
    }

    if table.is_empty() {
        return None;
    }

    // Dense enough when the span stays proportional to the label count.
    let span = max.checked_sub(min)?;
    if span > (table.len() as i64).saturating_mul(2) {
        return None;
    }
    Some(table)
}
