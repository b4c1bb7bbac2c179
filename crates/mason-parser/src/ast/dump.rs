//! Textual AST dump, used by the `dump-ast` option.

use std::fmt::Write;

use super::*;

struct NodeWriter {
    out: String,
    depth: usize,
}

impl NodeWriter {
    fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn nested(&mut self, header: impl AsRef<str>, f: impl FnOnce(&mut Self)) {
        self.line(header);
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }
}

/// Render a parsed script as an indented tree.
pub fn dump_script(script: &Script) -> String {
    let mut writer = NodeWriter::new();
    writer.nested(format!("Script \"{}\"", script.name), |w| {
        for member in &script.members {
            dump_node(w, member);
        }
    });
    writer.out
}

fn dump_node(w: &mut NodeWriter, node: &Node) {
    match node {
        Node::Decl(decl) => dump_decl(w, decl),
        Node::Stmt(stmt) => dump_stmt(w, stmt),
    }
}

fn header(kind: &str, range: SourceRange) -> String {
    format!("{} <{}>", kind, range.begin)
}

fn dump_params(w: &mut NodeWriter, params: &ParameterList) {
    let mut names = String::new();
    for (index, param) in params.params.iter().enumerate() {
        if index > 0 {
            names.push_str(", ");
        }
        names.push_str(&param.name.name);
    }
    if params.is_vararg() {
        names.push_str("...");
    }
    w.line(format!("Parameters ({})", names));
}

fn dump_body(w: &mut NodeWriter, body: &Body) {
    match body {
        Body::Block(block) => w.nested(header("Block", block.range), |w| {
            for member in &block.members {
                dump_node(w, member);
            }
        }),
        Body::Arrow(range, expr) => w.nested(header("Arrow", *range), |w| {
            dump_expr(w, expr);
        }),
    }
}

fn dump_decl(w: &mut NodeWriter, decl: &Declaration) {
    match decl {
        Declaration::Import(d) => w.nested(header("ImportDeclaration", d.range), |w| {
            dump_expr(w, &d.path);
            if let Some(alias) = &d.alias {
                w.line(format!("As '{}'", alias.name));
            }
        }),
        Declaration::Export(d) => {
            w.nested(
                format!("ExportDeclaration '{}' <{}>", d.name.name, d.range.begin),
                |w| {
                    if let Some(value) = &d.value {
                        dump_expr(w, value);
                    }
                },
            );
        }
        Declaration::Function(d) => {
            w.nested(
                format!("FunctionDeclaration '{}' <{}>", d.name.name, d.range.begin),
                |w| {
                    dump_params(w, &d.params);
                    dump_body(w, &d.body);
                },
            );
        }
        Declaration::Class(d) => {
            let mut text = format!("ClassDeclaration '{}'", d.name.name);
            if let Some(extends) = &d.extends {
                let _ = write!(text, " extends '{}'", extends.name);
            }
            let _ = write!(text, " <{}>", d.range.begin);
            w.nested(text, |w| {
                for member in &d.members {
                    dump_class_member(w, member);
                }
            });
        }
        Declaration::Task(d) => {
            let mut text = format!("TaskDeclaration '{}'", d.name.name);
            if let Some(extends) = &d.extends {
                let _ = write!(text, " extends '{}'", extends.name);
            }
            let _ = write!(text, " <{}>", d.range.begin);
            w.nested(text, |w| {
                if !d.depends.is_empty() {
                    let names: Vec<_> = d.depends.iter().map(|n| n.name.as_str()).collect();
                    w.line(format!("DependsOn ({})", names.join(", ")));
                }
                for member in &d.members {
                    dump_task_member(w, member);
                }
            });
        }
        Declaration::Variable(d) => {
            let kind = if d.readonly { "const" } else { "var" };
            w.nested(
                format!(
                    "VariableDeclaration {} '{}' <{}>",
                    kind, d.name.name, d.range.begin
                ),
                |w| dump_expr(w, &d.value),
            );
        }
        Declaration::Error(range) => w.line(header("ErrorDeclaration", *range)),
    }
}

fn dump_class_member(w: &mut NodeWriter, member: &ClassMember) {
    match member {
        ClassMember::Init(d) => w.nested(header("Initializer", d.range), |w| {
            dump_params(w, &d.params);
            dump_body(w, &d.body);
        }),
        ClassMember::Deinit(d) => w.nested(header("Deinitializer", d.range), |w| {
            dump_body(w, &d.body);
        }),
        ClassMember::Field(d) => {
            let mut kind = String::new();
            if d.modifiers.is_static {
                kind.push_str("static ");
            }
            kind.push_str(if d.modifiers.is_const { "const" } else { "var" });
            w.nested(
                format!("Field {} '{}' <{}>", kind, d.name.name, d.range.begin),
                |w| {
                    if let Some(value) = &d.value {
                        dump_expr(w, value);
                    }
                },
            );
        }
        ClassMember::Method(d) => {
            let prefix = if d.modifiers.is_static { "static " } else { "" };
            w.nested(
                format!("Method {}'{}' <{}>", prefix, d.name.name, d.range.begin),
                |w| {
                    dump_params(w, &d.params);
                    dump_body(w, &d.body);
                },
            );
        }
        ClassMember::Property(d) => {
            let kind = if d.is_getter { "get" } else { "set" };
            w.nested(
                format!("Property {} '{}' <{}>", kind, d.name.name, d.range.begin),
                |w| dump_body(w, &d.body),
            );
        }
        ClassMember::Error(range) => w.line(header("ErrorMember", *range)),
    }
}

fn dump_task_member(w: &mut NodeWriter, member: &TaskMember) {
    match member {
        TaskMember::Inputs(range, exprs) => w.nested(header("Inputs", *range), |w| {
            for expr in exprs {
                dump_expr(w, expr);
            }
        }),
        TaskMember::Outputs(range, exprs) => w.nested(header("Outputs", *range), |w| {
            for expr in exprs {
                dump_expr(w, expr);
            }
        }),
        TaskMember::Action(d) => w.nested(
            format!("Action '{}' <{}>", d.action.name(), d.range.begin),
            |w| dump_body(w, &d.body),
        ),
        TaskMember::Variable(d) => {
            dump_decl(w, &Declaration::Variable(d.clone()));
        }
        TaskMember::Error(range) => w.line(header("ErrorMember", *range)),
    }
}

fn dump_stmt(w: &mut NodeWriter, stmt: &Statement) {
    match stmt {
        Statement::Block(s) => w.nested(header("Block", s.range), |w| {
            for member in &s.members {
                dump_node(w, member);
            }
        }),
        Statement::If(s) => dump_if(w, s),
        Statement::Match(s) => w.nested(header("Match", s.range), |w| {
            dump_expr(w, &s.condition);
            for case in &s.cases {
                w.nested(header("Case", case.range), |w| {
                    for label in &case.labels {
                        match &label.value {
                            Some(value) => {
                                w.nested("Label", |w| dump_expr(w, value));
                            }
                            None => w.line("DefaultLabel"),
                        }
                    }
                    for member in &case.members {
                        dump_node(w, member);
                    }
                });
            }
        }),
        Statement::For(s) => w.nested(
            format!("For '{}' <{}>", s.binding.name, s.range.begin),
            |w| {
                dump_expr(w, &s.sequence);
                dump_body(w, &s.body);
            },
        ),
        Statement::While(s) => w.nested(header("While", s.range), |w| {
            dump_expr(w, &s.condition);
            dump_body(w, &s.body);
        }),
        Statement::Try(s) => w.nested(header("Try", s.range), |w| {
            dump_body(w, &s.body);
            for clause in &s.excepts {
                let mut text = String::from("Except");
                if let Some(ty) = &clause.type_name {
                    let _ = write!(text, " '{}'", ty.name);
                }
                if let Some(binding) = &clause.binding {
                    let _ = write!(text, " as '{}'", binding.name);
                }
                w.nested(text, |w| dump_body(w, &clause.body));
            }
            if let Some(finally) = &s.finally {
                w.nested("Finally", |w| dump_body(w, finally));
            }
        }),
        Statement::With(s) => w.nested(header("With", s.range), |w| {
            dump_expr(w, &s.resource);
            if let Some(binding) = &s.binding {
                w.line(format!("As '{}'", binding.name));
            }
            dump_body(w, &s.body);
        }),
        Statement::Break(s) => w.line(header("Break", s.range)),
        Statement::Continue(s) => w.line(header("Continue", s.range)),
        Statement::Return(s) => w.nested(header("Return", s.range), |w| {
            if let Some(value) = &s.value {
                dump_expr(w, value);
            }
        }),
        Statement::Raise(s) => w.nested(header("Raise", s.range), |w| {
            if let Some(value) = &s.value {
                dump_expr(w, value);
            }
        }),
        Statement::Assert(s) => w.nested(header("Assert", s.range), |w| {
            dump_expr(w, &s.condition);
            if let Some(message) = &s.message {
                dump_expr(w, message);
            }
        }),
        Statement::Pass(s) => w.line(header("Pass", s.range)),
        Statement::Labeled(s) => w.nested(
            format!("Labeled '{}' <{}>", s.label.name, s.range.begin),
            |w| dump_stmt(w, &s.statement),
        ),
        Statement::Assign(s) => w.nested(
            format!("Assign {:?} <{}>", s.op, s.range.begin),
            |w| {
                dump_expr(w, &s.target);
                dump_expr(w, &s.value);
            },
        ),
        Statement::Expression(s) => w.nested(header("ExpressionStatement", s.range), |w| {
            dump_expr(w, &s.expr);
        }),
        Statement::Error(range) => w.line(header("ErrorStatement", *range)),
    }
}

fn dump_if(w: &mut NodeWriter, stmt: &IfStatement) {
    w.nested(header("If", stmt.range), |w| {
        dump_expr(w, &stmt.condition);
        dump_body(w, &stmt.then_body);
        match &stmt.else_body {
            Some(ElseBody::ElseIf(next)) => w.nested("ElseIf", |w| dump_if(w, next)),
            Some(ElseBody::Else(body)) => w.nested("Else", |w| dump_body(w, body)),
            None => {}
        }
    });
}

fn dump_expr(w: &mut NodeWriter, expr: &Expression) {
    match expr {
        Expression::Ternary(e) => w.nested(header("Ternary", e.range), |w| {
            dump_expr(w, &e.condition);
            dump_expr(w, &e.on_true);
            dump_expr(w, &e.on_false);
        }),
        Expression::Binary(e) => w.nested(
            format!("Binary {:?} <{}>", e.op, e.range.begin),
            |w| {
                dump_expr(w, &e.left);
                dump_expr(w, &e.right);
            },
        ),
        Expression::Unary(e) => w.nested(
            format!("Unary {:?} <{}>", e.op, e.range.begin),
            |w| dump_expr(w, &e.operand),
        ),
        Expression::Defined(e) => {
            w.line(format!("Defined '{}' <{}>", e.name.name, e.range.begin));
        }
        Expression::Call(e) => w.nested(header("Call", e.range), |w| {
            dump_expr(w, &e.target);
            for arg in &e.args {
                dump_expr(w, arg);
            }
        }),
        Expression::Invoke(e) => w.nested(
            format!("Invoke '{}' <{}>", e.member.name, e.range.begin),
            |w| {
                dump_expr(w, &e.target);
                for arg in &e.args {
                    dump_expr(w, arg);
                }
            },
        ),
        Expression::Member(e) => w.nested(
            format!("Member '{}' <{}>", e.member.name, e.range.begin),
            |w| dump_expr(w, &e.target),
        ),
        Expression::Subscript(e) => w.nested(header("Subscript", e.range), |w| {
            dump_expr(w, &e.target);
            dump_expr(w, &e.index);
        }),
        Expression::Literal(e) => w.line(format!("Literal {:?} <{}>", e.value, e.range.begin)),
        Expression::InterpolatedString(e) => {
            w.nested(header("InterpolatedString", e.range), |w| {
                for part in &e.parts {
                    match part {
                        StringPart::Text(text) => w.line(format!("Text {:?}", text)),
                        StringPart::Expr(expr) => dump_expr(w, expr),
                    }
                }
            });
        }
        Expression::Name(e) => w.line(format!("Name '{}' <{}>", e.name.name, e.name.range.begin)),
        Expression::SelfRef(range) => w.line(header("Self", *range)),
        Expression::SuperRef(range) => w.line(header("Super", *range)),
        Expression::List(e) => w.nested(header("List", e.range), |w| {
            for item in &e.items {
                dump_expr(w, item);
            }
        }),
        Expression::Map(e) => w.nested(header("Map", e.range), |w| {
            for (key, value) in &e.entries {
                dump_expr(w, key);
                dump_expr(w, value);
            }
        }),
        Expression::Closure(e) => w.nested(header("Closure", e.range), |w| {
            dump_params(w, &e.params);
            dump_body(w, &e.body);
        }),
        Expression::Paren(e) => dump_expr(w, &e.inner),
        Expression::Error(range) => w.line(header("ErrorExpression", *range)),
    }
}
