//! Declaration nodes.

use super::{Body, Expression, Identifier, NodeId, ParameterList};
use crate::source::SourceRange;

#[derive(Debug, Clone, PartialEq)]
pub enum Declaration {
    Import(Box<ImportDecl>),
    Export(Box<ExportDecl>),
    Function(Box<FunctionDecl>),
    Class(Box<ClassDecl>),
    Task(Box<TaskDecl>),
    Variable(Box<VariableDecl>),
    Error(SourceRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub range: SourceRange,
    pub path: Expression,
    pub id: NodeId,
    pub alias: Option<Identifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub name: Identifier,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub name: Identifier,
    pub params: ParameterList,
    pub body: Body,
}

/// Access modifiers on class members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Init(Box<InitDecl>),
    Deinit(Box<DeinitDecl>),
    Field(Box<FieldDecl>),
    Method(Box<MethodDecl>),
    Property(Box<PropertyDecl>),
    Error(SourceRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub params: ParameterList,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeinitDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub modifiers: Modifiers,
    pub name: Identifier,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub modifiers: Modifiers,
    pub name: Identifier,
    pub params: ParameterList,
    pub body: Body,
}

/// A `get name` or `set name(value)` accessor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub is_getter: bool,
    pub name: Identifier,
    pub params: ParameterList,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub name: Identifier,
    pub extends: Option<Identifier>,
    pub members: Vec<ClassMember>,
}

/// One `do`/`doFirst`/`doLast` action of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Do,
    DoFirst,
    DoLast,
}

impl TaskAction {
    pub fn name(self) -> &'static str {
        match self {
            TaskAction::Do => "do",
            TaskAction::DoFirst => "doFirst",
            TaskAction::DoLast => "doLast",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskActionDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub action: TaskAction,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskMember {
    Inputs(SourceRange, Vec<Expression>),
    Outputs(SourceRange, Vec<Expression>),
    Action(Box<TaskActionDecl>),
    Variable(Box<VariableDecl>),
    Error(SourceRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub name: Identifier,
    pub extends: Option<Identifier>,
    pub depends: Vec<Identifier>,
    pub members: Vec<TaskMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub range: SourceRange,
    pub id: NodeId,
    pub readonly: bool,
    pub name: Identifier,
    pub value: Expression,
}

impl Declaration {
    pub fn range(&self) -> SourceRange {
        match self {
            Declaration::Import(d) => d.range,
            Declaration::Export(d) => d.range,
            Declaration::Function(d) => d.range,
            Declaration::Class(d) => d.range,
            Declaration::Task(d) => d.range,
            Declaration::Variable(d) => d.range,
            Declaration::Error(range) => *range,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Declaration::Error(_))
    }
}
