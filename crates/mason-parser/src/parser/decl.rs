//! Declaration parsing.

use super::Parser;
use crate::ast::*;
use crate::diag::ReportId;
use crate::source::SourceRange;
use crate::token::TokenType;

impl<'a> Parser<'a> {
    pub(crate) fn parse_declaration(&mut self) -> Declaration {
        match self.current() {
            TokenType::Import => self.parse_import(),
            TokenType::Export => self.parse_export(),
            TokenType::Def => self.parse_function(),
            TokenType::Class => self.parse_class(),
            TokenType::Task => self.parse_task(),
            TokenType::Var | TokenType::Const => Declaration::Variable(self.parse_variable()),
            _ => {
                let range = self.token.range;
                self.reporter
                    .report(range.begin, ReportId::ParseExpectDeclaration);
                self.skip_to_eol();
                Declaration::Error(range)
            }
        }
    }

    fn parse_import(&mut self) -> Declaration {
        let begin = self.consume_token();
        let path = self.parse_expression();

        let alias = if self.consume_if(TokenType::As).is_some() {
            Some(self.require_identifier())
        } else {
            None
        };

        let end = alias
            .as_ref()
            .map(|a| a.range.end)
            .unwrap_or(path.range().end);
        self.require_eol();

        Declaration::Import(Box::new(ImportDecl {
            range: SourceRange::new(begin, end),
            path,
            id: self.next_node_id(),
            alias,
        }))
    }

    fn parse_export(&mut self) -> Declaration {
        let begin = self.consume_token();
        let name = self.require_identifier();

        let value = if self.consume_if(TokenType::Assign).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };

        let end = value
            .as_ref()
            .map(|v| v.range().end)
            .unwrap_or(name.range.end);
        self.require_eol();

        Declaration::Export(Box::new(ExportDecl {
            range: SourceRange::new(begin, end),
            id: self.next_node_id(),
            name,
            value,
        }))
    }

    fn parse_function(&mut self) -> Declaration {
        let begin = self.consume_token(); // 'def'
        let id = self.next_node_id();
        let name = self.require_identifier();
        let params = self.parse_parameter_list();
        let body = self.parse_body();

        if matches!(body, Body::Arrow(..)) {
            self.require_eol();
        }

        Declaration::Function(Box::new(FunctionDecl {
            range: SourceRange::new(begin, body.range().end),
            id,
            name,
            params,
            body,
        }))
    }

    /// Parse `( name, name, last... )`.
    ///
    /// The separator positions are recorded alongside the names; a missing
    /// comma between two names is healed with a diagnostic. The list
    /// always satisfies `commas == max(0, names - 1)`.
    pub(crate) fn parse_parameter_list(&mut self) -> ParameterList {
        let begin = self.require_token(TokenType::LeftParen);
        let begin = if begin.is_valid() {
            begin
        } else {
            self.token.range.begin
        };

        let mut params = Vec::new();
        let mut commas = Vec::new();
        let mut ellipsis = None;

        while !self.at(TokenType::RightParen) && !self.at_eof() {
            if !self.at_identifier() {
                self.reporter
                    .report(self.token.range.begin, ReportId::ParseExpectIdentifier);
                break;
            }

            let name = self.require_identifier();
            params.push(Parameter {
                id: self.next_node_id(),
                name,
            });

            if let Some(pos) = self.consume_if(TokenType::Ellipsis) {
                if ellipsis.is_some() || !matches!(self.current(), TokenType::RightParen) {
                    self.reporter.report(pos, ReportId::ParseEllipsisNotLast);
                }
                ellipsis = Some(pos);
            }

            if let Some(pos) = self.consume_if(TokenType::Comma) {
                if self.at(TokenType::RightParen) {
                    // Trailing comma; keep the separator invariant.
                    self.reporter
                        .report(self.token.range.begin, ReportId::ParseExpectIdentifier);
                } else {
                    commas.push(pos);
                }
                continue;
            }

            if self.at_identifier() {
                // Missing comma between two obvious parameters: heal it.
                let pos = self.token.range.begin;
                self.reporter
                    .report(pos, ReportId::ParseExpectComma)
                    .insert(pos, ",");
                commas.push(pos);
                continue;
            }

            break;
        }

        self.require_token(TokenType::RightParen);

        debug_assert_eq!(commas.len(), params.len().saturating_sub(1));
        ParameterList {
            range: SourceRange::new(begin, self.prev_range().end),
            params,
            commas,
            ellipsis,
        }
    }

    fn parse_class(&mut self) -> Declaration {
        let begin = self.consume_token();
        let id = self.next_node_id();
        let name = self.require_identifier();

        let extends = if self.consume_if(TokenType::Extends).is_some() {
            Some(self.require_identifier())
        } else {
            None
        };

        self.require_token(TokenType::LeftBrace);
        let mut members = Vec::new();
        while !self.at(TokenType::RightBrace) && !self.at_eof() {
            let before = self.token.range.begin;
            members.push(self.parse_class_member());
            if self.token.range.begin == before && !self.at_eof() {
                self.consume();
            }
        }
        self.require_token(TokenType::RightBrace);

        Declaration::Class(Box::new(ClassDecl {
            range: SourceRange::new(begin, self.prev_range().end),
            id,
            name,
            extends,
            members,
        }))
    }

    fn parse_class_member(&mut self) -> ClassMember {
        let begin = self.token.range.begin;

        let mut modifiers = Modifiers::default();
        if self.at(TokenType::Static) {
            self.consume();
            modifiers.is_static = true;
        }

        match self.current() {
            TokenType::Init => {
                if modifiers.is_static {
                    self.reporter
                        .report_args(begin, ReportId::SemaInvalidModifier, &["initializer"]);
                }
                self.consume();
                let id = self.next_node_id();
                let params = self.parse_parameter_list();
                let body = self.parse_body();
                ClassMember::Init(Box::new(InitDecl {
                    range: SourceRange::new(begin, body.range().end),
                    id,
                    params,
                    body,
                }))
            }
            TokenType::Deinit => {
                if modifiers.is_static {
                    self.reporter
                        .report_args(begin, ReportId::SemaInvalidModifier, &["deinitializer"]);
                }
                self.consume();
                let id = self.next_node_id();
                let body = self.parse_body();
                ClassMember::Deinit(Box::new(DeinitDecl {
                    range: SourceRange::new(begin, body.range().end),
                    id,
                    body,
                }))
            }
            TokenType::Var | TokenType::Const => {
                let readonly = self.at(TokenType::Const);
                self.consume();
                modifiers.is_const = readonly;
                let id = self.next_node_id();
                let name = self.require_identifier();

                let value = if self.consume_if(TokenType::Assign).is_some() {
                    Some(self.parse_expression())
                } else {
                    None
                };
                self.require_eol();

                ClassMember::Field(Box::new(FieldDecl {
                    range: SourceRange::new(begin, self.prev_range().end),
                    id,
                    modifiers,
                    name,
                    value,
                }))
            }
            TokenType::Def => {
                self.consume();
                let id = self.next_node_id();
                let name = self.require_identifier();
                let params = self.parse_parameter_list();
                let body = self.parse_body();
                if matches!(body, Body::Arrow(..)) {
                    self.require_eol();
                }
                ClassMember::Method(Box::new(MethodDecl {
                    range: SourceRange::new(begin, body.range().end),
                    id,
                    modifiers,
                    name,
                    params,
                    body,
                }))
            }
            TokenType::Get | TokenType::Set => {
                let is_getter = self.at(TokenType::Get);
                if modifiers.is_static {
                    self.reporter
                        .report_args(begin, ReportId::SemaInvalidModifier, &["property"]);
                }
                self.consume();
                let id = self.next_node_id();
                let name = self.require_identifier();
                let params = if is_getter {
                    ParameterList {
                        range: SourceRange::at(name.range.end),
                        ..ParameterList::default()
                    }
                } else {
                    self.parse_parameter_list()
                };
                let body = self.parse_body();
                if matches!(body, Body::Arrow(..)) {
                    self.require_eol();
                }
                ClassMember::Property(Box::new(PropertyDecl {
                    range: SourceRange::new(begin, body.range().end),
                    id,
                    is_getter,
                    name,
                    params,
                    body,
                }))
            }
            _ => {
                let range = self.token.range;
                self.reporter.report_args(
                    range.begin,
                    ReportId::ParseUnexpectedToken,
                    &[self.current().describe()],
                );
                self.skip_to_member();
                ClassMember::Error(range)
            }
        }
    }

    fn parse_task(&mut self) -> Declaration {
        let begin = self.consume_token();
        let id = self.next_node_id();
        let name = self.require_identifier();

        let extends = if self.consume_if(TokenType::Extends).is_some() {
            Some(self.require_identifier())
        } else {
            None
        };

        let mut depends = Vec::new();
        if self.consume_if(TokenType::DependsOn).is_some() {
            self.parse_name_list(&mut depends);
        }

        self.require_token(TokenType::LeftBrace);
        let mut members = Vec::new();
        let mut seen = [false; 3];

        while !self.at(TokenType::RightBrace) && !self.at_eof() {
            let before = self.token.range.begin;
            members.push(self.parse_task_member(&mut seen));
            if self.token.range.begin == before && !self.at_eof() {
                self.consume();
            }
        }
        self.require_token(TokenType::RightBrace);

        Declaration::Task(Box::new(TaskDecl {
            range: SourceRange::new(begin, self.prev_range().end),
            id,
            name,
            extends,
            depends,
            members,
        }))
    }

    fn parse_task_member(&mut self, seen: &mut [bool; 3]) -> TaskMember {
        let begin = self.token.range.begin;

        match self.current() {
            TokenType::Inputs => {
                self.consume();
                let exprs = self.parse_expression_list_line();
                self.require_eol();
                TaskMember::Inputs(SourceRange::new(begin, self.prev_range().end), exprs)
            }
            TokenType::Outputs => {
                self.consume();
                let exprs = self.parse_expression_list_line();
                self.require_eol();
                TaskMember::Outputs(SourceRange::new(begin, self.prev_range().end), exprs)
            }
            TokenType::Do | TokenType::DoFirst | TokenType::DoLast => {
                let (action, index) = match self.current() {
                    TokenType::Do => (TaskAction::Do, 0),
                    TokenType::DoFirst => (TaskAction::DoFirst, 1),
                    _ => (TaskAction::DoLast, 2),
                };
                if seen[index] {
                    self.reporter.report_args(
                        begin,
                        ReportId::ParseDuplicateClause,
                        &[action.name()],
                    );
                }
                seen[index] = true;

                self.consume();
                let id = self.next_node_id();
                let body = self.parse_body();
                TaskMember::Action(Box::new(TaskActionDecl {
                    range: SourceRange::new(begin, body.range().end),
                    id,
                    action,
                    body,
                }))
            }
            TokenType::Var | TokenType::Const => TaskMember::Variable(self.parse_variable()),
            _ => {
                let range = self.token.range;
                self.reporter.report_args(
                    range.begin,
                    ReportId::ParseUnexpectedToken,
                    &[self.current().describe()],
                );
                self.skip_to_member();
                TaskMember::Error(range)
            }
        }
    }

    pub(crate) fn parse_variable(&mut self) -> Box<VariableDecl> {
        let begin = self.token.range.begin;
        let readonly = self.at(TokenType::Const);
        self.consume(); // 'var' | 'const'

        let id = self.next_node_id();
        let name = self.require_identifier();
        self.require_token(TokenType::Assign);
        let value = self.parse_expression();
        self.require_eol();

        Box::new(VariableDecl {
            range: SourceRange::new(begin, value.range().end),
            id,
            readonly,
            name,
            value,
        })
    }

    /// Comma-separated identifiers, with missing-comma healing.
    pub(crate) fn parse_name_list(&mut self, names: &mut Vec<Identifier>) {
        loop {
            if !self.at_identifier() {
                self.reporter
                    .report(self.token.range.begin, ReportId::ParseExpectIdentifier);
                return;
            }
            names.push(self.require_identifier());

            if self.consume_if(TokenType::Comma).is_some() {
                continue;
            }
            if self.at_identifier() && !self.has_eol() {
                let pos = self.token.range.begin;
                self.reporter
                    .report(pos, ReportId::ParseExpectComma)
                    .insert(pos, ",");
                continue;
            }
            return;
        }
    }

    /// Expressions on one line, for `inputs`/`outputs` clauses.
    fn parse_expression_list_line(&mut self) -> Vec<Expression> {
        let mut exprs = vec![self.parse_expression()];
        while self.consume_if(TokenType::Comma).is_some() {
            exprs.push(self.parse_expression());
        }
        exprs
    }
}
