//! Statement parsing.

use super::recovery::is_declaration_starter;
use super::Parser;
use crate::ast::*;
use crate::diag::ReportId;
use crate::source::SourceRange;
use crate::token::TokenType;

impl<'a> Parser<'a> {
    /// Parse one declaration or statement, the shared production for
    /// script bodies and blocks.
    pub(crate) fn parse_script_member(&mut self) -> Node {
        if is_declaration_starter(self.current()) {
            Node::Decl(self.parse_declaration())
        } else {
            Node::Stmt(self.parse_statement())
        }
    }

    pub(crate) fn parse_statement(&mut self) -> Statement {
        match self.current() {
            TokenType::If => self.parse_if(),
            TokenType::Match => self.parse_match(),
            TokenType::For => self.parse_for(),
            TokenType::While => self.parse_while(),
            TokenType::Try => self.parse_try(),
            TokenType::With => self.parse_with(),
            TokenType::Break => {
                let range = self.consume_token_range();
                self.require_eol();
                Statement::Break(BreakStatement { range })
            }
            TokenType::Continue => {
                let range = self.consume_token_range();
                self.require_eol();
                Statement::Continue(ContinueStatement { range })
            }
            TokenType::Return => self.parse_return(),
            TokenType::Raise => self.parse_raise(),
            TokenType::Assert => self.parse_assert(),
            TokenType::Pass => {
                let range = self.consume_token_range();
                self.require_eol();
                Statement::Pass(PassStatement { range })
            }
            TokenType::LeftBrace => Statement::Block(self.parse_block()),
            TokenType::Identifier => {
                if self.peek(1).ty == TokenType::Colon {
                    self.parse_labeled()
                } else {
                    self.parse_assign_or_expression()
                }
            }
            _ => self.parse_assign_or_expression(),
        }
    }

    /// Parse a `{ ... }` or `=> expr` body.
    pub(crate) fn parse_body(&mut self) -> Body {
        match self.current() {
            TokenType::LeftBrace => Body::Block(self.parse_block()),
            TokenType::Arrow => {
                let begin = self.consume_token();
                let expr = self.parse_expression();
                let range = SourceRange::new(begin, expr.range().end);
                Body::Arrow(range, expr)
            }
            _ => {
                let pos = self.token.range.begin;
                self.reporter.report(pos, ReportId::ParseExpectBody);
                Body::Block(BlockStatement {
                    range: SourceRange::at(pos),
                    members: Vec::new(),
                })
            }
        }
    }

    pub(crate) fn parse_block(&mut self) -> BlockStatement {
        let begin = self.require_token(TokenType::LeftBrace);
        let begin = if begin.is_valid() {
            begin
        } else {
            self.token.range.begin
        };

        let mut members = Vec::new();
        while !self.at(TokenType::RightBrace) && !self.at_eof() {
            let before = self.token.range.begin;
            members.push(self.parse_script_member());
            if self.token.range.begin == before && !self.at_eof() {
                // Stuck production; drop the offending token.
                self.consume();
            }
        }

        self.require_token(TokenType::RightBrace);
        BlockStatement {
            range: SourceRange::new(begin, self.prev_range().end),
            members,
        }
    }

    fn parse_if(&mut self) -> Statement {
        Statement::If(Box::new(self.parse_if_inner()))
    }

    fn parse_if_inner(&mut self) -> IfStatement {
        let begin = self.consume_token(); // 'if'
        let condition = self.parse_expression();
        let then_body = self.parse_body();

        let mut end = then_body.range().end;
        let else_body = if self.consume_if(TokenType::Else).is_some() {
            if self.at(TokenType::If) {
                let nested = self.parse_if_inner();
                end = nested.range.end;
                Some(ElseBody::ElseIf(Box::new(nested)))
            } else {
                let body = self.parse_body();
                end = body.range().end;
                Some(ElseBody::Else(body))
            }
        } else {
            None
        };

        IfStatement {
            range: SourceRange::new(begin, end),
            condition,
            then_body,
            else_body,
        }
    }

    fn parse_match(&mut self) -> Statement {
        let begin = self.consume_token();
        let condition = self.parse_expression();
        self.require_token(TokenType::LeftBrace);

        let mut cases: Vec<MatchCase> = Vec::new();
        let mut seen_default = false;

        while !self.at(TokenType::RightBrace) && !self.at_eof() {
            if !matches!(self.current(), TokenType::Case | TokenType::Default) {
                let pos = self.token.range.begin;
                self.reporter.report_args(
                    pos,
                    ReportId::ParseUnexpectedToken,
                    &[self.current().describe()],
                );
                self.skip_to_member();
                if !matches!(self.current(), TokenType::Case | TokenType::Default) {
                    if self.at(TokenType::RightBrace) || self.at_eof() {
                        break;
                    }
                    self.consume();
                }
                continue;
            }

            // Consecutive labels share one body.
            let case_begin = self.token.range.begin;
            let mut labels = Vec::new();
            while matches!(self.current(), TokenType::Case | TokenType::Default) {
                let label_begin = self.token.range.begin;
                let value = if self.consume_if(TokenType::Case).is_some() {
                    if seen_default {
                        self.reporter
                            .report(label_begin, ReportId::ParseCaseAfterDefault);
                    }
                    Some(self.parse_binary(super::precedence::BASE_RANK))
                } else {
                    self.consume(); // 'default'
                    seen_default = true;
                    None
                };
                self.require_token(TokenType::Colon);
                labels.push(CaseLabel {
                    range: SourceRange::new(label_begin, self.prev_range().end),
                    value,
                });
            }

            let mut members = Vec::new();
            while !matches!(
                self.current(),
                TokenType::Case | TokenType::Default | TokenType::RightBrace | TokenType::EndOfFile
            ) {
                let before = self.token.range.begin;
                members.push(self.parse_script_member());
                if self.token.range.begin == before && !self.at_eof() {
                    self.consume();
                }
            }

            cases.push(MatchCase {
                range: SourceRange::new(case_begin, self.prev_range().end),
                labels,
                members,
            });
        }

        self.require_token(TokenType::RightBrace);
        Statement::Match(Box::new(MatchStatement {
            range: SourceRange::new(begin, self.prev_range().end),
            condition,
            cases,
        }))
    }

    fn parse_for(&mut self) -> Statement {
        let begin = self.consume_token();
        let id = self.next_node_id();
        let binding = self.require_identifier();
        self.require_token(TokenType::In);
        let sequence = self.parse_expression();
        let body = self.parse_body();

        Statement::For(Box::new(ForStatement {
            range: SourceRange::new(begin, body.range().end),
            id,
            binding,
            sequence,
            body,
        }))
    }

    fn parse_while(&mut self) -> Statement {
        let begin = self.consume_token();
        let condition = self.parse_expression();
        let body = self.parse_body();

        Statement::While(Box::new(WhileStatement {
            range: SourceRange::new(begin, body.range().end),
            condition,
            body,
        }))
    }

    fn parse_try(&mut self) -> Statement {
        let begin = self.consume_token();
        let body = self.parse_body();

        let mut excepts = Vec::new();
        while self.at(TokenType::Except) {
            let clause_begin = self.consume_token();

            let type_name = if self.at_identifier() {
                Some(self.require_identifier())
            } else {
                None
            };
            let binding = if self.consume_if(TokenType::As).is_some() {
                Some(self.require_identifier())
            } else {
                None
            };

            let clause_body = self.parse_body();
            excepts.push(ExceptClause {
                range: SourceRange::new(clause_begin, clause_body.range().end),
                type_name,
                id: self.next_node_id(),
                binding,
                body: clause_body,
            });
        }

        let finally = if self.consume_if(TokenType::Finally).is_some() {
            Some(self.parse_body())
        } else {
            None
        };

        let end = finally
            .as_ref()
            .map(|f| f.range().end)
            .or_else(|| excepts.last().map(|c| c.range.end))
            .unwrap_or(body.range().end);

        Statement::Try(Box::new(TryStatement {
            range: SourceRange::new(begin, end),
            body,
            excepts,
            finally,
        }))
    }

    fn parse_with(&mut self) -> Statement {
        let begin = self.consume_token();
        let resource = self.parse_expression();
        let id = self.next_node_id();
        let binding = if self.consume_if(TokenType::As).is_some() {
            Some(self.require_identifier())
        } else {
            None
        };
        let body = self.parse_body();

        Statement::With(Box::new(WithStatement {
            range: SourceRange::new(begin, body.range().end),
            resource,
            id,
            binding,
            body,
        }))
    }

    fn parse_return(&mut self) -> Statement {
        let begin = self.consume_token();

        let value = if self.has_eol() || !self.can_start_expression() {
            None
        } else {
            Some(self.parse_expression())
        };

        let end = value
            .as_ref()
            .map(|v| v.range().end)
            .unwrap_or(self.prev_range().end);
        self.require_eol();

        Statement::Return(Box::new(ReturnStatement {
            range: SourceRange::new(begin, end),
            value,
        }))
    }

    fn parse_raise(&mut self) -> Statement {
        let begin = self.consume_token();

        let value = if self.has_eol() || !self.can_start_expression() {
            None
        } else {
            Some(self.parse_expression())
        };

        let end = value
            .as_ref()
            .map(|v| v.range().end)
            .unwrap_or(self.prev_range().end);
        self.require_eol();

        Statement::Raise(Box::new(RaiseStatement {
            range: SourceRange::new(begin, end),
            value,
        }))
    }

    fn parse_assert(&mut self) -> Statement {
        let begin = self.consume_token();
        let condition = self.parse_expression();

        let message = if self.consume_if(TokenType::Comma).is_some() {
            Some(self.parse_expression())
        } else {
            None
        };

        let end = message
            .as_ref()
            .map(|m| m.range().end)
            .unwrap_or(condition.range().end);
        self.require_eol();

        Statement::Assert(Box::new(AssertStatement {
            range: SourceRange::new(begin, end),
            condition,
            message,
        }))
    }

    fn parse_labeled(&mut self) -> Statement {
        let label = self.require_identifier();
        self.require_token(TokenType::Colon);
        let statement = self.parse_statement();

        Statement::Labeled(Box::new(LabeledStatement {
            range: SourceRange::new(label.range.begin, statement.range().end),
            label,
            statement,
        }))
    }

    fn parse_assign_or_expression(&mut self) -> Statement {
        let before = self.token.range.begin;
        let target = self.parse_expression();

        if target.is_error() && self.token.range.begin == before {
            // Nothing consumed; resynchronize to the next line.
            let range = self.token.range;
            self.skip_to_eol();
            return Statement::Error(range);
        }

        let op = match self.current() {
            TokenType::Assign => Some(AssignOp::Assign),
            TokenType::InplaceAdd => Some(AssignOp::Add),
            TokenType::InplaceSub => Some(AssignOp::Sub),
            TokenType::InplaceMul => Some(AssignOp::Mul),
            TokenType::InplaceDiv => Some(AssignOp::Div),
            TokenType::InplaceMod => Some(AssignOp::Mod),
            TokenType::InplaceBitAnd => Some(AssignOp::BitAnd),
            TokenType::InplaceBitOr => Some(AssignOp::BitOr),
            TokenType::InplaceBitXor => Some(AssignOp::BitXor),
            TokenType::InplaceLeftShift => Some(AssignOp::LeftShift),
            TokenType::InplaceRightShift => Some(AssignOp::RightShift),
            _ => None,
        };

        if let Some(op) = op {
            if !target.is_assignable() {
                self.reporter
                    .report(self.token.range.begin, ReportId::ParseInvalidAssignTarget);
            }
            let op_pos = self.consume_token();
            let value = self.parse_expression();
            self.require_eol();

            return Statement::Assign(Box::new(AssignStatement {
                range: SourceRange::new(target.range().begin, value.range().end),
                target,
                op,
                op_pos,
                value,
            }));
        }

        self.require_eol();
        let range = target.range();
        Statement::Expression(Box::new(ExpressionStatement { range, expr: target }))
    }
}
