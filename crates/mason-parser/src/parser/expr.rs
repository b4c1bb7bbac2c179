//! Expression parsing.
//!
//! Precedence climbing over the rank table in `precedence.rs`. The
//! conditional expression is `value if cond else alt`; `not in` and
//! `is not` are resolved with one token of lookahead before the table is
//! consulted.

use super::precedence::{binary_rank, BASE_RANK};
use super::Parser;
use crate::ast::*;
use crate::convert;
use crate::diag::ReportId;
use crate::source::SourceRange;
use crate::token::{Token, TokenType};

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self) -> Expression {
        let value = self.parse_binary(BASE_RANK);

        // `value if cond else alt`
        if !self.has_eol() && self.at(TokenType::If) {
            self.consume();
            let condition = self.parse_binary(BASE_RANK);
            self.require_token(TokenType::Else);
            let alternative = self.parse_expression();

            let range = value.range().merge(alternative.range());
            return Expression::Ternary(Box::new(TernaryExpr {
                range,
                condition,
                on_true: value,
                on_false: alternative,
            }));
        }

        value
    }

    pub(crate) fn parse_binary(&mut self, min_rank: u8) -> Expression {
        let mut left = self.parse_unary();

        loop {
            // Binary operators do not continue across a line break.
            if self.has_eol() {
                break;
            }

            let resolved = if self.at(TokenType::Not) && self.peek(1).ty == TokenType::In {
                Some((4, BinaryOp::NotIn, 2))
            } else if self.at(TokenType::Is) && self.peek(1).ty == TokenType::Not {
                Some((4, BinaryOp::IsNot, 2))
            } else {
                binary_rank(self.current()).map(|(rank, op)| (rank, op, 1))
            };
            let Some((rank, op, op_tokens)) = resolved else {
                break;
            };

            if rank < min_rank {
                break;
            }

            let op_pos = self.consume_token();
            if op_tokens == 2 {
                self.consume();
            }

            let right = self.parse_binary(rank + 1);
            let range = left.range().merge(right.range());
            left = Expression::Binary(Box::new(BinaryExpr {
                range,
                op,
                op_pos,
                left,
                right,
            }));
        }

        left
    }

    fn parse_unary(&mut self) -> Expression {
        let op = match self.current() {
            TokenType::Not => Some(UnaryOp::Not),
            TokenType::Sub => Some(UnaryOp::Neg),
            TokenType::BitNot => Some(UnaryOp::BitNot),
            _ => None,
        };

        if let Some(op) = op {
            let op_pos = self.consume_token();
            let operand = self.parse_unary();
            let range = SourceRange::new(op_pos, operand.range().end);
            return Expression::Unary(Box::new(UnaryExpr {
                range,
                op,
                op_pos,
                operand,
            }));
        }

        if self.at(TokenType::Defined) {
            let begin = self.consume_token();
            let name = self.require_identifier();
            let range = SourceRange::new(begin, name.range.end);
            return Expression::Defined(Box::new(DefinedExpr {
                range,
                id: self.next_node_id(),
                name,
            }));
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Expression {
        let mut expr = self.parse_primary();

        loop {
            if self.has_eol() {
                break;
            }

            match self.current() {
                TokenType::Dot => {
                    self.consume();
                    let member = self.require_identifier();
                    if !member.is_valid() {
                        break;
                    }

                    if self.at(TokenType::LeftParen) {
                        let (args, end) = self.parse_call_args();
                        let range = SourceRange::new(expr.range().begin, end);
                        expr = Expression::Invoke(Box::new(InvokeExpr {
                            range,
                            target: expr,
                            member,
                            args,
                        }));
                    } else {
                        let range = SourceRange::new(expr.range().begin, member.range.end);
                        expr = Expression::Member(Box::new(MemberExpr {
                            range,
                            target: expr,
                            member,
                        }));
                    }
                }
                TokenType::LeftParen => {
                    let (args, end) = self.parse_call_args();
                    let range = SourceRange::new(expr.range().begin, end);
                    expr = Expression::Call(Box::new(CallExpr {
                        range,
                        target: expr,
                        args,
                    }));
                }
                TokenType::LeftSquare => {
                    self.consume();
                    let index = self.parse_expression();
                    self.require_token(TokenType::RightSquare);
                    let range = SourceRange::new(expr.range().begin, self.prev_range().end);
                    expr = Expression::Subscript(Box::new(SubscriptExpr {
                        range,
                        target: expr,
                        index,
                    }));
                }
                _ => break,
            }
        }

        expr
    }

    /// Parse `( args )`, returning the arguments and the position just
    /// past the closing parenthesis.
    fn parse_call_args(&mut self) -> (Vec<Expression>, crate::source::SourcePosition) {
        debug_assert!(self.at(TokenType::LeftParen));
        self.consume();

        let args = self.parse_expression_list(TokenType::RightParen);
        self.require_token(TokenType::RightParen);
        (args, self.prev_range().end)
    }

    /// Comma-separated expressions up to `end`. A missing comma between
    /// two obvious items is healed with a diagnostic.
    pub(crate) fn parse_expression_list(&mut self, end: TokenType) -> Vec<Expression> {
        let mut items = Vec::new();

        loop {
            if self.at(end) || self.at_eof() {
                break;
            }

            let before = self.token.range.begin;
            items.push(self.parse_expression());
            let progressed = self.token.range.begin != before;

            if self.consume_if(TokenType::Comma).is_some() {
                continue;
            }
            if self.at(end) || self.at_eof() {
                break;
            }

            if progressed && self.can_start_expression() && !self.has_eol() {
                let pos = self.token.range.begin;
                self.reporter
                    .report(pos, ReportId::ParseExpectComma)
                    .insert(pos, ",");
                continue;
            }

            break;
        }

        items
    }

    pub(crate) fn can_start_expression(&self) -> bool {
        matches!(
            self.current(),
            TokenType::Identifier
                | TokenType::Integer
                | TokenType::Float
                | TokenType::String
                | TokenType::True
                | TokenType::False
                | TokenType::None
                | TokenType::SelfRef
                | TokenType::Super
                | TokenType::Not
                | TokenType::Sub
                | TokenType::BitNot
                | TokenType::Defined
                | TokenType::LeftParen
                | TokenType::LeftSquare
                | TokenType::LeftBrace
        ) || self.current().is_contextual_keyword()
    }

    fn parse_primary(&mut self) -> Expression {
        match self.current() {
            TokenType::Integer => {
                let token = self.token.clone();
                let range = self.consume_token_range();
                match convert::parse_integer(token.image()) {
                    Some(value) => Expression::Literal(LiteralExpr {
                        range,
                        value: Literal::Integer(value),
                    }),
                    None => {
                        self.reporter.report_args(
                            range.begin,
                            ReportId::LexInvalidNumber,
                            &[token.image()],
                        );
                        Expression::Error(range)
                    }
                }
            }
            TokenType::Float => {
                let token = self.token.clone();
                let range = self.consume_token_range();
                match convert::parse_float(token.image()) {
                    Some(value) => Expression::Literal(LiteralExpr {
                        range,
                        value: Literal::Float(value),
                    }),
                    None => {
                        self.reporter.report_args(
                            range.begin,
                            ReportId::LexInvalidNumber,
                            &[token.image()],
                        );
                        Expression::Error(range)
                    }
                }
            }
            TokenType::String => {
                let token = self.token.clone();
                self.consume();
                self.parse_string(token)
            }
            TokenType::True => {
                let range = self.consume_token_range();
                Expression::Literal(LiteralExpr {
                    range,
                    value: Literal::True,
                })
            }
            TokenType::False => {
                let range = self.consume_token_range();
                Expression::Literal(LiteralExpr {
                    range,
                    value: Literal::False,
                })
            }
            TokenType::None => {
                let range = self.consume_token_range();
                Expression::Literal(LiteralExpr {
                    range,
                    value: Literal::None,
                })
            }
            TokenType::SelfRef => Expression::SelfRef(self.consume_token_range()),
            TokenType::Super => Expression::SuperRef(self.consume_token_range()),
            TokenType::LeftParen => {
                if self.check_for_closure() {
                    self.parse_closure()
                } else {
                    let begin = self.consume_token();
                    let inner = self.parse_expression();
                    self.require_token(TokenType::RightParen);
                    let range = SourceRange::new(begin, self.prev_range().end);
                    Expression::Paren(Box::new(ParenExpr { range, inner }))
                }
            }
            TokenType::LeftSquare => self.parse_list(),
            TokenType::LeftBrace => self.parse_map(),
            TokenType::Invalid => {
                // The lexer already reported this token.
                Expression::Error(self.consume_token_range())
            }
            ty if ty == TokenType::Identifier || ty.is_contextual_keyword() => {
                let name = self.require_identifier();
                Expression::Name(NameExpr {
                    id: self.next_node_id(),
                    name,
                })
            }
            _ => {
                let pos = self.token.range.begin;
                if self.at_eof() {
                    self.reporter.report(pos, ReportId::ParseUnexpectedEof);
                } else {
                    self.reporter.report(pos, ReportId::ParseExpectExpression);
                }
                Expression::Error(SourceRange::at(pos))
            }
        }
    }

    /// Rebuild a string token as a literal or interpolated expression.
    /// The token has already been consumed.
    fn parse_string(&mut self, token: Token) -> Expression {
        if token.interpolations.is_empty() {
            return Expression::Literal(LiteralExpr {
                range: token.range,
                value: Literal::String(token.image().to_string()),
            });
        }

        let mut parts = Vec::new();
        for (index, span) in token.interpolations.iter().enumerate() {
            let piece = &token.pieces[index];
            if !piece.is_empty() {
                parts.push(StringPart::Text(piece.clone()));
            }

            let mut sub = self.sub_parser(span.inner);
            parts.push(StringPart::Expr(sub.parse_expression()));
        }
        let tail = &token.pieces[token.interpolations.len()];
        if !tail.is_empty() {
            parts.push(StringPart::Text(tail.clone()));
        }

        Expression::InterpolatedString(Box::new(InterpolatedStringExpr {
            range: token.range,
            parts,
        }))
    }

    /// Decide whether a `(` starts a closure: scan past the balanced
    /// parentheses and look for `=>` or `{`.
    fn check_for_closure(&mut self) -> bool {
        debug_assert!(self.at(TokenType::LeftParen));

        let mut depth = 1u32;
        let mut n = 1usize;
        loop {
            match self.peek(n).ty {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                TokenType::EndOfFile => return false,
                _ => {}
            }
            n += 1;
        }

        matches!(
            self.peek(n + 1).ty,
            TokenType::Arrow | TokenType::LeftBrace
        )
    }

    fn parse_closure(&mut self) -> Expression {
        let begin = self.token.range.begin;
        let id = self.next_node_id();
        let params = self.parse_parameter_list();
        let body = self.parse_body();
        let range = SourceRange::new(begin, body.range().end);

        Expression::Closure(Box::new(ClosureExpr {
            range,
            id,
            params,
            body,
        }))
    }

    fn parse_list(&mut self) -> Expression {
        let begin = self.consume_token();
        let items = self.parse_expression_list(TokenType::RightSquare);
        self.require_token(TokenType::RightSquare);
        let range = SourceRange::new(begin, self.prev_range().end);
        Expression::List(Box::new(ListExpr { range, items }))
    }

    fn parse_map(&mut self) -> Expression {
        let begin = self.consume_token();
        let mut entries = Vec::new();

        loop {
            if self.at(TokenType::RightBrace) || self.at_eof() {
                break;
            }

            let before = self.token.range.begin;
            let key = self.parse_expression();
            self.require_token(TokenType::Colon);
            let value = self.parse_expression();
            entries.push((key, value));

            if self.consume_if(TokenType::Comma).is_some() {
                continue;
            }
            if self.at(TokenType::RightBrace) || self.at_eof() {
                break;
            }
            if self.token.range.begin != before && self.can_start_expression() && !self.has_eol() {
                let pos = self.token.range.begin;
                self.reporter
                    .report(pos, ReportId::ParseExpectComma)
                    .insert(pos, ",");
                continue;
            }
            break;
        }

        self.require_token(TokenType::RightBrace);
        let range = SourceRange::new(begin, self.prev_range().end);
        Expression::Map(Box::new(MapExpr { range, entries }))
    }
}
