//! Predictive recursive-descent parser with error recovery.
//!
//! The token buffer gives arbitrary lookahead; EOL and comment tokens are
//! transparent to the grammar and only consulted through [`Parser::has_eol`]
//! and [`Parser::require_eol`] for statement termination. Failed
//! expectations report one diagnostic (with a fix-it where the repair is
//! obvious), do not consume the offending token, and surface as typed
//! `Error` nodes so later passes still see structured data.

mod decl;
mod expr;
mod precedence;
mod recovery;
mod stmt;

use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::ast::{Identifier, NodeId, Script};
use crate::diag::{ErrorReporter, ReportId};
use crate::lexer::Lexer;
use crate::source::{SourcePosition, SourceRange, SourceText};
use crate::token::{Token, TokenType};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    reporter: &'a ErrorReporter,

    /// Current significant token (never EOL or comment).
    token: Token,
    /// Lookahead buffer of raw tokens, EOLs and comments included.
    buffer: VecDeque<Token>,
    /// Whether a line break (or EOF) was crossed before `token`.
    newline: bool,
    /// Range of the previously consumed token.
    prev_range: SourceRange,

    /// Shared node-id counter; interpolation sub-parsers reuse it.
    nodes: Rc<Cell<u32>>,
}

impl<'a> Parser<'a> {
    pub fn new(source: SourceText, reporter: &'a ErrorReporter) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source, reporter),
            reporter,
            token: Token::eof(SourceRange::invalid()),
            buffer: VecDeque::new(),
            newline: false,
            prev_range: SourceRange::invalid(),
            nodes: Rc::new(Cell::new(0)),
        };
        parser.load_first();
        parser
    }

    /// A parser over a sub-range of the same buffer, sharing the node-id
    /// counter. Used for interpolated string expressions.
    fn sub_parser(&self, range: SourceRange) -> Parser<'a> {
        let mut parser = Parser {
            lexer: Lexer::new(self.lexer.source().view(range), self.reporter),
            reporter: self.reporter,
            token: Token::eof(SourceRange::invalid()),
            buffer: VecDeque::new(),
            newline: false,
            prev_range: SourceRange::invalid(),
            nodes: Rc::clone(&self.nodes),
        };
        parser.load_first();
        parser
    }

    fn load_first(&mut self) {
        self.consume();
        // consume() saved the placeholder EOF range; forget it.
        self.prev_range = SourceRange::invalid();
        self.newline = false;
    }

    /// Parse a whole script.
    pub fn parse(mut self) -> Script {
        let name = self.lexer.source().name().to_string();
        let begin = self.token.range.begin;
        let mut members = Vec::new();

        while !self.at_eof() {
            let before = self.token.range.begin;
            members.push(self.parse_script_member());

            // Any production that could not consume anything still must
            // not stall the parser.
            if self.token.range.begin == before && !self.at_eof() {
                self.consume();
            }
        }

        let end = members
            .last()
            .map(|m| m.range().end)
            .unwrap_or(self.token.range.end);

        Script {
            name,
            range: SourceRange::new(begin, end),
            members,
        }
    }

    // ------------------------------------------------------------------
    // Token management
    // ------------------------------------------------------------------

    pub(crate) fn next_node_id(&self) -> NodeId {
        let id = self.nodes.get();
        self.nodes.set(id + 1);
        NodeId(id)
    }

    fn next_raw_token(&mut self) -> Token {
        match self.buffer.pop_front() {
            Some(token) => token,
            None => self.lexer.next_token(),
        }
    }

    /// Advance to the next significant token.
    pub(crate) fn consume(&mut self) {
        self.newline = false;
        self.prev_range = self.token.range;

        loop {
            let token = self.next_raw_token();
            match token.ty {
                TokenType::EndOfLine => {
                    self.newline = true;
                }
                TokenType::Comment => {}
                TokenType::EndOfFile => {
                    self.newline = true;
                    self.token = token;
                    return;
                }
                _ => {
                    self.token = token;
                    return;
                }
            }
        }
    }

    /// Peek `lookahead` significant tokens ahead; 0 is the current token.
    pub(crate) fn peek(&mut self, lookahead: usize) -> &Token {
        if lookahead == 0 {
            return &self.token;
        }

        let mut remaining = lookahead;
        let mut index = 0;
        loop {
            if index == self.buffer.len() {
                let token = self.lexer.next_token();
                self.buffer.push_back(token);
            }

            let ty = self.buffer[index].ty;
            if ty == TokenType::EndOfFile {
                return &self.buffer[index];
            }
            if ty != TokenType::EndOfLine && ty != TokenType::Comment {
                remaining -= 1;
                if remaining == 0 {
                    return &self.buffer[index];
                }
            }
            index += 1;
        }
    }

    pub(crate) fn current(&self) -> TokenType {
        self.token.ty
    }

    pub(crate) fn at(&self, ty: TokenType) -> bool {
        self.token.ty == ty
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.token.ty == TokenType::EndOfFile
    }

    /// Consume the current token, returning its begin position.
    pub(crate) fn consume_token(&mut self) -> SourcePosition {
        let pos = self.token.range.begin;
        self.consume();
        pos
    }

    /// Consume the current token, returning its range.
    pub(crate) fn consume_token_range(&mut self) -> SourceRange {
        let range = self.token.range;
        self.consume();
        range
    }

    /// Consume the current token if it has the desired type.
    pub(crate) fn consume_if(&mut self, ty: TokenType) -> Option<SourcePosition> {
        if self.at(ty) {
            Some(self.consume_token())
        } else {
            None
        }
    }

    pub(crate) fn prev_range(&self) -> SourceRange {
        self.prev_range
    }

    /// Whether a line break was crossed just before the current token.
    pub(crate) fn has_eol(&self) -> bool {
        self.newline
    }

    // ------------------------------------------------------------------
    // Expectations
    // ------------------------------------------------------------------

    /// Require `expected`; on mismatch report with an insertion fix-it and
    /// do not consume. Returns the consumed position, invalid on error.
    pub(crate) fn require_token(&mut self, expected: TokenType) -> SourcePosition {
        if self.at(expected) {
            return self.consume_token();
        }

        let pos = self.token.range.begin;
        if self.at_eof() {
            self.reporter.report(pos, ReportId::ParseUnexpectedEof);
        } else if !self.at(TokenType::Invalid) {
            // Invalid tokens already carry a lexer diagnostic.
            self.reporter
                .report_args(pos, ReportId::ParseExpectToken, &[expected.describe()])
                .insert(pos, expected.describe());
        }
        SourcePosition::invalid()
    }

    /// Require an identifier; contextual keywords are accepted. Returns an
    /// empty identifier on failure without consuming.
    pub(crate) fn require_identifier(&mut self) -> Identifier {
        if self.at(TokenType::Identifier) {
            let name = self.token.image().to_string();
            let range = self.consume_token_range();
            return Identifier::new(range, name);
        }
        if self.current().is_contextual_keyword() {
            let name = self.current().describe().to_string();
            let range = self.consume_token_range();
            return Identifier::new(range, name);
        }

        let pos = self.token.range.begin;
        if self.at_eof() {
            self.reporter.report(pos, ReportId::ParseUnexpectedEof);
        } else if !self.at(TokenType::Invalid) {
            self.reporter.report(pos, ReportId::ParseExpectIdentifier);
        }
        Identifier::invalid(pos)
    }

    /// Require a statement terminator: a line break before the current
    /// token. A closing brace ends the statement as well.
    pub(crate) fn require_eol(&mut self) {
        if self.newline || self.at(TokenType::RightBrace) {
            return;
        }
        let pos = self.token.range.begin;
        self.reporter
            .report(pos, ReportId::ParseExpectNewLine)
            .insert(pos, "<enter>");
    }

    /// Whether the current token can act as an identifier.
    pub(crate) fn at_identifier(&self) -> bool {
        self.at(TokenType::Identifier) || self.current().is_contextual_keyword()
    }
}
