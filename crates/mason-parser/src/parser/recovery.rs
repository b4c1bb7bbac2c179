//! Error re-synchronization.
//!
//! Each production that loses the thread skips to a safe point: the next
//! statement boundary (EOL), a closing brace, or the next declaration
//! starter. Skipping balances nested braces so a stray token inside a
//! block does not desynchronize the enclosing construct.

use super::Parser;
use crate::token::TokenType;

/// Token types that start a declaration.
pub(crate) fn is_declaration_starter(ty: TokenType) -> bool {
    matches!(
        ty,
        TokenType::Import
            | TokenType::Export
            | TokenType::Def
            | TokenType::Class
            | TokenType::Task
            | TokenType::Var
            | TokenType::Const
    )
}

impl Parser<'_> {
    /// Skip to just after the next statement boundary.
    pub(crate) fn skip_to_eol(&mut self) {
        while !self.has_eol() && !self.at_eof() {
            match self.current() {
                TokenType::LeftBrace => self.skip_braces(),
                TokenType::RightBrace => return,
                _ => self.consume(),
            }
        }
    }

    /// Skip a balanced `{ ... }`, consuming the closing brace.
    pub(crate) fn skip_braces(&mut self) {
        debug_assert!(self.at(TokenType::LeftBrace));
        self.consume();

        let mut depth = 1u32;
        while depth > 0 && !self.at_eof() {
            match self.current() {
                TokenType::LeftBrace => depth += 1,
                TokenType::RightBrace => depth -= 1,
                _ => {}
            }
            self.consume();
        }
    }

    /// Skip to the next member boundary inside a braced body: a closing
    /// brace, a declaration starter, or a statement on a fresh line.
    pub(crate) fn skip_to_member(&mut self) {
        while !self.at_eof() {
            match self.current() {
                TokenType::RightBrace => return,
                TokenType::LeftBrace => self.skip_braces(),
                ty if is_declaration_starter(ty) => return,
                _ if self.has_eol() => return,
                _ => self.consume(),
            }
        }
    }
}
