//! In-memory source buffer.
//!
//! `SourceText` owns the encoded bytes of one compilation unit and yields
//! code points through the configured decoder while tracking line/column.
//! Tabs advance the column to the next multiple of the tab size; CR, LF
//! and CRLF each count as a single line break.

use std::rc::Rc;

use super::position::{SourcePosition, SourceRange};
use crate::encoding::{DecodeError, Decoder};

/// What the buffer yields at the current cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePoint {
    Char(char),
    Invalid(DecodeError),
    Eof,
}

impl CodePoint {
    pub fn is_char(&self, ch: char) -> bool {
        matches!(self, CodePoint::Char(c) if *c == ch)
    }

    pub fn as_char(&self) -> Option<char> {
        match self {
            CodePoint::Char(c) => Some(*c),
            _ => None,
        }
    }
}

/// Saved cursor state of a [`SourceText`].
#[derive(Debug, Clone, Copy)]
pub struct TextCheckpoint {
    cursor: usize,
    next_cursor: usize,
    current: CodePoint,
    line: u32,
    column: u32,
}

/// Source code of one compilation unit.
pub struct SourceText {
    name: String,
    bytes: Rc<[u8]>,
    decoder: &'static dyn Decoder,
    tab_size: u32,

    /// End of this view into `bytes`.
    end: usize,

    /// Cursor of the current (peeked) code point.
    cursor: usize,
    /// Byte offset just past the current code point (past the LF of CRLF).
    next_cursor: usize,
    current: CodePoint,
    line: u32,
    column: u32,
}

impl SourceText {
    pub fn new(
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        decoder: &'static dyn Decoder,
        tab_size: u32,
    ) -> Self {
        let bytes: Rc<[u8]> = bytes.into().into();
        let begin = decoder.strip_preamble(&bytes);
        let end = bytes.len();

        let mut text = Self {
            name: name.into(),
            bytes,
            decoder,
            tab_size: tab_size.max(1),
            end,
            cursor: begin,
            next_cursor: begin,
            current: CodePoint::Eof,
            line: 1,
            column: 1,
        };
        text.current = text.decode_at(begin);
        text.next_cursor = text.cursor_after(begin);
        text
    }

    /// A sub-view over `range`, sharing the byte buffer. Used to re-scan
    /// interpolated string segments as expressions.
    pub fn view(&self, range: SourceRange) -> SourceText {
        let begin = range.begin.cursor;
        let end = range.end.cursor;
        debug_assert!(begin <= end && end <= self.bytes.len());

        let mut text = Self {
            name: self.name.clone(),
            bytes: Rc::clone(&self.bytes),
            decoder: self.decoder,
            tab_size: self.tab_size,
            end,
            cursor: begin,
            next_cursor: begin,
            current: CodePoint::Eof,
            line: range.begin.line,
            column: range.begin.column,
        };
        text.current = text.decode_at(begin);
        text.next_cursor = text.cursor_after(begin);
        text
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tab_size(&self) -> u32 {
        self.tab_size
    }

    pub fn decoder(&self) -> &'static dyn Decoder {
        self.decoder
    }

    /// The current code point without advancing.
    pub fn peek(&self) -> CodePoint {
        self.current
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.current, CodePoint::Eof)
    }

    /// Position of the current code point.
    pub fn position(&self) -> SourcePosition {
        SourcePosition::new(self.cursor, self.line, self.column)
    }

    /// Advance past the current code point, returning it.
    pub fn consume(&mut self) -> CodePoint {
        let consumed = self.current;

        if self.cursor >= self.end {
            return consumed;
        }

        match consumed {
            CodePoint::Char('\r') | CodePoint::Char('\n') => {
                self.line += 1;
                self.column = 1;
            }
            CodePoint::Char('\t') => {
                self.column += self.tab_size - (self.column % self.tab_size) + 1;
            }
            _ => {
                self.column += 1;
            }
        }

        self.cursor = self.next_cursor;
        self.current = self.decode_at(self.cursor);
        self.next_cursor = self.cursor_after(self.cursor);

        consumed
    }

    /// Snapshot of the cursor state, for bounded rewinds in the lexer.
    pub fn checkpoint(&self) -> TextCheckpoint {
        TextCheckpoint {
            cursor: self.cursor,
            next_cursor: self.next_cursor,
            current: self.current,
            line: self.line,
            column: self.column,
        }
    }

    /// Rewind to a previously taken checkpoint.
    pub fn rewind(&mut self, checkpoint: TextCheckpoint) {
        self.cursor = checkpoint.cursor;
        self.next_cursor = checkpoint.next_cursor;
        self.current = checkpoint.current;
        self.line = checkpoint.line;
        self.column = checkpoint.column;
    }

    /// Consume the current code point if it equals `ch`.
    pub fn consume_if(&mut self, ch: char) -> bool {
        if self.current.is_char(ch) {
            self.consume();
            true
        } else {
            false
        }
    }

    /// Consume while `pred` holds, returning the position just past the
    /// last consumed code point.
    pub fn consume_while(&mut self, mut pred: impl FnMut(char) -> bool) -> SourcePosition {
        while let CodePoint::Char(ch) = self.current {
            if !pred(ch) {
                break;
            }
            self.consume();
        }
        self.position()
    }

    /// The position following `pos`. Pure; never touches cursor state.
    pub fn next_position(&self, pos: SourcePosition) -> SourcePosition {
        debug_assert!(pos.cursor < self.end);

        let ch = self.decode_at(pos.cursor);
        let mut line = pos.line;
        let mut column = pos.column;

        match ch {
            CodePoint::Char('\r') | CodePoint::Char('\n') => {
                line += 1;
                column = 1;
            }
            CodePoint::Char('\t') => {
                column += self.tab_size - (column % self.tab_size) + 1;
            }
            CodePoint::Eof => {}
            _ => {
                column += 1;
            }
        }

        SourcePosition::new(self.cursor_after(pos.cursor), line, column)
    }

    /// Decoded text between two positions.
    pub fn get_string(&self, begin: SourcePosition, end: SourcePosition) -> String {
        debug_assert!(begin.cursor <= end.cursor);
        debug_assert!(end.cursor <= self.bytes.len());

        self.decoder
            .decode_lossy(&self.bytes[begin.cursor..end.cursor])
    }

    /// Decoded text of a range.
    pub fn get_range_string(&self, range: SourceRange) -> String {
        self.get_string(range.begin, range.end)
    }

    fn decode_at(&self, cursor: usize) -> CodePoint {
        if cursor >= self.end {
            return CodePoint::Eof;
        }

        let (result, consumed) = self.decoder.decode_one(&self.bytes[cursor..self.end]);
        if consumed == 0 {
            return CodePoint::Eof;
        }

        match result {
            Ok(ch) => CodePoint::Char(ch),
            Err(err) => CodePoint::Invalid(err),
        }
    }

    /// Byte offset just past the code point at `cursor`, folding CRLF.
    fn cursor_after(&self, cursor: usize) -> usize {
        if cursor >= self.end {
            return cursor;
        }

        let (result, consumed) = self.decoder.decode_one(&self.bytes[cursor..self.end]);
        if consumed == 0 {
            return cursor;
        }

        let mut next = cursor + consumed;
        if result == Ok('\r') && next < self.end {
            let (peeked, peeked_len) = self.decoder.decode_one(&self.bytes[next..self.end]);
            if peeked == Ok('\n') {
                next += peeked_len;
            }
        }
        next
    }
}
