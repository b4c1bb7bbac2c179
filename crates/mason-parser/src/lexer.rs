//! Token scanner for the Mason build-script language.
//!
//! The lexer reads one logical token per call, directly off the decoded
//! source buffer. Newlines become `EndOfLine` tokens and comments are
//! preserved as `Comment` tokens; the parser filters both at its lookahead
//! boundary. Errors are reported through the diagnostic channel and the
//! scanner always makes progress by emitting `Invalid` and advancing.

use unicode_xid::UnicodeXID;

use crate::diag::{ErrorReporter, ReportId};
use crate::source::{CodePoint, SourcePosition, SourceRange, SourceText};
use crate::token::{InterpolationSpan, Token, TokenType};

pub struct Lexer<'a> {
    source: SourceText,
    reporter: &'a ErrorReporter,
    eof_eol_emitted: bool,
}

fn is_ident_start(ch: char) -> bool {
    ch == '_' || ch.is_xid_start()
}

fn is_ident_continue(ch: char) -> bool {
    ch == '_' || ch.is_xid_continue()
}

fn is_decimal_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

fn is_hex_digit(ch: char) -> bool {
    ch.is_ascii_hexdigit()
}

fn is_octal_digit(ch: char) -> bool {
    ('0'..='7').contains(&ch)
}

fn is_binary_digit(ch: char) -> bool {
    ch == '0' || ch == '1'
}

impl<'a> Lexer<'a> {
    pub fn new(source: SourceText, reporter: &'a ErrorReporter) -> Self {
        Self {
            source,
            reporter,
            eof_eol_emitted: false,
        }
    }

    pub fn source(&self) -> &SourceText {
        &self.source
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Token {
        loop {
            let begin = self.source.position();

            match self.source.peek() {
                CodePoint::Eof => {
                    // One final EndOfLine terminates the last statement.
                    if !self.eof_eol_emitted {
                        self.eof_eol_emitted = true;
                        return Token::new(TokenType::EndOfLine, SourceRange::at(begin));
                    }
                    return Token::eof(SourceRange::at(begin));
                }
                CodePoint::Invalid(err) => {
                    let id = match err {
                        crate::encoding::DecodeError::InvalidEncoding => {
                            ReportId::LexInvalidEncoding
                        }
                        crate::encoding::DecodeError::InvalidCharacter => {
                            ReportId::LexInvalidCharacter
                        }
                    };
                    self.reporter.report(begin, id);
                    self.source.consume();
                    return Token::new(TokenType::Invalid, self.range_from(begin));
                }
                CodePoint::Char(ch) => match ch {
                    ' ' | '\t' => {
                        self.source.consume();
                        continue;
                    }
                    '\r' | '\n' => {
                        self.source.consume();
                        return Token::new(TokenType::EndOfLine, self.range_from(begin));
                    }
                    '/' => {
                        self.source.consume();
                        match self.source.peek() {
                            CodePoint::Char('/') => return self.lex_line_comment(begin),
                            CodePoint::Char('*') => return self.lex_block_comment(begin),
                            CodePoint::Char('=') => {
                                self.source.consume();
                                return Token::new(
                                    TokenType::InplaceDiv,
                                    self.range_from(begin),
                                );
                            }
                            _ => return Token::new(TokenType::Div, self.range_from(begin)),
                        }
                    }
                    '0'..='9' => return self.lex_number(begin),
                    '"' | '\'' => return self.lex_string(begin, ch),
                    _ if is_ident_start(ch) => return self.lex_identifier(begin),
                    _ => return self.lex_punctuator(begin, ch),
                },
            }
        }
    }

    fn range_from(&self, begin: SourcePosition) -> SourceRange {
        SourceRange::new(begin, self.source.position())
    }

    fn lex_line_comment(&mut self, begin: SourcePosition) -> Token {
        // The second '/' is current.
        self.source
            .consume_while(|ch| ch != '\r' && ch != '\n');
        Token::new(TokenType::Comment, self.range_from(begin))
    }

    fn lex_block_comment(&mut self, begin: SourcePosition) -> Token {
        self.source.consume(); // '*'

        loop {
            match self.source.peek() {
                CodePoint::Eof => {
                    self.reporter
                        .report(begin, ReportId::LexUnterminatedComment);
                    break;
                }
                CodePoint::Char('*') => {
                    self.source.consume();
                    if self.source.consume_if('/') {
                        break;
                    }
                }
                _ => {
                    self.source.consume();
                }
            }
        }

        Token::new(TokenType::Comment, self.range_from(begin))
    }

    fn lex_identifier(&mut self, begin: SourcePosition) -> Token {
        let end = self.source.consume_while(is_ident_continue);
        let image = self.source.get_string(begin, end);

        match TokenType::keyword(&image) {
            Some(ty) => Token::new(ty, self.range_from(begin)),
            None => Token::with_image(TokenType::Identifier, self.range_from(begin), image),
        }
    }

    fn lex_number(&mut self, begin: SourcePosition) -> Token {
        let first = self.source.consume();

        if first.is_char('0') {
            let radix = match self.source.peek() {
                CodePoint::Char('x') | CodePoint::Char('X') => Some(is_hex_digit as fn(char) -> bool),
                CodePoint::Char('o') | CodePoint::Char('O') => Some(is_octal_digit as fn(char) -> bool),
                CodePoint::Char('b') | CodePoint::Char('B') => Some(is_binary_digit as fn(char) -> bool),
                _ => None,
            };

            if let Some(digit) = radix {
                self.source.consume();
                return self.lex_radix_digits(begin, digit);
            }
        }

        let mut is_float = false;
        self.source.consume_while(is_decimal_digit);

        // Fraction part. A bare trailing dot is member access, not a float.
        if self.source.peek().is_char('.') {
            let before_dot = self.source.checkpoint();
            self.source.consume();
            if matches!(self.source.peek(), CodePoint::Char(c) if is_decimal_digit(c)) {
                is_float = true;
                self.source.consume_while(is_decimal_digit);
            } else {
                self.source.rewind(before_dot);
                let image = self.source.get_string(begin, self.source.position());
                return Token::with_image(TokenType::Integer, self.range_from(begin), image);
            }
        }

        // Exponent part.
        if matches!(self.source.peek(), CodePoint::Char('e') | CodePoint::Char('E')) {
            is_float = true;
            self.source.consume();
            if matches!(self.source.peek(), CodePoint::Char('+') | CodePoint::Char('-')) {
                self.source.consume();
            }
            if !matches!(self.source.peek(), CodePoint::Char(c) if is_decimal_digit(c)) {
                self.reporter.report(self.source.position(), ReportId::LexRequireDigit);
                return Token::new(TokenType::Invalid, self.range_from(begin));
            }
            self.source.consume_while(is_decimal_digit);
        }

        // A number immediately followed by identifier characters is one
        // ill-formed token, not two.
        if matches!(self.source.peek(), CodePoint::Char(c) if is_ident_start(c)) {
            let end = self.source.consume_while(is_ident_continue);
            self.reporter.report_args(
                begin,
                ReportId::LexInvalidNumber,
                &[&self.source.get_string(begin, end)],
            );
            return Token::new(TokenType::Invalid, self.range_from(begin));
        }

        let image = self.source.get_string(begin, self.source.position());
        let ty = if is_float {
            TokenType::Float
        } else {
            TokenType::Integer
        };
        Token::with_image(ty, self.range_from(begin), image)
    }

    fn lex_radix_digits(&mut self, begin: SourcePosition, digit: fn(char) -> bool) -> Token {
        if !matches!(self.source.peek(), CodePoint::Char(c) if digit(c)) {
            self.reporter
                .report(self.source.position(), ReportId::LexRequireDigit);
            return Token::new(TokenType::Invalid, self.range_from(begin));
        }

        self.source.consume_while(digit);

        if matches!(self.source.peek(), CodePoint::Char(c) if is_ident_start(c) || is_decimal_digit(c))
        {
            let end = self.source.consume_while(is_ident_continue);
            self.reporter.report_args(
                begin,
                ReportId::LexInvalidNumber,
                &[&self.source.get_string(begin, end)],
            );
            return Token::new(TokenType::Invalid, self.range_from(begin));
        }

        let image = self.source.get_string(begin, self.source.position());
        Token::with_image(TokenType::Integer, self.range_from(begin), image)
    }

    fn lex_string(&mut self, begin: SourcePosition, quote: char) -> Token {
        self.source.consume(); // opening quote

        let mut image = String::new();
        let mut pieces: Vec<String> = Vec::new();
        let mut interpolations = Vec::new();

        loop {
            match self.source.peek() {
                CodePoint::Eof | CodePoint::Char('\r') | CodePoint::Char('\n') => {
                    self.reporter
                        .report(begin, ReportId::LexUnterminatedString);
                    return Token::new(TokenType::Invalid, self.range_from(begin));
                }
                CodePoint::Invalid(_) => {
                    self.reporter
                        .report(self.source.position(), ReportId::LexInvalidEncoding);
                    self.source.consume();
                }
                CodePoint::Char(ch) if ch == quote => {
                    self.source.consume();
                    break;
                }
                CodePoint::Char('\\') => {
                    if let Some(ch) = self.lex_escape() {
                        image.push(ch);
                    }
                }
                CodePoint::Char('$') => {
                    let outer_begin = self.source.position();
                    self.source.consume();
                    if self.source.peek().is_char('{') {
                        self.source.consume();
                        if let Some(span) = self.scan_interpolation(outer_begin) {
                            interpolations.push(span);
                            pieces.push(std::mem::take(&mut image));
                        } else {
                            self.reporter
                                .report(begin, ReportId::LexUnterminatedInterpolation);
                            return Token::new(TokenType::Invalid, self.range_from(begin));
                        }
                    } else {
                        image.push('$');
                    }
                }
                CodePoint::Char(ch) => {
                    image.push(ch);
                    self.source.consume();
                }
            }
        }

        if !interpolations.is_empty() {
            pieces.push(std::mem::take(&mut image));
            let full: String = pieces.concat();
            let mut token = Token::with_image(TokenType::String, self.range_from(begin), full);
            token.interpolations = interpolations;
            token.pieces = pieces;
            return token;
        }

        Token::with_image(TokenType::String, self.range_from(begin), image)
    }

    /// Scan a balanced `${...}` segment; `outer_begin` is the `$`. The
    /// current code point is the first one past `{`.
    fn scan_interpolation(&mut self, outer_begin: SourcePosition) -> Option<InterpolationSpan> {
        let inner_begin = self.source.position();
        let mut depth = 1u32;
        let mut quote: Option<char> = None;

        loop {
            match self.source.peek() {
                CodePoint::Eof | CodePoint::Invalid(_) => return None,
                CodePoint::Char(ch) => {
                    if let Some(q) = quote {
                        if ch == '\\' {
                            self.source.consume();
                            self.source.consume();
                            continue;
                        }
                        if ch == q {
                            quote = None;
                        }
                        self.source.consume();
                        continue;
                    }

                    match ch {
                        '"' | '\'' => quote = Some(ch),
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                let inner_end = self.source.position();
                                self.source.consume();
                                return Some(InterpolationSpan {
                                    outer: SourceRange::new(outer_begin, self.source.position()),
                                    inner: SourceRange::new(inner_begin, inner_end),
                                });
                            }
                        }
                        '\r' | '\n' => return None,
                        _ => {}
                    }
                    self.source.consume();
                }
            }
        }
    }

    /// Decode one escape sequence; the current code point is the backslash.
    fn lex_escape(&mut self) -> Option<char> {
        let backslash = self.source.position();
        self.source.consume();

        let ch = match self.source.peek() {
            CodePoint::Char(c) => c,
            _ => {
                self.reporter
                    .report_args(backslash, ReportId::LexInvalidEscape, &["<eof>"]);
                return None;
            }
        };
        self.source.consume();

        let decoded = match ch {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            '$' => '$',
            'x' => return self.lex_unicode_escape(backslash, 2),
            'u' => return self.lex_unicode_escape(backslash, 4),
            other => {
                self.reporter.report_args(
                    backslash,
                    ReportId::LexInvalidEscape,
                    &[&other.to_string()],
                );
                return Some(other);
            }
        };
        Some(decoded)
    }

    fn lex_unicode_escape(&mut self, backslash: SourcePosition, digits: u32) -> Option<char> {
        let mut value = 0u32;
        for _ in 0..digits {
            match self.source.peek() {
                CodePoint::Char(c) if is_hex_digit(c) => {
                    value = value * 16 + c.to_digit(16).unwrap();
                    self.source.consume();
                }
                _ => {
                    self.reporter
                        .report_args(backslash, ReportId::LexInvalidEscape, &["x"]);
                    return None;
                }
            }
        }

        match char::from_u32(value) {
            Some(ch) => Some(ch),
            None => {
                self.reporter
                    .report(backslash, ReportId::LexInvalidCharacter);
                None
            }
        }
    }

    fn lex_punctuator(&mut self, begin: SourcePosition, ch: char) -> Token {
        use TokenType::*;
        self.source.consume();

        let ty = match ch {
            '+' => self.with_assign(InplaceAdd, Add),
            '-' => self.with_assign(InplaceSub, Sub),
            '*' => self.with_assign(InplaceMul, Mul),
            '%' => self.with_assign(InplaceMod, Mod),
            '&' => self.with_assign(InplaceBitAnd, BitAnd),
            '|' => self.with_assign(InplaceBitOr, BitOr),
            '^' => self.with_assign(InplaceBitXor, BitXor),
            '~' => BitNot,
            '<' => {
                if self.source.consume_if('<') {
                    self.with_assign(InplaceLeftShift, LeftShift)
                } else {
                    self.with_assign(LessOrEqual, Less)
                }
            }
            '>' => {
                if self.source.consume_if('>') {
                    self.with_assign(InplaceRightShift, RightShift)
                } else {
                    self.with_assign(GreaterOrEqual, Greater)
                }
            }
            '=' => {
                if self.source.consume_if('=') {
                    Equal
                } else if self.source.consume_if('>') {
                    Arrow
                } else {
                    Assign
                }
            }
            '!' => {
                if self.source.consume_if('=') {
                    NotEqual
                } else {
                    self.reporter
                        .report_args(begin, ReportId::LexUnexpectedCharacter, &["!"]);
                    Invalid
                }
            }
            ',' => Comma,
            ':' => Colon,
            '.' => {
                if self.source.consume_if('.') {
                    if self.source.consume_if('.') {
                        Ellipsis
                    } else {
                        self.reporter
                            .report_args(begin, ReportId::LexUnexpectedCharacter, &["."]);
                        Invalid
                    }
                } else {
                    Dot
                }
            }
            '(' => LeftParen,
            ')' => RightParen,
            '{' => LeftBrace,
            '}' => RightBrace,
            '[' => LeftSquare,
            ']' => RightSquare,
            other => {
                self.reporter.report_args(
                    begin,
                    ReportId::LexUnexpectedCharacter,
                    &[&other.to_string()],
                );
                Invalid
            }
        };

        Token::new(ty, self.range_from(begin))
    }

    fn with_assign(&mut self, with: TokenType, without: TokenType) -> TokenType {
        if self.source.consume_if('=') {
            with
        } else {
            without
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding;

    fn lex_all(source: &str) -> (Vec<Token>, ErrorReporter) {
        let reporter = ErrorReporter::new();
        let text = SourceText::new("test", source.as_bytes().to_vec(), encoding::utf8(), 4);
        let mut tokens = Vec::new();
        {
            let mut lexer = Lexer::new(text, &reporter);
            loop {
                let token = lexer.next_token();
                let done = token.is(TokenType::EndOfFile);
                tokens.push(token);
                if done {
                    break;
                }
            }
        }
        (tokens, reporter)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokenType> {
        tokens.iter().map(|t| t.ty).collect()
    }

    #[test]
    fn test_basic_arithmetic() {
        let (tokens, reporter) = lex_all("1 + 2");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Integer,
                TokenType::Add,
                TokenType::Integer,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
        assert_eq!(tokens[0].image(), "1");
        assert_eq!(tokens[2].image(), "2");
        assert_eq!(
            (tokens[0].range.begin.line, tokens[0].range.begin.column),
            (1, 1)
        );
        assert_eq!(
            (tokens[1].range.begin.line, tokens[1].range.begin.column),
            (1, 3)
        );
        assert_eq!(
            (tokens[2].range.begin.line, tokens[2].range.begin.column),
            (1, 5)
        );
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let (tokens, _) = lex_all("def foo var inputs");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Def,
                TokenType::Identifier,
                TokenType::Var,
                TokenType::Inputs,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
        assert_eq!(tokens[1].image(), "foo");
    }

    #[test]
    fn test_eol_tokens_per_line() {
        let (tokens, _) = lex_all("a\nb\n");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::EndOfLine,
                TokenType::Identifier,
                TokenType::EndOfLine,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_comments_preserved() {
        let (tokens, reporter) = lex_all("a // note\nb /* block */ c");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::Comment,
                TokenType::EndOfLine,
                TokenType::Identifier,
                TokenType::Comment,
                TokenType::Identifier,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (tokens, reporter) = lex_all("/* never ends");
        assert_eq!(tokens[0].ty, TokenType::Comment);
        assert!(reporter.has_error());
    }

    #[test]
    fn test_numbers() {
        let (tokens, reporter) = lex_all("42 0xFF 0o17 0b1010 1.5 2e3 1.25e-2");
        let types = kinds(&tokens);
        assert_eq!(
            &types[..7],
            &[
                TokenType::Integer,
                TokenType::Integer,
                TokenType::Integer,
                TokenType::Integer,
                TokenType::Float,
                TokenType::Float,
                TokenType::Float,
            ]
        );
        assert_eq!(tokens[1].image(), "0xFF");
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_radix_error() {
        let (tokens, reporter) = lex_all("0x");
        assert_eq!(tokens[0].ty, TokenType::Invalid);
        assert!(reporter.has_error());
    }

    #[test]
    fn test_number_with_trailing_ident() {
        let (tokens, reporter) = lex_all("1abc");
        assert_eq!(tokens[0].ty, TokenType::Invalid);
        assert_eq!(tokens.len(), 3); // invalid, eol, eof
        assert!(reporter.has_error());
    }

    #[test]
    fn test_string_escapes() {
        let (tokens, reporter) = lex_all(r#""a\tb\n" 'x\'y'"#);
        assert_eq!(tokens[0].ty, TokenType::String);
        assert_eq!(tokens[0].image(), "a\tb\n");
        assert_eq!(tokens[1].ty, TokenType::String);
        assert_eq!(tokens[1].image(), "x'y");
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_unicode_escape() {
        let (tokens, _) = lex_all(r#""A\x41""#);
        assert_eq!(tokens[0].image(), "AA");
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, reporter) = lex_all("\"abc\ndef");
        assert_eq!(tokens[0].ty, TokenType::Invalid);
        assert!(reporter.has_error());
    }

    #[test]
    fn test_interpolation_ranges() {
        let source = r#""a${x + 1}b""#;
        let (tokens, reporter) = lex_all(source);
        assert_eq!(tokens[0].ty, TokenType::String);
        assert_eq!(tokens[0].interpolations.len(), 1);

        let span = tokens[0].interpolations[0];
        assert_eq!(&source[span.outer.begin.cursor..span.outer.end.cursor], "${x + 1}");
        assert_eq!(&source[span.inner.begin.cursor..span.inner.end.cursor], "x + 1");
        // literal pieces survive alongside the spans
        assert_eq!(tokens[0].pieces, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(tokens[0].image(), "ab");
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_nested_interpolation_braces() {
        let source = r#""${ {1: 2}[1] }""#;
        let (tokens, reporter) = lex_all(source);
        assert_eq!(tokens[0].interpolations.len(), 1);
        let span = tokens[0].interpolations[0];
        assert_eq!(
            &source[span.inner.begin.cursor..span.inner.end.cursor],
            " {1: 2}[1] "
        );
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_punctuator_longest_match() {
        let (tokens, reporter) = lex_all("<<= << < >>= >> >= ... . => = ==");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::InplaceLeftShift,
                TokenType::LeftShift,
                TokenType::Less,
                TokenType::InplaceRightShift,
                TokenType::RightShift,
                TokenType::GreaterOrEqual,
                TokenType::Ellipsis,
                TokenType::Dot,
                TokenType::Arrow,
                TokenType::Assign,
                TokenType::Equal,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
        assert!(!reporter.has_error());
    }

    #[test]
    fn test_unexpected_character() {
        let (tokens, reporter) = lex_all("a ? b");
        assert_eq!(tokens[1].ty, TokenType::Invalid);
        assert!(reporter.has_error());
        // progress: the rest still lexes
        assert_eq!(tokens[2].ty, TokenType::Identifier);
    }

    #[test]
    fn test_lexer_progress_on_invalid_bytes() {
        let reporter = ErrorReporter::new();
        let text = SourceText::new("test", vec![0xFF, 0xFE, b'a'], encoding::utf8(), 4);
        let mut lexer = Lexer::new(text, &reporter);

        let mut last_cursor = usize::MAX;
        let mut steps = 0;
        loop {
            let token = lexer.next_token();
            if token.is(TokenType::EndOfFile) {
                break;
            }
            // no request returns the same position twice without advancing
            assert!(
                token.range.begin.cursor != last_cursor
                    || token.range.end.cursor > token.range.begin.cursor
                    || token.is(TokenType::EndOfLine)
            );
            last_cursor = token.range.begin.cursor;
            steps += 1;
            assert!(steps < 16, "lexer failed to make progress");
        }
        assert!(reporter.has_error());
    }

    #[test]
    fn test_token_spans_cover_source() {
        // Concatenating the spans of all tokens (comments and EOLs
        // included) reproduces the source, modulo skipped blanks.
        let source = "a + 1 // c\nb";
        let (tokens, _) = lex_all(source);
        let mut rebuilt = String::new();
        for token in &tokens {
            rebuilt.push_str(&source[token.range.begin.cursor..token.range.end.cursor]);
        }
        assert_eq!(rebuilt, "a+1// c\nb");
    }

    #[test]
    fn test_crlf_single_eol() {
        let (tokens, _) = lex_all("a\r\nb");
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenType::Identifier,
                TokenType::EndOfLine,
                TokenType::Identifier,
                TokenType::EndOfLine,
                TokenType::EndOfFile,
            ]
        );
        assert_eq!(tokens[2].range.begin.line, 2);
    }
}
