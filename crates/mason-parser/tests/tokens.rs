//! Lexer integration tests.

use mason_parser::diag::ErrorReporter;
use mason_parser::encoding;
use mason_parser::lexer::Lexer;
use mason_parser::source::SourceText;
use mason_parser::token::{Token, TokenType};

fn lex(source: &str) -> (Vec<Token>, ErrorReporter) {
    let reporter = ErrorReporter::new();
    let tokens = {
        let text = SourceText::new("test.mason", source.as_bytes().to_vec(), encoding::utf8(), 4);
        let mut lexer = Lexer::new(text, &reporter);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.is(TokenType::EndOfFile);
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    };
    (tokens, reporter)
}

#[test]
fn lexes_one_plus_two_with_positions() {
    let (tokens, reporter) = lex("1 + 2");

    let kinds: Vec<_> = tokens.iter().map(|t| t.ty).collect();
    assert_eq!(
        kinds,
        vec![
            TokenType::Integer,
            TokenType::Add,
            TokenType::Integer,
            TokenType::EndOfLine,
            TokenType::EndOfFile,
        ]
    );

    let positions: Vec<_> = tokens[..3]
        .iter()
        .map(|t| (t.range.begin.line, t.range.begin.column))
        .collect();
    assert_eq!(positions, vec![(1, 1), (1, 3), (1, 5)]);
    assert!(!reporter.has_error());
}

#[test]
fn tab_advances_column_to_next_stop() {
    // With tab size 4, 'c' in "ab\tcd" sits at column 5.
    let (tokens, _) = lex("ab\tcd\n");
    assert_eq!(tokens[0].image(), "ab");
    assert_eq!(tokens[1].image(), "cd");
    assert_eq!(tokens[1].range.begin.column, 5);
}

#[test]
fn keyword_table_covers_reserved_words() {
    let source = "and as assert break case class continue const def default defined deinit \
                  else except export extends false finally for get if import in init is match \
                  none not operator or pass raise return self set static super task true try \
                  var while with";
    let (tokens, reporter) = lex(source);
    assert!(!reporter.has_error());

    for token in &tokens {
        match token.ty {
            TokenType::EndOfLine | TokenType::EndOfFile => {}
            ty => assert!(
                !matches!(ty, TokenType::Identifier),
                "'{}' lexed as a plain identifier",
                token.image()
            ),
        }
    }
}

#[test]
fn contextual_keywords_have_own_types() {
    let (tokens, _) = lex("inputs outputs from do doFirst doLast dependsOn");
    let kinds: Vec<_> = tokens.iter().map(|t| t.ty).collect();
    assert_eq!(
        &kinds[..7],
        &[
            TokenType::Inputs,
            TokenType::Outputs,
            TokenType::From,
            TokenType::Do,
            TokenType::DoFirst,
            TokenType::DoLast,
            TokenType::DependsOn,
        ]
    );
}

#[test]
fn repeated_requests_reach_eof() {
    // Lexer progress: any input reaches EndOfFile, and stays there.
    let reporter = ErrorReporter::new();
    let text = SourceText::new("t", b"x + /".to_vec(), encoding::utf8(), 4);
    let mut lexer = Lexer::new(text, &reporter);

    let mut eof_seen = 0;
    for _ in 0..32 {
        if lexer.next_token().is(TokenType::EndOfFile) {
            eof_seen += 1;
        }
    }
    assert!(eof_seen > 0);
}

#[test]
fn utf16le_source_decodes() {
    let reporter = ErrorReporter::new();
    let source = "var x = 1\n";
    let bytes: Vec<u8> = source.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
    let text = SourceText::new("t", bytes, encoding::lookup("utf16").unwrap(), 4);
    let mut lexer = Lexer::new(text, &reporter);

    assert!(lexer.next_token().is(TokenType::Var));
    let ident = lexer.next_token();
    assert!(ident.is(TokenType::Identifier));
    assert_eq!(ident.image(), "x");
    assert!(!reporter.has_error());
}

#[test]
fn interpolated_string_records_subranges() {
    let source = r#"var s = "sum: ${a + b}!""#;
    let (tokens, reporter) = lex(source);

    let string = tokens
        .iter()
        .find(|t| t.is(TokenType::String))
        .expect("string token");
    assert_eq!(string.interpolations.len(), 1);
    let inner = string.interpolations[0].inner;
    assert_eq!(&source[inner.begin.cursor..inner.end.cursor], "a + b");
    assert_eq!(string.pieces, vec!["sum: ".to_string(), "!".to_string()]);
    assert!(!reporter.has_error());
}
