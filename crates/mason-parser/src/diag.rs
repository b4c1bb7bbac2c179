//! Diagnostic channel.
//!
//! Every compilation stage reports through a shared [`ErrorReporter`]: an
//! append-only list of severity-tagged entries keyed by source position.
//! Subscribers see the entries when `notify` is called; nothing in the
//! pipeline unwinds on a user error.

use std::cell::RefCell;
use std::fmt;

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity as CsSeverity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use serde::{Deserialize, Serialize};

use crate::source::SourcePosition;

/// Severity of a reported entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

macro_rules! report_ids {
    ($(($id:ident, $severity:ident, $message:literal)),* $(,)?) => {
        /// Identifies one diagnostic message template.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum ReportId {
            $($id),*
        }

        impl ReportId {
            pub fn severity(self) -> Severity {
                match self {
                    $(ReportId::$id => Severity::$severity),*
                }
            }

            pub fn template(self) -> &'static str {
                match self {
                    $(ReportId::$id => $message),*
                }
            }
        }
    };
}

report_ids! {
    // Lexical
    (LexUnexpectedCharacter, Error, "unexpected character '{0}'"),
    (LexInvalidEncoding, Error, "source bytes are not valid for the configured encoding"),
    (LexInvalidCharacter, Error, "decoded character is outside the Unicode range"),
    (LexUnterminatedString, Error, "unterminated string literal"),
    (LexUnterminatedComment, Error, "unterminated block comment"),
    (LexInvalidEscape, Error, "invalid escape sequence '\\{0}'"),
    (LexRequireDigit, Error, "expected a digit after the radix prefix"),
    (LexInvalidNumber, Error, "ill-formed numeric literal '{0}'"),
    (LexUnterminatedInterpolation, Error, "unterminated interpolation in string literal"),

    // Syntactic
    (ParseExpectToken, Error, "expected '{0}'"),
    (ParseExpectIdentifier, Error, "expected an identifier"),
    (ParseExpectNewLine, Error, "expected a new line"),
    (ParseExpectComma, Error, "expected ','"),
    (ParseUnexpectedEof, Error, "unexpected end of file"),
    (ParseUnexpectedToken, Error, "unexpected token '{0}'"),
    (ParseExpectExpression, Error, "expected an expression"),
    (ParseExpectDeclaration, Error, "expected a declaration"),
    (ParseExpectStatement, Error, "expected a statement"),
    (ParseExpectBody, Error, "expected '{{' or '=>'"),
    (ParseDeclarationNotAllowed, Error, "declaration is not allowed here"),
    (ParseDuplicateClause, Error, "duplicate '{0}' clause"),
    (ParseCaseAfterDefault, Error, "'case' cannot follow 'default'"),
    (ParseEllipsisNotLast, Error, "'...' is only allowed on the last parameter"),
    (ParseInvalidAssignTarget, Error, "invalid assignment target"),

    // Semantic
    (SemaRedefinition, Error, "redefinition of {0}; previously defined as {1}"),
    (SemaUndeclaredName, Error, "use of undeclared name '{0}'"),
    (SemaBreakOutsideLoop, Error, "'break' is not allowed outside of a loop"),
    (SemaContinueOutsideLoop, Error, "'continue' is not allowed outside of a loop"),
    (SemaReturnOutsideFunction, Error, "'return' is not allowed outside of a function"),
    (SemaRaiseWithoutExpression, Error, "'raise' without an expression is only allowed inside an 'except' body"),
    (SemaInvalidModifier, Error, "invalid modifier combination on {0}"),
    (SemaAssignToReadonly, Error, "cannot assign to {0}"),
    (SemaUnknownType, Warning, "unknown type name '{0}'"),
    (SemaShadowedByCapture, Info, "'{0}' is captured from an enclosing scope"),
}

/// A fix-it hint: insert `text` at `pos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixIt {
    pub pos: SourcePosition,
    pub text: String,
}

/// One reported diagnostic.
#[derive(Debug, Clone)]
pub struct ErrorEntry {
    pub severity: Severity,
    pub pos: SourcePosition,
    pub message: String,
    pub fixits: Vec<FixIt>,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.pos.line, self.pos.column, self.severity, self.message
        )
    }
}

/// Formats a positional template: `{0}`, `{1}`, ... replaced by `args`.
fn format_template(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut index = 0usize;
                for digit in chars.by_ref() {
                    if digit == '}' {
                        break;
                    }
                    index = index * 10 + digit.to_digit(10).unwrap_or(0) as usize;
                }
                if let Some(arg) = args.get(index) {
                    out.push_str(arg);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Callback invoked for each entry on `notify`.
pub type Subscriber = Box<dyn Fn(&ErrorEntry)>;

/// Append-only diagnostic collector shared by all compilation stages.
///
/// Interior mutability keeps reporting a `&self` operation; a compile unit
/// is single-threaded, so a `RefCell` suffices.
#[derive(Default)]
pub struct ErrorReporter {
    entries: RefCell<Vec<ErrorEntry>>,
    subscribers: RefCell<Vec<Subscriber>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a diagnostic without arguments.
    pub fn report(&self, pos: SourcePosition, id: ReportId) -> Report<'_> {
        self.report_args(pos, id, &[])
    }

    /// Report a diagnostic with positional arguments.
    pub fn report_args(&self, pos: SourcePosition, id: ReportId, args: &[&str]) -> Report<'_> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let entry = ErrorEntry {
            severity: id.severity(),
            pos,
            message: format_template(id.template(), &args),
            fixits: Vec::new(),
        };

        let mut entries = self.entries.borrow_mut();
        entries.push(entry);
        let index = entries.len() - 1;
        drop(entries);

        Report {
            reporter: self,
            index,
        }
    }

    /// Register a subscriber invoked on `notify`.
    pub fn subscribe(&self, subscriber: impl Fn(&ErrorEntry) + 'static) {
        self.subscribers.borrow_mut().push(Box::new(subscriber));
    }

    /// Deliver every entry to every subscriber, in order.
    pub fn notify(&self) {
        let entries = self.entries.borrow();
        let subscribers = self.subscribers.borrow();
        for entry in entries.iter() {
            for subscriber in subscribers.iter() {
                subscriber(entry);
            }
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warning(&self) -> bool {
        self.warning_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|e| e.severity == Severity::Warning)
            .count()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        self.entries.borrow().clone()
    }

    /// Render every entry to stderr with source context.
    pub fn emit_terminal(&self, name: &str, source: &str) -> std::io::Result<()> {
        let mut files = SimpleFiles::new();
        let file_id = files.add(name.to_string(), source.to_string());

        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();

        for entry in self.entries.borrow().iter() {
            let severity = match entry.severity {
                Severity::Error => CsSeverity::Error,
                Severity::Warning => CsSeverity::Warning,
                Severity::Info => CsSeverity::Note,
            };
            let cursor = entry.pos.cursor.min(source.len());
            let diagnostic = CsDiagnostic::new(severity)
                .with_message(entry.message.clone())
                .with_labels(vec![Label::primary(file_id, cursor..cursor)]);
            term::emit(&mut writer.lock(), &config, &files, &diagnostic)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        }
        Ok(())
    }

    /// JSON form of all entries, for IDE integration.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let entries: Vec<JsonEntry> = self
            .entries
            .borrow()
            .iter()
            .map(JsonEntry::from_entry)
            .collect();
        serde_json::to_string_pretty(&entries)
    }
}

/// Handle to a just-reported entry; allows attaching fix-it hints.
pub struct Report<'a> {
    reporter: &'a ErrorReporter,
    index: usize,
}

impl Report<'_> {
    /// Attach an insertion fix-it.
    pub fn insert(self, pos: SourcePosition, text: impl Into<String>) -> Self {
        self.reporter.entries.borrow_mut()[self.index]
            .fixits
            .push(FixIt {
                pos,
                text: text.into(),
            });
        self
    }
}

/// Serialized diagnostic entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonEntry {
    pub severity: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
    pub fixits: Vec<JsonFixIt>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonFixIt {
    pub line: u32,
    pub column: u32,
    pub insert: String,
}

impl JsonEntry {
    fn from_entry(entry: &ErrorEntry) -> Self {
        JsonEntry {
            severity: entry.severity.to_string(),
            line: entry.pos.line,
            column: entry.pos.column,
            message: entry.message.clone(),
            fixits: entry
                .fixits
                .iter()
                .map(|f| JsonFixIt {
                    line: f.pos.line,
                    column: f.pos.column,
                    insert: f.text.clone(),
                })
                .collect(),
        }
    }
}
