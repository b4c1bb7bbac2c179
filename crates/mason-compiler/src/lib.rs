//! Compilation pipeline for the Mason build-script language.
//!
//! `bytes → tokens → AST → scopes+symbols → IR → optimized IR`, driven
//! by a per-compile [`Context`]. Bytecode emission and execution consume
//! the produced [`CodeUnit`]s elsewhere.

pub mod ir;
pub mod lower;
pub mod optimize;

use std::marker::PhantomData;

use mason_checker::analyzer::{analyze, Analysis};
use mason_parser::ast::{dump_script, Script};
use mason_parser::diag::ErrorReporter;
use mason_parser::options::CompileOptions;
use mason_parser::parser::Parser;
use mason_parser::source::SourceText;

pub use ir::{CodeUnit, IrValue};
pub use optimize::Optimizer;

/// Everything one compile produced. Emission should be gated on
/// [`Context::has_error`]; the structures are complete either way.
pub struct Compilation {
    pub script: Script,
    pub analysis: Option<Analysis>,
    pub units: Vec<CodeUnit>,
}

/// One compilation unit: options, diagnostic channel and the transient
/// state of a single compile.
///
/// A `Context` is tied to the thread that created it; the marker keeps
/// it out of `Send`/`Sync`.
pub struct Context {
    options: CompileOptions,
    reporter: ErrorReporter,
    _single_thread: PhantomData<*const ()>,
}

impl Context {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            options,
            reporter: ErrorReporter::new(),
            _single_thread: PhantomData,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn reporter(&self) -> &ErrorReporter {
        &self.reporter
    }

    pub fn has_error(&self) -> bool {
        self.reporter.has_error()
    }

    /// Run the pipeline over one source buffer.
    pub fn compile(&self, name: &str, bytes: &[u8]) -> Compilation {
        let source = SourceText::new(
            name,
            bytes.to_vec(),
            self.options.encoding,
            self.options.tab_size,
        );

        let script = Parser::new(source, &self.reporter).parse();
        if self.options.dump_ast {
            print!("{}", dump_script(&script));
        }

        if self.options.syntax_only {
            return Compilation {
                script,
                analysis: None,
                units: Vec::new(),
            };
        }

        let mut analysis = analyze(&script, &self.reporter);
        let mut units = lower::generate(
            &script,
            &mut analysis,
            &self.reporter,
            self.options.generate_debug_info,
        );

        // Optimization always runs at its configured level; callers gate
        // emission on has_error.
        Optimizer::new(self.options.optimize_level).optimize(&mut units);

        if self.options.dump_ir {
            print!("{}", ir::dump_units(&units, &analysis.symbols));
        }

        Compilation {
            script,
            analysis: Some(analysis),
            units,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(CompileOptions::default())
    }
}

/// Convenience wrapper: one compile with default options.
pub fn compile_source(name: &str, source: &str) -> (Compilation, Context) {
    let context = Context::default();
    let compilation = context.compile(name, source.as_bytes());
    (compilation, context)
}
