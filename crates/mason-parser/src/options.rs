//! Compile options.

use crate::encoding::{self, Decoder};

/// Optimization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizeLevel {
    /// Disable optimization.
    None,
    /// Enable optimization.
    #[default]
    Optimize,
}

impl OptimizeLevel {
    /// Clamp an integer level into the enum.
    pub fn from_int(level: i32) -> Self {
        if level <= 0 {
            OptimizeLevel::None
        } else {
            OptimizeLevel::Optimize
        }
    }
}

/// Set of compiler options, filled in by the external driver.
pub struct CompileOptions {
    /// Dump textual AST to stdout.
    pub dump_ast: bool,
    /// Dump textual IR to stdout.
    pub dump_ir: bool,
    /// Dump textual bytecode to stdout (consumed by the emitter).
    pub dump_bytecode: bool,

    /// Retain source positions in IR.
    pub generate_debug_info: bool,

    /// Stop after the parser.
    pub syntax_only: bool,

    /// Decoder for the source text.
    pub encoding: &'static dyn Decoder,

    /// Column increment for tab.
    pub tab_size: u32,

    /// Optimize the produced IR.
    pub optimize_level: OptimizeLevel,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dump_ast: false,
            dump_ir: false,
            dump_bytecode: false,
            generate_debug_info: false,
            syntax_only: false,
            encoding: encoding::utf8(),
            tab_size: 4,
            optimize_level: OptimizeLevel::default(),
        }
    }
}

impl CompileOptions {
    /// Select the source decoder by name; `false` if unknown.
    pub fn set_encoding(&mut self, name: &str) -> bool {
        match encoding::lookup(name) {
            Some(decoder) => {
                self.encoding = decoder;
                true
            }
            None => false,
        }
    }
}
