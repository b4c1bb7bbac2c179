//! Source buffers and positions.

mod position;
mod text;

pub use position::{SourcePosition, SourceRange};
pub use text::{CodePoint, SourceText, TextCheckpoint};
