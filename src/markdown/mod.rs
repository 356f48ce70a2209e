//! Markdown notes: file naming and rendering.

pub mod paths;
pub mod writer;

pub use writer::{MarkdownWriter, WriteError};
