//! File walking, language detection and chunking
//!
//! Walks a folder, filters files by the extension allow-list and ignore rules,
//! hashes raw content, and splits text into line-bounded chunks aligned to
//! declaration boundaries where a tree-sitter grammar is bundled.

mod ast_parser;
mod chunker;
mod file_info;
mod file_walker;
mod language;

pub use ast_parser::AstParser;
pub use chunker::{ChunkSpan, ChunkStrategy, CodeChunker};
pub use file_info::ScannedFile;
pub use file_walker::FileWalker;
pub use language::{detect_language, language_for_path};
