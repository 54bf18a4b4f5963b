//! A file discovered by the walker, ready for diffing and chunking

use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// Path the content was read from (container view)
    pub path: PathBuf,
    /// Path relative to the folder root, `/`-separated
    pub relative_path: String,
    pub language: String,
    pub content: String,
    /// Lowercase hex SHA-256 of the raw bytes
    pub sha256: String,
    pub size: u64,
    pub line_count: usize,
    pub modified_at: Option<DateTime<Utc>>,
}
