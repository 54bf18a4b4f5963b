//! Language detection from file extensions
//!
//! The extension table doubles as the allow-list: files whose extension is not
//! listed here are never indexed.

use std::path::Path;

/// Detect the language id for a file extension (without the dot)
pub fn detect_language(extension: &str) -> Option<&'static str> {
    let lang = match extension.to_ascii_lowercase().as_str() {
        "go" => "go",
        "js" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "py" => "python",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "rs" => "rust",
        "swift" => "swift",
        "kt" => "kotlin",
        "m" => "objective-c",
        "scala" => "scala",
        "r" => "r",
        "sql" => "sql",
        "sh" | "bash" => "shell",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "vue" => "vue",
        "md" => "markdown",
        _ => return None,
    };

    Some(lang)
}

/// Language for a path, `None` when the extension is not indexed
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(detect_language)
}
