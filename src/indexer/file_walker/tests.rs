//! Tests for FileWalker

use super::*;
use tempfile::TempDir;

#[test]
fn test_new_uses_default_ignore_dirs() {
    let walker = FileWalker::new("/tmp", 1024);
    assert_eq!(walker.root, PathBuf::from("/tmp"));
    assert_eq!(walker.max_file_size, 1024);
    assert!(walker.ignore_dirs.iter().any(|d| d == "node_modules"));
}

#[test]
fn test_walk_nonexistent_directory() {
    let result = FileWalker::new("/nonexistent/path/12345", 1024).walk();
    let err = result.unwrap_err();
    assert!(err.to_string().contains("no longer exists"));
}

#[test]
fn test_walk_not_a_directory() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("main.go");
    fs::write(&file_path, "package main\n").unwrap();

    let err = FileWalker::new(&file_path, 1024).walk().unwrap_err();
    assert!(err.to_string().contains("not a directory"));
}

#[test]
fn test_walk_empty_directory() {
    let temp_dir = TempDir::new().unwrap();
    let files = FileWalker::new(temp_dir.path(), 1024).walk().unwrap();
    assert!(files.is_empty());
}

#[test]
fn test_walk_filters_by_extension_and_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
    fs::create_dir_all(root.join("build")).unwrap();

    fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
    fs::write(root.join("README.md"), "# readme\n").unwrap();
    fs::write(root.join("notes.txt"), "plain text\n").unwrap();
    fs::write(root.join("node_modules/pkg/index.js"), "module.exports = 1;\n").unwrap();
    fs::write(root.join("build/out.go"), "package out\n").unwrap();

    let mut files = FileWalker::new(root, 1024 * 1024).walk().unwrap();
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["README.md", "src/main.rs"]);
    assert_eq!(files[1].language, "rust");
    assert_eq!(files[0].language, "markdown");
}

#[test]
fn test_walk_skips_large_and_binary_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("big.go"), "x".repeat(2048)).unwrap();
    fs::write(root.join("blob.c"), [0u8, 1, 2, 3, 0, 5]).unwrap();
    fs::write(root.join("latin1.py"), [b'#', b' ', 0xE9, b'\n']).unwrap();
    fs::write(root.join("ok.py"), "print('hi')\n").unwrap();

    let files = FileWalker::new(root, 1024).walk().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "ok.py");
}

#[test]
fn test_hash_and_counts() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a.go");
    fs::write(&path, "package a\n\nfunc A() {}\n").unwrap();

    let files = FileWalker::new(temp_dir.path(), 1024).walk().unwrap();
    let file = &files[0];
    assert_eq!(file.sha256, hash_bytes(b"package a\n\nfunc A() {}\n"));
    assert_eq!(file.sha256.len(), 64);
    assert_eq!(file.size, 23);
    assert_eq!(file.line_count, 3);
    assert!(file.modified_at.is_some());
}

#[test]
fn test_walk_respects_gitignore() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join(".gitignore"), "generated.go\n").unwrap();
    fs::write(root.join("generated.go"), "package gen\n").unwrap();
    fs::write(root.join("main.go"), "package main\n").unwrap();

    let files = FileWalker::new(root, 1024).walk().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].relative_path, "main.go");
}

#[test]
fn test_walk_cancelled() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.go"), "package a\n").unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let result = FileWalker::new(temp_dir.path(), 1024)
        .with_cancellation(token)
        .walk();
    assert!(result.unwrap_err().to_string().contains("cancelled"));
}

#[test]
fn test_scan_file_eligibility() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("vendor/lib")).unwrap();
    fs::write(root.join("vendor/lib/x.go"), "package x\n").unwrap();
    fs::write(root.join("main.go"), "package main\n").unwrap();
    fs::write(root.join(".env"), "SECRET=1\n").unwrap();

    let walker = FileWalker::new(root, 1024);
    assert!(walker.scan_file(&root.join("main.go")).unwrap().is_some());
    assert!(walker.scan_file(&root.join("vendor/lib/x.go")).unwrap().is_none());
    assert!(walker.scan_file(&root.join(".env")).unwrap().is_none());
    assert!(walker.scan_file(Path::new("/elsewhere/main.go")).unwrap().is_none());
    assert!(walker.scan_file(&root.join("missing.go")).is_err());
}

#[test]
fn test_is_binary() {
    assert!(!is_binary(b""));
    assert!(!is_binary(b"fn main() {}\n\tindent\r\n"));
    assert!(is_binary(b"abc\0def"));
    assert!(is_binary(&[1, 2, 3, b'a']));
}

#[test]
fn test_relative_path_uses_forward_slashes() {
    let root = Path::new("/proj");
    assert_eq!(relative_path(root, Path::new("/proj/src/lib/a.rs")), "src/lib/a.rs");
    assert_eq!(relative_path(root, Path::new("/proj/a.rs")), "a.rs");
}

#[test]
fn test_modified_time_is_captured() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("lib.rs");
    fs::write(&file_path, "fn main() {}\n").unwrap();
    filetime::set_file_mtime(&file_path, filetime::FileTime::from_unix_time(1_700_000_000, 0))
        .unwrap();

    let scanned = FileWalker::new(temp_dir.path(), 1024)
        .scan_file(&file_path)
        .unwrap()
        .unwrap();
    assert_eq!(scanned.modified_at.unwrap().timestamp(), 1_700_000_000);
}
