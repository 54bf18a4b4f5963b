//! Directory traversal and per-file eligibility checks

use super::file_info::ScannedFile;
use super::language::language_for_path;
use crate::error::IndexingError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub struct FileWalker {
    pub(crate) root: PathBuf,
    pub(crate) max_file_size: u64,
    pub(crate) ignore_dirs: Vec<String>,
    cancel: Option<CancellationToken>,
}

impl FileWalker {
    pub fn new(root: impl AsRef<Path>, max_file_size: u64) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_file_size,
            ignore_dirs: crate::config::default_ignore_dirs(),
            cancel: None,
        }
    }

    pub fn with_ignore_dirs(mut self, ignore_dirs: Vec<String>) -> Self {
        self.ignore_dirs = ignore_dirs;
        self
    }

    /// Abort the walk once the token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Walk the directory and collect all eligible files
    pub fn walk(&self) -> Result<Vec<ScannedFile>> {
        if !self.root.exists() {
            return Err(IndexingError::FolderMissing(self.root.display().to_string()).into());
        }
        if !self.root.is_dir() {
            return Err(IndexingError::NotADirectory(self.root.display().to_string()).into());
        }

        let ignore_dirs = self.ignore_dirs.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(true)
            .hidden(false)
            .require_git(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && ignore_dirs
                        .iter()
                        .any(|d| entry.file_name().to_str() == Some(d.as_str())))
            })
            .build();

        let mut files = Vec::new();

        for entry in walker {
            if self.is_cancelled() {
                tracing::info!("File walk cancelled after {} files", files.len());
                return Err(IndexingError::Cancelled(self.root.display().to_string()).into());
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {:?}: {}", self.root, e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            match self.inspect(entry.path()) {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping {:?}: {:#}", entry.path(), e),
            }
        }

        tracing::info!("Found {} files under {:?}", files.len(), self.root);
        Ok(files)
    }

    /// Check and read one file under the root. `Ok(None)` means the file is not
    /// eligible (extension, ignored directory, size, binary).
    pub fn scan_file(&self, path: &Path) -> Result<Option<ScannedFile>> {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return Ok(None);
        };
        if self.in_ignored_dir(relative) {
            return Ok(None);
        }
        self.inspect(path)
    }

    fn in_ignored_dir(&self, relative: &Path) -> bool {
        relative.parent().is_some_and(|parent| {
            parent.components().any(|c| match c {
                Component::Normal(name) => self
                    .ignore_dirs
                    .iter()
                    .any(|d| name.to_str() == Some(d.as_str())),
                _ => false,
            })
        })
    }

    fn inspect(&self, path: &Path) -> Result<Option<ScannedFile>> {
        let Some(language) = language_for_path(path) else {
            return Ok(None);
        };

        let metadata = fs::metadata(path).context("Failed to stat file")?;
        if !metadata.is_file() {
            return Ok(None);
        }
        if metadata.len() > self.max_file_size {
            tracing::debug!("Skipping large file: {:?}", path);
            return Ok(None);
        }

        let bytes = fs::read(path).context("Failed to read file")?;
        if is_binary(&bytes) {
            tracing::debug!("Skipping binary file: {:?}", path);
            return Ok(None);
        }

        let sha256 = hash_bytes(&bytes);
        let content = match String::from_utf8(bytes) {
            Ok(c) => c,
            Err(_) => {
                tracing::debug!("Skipping non UTF-8 file: {:?}", path);
                return Ok(None);
            }
        };

        Ok(Some(ScannedFile {
            path: path.to_path_buf(),
            relative_path: relative_path(&self.root, path),
            language: language.to_string(),
            line_count: content.lines().count(),
            content,
            sha256,
            size: metadata.len(),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        }))
    }
}

/// NUL bytes, or more than 30% control characters
pub(crate) fn is_binary(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    if bytes.contains(&0) {
        return true;
    }
    let non_printable = bytes
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();
    (non_printable as f64 / bytes.len() as f64) > 0.3
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// `/`-joined path of `path` below `root`
pub(crate) fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests;
