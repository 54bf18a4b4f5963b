use crate::metadata::{FolderRecord, FolderStatus};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound for caller-supplied search limits
pub const MAX_SEARCH_LIMIT: usize = 50;

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} must not be empty", field));
    }
    Ok(())
}

/// Request to register a folder for indexing
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddFolderRequest {
    /// Path of the folder to index; relative paths resolve against the server's working directory
    pub folder_path: String,
    /// Optional human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl AddFolderRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("folderPath", &self.folder_path)
    }
}

/// A registered folder
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub id: String,
    pub folder_path: String,
    pub description: Option<String>,
    pub status: FolderStatus,
    pub error: Option<String>,
    pub file_count: usize,
    pub added_at: DateTime<Utc>,
    pub last_scanned: Option<DateTime<Utc>>,
}

impl From<FolderRecord> for FolderInfo {
    fn from(record: FolderRecord) -> Self {
        Self {
            id: record.id,
            folder_path: record.path,
            description: record.description,
            status: record.status,
            error: record.error,
            file_count: record.file_count,
            added_at: record.added_at,
            last_scanned: record.last_scanned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddFolderResponse {
    pub folder: FolderInfo,
    /// True when the path was already registered and the existing entry is returned
    pub already_registered: bool,
}

/// Request to unregister a folder and delete everything indexed under it
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFolderRequest {
    /// Path of a registered folder
    pub folder_path: String,
}

impl RemoveFolderRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("folderPath", &self.folder_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveFolderResponse {
    pub folder_path: String,
    /// Number of file records deleted
    pub files_removed: usize,
}

/// Request to scan a registered folder
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Path of a registered folder
    pub folder_path: String,
}

impl ScanRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("folderPath", &self.folder_path)
    }
}

/// Outcome of one folder scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub folder_path: String,
    /// New files embedded
    pub files_indexed: usize,
    /// Changed files re-embedded
    pub files_updated: usize,
    /// Unchanged files
    pub files_skipped: usize,
    /// Files deleted from disk since the last scan
    pub files_removed: usize,
    /// Eligible files found on disk
    pub total_files: usize,
    /// Chunks embedded and written
    pub chunks_indexed: usize,
    /// Time taken in milliseconds
    pub duration_ms: u64,
    /// Per-file failures; those files are retried by the next scan
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Search result granularity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RetrieveMode {
    /// The matching chunk only
    #[default]
    Chunk,
    /// The whole file, reconstructed from its chunks
    Full,
}

/// Semantic search request
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Natural-language query
    pub query: String,
    /// Number of results (default 10, max 50)
    #[serde(default)]
    pub limit: Option<usize>,
    /// Restrict results to one registered folder
    #[serde(default)]
    pub folder_path: Option<String>,
    /// "chunk" (default) or "full"
    #[serde(default)]
    pub retrieve: RetrieveMode,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), String> {
        require_non_empty("query", &self.query)?;
        if self.limit == Some(0) {
            return Err("limit must be at least 1".to_string());
        }
        Ok(())
    }

    /// Limit clamped to `1..=max`, `default` when absent
    pub fn effective_limit(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max.max(1))
    }
}

/// A single search result
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub file_path: String,
    pub relative_path: String,
    pub folder_path: String,
    pub language: String,
    pub chunk_num: usize,
    pub start_line: usize,
    pub end_line: usize,
    /// Cosine similarity, higher is closer
    pub score: f32,
    /// Chunk text, or the whole file when `fullFileRetrieved`
    pub content: String,
    pub full_file_retrieved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub query: String,
    pub retrieve: RetrieveMode,
    pub results: Vec<SearchResult>,
    pub total_results: usize,
}

/// Request for index status
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StatusRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FolderStatusEntry {
    pub folder_path: String,
    pub file_count: usize,
    /// True when the folder is active and watched
    pub enabled: bool,
    pub status: FolderStatus,
    pub error: Option<String>,
    pub last_scanned: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub total_folders: usize,
    pub total_files: usize,
    pub total_chunks: usize,
    /// Bytes across all indexed files
    pub total_size: u64,
    pub active_folders: usize,
    pub scanning_folders: usize,
    /// Folders whose last scan failed
    pub error_folders: usize,
    pub watcher_running: bool,
    pub last_scan: Option<DateTime<Utc>>,
    pub folders: Vec<FolderStatusEntry>,
}

#[cfg(test)]
mod tests;
