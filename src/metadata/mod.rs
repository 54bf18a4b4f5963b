//! Durable record of indexed folders, files and chunks
//!
//! The whole store is one JSON document replaced atomically (write to a temp
//! file, then rename). Folder-level changes are persisted immediately; file and
//! chunk writes mark the store dirty and are persisted by [`MetadataStore::flush`],
//! which the indexing pipeline calls at checkpoints.

use crate::error::MetadataError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Folder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FolderStatus {
    Pending,
    Scanning,
    Active,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderRecord {
    pub id: String,
    pub path: String,
    pub description: Option<String>,
    pub status: FolderStatus,
    pub error: Option<String>,
    pub file_count: usize,
    pub added_at: DateTime<Utc>,
    pub last_scanned: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub folder_id: String,
    pub path: String,
    pub relative_path: String,
    pub language: String,
    pub sha256: String,
    pub size: u64,
    pub line_count: usize,
    pub chunk_count: usize,
    pub modified_at: Option<DateTime<Utc>>,
    pub indexed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub file_id: String,
    pub chunk_num: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub vector_id: String,
    pub indexed_at: DateTime<Utc>,
}

/// Aggregate counts across the store
#[derive(Debug, Clone, Default)]
pub struct StoreStatus {
    pub total_folders: usize,
    pub total_files: usize,
    pub total_chunks: usize,
    pub total_size: u64,
    pub active_folders: usize,
    pub scanning_folders: usize,
    pub error_folders: usize,
    pub last_scan: Option<DateTime<Utc>>,
}

/// Stable file id, so a rescan after a crash addresses the same vector points
pub fn file_id(folder_id: &str, relative_path: &str) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("code-index:file:{}:{}", folder_id, relative_path).as_bytes(),
    )
    .to_string()
}

/// Vector point id for one chunk of a file
pub fn vector_id(file_id: &str, chunk_num: usize) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("code-index:chunk:{}:{}", file_id, chunk_num).as_bytes(),
    )
    .to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    folders: BTreeMap<String, FolderRecord>,
    files: BTreeMap<String, FileRecord>,
    /// file id -> chunks ordered by chunk_num
    chunks: BTreeMap<String, Vec<ChunkRecord>>,
    /// (folder id, path) -> file id
    #[serde(skip)]
    file_index: HashMap<(String, String), String>,
    #[serde(skip)]
    dirty: bool,
}

impl State {
    fn rebuild_index(&mut self) {
        self.file_index = self
            .files
            .values()
            .map(|f| ((f.folder_id.clone(), f.path.clone()), f.id.clone()))
            .collect();
    }

    fn remove_file(&mut self, file_id: &str) -> Option<FileRecord> {
        let record = self.files.remove(file_id)?;
        self.chunks.remove(file_id);
        self.file_index
            .remove(&(record.folder_id.clone(), record.path.clone()));
        self.dirty = true;
        Some(record)
    }
}

pub struct MetadataStore {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    state: RwLock<State>,
}

impl MetadataStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self, MetadataError> {
        let mut state = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| MetadataError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            serde_json::from_str::<State>(&content).map_err(|e| MetadataError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?
        } else {
            tracing::debug!("Metadata file not found, starting empty");
            State::default()
        };
        state.rebuild_index();

        for folder in state.folders.values_mut() {
            if folder.status == FolderStatus::Scanning {
                tracing::warn!("Folder {} was mid-scan at shutdown", folder.path);
                folder.status = FolderStatus::Error;
                folder.error = Some("scan interrupted; rescan to repair".to_string());
                state.dirty = true;
            }
        }

        tracing::info!(
            "Loaded metadata: {} folders, {} files",
            state.folders.len(),
            state.files.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(State::default()),
        }
    }

    /// Persist pending changes, if any
    pub async fn flush(&self) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        if !state.dirty {
            return Ok(());
        }
        if let Some(path) = &self.path {
            persist(path, &state)?;
        }
        state.dirty = false;
        Ok(())
    }

    /// Register a new folder in `pending` state
    pub async fn register_folder(
        &self,
        path: &str,
        description: Option<String>,
    ) -> Result<FolderRecord, MetadataError> {
        let record = {
            let mut state = self.state.write().await;
            if state.folders.values().any(|f| f.path == path) {
                return Err(MetadataError::AlreadyRegistered(path.to_string()));
            }

            let record = FolderRecord {
                id: Uuid::new_v4().to_string(),
                path: path.to_string(),
                description,
                status: FolderStatus::Pending,
                error: None,
                file_count: 0,
                added_at: Utc::now(),
                last_scanned: None,
            };
            state.folders.insert(record.id.clone(), record.clone());
            state.dirty = true;
            record
        };
        self.flush().await?;
        Ok(record)
    }

    pub async fn folder(&self, id: &str) -> Option<FolderRecord> {
        self.state.read().await.folders.get(id).cloned()
    }

    pub async fn folder_by_path(&self, path: &str) -> Option<FolderRecord> {
        self.state
            .read()
            .await
            .folders
            .values()
            .find(|f| f.path == path)
            .cloned()
    }

    /// All folders, ordered by path
    pub async fn folders(&self) -> Vec<FolderRecord> {
        let mut folders: Vec<FolderRecord> =
            self.state.read().await.folders.values().cloned().collect();
        folders.sort_by(|a, b| a.path.cmp(&b.path));
        folders
    }

    pub async fn set_folder_status(
        &self,
        id: &str,
        status: FolderStatus,
        error: Option<String>,
    ) -> Result<(), MetadataError> {
        {
            let mut state = self.state.write().await;
            let folder = state
                .folders
                .get_mut(id)
                .ok_or_else(|| MetadataError::FolderNotFound(id.to_string()))?;
            folder.status = status;
            folder.error = error;
            state.dirty = true;
        }
        self.flush().await
    }

    /// Mark a scan complete: `active`, file count, last scan time
    pub async fn finish_scan(&self, id: &str, file_count: usize) -> Result<(), MetadataError> {
        {
            let mut state = self.state.write().await;
            let folder = state
                .folders
                .get_mut(id)
                .ok_or_else(|| MetadataError::FolderNotFound(id.to_string()))?;
            folder.status = FolderStatus::Active;
            folder.error = None;
            folder.file_count = file_count;
            folder.last_scanned = Some(Utc::now());
            state.dirty = true;
        }
        self.flush().await
    }

    /// Recount a folder's files after an incremental change
    pub async fn refresh_file_count(&self, id: &str) -> Result<usize, MetadataError> {
        let mut state = self.state.write().await;
        let count = state.files.values().filter(|f| f.folder_id == id).count();
        let folder = state
            .folders
            .get_mut(id)
            .ok_or_else(|| MetadataError::FolderNotFound(id.to_string()))?;
        if folder.file_count != count {
            folder.file_count = count;
            state.dirty = true;
        }
        Ok(count)
    }

    pub async fn files_for_folder(&self, folder_id: &str) -> Vec<FileRecord> {
        self.state
            .read()
            .await
            .files
            .values()
            .filter(|f| f.folder_id == folder_id)
            .cloned()
            .collect()
    }

    pub async fn file_by_path(&self, folder_id: &str, path: &str) -> Option<FileRecord> {
        let state = self.state.read().await;
        state
            .file_index
            .get(&(folder_id.to_string(), path.to_string()))
            .and_then(|id| state.files.get(id))
            .cloned()
    }

    /// Replace a file record and all of its chunks
    pub async fn replace_file(
        &self,
        record: FileRecord,
        mut chunks: Vec<ChunkRecord>,
    ) -> Result<(), MetadataError> {
        let mut state = self.state.write().await;
        if !state.folders.contains_key(&record.folder_id) {
            return Err(MetadataError::FolderNotFound(record.folder_id.clone()));
        }

        let key = (record.folder_id.clone(), record.path.clone());
        if let Some(existing) = state.file_index.get(&key).cloned()
            && existing != record.id
        {
            state.remove_file(&existing);
        }

        chunks.sort_by_key(|c| c.chunk_num);
        state.file_index.insert(key, record.id.clone());
        state.chunks.insert(record.id.clone(), chunks);
        state.files.insert(record.id.clone(), record);
        state.dirty = true;
        Ok(())
    }

    /// Chunks of a file in sequence order
    pub async fn chunks_for_file(&self, file_id: &str) -> Vec<ChunkRecord> {
        self.state
            .read()
            .await
            .chunks
            .get(file_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a file and its chunks; false when it was not present
    pub async fn remove_file(&self, file_id: &str) -> bool {
        self.state.write().await.remove_file(file_id).is_some()
    }

    /// Remove a folder with all its files and chunks, returning the file count
    pub async fn remove_folder(&self, id: &str) -> Result<usize, MetadataError> {
        let removed = {
            let mut state = self.state.write().await;
            if state.folders.remove(id).is_none() {
                return Err(MetadataError::FolderNotFound(id.to_string()));
            }

            let file_ids: Vec<String> = state
                .files
                .values()
                .filter(|f| f.folder_id == id)
                .map(|f| f.id.clone())
                .collect();
            for file_id in &file_ids {
                state.remove_file(file_id);
            }
            state.dirty = true;
            file_ids.len()
        };
        self.flush().await?;
        Ok(removed)
    }

    pub async fn status(&self) -> StoreStatus {
        let state = self.state.read().await;
        let mut status = StoreStatus {
            total_folders: state.folders.len(),
            total_files: state.files.len(),
            total_chunks: state.chunks.values().map(Vec::len).sum(),
            total_size: state.files.values().map(|f| f.size).sum(),
            ..Default::default()
        };

        for folder in state.folders.values() {
            match folder.status {
                FolderStatus::Active => status.active_folders += 1,
                FolderStatus::Scanning => status.scanning_folders += 1,
                FolderStatus::Error => status.error_folders += 1,
                FolderStatus::Pending => {}
            }
            if folder.last_scanned > status.last_scan {
                status.last_scan = folder.last_scanned;
            }
        }
        status
    }
}

fn persist(path: &Path, state: &State) -> Result<(), MetadataError> {
    let fail = |reason: String| MetadataError::Persist {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    }

    let content = serde_json::to_string(state).map_err(|e| fail(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(|e| fail(e.to_string()))?;
    std::fs::rename(&tmp, path).map_err(|e| fail(e.to_string()))?;

    tracing::debug!("Saved metadata to {:?}", path);
    Ok(())
}
