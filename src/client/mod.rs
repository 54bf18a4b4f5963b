//! Core library client for code-index
//!
//! [`CodeIndexClient`] owns the embedding provider, vector store, metadata store
//! and folder coordination. The MCP server and the filesystem watcher are thin
//! layers over it.

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::{MetadataError, ValidationError};
use crate::indexer::{ChunkStrategy, CodeChunker};
use crate::metadata::{FolderStatus, MetadataStore};
use crate::path_mapper::PathMapper;
use crate::types::*;
use crate::vector_store::{self, PointFilter, VectorStore};
use crate::watcher::{self, WatcherHandle};

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

mod folder_lock;
pub(crate) mod indexing;

pub(crate) use folder_lock::FolderLocks;
pub(crate) use indexing::ScanProgress;

/// Main client for the code index
///
/// # Example
///
/// ```no_run
/// use code_index::{CodeIndexClient, Config};
/// use code_index::types::{AddFolderRequest, ScanRequest, SearchRequest};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = CodeIndexClient::new(Config::load(None)?).await?;
///
///     client
///         .add_folder(AddFolderRequest {
///             folder_path: "/path/to/code".to_string(),
///             description: None,
///         })
///         .await?;
///     let scan = client
///         .scan_folder(ScanRequest {
///             folder_path: "/path/to/code".to_string(),
///         })
///         .await?;
///     println!("Indexed {} files", scan.files_indexed);
///
///     let response = client
///         .search(SearchRequest {
///             query: "where is the config parsed".to_string(),
///             limit: Some(5),
///             folder_path: None,
///             retrieve: Default::default(),
///         })
///         .await?;
///     for result in response.results {
///         println!("{}:{} ({:.2})", result.file_path, result.start_line, result.score);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct CodeIndexClient {
    pub(crate) embedding: Arc<dyn EmbeddingProvider>,
    pub(crate) vector_store: Arc<dyn VectorStore>,
    pub(crate) metadata: Arc<MetadataStore>,
    pub(crate) chunker: Arc<CodeChunker>,
    pub(crate) path_mapper: Arc<PathMapper>,
    pub(crate) config: Arc<Config>,
    pub(crate) locks: Arc<FolderLocks>,
    // Created on first use so startup works while the vector store is down
    collection_ready: Arc<OnceCell<()>>,
    watcher: Arc<OnceCell<WatcherHandle>>,
}

impl CodeIndexClient {
    /// Build a client from configuration: connects the embedding provider,
    /// creates the vector store client and loads the metadata store.
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing code index client");
        tracing::debug!("Vector store backend: {}", config.vector_store.backend);
        tracing::debug!("Embedding provider: {}", config.embedding.provider);

        let embedding = embedding::create_provider(&config.embedding)
            .await
            .context("Failed to initialize embedding provider")?;
        let vector_store = vector_store::create_store(&config.vector_store)
            .context("Failed to initialize vector store")?;
        let metadata = MetadataStore::open(&config.metadata.path)
            .context("Failed to open metadata store")?;

        tracing::info!("Using metadata file: {}", config.metadata.path.display());

        Ok(Self::with_components(
            config,
            embedding,
            vector_store,
            Arc::new(metadata),
        ))
    }

    /// Assemble a client from already-built components
    pub fn with_components(
        config: Config,
        embedding: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
        metadata: Arc<MetadataStore>,
    ) -> Self {
        let chunker = CodeChunker::new(ChunkStrategy::Semantic {
            max_lines: config.indexing.chunk_lines,
        });
        let path_mapper = PathMapper::from_pairs(&config.path_mappings);
        for (host, container) in path_mapper.mappings() {
            tracing::info!("Path mapping {} -> {}", host.display(), container.display());
        }

        Self {
            embedding,
            vector_store,
            metadata,
            chunker: Arc::new(chunker),
            path_mapper: Arc::new(path_mapper),
            config: Arc::new(config),
            locks: Arc::new(FolderLocks::new()),
            collection_ready: Arc::new(OnceCell::new()),
            watcher: Arc::new(OnceCell::new()),
        }
    }

    pub(crate) fn collection(&self) -> &str {
        &self.config.vector_store.collection_name
    }

    /// Create the collection on first use. A failure is returned and retried on the next call.
    pub(crate) async fn ensure_collection(&self) -> Result<()> {
        self.collection_ready
            .get_or_try_init(|| async {
                self.vector_store
                    .ensure_collection(self.collection(), self.embedding.dimension())
                    .await
                    .with_context(|| {
                        format!("Failed to prepare collection '{}'", self.collection())
                    })
            })
            .await?;
        Ok(())
    }

    /// Register a folder for indexing. Registering a known path returns the existing entry.
    pub async fn add_folder(&self, request: AddFolderRequest) -> Result<AddFolderResponse> {
        request.validate().map_err(anyhow::Error::msg)?;
        let path = normalize_folder_path(&request.folder_path)?;

        if let Some(existing) = self.metadata.folder_by_path(&path).await {
            tracing::debug!("Folder {} already registered", path);
            return Ok(AddFolderResponse {
                folder: existing.into(),
                already_registered: true,
            });
        }

        let local = self.path_mapper.to_container_path(Path::new(&path));
        if !self.path_mapper.validate_container_path(&local) {
            tracing::warn!(
                "{} is outside every configured path mapping; reading it unmapped",
                path
            );
        }
        if !local.is_dir() {
            return Err(ValidationError::InvalidPath(format!(
                "{} does not exist or is not a directory",
                path
            ))
            .into());
        }

        let folder = match self
            .metadata
            .register_folder(&path, request.description)
            .await
        {
            Ok(folder) => folder,
            // Lost a race with a concurrent registration of the same path
            Err(MetadataError::AlreadyRegistered(_)) => {
                let existing = self
                    .metadata
                    .folder_by_path(&path)
                    .await
                    .ok_or_else(|| MetadataError::FolderNotFound(path.clone()))?;
                return Ok(AddFolderResponse {
                    folder: existing.into(),
                    already_registered: true,
                });
            }
            Err(e) => return Err(e).context("Failed to register folder"),
        };

        tracing::info!("Registered folder {} ({})", folder.path, folder.id);
        Ok(AddFolderResponse {
            folder: folder.into(),
            already_registered: false,
        })
    }

    /// Unregister a folder and delete its points, files and chunks
    pub async fn remove_folder(&self, request: RemoveFolderRequest) -> Result<RemoveFolderResponse> {
        request.validate().map_err(anyhow::Error::msg)?;
        let path = normalize_folder_path(&request.folder_path)?;
        let folder = self
            .metadata
            .folder_by_path(&path)
            .await
            .ok_or_else(|| MetadataError::FolderNotFound(path.clone()))?;

        // Stop an in-flight scan at its next checkpoint, then wait for it
        self.locks.cancel(&folder.id).await;
        let gate = self.locks.lock_folder(&folder.id).await;

        self.ensure_collection().await?;
        self.vector_store
            .delete_by_filter(self.collection(), PointFilter::folder(&folder.id))
            .await
            .with_context(|| format!("Failed to delete vector points for {}", path))?;

        let files_removed = self
            .metadata
            .remove_folder(&folder.id)
            .await
            .with_context(|| format!("Failed to remove metadata for {}", path))?;

        self.unwatch_folder(&folder.path);
        drop(gate);
        self.locks.forget(&folder.id).await;

        tracing::info!("Removed folder {} ({} files)", path, files_removed);
        Ok(RemoveFolderResponse {
            folder_path: path,
            files_removed,
        })
    }

    /// Scan a registered folder and bring both stores in line with the disk
    pub async fn scan_folder(&self, request: ScanRequest) -> Result<ScanResponse> {
        self.scan_folder_with_progress(request, None).await
    }

    pub(crate) async fn scan_folder_with_progress(
        &self,
        request: ScanRequest,
        progress: Option<ScanProgress>,
    ) -> Result<ScanResponse> {
        request.validate().map_err(anyhow::Error::msg)?;
        let path = normalize_folder_path(&request.folder_path)?;
        let folder = self
            .metadata
            .folder_by_path(&path)
            .await
            .ok_or_else(|| MetadataError::FolderNotFound(path.clone()))?;

        indexing::scan_folder(self, &folder.id, progress)
            .await
            .with_context(|| format!("Scan of {} failed", path))
    }

    /// Semantic search over indexed chunks
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        request.validate().map_err(anyhow::Error::msg)?;
        let max = self.config.search.max_limit.min(MAX_SEARCH_LIMIT);
        let limit = request.effective_limit(self.config.search.default_limit.min(max), max);

        let filter = match &request.folder_path {
            Some(folder_path) => {
                let path = normalize_folder_path(folder_path)?;
                let folder = self
                    .metadata
                    .folder_by_path(&path)
                    .await
                    .ok_or_else(|| MetadataError::FolderNotFound(path.clone()))?;
                Some(PointFilter::folder(&folder.id))
            }
            None => None,
        };

        self.ensure_collection().await?;
        let query_vector = self
            .embedding
            .embed(&request.query)
            .await
            .context("Failed to generate query embedding")?;

        let hits = self
            .vector_store
            .search_similar(self.collection(), query_vector, limit, filter)
            .await
            .context("Failed to search vector store")?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let payload = hit.payload;
            let (content, full_file_retrieved) = match request.retrieve {
                RetrieveMode::Chunk => (payload.content, false),
                RetrieveMode::Full => {
                    let chunks = self.metadata.chunks_for_file(&payload.file_id).await;
                    if chunks.is_empty() {
                        tracing::debug!(
                            "No stored chunks for {}, returning the matching chunk",
                            payload.file_path
                        );
                        (payload.content, false)
                    } else {
                        (chunks.into_iter().map(|c| c.content).collect(), true)
                    }
                }
            };

            results.push(SearchResult {
                file_path: payload.file_path,
                relative_path: payload.relative_path,
                folder_path: payload.folder_path,
                language: payload.language,
                chunk_num: payload.chunk_num,
                start_line: payload.start_line,
                end_line: payload.end_line,
                score: hit.score,
                content,
                full_file_retrieved,
            });
        }

        Ok(SearchResponse {
            query: request.query,
            retrieve: request.retrieve,
            total_results: results.len(),
            results,
        })
    }

    /// Aggregate index status
    pub async fn status(&self) -> Result<StatusResponse> {
        let totals = self.metadata.status().await;
        let folders = self
            .metadata
            .folders()
            .await
            .into_iter()
            .map(|f| FolderStatusEntry {
                enabled: f.status == FolderStatus::Active,
                folder_path: f.path,
                file_count: f.file_count,
                status: f.status,
                error: f.error,
                last_scanned: f.last_scanned,
            })
            .collect();

        Ok(StatusResponse {
            total_folders: totals.total_folders,
            total_files: totals.total_files,
            total_chunks: totals.total_chunks,
            total_size: totals.total_size,
            active_folders: totals.active_folders,
            scanning_folders: totals.scanning_folders,
            error_folders: totals.error_folders,
            watcher_running: self.watcher_running(),
            last_scan: totals.last_scan,
            folders,
        })
    }

    /// Start the filesystem watcher and watch every active folder. Idempotent.
    pub async fn start_watcher(&self) -> Result<()> {
        let handle = self
            .watcher
            .get_or_try_init(|| async {
                watcher::spawn_watcher(
                    self.clone(),
                    Duration::from_millis(self.config.watcher.debounce_ms),
                )
            })
            .await?;

        for folder in self.metadata.folders().await {
            if folder.status == FolderStatus::Active {
                handle.watch(&folder.path);
            }
        }
        Ok(())
    }

    pub fn watcher_running(&self) -> bool {
        self.watcher.get().is_some_and(WatcherHandle::is_running)
    }

    pub(crate) fn watch_folder(&self, host_path: &str) {
        if let Some(handle) = self.watcher.get() {
            handle.watch(host_path);
        }
    }

    pub(crate) fn unwatch_folder(&self, host_path: &str) {
        if let Some(handle) = self.watcher.get() {
            handle.unwatch(host_path);
        }
    }

    /// Get the configuration used by this client
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path_mapper(&self) -> &PathMapper {
        &self.path_mapper
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }
}

/// Absolute, lexically normalized form of a folder path (no `.`/`..`, no trailing slash)
pub(crate) fn normalize_folder_path(path: &str) -> Result<String> {
    let absolute = std::path::absolute(path.trim())
        .with_context(|| format!("Invalid folder path: {}", path))?;

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized.to_string_lossy().into_owned())
}

#[cfg(test)]
pub(crate) mod tests;
