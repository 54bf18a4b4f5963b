// Qdrant over its REST API is the production backend; the in-process store
// serves tests and `backend = "memory"` runs.
pub mod memory;
pub mod qdrant_http;

pub use memory::MemoryVectorStore;
pub use qdrant_http::QdrantHttpStore;

use crate::config::VectorStoreConfig;
use crate::error::VectorStoreError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload stored with every point. Carries enough to render a search hit
/// without touching the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    pub file_id: String,
    pub folder_id: String,
    pub folder_path: String,
    pub file_path: String,
    pub relative_path: String,
    pub language: String,
    pub chunk_num: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
}

impl ChunkPayload {
    /// Value of a filterable payload key
    pub fn field(&self, key: &str) -> Option<&str> {
        match key {
            "fileId" => Some(&self.file_id),
            "folderId" => Some(&self.folder_id),
            "folderPath" => Some(&self.folder_path),
            "filePath" => Some(&self.file_path),
            "relativePath" => Some(&self.relative_path),
            "language" => Some(&self.language),
            _ => None,
        }
    }
}

/// A point to upsert
#[derive(Debug, Clone)]
pub struct Point {
    /// UUID string
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A nearest-neighbour hit, higher score is closer
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Conjunction of exact payload matches, minus points whose key takes any excluded value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    must: Vec<(String, String)>,
    must_not: Vec<(String, Vec<String>)>,
}

impl PointFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every point belonging to a folder
    pub fn folder(folder_id: &str) -> Self {
        Self::new().with_match("folderId", folder_id)
    }

    /// Every point belonging to a file
    pub fn file(file_id: &str) -> Self {
        Self::new().with_match("fileId", file_id)
    }

    pub fn with_match(mut self, key: &str, value: &str) -> Self {
        self.must.push((key.to_string(), value.to_string()));
        self
    }

    /// Skip points whose `key` equals any of `values`. An empty list excludes nothing.
    pub fn excluding(mut self, key: &str, values: impl IntoIterator<Item = String>) -> Self {
        let values: Vec<String> = values.into_iter().collect();
        if !values.is_empty() {
            self.must_not.push((key.to_string(), values));
        }
        self
    }

    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        self.must
            .iter()
            .all(|(key, value)| payload.field(key) == Some(value.as_str()))
            && !self.must_not.iter().any(|(key, values)| {
                payload
                    .field(key)
                    .is_some_and(|field| values.iter().any(|v| v == field))
            })
    }

    /// Qdrant filter JSON: `{"must": [{"key": .., "match": {"value": ..}}]}`, plus a
    /// `must_not` list of `{"match": {"any": [..]}}` conditions when exclusions are set
    pub fn to_qdrant(&self) -> serde_json::Value {
        let must: Vec<serde_json::Value> = self
            .must
            .iter()
            .map(|(key, value)| serde_json::json!({ "key": key, "match": { "value": value } }))
            .collect();
        if self.must_not.is_empty() {
            return serde_json::json!({ "must": must });
        }

        let must_not: Vec<serde_json::Value> = self
            .must_not
            .iter()
            .map(|(key, values)| serde_json::json!({ "key": key, "match": { "any": values } }))
            .collect();
        serde_json::json!({ "must": must, "must_not": must_not })
    }
}

/// Trait for vector store operations
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent. Fails when an existing collection
    /// has a different vector size.
    async fn ensure_collection(&self, name: &str, dimension: usize)
    -> Result<(), VectorStoreError>;

    /// Write or overwrite points by id
    async fn upsert_points(&self, name: &str, points: Vec<Point>) -> Result<(), VectorStoreError>;

    /// Nearest neighbours by cosine similarity, best first
    async fn search_similar(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<PointFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError>;

    /// Remove every point matching the filter
    async fn delete_by_filter(&self, name: &str, filter: PointFilter)
    -> Result<(), VectorStoreError>;

    /// Count points, optionally filtered
    async fn count(&self, name: &str, filter: Option<PointFilter>)
    -> Result<usize, VectorStoreError>;
}

/// Build the store named by `config.backend`
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.backend.as_str() {
        "qdrant" => {
            tracing::info!("Using Qdrant vector store at {}", config.url);
            Ok(Arc::new(QdrantHttpStore::new(
                &config.url,
                config.api_key.clone(),
                std::time::Duration::from_secs(config.timeout_secs),
            )?))
        }
        "memory" => {
            tracing::warn!("Using in-memory vector store; embeddings are lost on exit");
            Ok(Arc::new(MemoryVectorStore::new()))
        }
        other => anyhow::bail!("Unknown vector store backend: {}", other),
    }
}
