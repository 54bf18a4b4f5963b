/// Configuration system for code-index
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{CodeIndexError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Vector store connection
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Embedding provider selection
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Scanner and chunker settings
    #[serde(default)]
    pub indexing: IndexingConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Filesystem watcher settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Metadata store location
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Host to container path prefix substitutions, each "host:container"
    #[serde(default)]
    pub path_mappings: Vec<String>,
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Backend: "qdrant" (REST) or "memory" (in-process, not persisted)
    #[serde(default = "default_vector_backend")]
    pub backend: String,

    /// Qdrant REST URL
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Sent as the `api-key` header when set
    #[serde(default)]
    pub api_key: Option<String>,

    /// Collection holding code chunks
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "ollama" or "openai"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name; provider default when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Base URL; provider default when unset
    #[serde(default)]
    pub base_url: Option<String>,

    /// API key for hosted providers
    #[serde(default)]
    pub api_key: Option<String>,

    /// Vector dimension; detected or provider default when unset
    #[serde(default)]
    pub dimension: Option<usize>,

    /// Timeout in seconds for a single embedding call
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum embedding calls in flight during one folder scan
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum lines per chunk
    #[serde(default = "default_chunk_lines")]
    pub chunk_lines: usize,

    /// Maximum file size to index (in bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Directory names pruned from every walk
    #[serde(default = "default_ignore_dirs")]
    pub ignore_dirs: Vec<String>,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result limit when the caller passes none
    #[serde(default = "default_result_limit")]
    pub default_limit: usize,

    /// Upper clamp for caller-supplied limits
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

/// Watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Start the filesystem watcher with the server
    #[serde(default = "default_watcher_enabled")]
    pub enabled: bool,

    /// Quiet period before a path's events are processed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Metadata store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// JSON file holding folders, files and chunks
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
}

fn default_vector_backend() -> String {
    "qdrant".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_collection_name() -> String {
    "code_index".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_chunk_lines() -> usize {
    200
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

pub(crate) fn default_ignore_dirs() -> Vec<String> {
    [
        ".git",
        "node_modules",
        "vendor",
        "dist",
        "build",
        ".vscode",
        ".idea",
        "__pycache__",
        ".next",
        "out",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_result_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    50
}

fn default_watcher_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_metadata_path() -> PathBuf {
    crate::paths::PlatformPaths::default_metadata_path()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            url: default_qdrant_url(),
            api_key: None,
            collection_name: default_collection_name(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key: None,
            dimension: None,
            timeout_secs: default_embedding_timeout(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            chunk_lines: default_chunk_lines(),
            max_file_size: default_max_file_size(),
            ignore_dirs: default_ignore_dirs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_result_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: default_watcher_enabled(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> CodeIndexError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, CodeIndexError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadFailed(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, or defaults when absent
    pub fn load_or_default() -> Result<Self, CodeIndexError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), CodeIndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CodeIndexError> {
        if !matches!(self.vector_store.backend.as_str(), "qdrant" | "memory") {
            return Err(invalid(
                "vector_store.backend",
                format!(
                    "must be 'qdrant' or 'memory', got '{}'",
                    self.vector_store.backend
                ),
            ));
        }

        if self.vector_store.collection_name.trim().is_empty() {
            return Err(invalid("vector_store.collection_name", "must not be empty"));
        }

        if !matches!(self.embedding.provider.as_str(), "ollama" | "openai") {
            return Err(invalid(
                "embedding.provider",
                format!(
                    "must be 'ollama' or 'openai', got '{}'",
                    self.embedding.provider
                ),
            ));
        }

        if self.embedding.dimension == Some(0) {
            return Err(invalid("embedding.dimension", "must be greater than 0"));
        }

        if self.embedding.max_concurrency == 0 {
            return Err(invalid("embedding.max_concurrency", "must be greater than 0"));
        }

        if self.embedding.timeout_secs == 0 || self.vector_store.timeout_secs == 0 {
            return Err(invalid("timeout_secs", "timeouts must be greater than 0"));
        }

        if self.indexing.chunk_lines == 0 {
            return Err(invalid("indexing.chunk_lines", "must be greater than 0"));
        }

        if self.indexing.max_file_size == 0 {
            return Err(invalid("indexing.max_file_size", "must be greater than 0"));
        }

        if self.search.max_limit == 0 {
            return Err(invalid("search.max_limit", "must be greater than 0"));
        }

        if self.search.default_limit == 0 || self.search.default_limit > self.search.max_limit {
            return Err(invalid(
                "search.default_limit",
                format!("must be between 1 and {}", self.search.max_limit),
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var("CODE_INDEX_VECTOR_BACKEND") {
            self.vector_store.backend = backend;
        }

        if let Ok(url) = std::env::var("CODE_INDEX_QDRANT_URL") {
            self.vector_store.url = url;
        }

        if let Ok(key) = std::env::var("CODE_INDEX_QDRANT_API_KEY") {
            self.vector_store.api_key = Some(key);
        }

        if let Ok(provider) = std::env::var("CODE_INDEX_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("CODE_INDEX_EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }

        if let Ok(url) = std::env::var("CODE_INDEX_EMBEDDING_URL") {
            self.embedding.base_url = Some(url);
        }

        if let Ok(dim) = std::env::var("CODE_INDEX_EMBEDDING_DIMENSION")
            && let Ok(dim) = dim.parse()
        {
            self.embedding.dimension = Some(dim);
        }

        if self.embedding.api_key.is_none()
            && let Ok(key) = std::env::var("OPENAI_API_KEY")
        {
            self.embedding.api_key = Some(key);
        }

        if let Ok(path) = std::env::var("CODE_INDEX_METADATA_PATH") {
            self.metadata.path = PathBuf::from(path);
        }

        if let Ok(raw) = std::env::var("CODE_INDEX_PATH_MAPPINGS") {
            self.path_mappings = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Load from `path` (or the default location), apply env overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self, CodeIndexError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::load_or_default()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
