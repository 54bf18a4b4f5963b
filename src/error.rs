/// Centralized error types for code-index using thiserror
///
/// Component seams (embedding providers, vector stores, metadata store) return their own
/// typed errors; the client and server layers wrap them with anyhow context.
use thiserror::Error;

/// Main error type for the code index
#[derive(Error, Debug)]
pub enum CodeIndexError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Indexing error: {0}")]
    Indexing(#[from] IndexingError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Embedding provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("Embedding generation timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing API key for provider '{0}'")]
    MissingApiKey(String),

    #[error("Cannot embed empty text")]
    EmptyInput,
}

/// Errors raised by vector store clients
#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Vector store returned HTTP {status} for {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Failed to create collection '{collection}': {reason}")]
    CollectionCreationFailed { collection: String, reason: String },

    #[error("Collection '{0}' not found")]
    CollectionNotFound(String),

    #[error(
        "Collection '{collection}' has vector size {existing}, but the embedding provider produces {requested}"
    )]
    DimensionMismatch {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error("Invalid vector store response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the metadata store
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Folder already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to load metadata from '{path}': {reason}")]
    Load { path: String, reason: String },

    #[error("Failed to persist metadata to '{path}': {reason}")]
    Persist { path: String, reason: String },
}

/// Errors related to folder indexing
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("Folder path no longer exists: {0}")]
    FolderMissing(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Failed to walk directory: {0}")]
    WalkFailed(String),

    #[error("Indexing was cancelled for {0}")]
    Cancelled(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Errors related to tool input validation
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Empty {0}")]
    Empty(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl From<anyhow::Error> for CodeIndexError {
    fn from(err: anyhow::Error) -> Self {
        CodeIndexError::Other(format!("{:#}", err))
    }
}

impl EmbeddingError {
    /// Transport failures and timeouts may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Request { .. } | EmbeddingError::Timeout(_) => true,
            EmbeddingError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl CodeIndexError {
    /// Check if this is a user error (validation, not found) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CodeIndexError::Validation(_)
                | CodeIndexError::Metadata(MetadataError::FolderNotFound(_))
                | CodeIndexError::Metadata(MetadataError::FileNotFound(_))
                | CodeIndexError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            CodeIndexError::Embedding(e) => e.is_retryable(),
            CodeIndexError::VectorStore(VectorStoreError::Request { .. }) => true,
            CodeIndexError::Io(_) => true,
            _ => false,
        }
    }
}

/// Whether an error anywhere in the chain was caused by the caller's input
pub fn is_user_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<CodeIndexError>()
            .is_some_and(CodeIndexError::is_user_error)
            || cause.downcast_ref::<ValidationError>().is_some()
            || matches!(
                cause.downcast_ref::<MetadataError>(),
                Some(MetadataError::FolderNotFound(_) | MetadataError::FileNotFound(_))
            )
    })
}

/// Whether an error anywhere in the chain may clear up on a later attempt
pub fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<CodeIndexError>()
            .is_some_and(CodeIndexError::is_retryable)
            || cause
                .downcast_ref::<EmbeddingError>()
                .is_some_and(EmbeddingError::is_retryable)
            || matches!(
                cause.downcast_ref::<VectorStoreError>(),
                Some(VectorStoreError::Request { .. })
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodeIndexError::Validation(ValidationError::Empty("query".to_string()));
        assert_eq!(err.to_string(), "Validation error: Empty query");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CodeIndexError = io_err.into();
        assert!(matches!(err, CodeIndexError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: CodeIndexError = anyhow::anyhow!("test error").into();
        assert!(matches!(err, CodeIndexError::Other(_)));
    }

    #[test]
    fn test_is_user_error() {
        let not_found = CodeIndexError::Metadata(MetadataError::FolderNotFound("/proj".into()));
        assert!(not_found.is_user_error());

        let system_err = CodeIndexError::Metadata(MetadataError::Persist {
            path: "/tmp/m.json".into(),
            reason: "disk full".into(),
        });
        assert!(!system_err.is_user_error());
    }

    #[test]
    fn test_is_retryable() {
        assert!(CodeIndexError::Embedding(EmbeddingError::Timeout(30)).is_retryable());

        let rate_limited = EmbeddingError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert!(rate_limited.is_retryable());

        let bad_request = EmbeddingError::Status {
            status: 400,
            body: "bad".into(),
        };
        assert!(!bad_request.is_retryable());

        let mismatch = CodeIndexError::VectorStore(VectorStoreError::DimensionMismatch {
            collection: "code_index".into(),
            existing: 768,
            requested: 1536,
        });
        assert!(!mismatch.is_retryable());
    }

    #[test]
    fn test_user_error_through_context() {
        let err = anyhow::Error::from(MetadataError::FolderNotFound("/proj".into()))
            .context("Failed to scan folder");
        assert!(is_user_error(&err));
        assert!(!is_retryable(&err));

        let err = anyhow::Error::from(ValidationError::InvalidPath("/nope".into()));
        assert!(is_user_error(&err));

        let err = anyhow::anyhow!("disk on fire");
        assert!(!is_user_error(&err));
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_retryable_through_context() {
        let err = anyhow::Error::from(EmbeddingError::Timeout(30)).context("Failed to embed chunk 0");
        assert!(is_retryable(&err));
        assert!(!is_user_error(&err));

        let err = anyhow::Error::from(EmbeddingError::Status {
            status: 401,
            body: "bad key".into(),
        })
        .context("Failed to embed chunk 0");
        assert!(!is_retryable(&err));

        let err = anyhow::Error::from(CodeIndexError::Io(std::io::Error::other("reset")));
        assert!(is_retryable(&err));
    }

    #[test]
    fn test_embedding_error_timeout() {
        let err = EmbeddingError::Timeout(30);
        assert_eq!(
            err.to_string(),
            "Embedding generation timed out after 30 seconds"
        );
    }

    #[test]
    fn test_vector_store_dimension_mismatch() {
        let err = VectorStoreError::DimensionMismatch {
            collection: "code_index".to_string(),
            existing: 768,
            requested: 1536,
        };
        assert_eq!(
            err.to_string(),
            "Collection 'code_index' has vector size 768, but the embedding provider produces 1536"
        );
    }

    #[test]
    fn test_metadata_already_registered() {
        let err = MetadataError::AlreadyRegistered("/proj".to_string());
        assert_eq!(err.to_string(), "Folder already registered: /proj");
    }

    #[test]
    fn test_indexing_folder_missing_chain() {
        let err: CodeIndexError = IndexingError::FolderMissing("/gone".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Indexing error: Folder path no longer exists: /gone"
        );
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            key: "search.max_limit".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'search.max_limit': must be greater than 0"
        );
    }
}
