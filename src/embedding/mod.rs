mod ollama;
mod openai;

pub use ollama::OllamaEmbeddings;
pub use openai::OpenAiEmbeddings;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
///
/// Implementations are selected once from configuration; callers only see
/// `Arc<dyn EmbeddingProvider>`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text into a vector of [`dimension`](Self::dimension) floats
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Get the dimension of the embeddings
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Build the provider named by `config.provider`
pub async fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "ollama" => Arc::new(
            OllamaEmbeddings::connect(
                config.base_url.clone(),
                config.model.clone(),
                config.dimension,
                timeout,
            )
            .await
            .context("Failed to initialize Ollama embeddings")?,
        ),
        "openai" => {
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| EmbeddingError::MissingApiKey("openai".to_string()))?;
            Arc::new(
                OpenAiEmbeddings::new(
                    api_key,
                    config.base_url.clone(),
                    config.model.clone(),
                    config.dimension,
                    timeout,
                )
                .context("Failed to initialize OpenAI embeddings")?,
            )
        }
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    };

    tracing::info!(
        "Embedding provider ready: {} ({} dimensions)",
        provider.model_name(),
        provider.dimension()
    );
    Ok(provider)
}

pub(crate) fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

pub(crate) fn map_request_error(
    url: &str,
    timeout: Duration,
    err: reqwest::Error,
) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::Timeout(timeout.as_secs())
    } else {
        EmbeddingError::Request {
            url: url.to_string(),
            source: err,
        }
    }
}
