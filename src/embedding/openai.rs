use super::{EmbeddingProvider, check_dimension, map_request_error};
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;
const MAX_RETRIES: u32 = 3;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embeddings from the OpenAI API or any endpoint speaking the same protocol
pub struct OpenAiEmbeddings {
    client: Client,
    api_key: String,
    url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl OpenAiEmbeddings {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        dimension: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::MissingApiKey("openai".to_string()));
        }

        let base = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let url = format!("{}/embeddings", base.trim_end_matches('/'));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| map_request_error(&url, timeout, e))?;

        Ok(Self {
            client,
            api_key,
            url,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dimension: dimension.unwrap_or(DEFAULT_DIMENSION),
            timeout,
        })
    }

    /// Send with retries on HTTP 429, honouring `retry-after`
    async fn send_request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbeddingRequest {
            input: [text],
            model: &self.model,
            encoding_format: "float",
        };

        let mut attempt = 0;
        let mut backoff_secs = 1u64;

        loop {
            let response = self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| map_request_error(&self.url, self.timeout, e))?;

            let status = response.status();

            if status.is_success() {
                let parsed: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

                return parsed
                    .data
                    .into_iter()
                    .min_by_key(|d| d.index)
                    .map(|d| d.embedding)
                    .ok_or_else(|| {
                        EmbeddingError::InvalidResponse("no embedding returned".to_string())
                    });
            }

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                attempt += 1;
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    "Rate limited by embedding API, retrying after {}s (attempt {}/{})",
                    retry_after,
                    attempt,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                backoff_secs *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let vector = self.send_request(text).await?;
        check_dimension(self.dimension, &vector)?;
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
