use super::{ChunkPayload, Point, PointFilter, ScoredPoint, VectorStore};
use crate::error::VectorStoreError;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;

/// Thin client for the Qdrant REST API
pub struct QdrantHttpStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    /// Collections already verified in this process
    ensured: Mutex<HashSet<String>>,
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Deserialize)]
struct CollectionParams {
    vectors: Value,
}

#[derive(Deserialize)]
struct Hit {
    id: Value,
    score: f32,
    payload: Option<ChunkPayload>,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantHttpStore {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, VectorStoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| VectorStoreError::Request {
                url: base_url.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<reqwest::Response, VectorStoreError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        request
            .send()
            .await
            .map_err(|source| VectorStoreError::Request { url, source })
    }

    /// Send and require a 2xx, decoding `{"result": T}`
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, VectorStoreError> {
        let response = self.send(method, path, body).await?;
        let response = check_status(operation, response).await?;
        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| VectorStoreError::InvalidResponse(format!("{}: {}", operation, e)))?;
        Ok(envelope.result)
    }
}

async fn check_status(
    operation: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VectorStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VectorStoreError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Vector size of a collection, for the unnamed-vector layout
fn vector_size(vectors: &Value) -> Option<usize> {
    vectors
        .get("size")
        .and_then(Value::as_u64)
        .map(|s| s as usize)
}

fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl VectorStore for QdrantHttpStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        let mut ensured = self.ensured.lock().await;
        if ensured.contains(name) {
            return Ok(());
        }

        let path = format!("/collections/{}", name);
        let response = self.send(Method::GET, &path, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(
                "Creating collection '{}' with dimension {}",
                name,
                dimension
            );
            let body = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
            let response = self.send(Method::PUT, &path, Some(body)).await?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(VectorStoreError::CollectionCreationFailed {
                    collection: name.to_string(),
                    reason: format!("HTTP {}: {}", status.as_u16(), body),
                });
            }
        } else {
            let response = check_status("get collection", response).await?;
            let info: Envelope<CollectionInfo> = response
                .json()
                .await
                .map_err(|e| VectorStoreError::InvalidResponse(e.to_string()))?;

            if let Some(existing) = vector_size(&info.result.config.params.vectors)
                && existing != dimension
            {
                return Err(VectorStoreError::DimensionMismatch {
                    collection: name.to_string(),
                    existing,
                    requested: dimension,
                });
            }
            tracing::debug!("Collection '{}' already exists", name);
        }

        ensured.insert(name.to_string());
        Ok(())
    }

    async fn upsert_points(&self, name: &str, points: Vec<Point>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<Value> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();

        let _: Value = self
            .call(
                "upsert points",
                Method::PUT,
                &format!("/collections/{}/points?wait=true", name),
                Some(json!({ "points": points })),
            )
            .await?;

        tracing::debug!("Upserted {} points into '{}'", count, name);
        Ok(())
    }

    async fn search_similar(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<PointFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let mut body = json!({ "vector": vector, "limit": limit, "with_payload": true });
        if let Some(filter) = filter {
            body["filter"] = filter.to_qdrant();
        }

        let hits: Vec<Hit> = self
            .call(
                "search points",
                Method::POST,
                &format!("/collections/{}/points/search", name),
                Some(body),
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let payload = hit.payload?;
                Some(ScoredPoint {
                    id: point_id(&hit.id),
                    score: hit.score,
                    payload,
                })
            })
            .collect())
    }

    async fn delete_by_filter(
        &self,
        name: &str,
        filter: PointFilter,
    ) -> Result<(), VectorStoreError> {
        let _: Value = self
            .call(
                "delete points",
                Method::POST,
                &format!("/collections/{}/points/delete?wait=true", name),
                Some(json!({ "filter": filter.to_qdrant() })),
            )
            .await?;
        Ok(())
    }

    async fn count(
        &self,
        name: &str,
        filter: Option<PointFilter>,
    ) -> Result<usize, VectorStoreError> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter.to_qdrant();
        }

        let result: CountResult = self
            .call(
                "count points",
                Method::POST,
                &format!("/collections/{}/points/count", name),
                Some(body),
            )
            .await?;
        Ok(result.count)
    }
}
