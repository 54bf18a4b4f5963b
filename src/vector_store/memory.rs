use super::{ChunkPayload, Point, PointFilter, ScoredPoint, VectorStore};
use crate::error::VectorStoreError;
use std::collections::HashMap;
use tokio::sync::RwLock;

struct Collection {
    dimension: usize,
    points: HashMap<String, (Vec<f32>, ChunkPayload)>,
}

/// In-process vector store with brute-force cosine search
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every point in a collection matching `filter`
    pub async fn point_ids(&self, name: &str, filter: &PointFilter) -> Vec<String> {
        let collections = self.collections.read().await;
        let mut ids: Vec<String> = collections
            .get(name)
            .map(|c| {
                c.points
                    .iter()
                    .filter(|(_, (_, payload))| filter.matches(payload))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.dimension != dimension => {
                Err(VectorStoreError::DimensionMismatch {
                    collection: name.to_string(),
                    existing: existing.dimension,
                    requested: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        dimension,
                        points: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn upsert_points(&self, name: &str, points: Vec<Point>) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(VectorStoreError::DimensionMismatch {
                collection: name.to_string(),
                existing: collection.dimension,
                requested: bad.vector.len(),
            });
        }

        for point in points {
            collection
                .points
                .insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search_similar(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: Option<PointFilter>,
    ) -> Result<Vec<ScoredPoint>, VectorStoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| VectorStoreError::CollectionNotFound(name.to_string()))?;

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .iter()
            .filter(|(_, (_, payload))| filter.as_ref().is_none_or(|f| f.matches(payload)))
            .map(|(id, (v, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&vector, v),
                payload: payload.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_by_filter(
        &self,
        name: &str,
        filter: PointFilter,
    ) -> Result<(), VectorStoreError> {
        let mut collections = self.collections.write().await;
        if let Some(collection) = collections.get_mut(name) {
            collection
                .points
                .retain(|_, (_, payload)| !filter.matches(payload));
        }
        Ok(())
    }

    async fn count(
        &self,
        name: &str,
        filter: Option<PointFilter>,
    ) -> Result<usize, VectorStoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(name)
            .map(|c| {
                c.points
                    .values()
                    .filter(|(_, payload)| filter.as_ref().is_none_or(|f| f.matches(payload)))
                    .count()
            })
            .unwrap_or(0))
    }
}
