//! Vector storage for the knowledge base and similarity search over case embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Default embedding dimension used when a provider doesn't specify one (§9 design note).
pub const DEFAULT_DIMENSION: usize = 384;

#[derive(Error, Debug)]
pub enum VectorError {
    #[error("dimension mismatch: expected {0}, got {1}")]
    DimensionMismatch(usize, usize),
    #[error("serialization error: {0}")]
    SerializationError(String),
    #[error("database error: {0}")]
    DatabaseError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorEmbedding {
    pub id: String,
    pub vector: Vec<f32>,
    /// An external entity this vector represents (e.g. a `knowledge_id`); used to
    /// look up or remove all vectors for that entity without knowing internal ids.
    pub payload_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Generic trait for vector storage, scoped by named collection (e.g. "knowledge_base").
#[async_trait]
pub trait VectorStoreBackend: Send + Sync + std::fmt::Debug {
    /// Create the collection if it doesn't already exist. A no-op for backends
    /// (like this one) that don't require upfront schema declaration per collection.
    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), VectorError>;

    async fn add(
        &self,
        collection: &str,
        embedding: VectorEmbedding,
    ) -> Result<(), VectorError>;

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(f32, VectorEmbedding)>, VectorError>;

    /// Find every vector tagged with `payload_id` in `collection`.
    async fn scroll_by_payload_id(
        &self,
        collection: &str,
        payload_id: &str,
    ) -> Result<Vec<VectorEmbedding>, VectorError>;

    /// Delete every vector tagged with `payload_id` in `collection`.
    async fn delete_by_payload_id(&self, collection: &str, payload_id: &str) -> Result<u64, VectorError>;
}

/// In-memory vector store, used in tests and for small deployments.
#[derive(Debug, Clone)]
pub struct MemoryVectorStore {
    dimension: usize,
    embeddings: Arc<RwLock<Vec<(String, VectorEmbedding)>>>, // (collection, embedding)
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            embeddings: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl VectorStoreBackend for MemoryVectorStore {
    async fn ensure_collection(&self, _collection: &str, _dimension: usize) -> Result<(), VectorError> {
        Ok(())
    }

    async fn add(&self, collection: &str, embedding: VectorEmbedding) -> Result<(), VectorError> {
        if embedding.vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch(self.dimension, embedding.vector.len()));
        }
        self.embeddings.write().unwrap().push((collection.to_string(), embedding));
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(f32, VectorEmbedding)>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch(self.dimension, query.len()));
        }

        let data = self.embeddings.read().unwrap();
        let mut scores: Vec<(f32, VectorEmbedding)> = data
            .iter()
            .filter(|(c, _)| c == collection)
            .map(|(_, emb)| (cosine_similarity(query, &emb.vector), emb.clone()))
            .collect();

        scores.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);
        Ok(scores)
    }

    async fn scroll_by_payload_id(
        &self,
        collection: &str,
        payload_id: &str,
    ) -> Result<Vec<VectorEmbedding>, VectorError> {
        let data = self.embeddings.read().unwrap();
        Ok(data
            .iter()
            .filter(|(c, emb)| c == collection && emb.payload_id.as_deref() == Some(payload_id))
            .map(|(_, emb)| emb.clone())
            .collect())
    }

    async fn delete_by_payload_id(&self, collection: &str, payload_id: &str) -> Result<u64, VectorError> {
        let mut data = self.embeddings.write().unwrap();
        let before = data.len();
        data.retain(|(c, emb)| !(c == collection && emb.payload_id.as_deref() == Some(payload_id)));
        Ok((before - data.len()) as u64)
    }
}

/// SQLite-backed persistent vector store; search is a brute-force scan, adequate
/// for the per-tenant embedding volumes this platform expects.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    dimension: usize,
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(dimension: usize, pool: SqlitePool) -> Self {
        Self { dimension, pool }
    }

    fn encode_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for &v in vector {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    fn decode_vector(bytes: &[u8], dimension: usize) -> Option<Vec<f32>> {
        if bytes.len() != dimension * 4 {
            return None;
        }
        Some(
            bytes
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
                .collect(),
        )
    }
}

#[async_trait]
impl VectorStoreBackend for SqliteVectorStore {
    async fn ensure_collection(&self, _collection: &str, _dimension: usize) -> Result<(), VectorError> {
        // Rows are partitioned by the `collection` column; no per-collection DDL needed.
        Ok(())
    }

    async fn add(&self, collection: &str, embedding: VectorEmbedding) -> Result<(), VectorError> {
        if embedding.vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch(self.dimension, embedding.vector.len()));
        }

        let vector_bytes = Self::encode_vector(&embedding.vector);
        let metadata_json = serde_json::to_string(&embedding.metadata)
            .map_err(|e| VectorError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO vector_embeddings (id, collection, vector, payload_id, metadata, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&embedding.id)
        .bind(collection)
        .bind(vector_bytes)
        .bind(&embedding.payload_id)
        .bind(metadata_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| VectorError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(f32, VectorEmbedding)>, VectorError> {
        if query.len() != self.dimension {
            return Err(VectorError::DimensionMismatch(self.dimension, query.len()));
        }

        let rows = sqlx::query(
            "SELECT id, vector, payload_id, metadata FROM vector_embeddings WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorError::DatabaseError(e.to_string()))?;

        let mut scores = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let vector_bytes: Vec<u8> = row.get("vector");
            let payload_id: Option<String> = row.get("payload_id");
            let metadata_str: String = row.get("metadata");

            let Some(vector) = Self::decode_vector(&vector_bytes, self.dimension) else {
                continue;
            };
            let metadata: HashMap<String, String> = serde_json::from_str(&metadata_str)
                .map_err(|e| VectorError::SerializationError(e.to_string()))?;

            let score = cosine_similarity(query, &vector);
            scores.push((score, VectorEmbedding { id, vector, payload_id, metadata }));
        }

        scores.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scores.truncate(k);
        Ok(scores)
    }

    async fn scroll_by_payload_id(
        &self,
        collection: &str,
        payload_id: &str,
    ) -> Result<Vec<VectorEmbedding>, VectorError> {
        let rows = sqlx::query(
            "SELECT id, vector, payload_id, metadata FROM vector_embeddings WHERE collection = ? AND payload_id = ?",
        )
        .bind(collection)
        .bind(payload_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| VectorError::DatabaseError(e.to_string()))?;

        let mut results = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let vector_bytes: Vec<u8> = row.get("vector");
            let payload_id: Option<String> = row.get("payload_id");
            let metadata_str: String = row.get("metadata");
            let Some(vector) = Self::decode_vector(&vector_bytes, self.dimension) else {
                continue;
            };
            let metadata: HashMap<String, String> = serde_json::from_str(&metadata_str)
                .map_err(|e| VectorError::SerializationError(e.to_string()))?;
            results.push(VectorEmbedding { id, vector, payload_id, metadata });
        }
        Ok(results)
    }

    async fn delete_by_payload_id(&self, collection: &str, payload_id: &str) -> Result<u64, VectorError> {
        let result = sqlx::query("DELETE FROM vector_embeddings WHERE collection = ? AND payload_id = ?")
            .bind(collection)
            .bind(payload_id)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorError::DatabaseError(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(id: &str, vector: Vec<f32>, payload_id: Option<&str>) -> VectorEmbedding {
        VectorEmbedding {
            id: id.to_string(),
            vector,
            payload_id: payload_id.map(String::from),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn memory_store_finds_nearest_by_cosine_similarity() {
        let store = MemoryVectorStore::new(3);
        store.add("knowledge_base", embedding("a", vec![1.0, 0.0, 0.0], None)).await.unwrap();
        store.add("knowledge_base", embedding("b", vec![0.0, 1.0, 0.0], None)).await.unwrap();

        let results = store.search("knowledge_base", &[1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].1.id, "a");
    }

    #[tokio::test]
    async fn memory_store_deletes_by_payload_id() {
        let store = MemoryVectorStore::new(2);
        store.add("kb", embedding("a", vec![1.0, 0.0], Some("know-1"))).await.unwrap();
        store.add("kb", embedding("b", vec![0.0, 1.0], Some("know-2"))).await.unwrap();

        let deleted = store.delete_by_payload_id("kb", "know-1").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.scroll_by_payload_id("kb", "know-1").await.unwrap().is_empty());
    }
}
