//! Vector index over named collections
//!
//! Provides:
//! - The [`VectorIndex`] contract (upsert / query / count / delete)
//! - In-process, file-backed and pgvector backends
//! - Cosine distance helpers
//!
//! Distances are cosine distances in `[0, 2]`; queries return ascending
//! distance with ties ordered by id.
//!
//! A collection is bound to the embedding model and dimension of its first
//! upsert. Later upserts and queries from any other model are rejected with
//! [`AppError::EmbedderMismatch`], and other dimensions with
//! [`AppError::DimensionMismatch`].

mod file;
mod memory;
mod postgres;

pub use file::FileIndex;
pub use memory::MemoryIndex;
pub use postgres::PgVectorIndex;

use crate::config::IndexConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Song-level metadata attached to every chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub artist: String,
    pub title: String,
    pub album: Option<String>,
}

/// Parallel arrays describing records to insert or overwrite
#[derive(Debug, Clone, Default)]
pub struct UpsertBatch {
    /// Embedding model that produced `embeddings`
    pub model: String,
    pub ids: Vec<String>,
    pub texts: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadatas: Vec<ChunkMetadata>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check that all arrays line up and every embedding has one dimension.
    ///
    /// Returns the shared dimension, or `None` for an empty batch.
    pub fn validate(&self) -> Result<Option<usize>> {
        let n = self.ids.len();
        if self.texts.len() != n || self.embeddings.len() != n || self.metadatas.len() != n {
            return Err(AppError::Validation {
                message: format!(
                    "upsert arrays must have equal length (ids={}, texts={}, embeddings={}, metadatas={})",
                    n,
                    self.texts.len(),
                    self.embeddings.len(),
                    self.metadatas.len()
                ),
                field: None,
            });
        }

        let Some(first) = self.embeddings.first() else {
            return Ok(None);
        };
        if self.model.is_empty() {
            return Err(AppError::validation("model", "embedding model must be named"));
        }
        let dimension = first.len();
        if dimension == 0 {
            return Err(AppError::validation("embeddings", "embeddings must not be empty"));
        }
        if let Some(bad) = self.embeddings.iter().find(|e| e.len() != dimension) {
            return Err(AppError::validation(
                "embeddings",
                format!(
                    "all embeddings in a batch must share one dimension ({} vs {})",
                    dimension,
                    bad.len()
                ),
            ));
        }
        Ok(Some(dimension))
    }
}

/// A stored record returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMatch {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query, in `[0, 2]`
    pub distance: f32,
}

/// Persistent store of embedded lyric chunks
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert records, overwriting any existing record with the same id
    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()>;

    /// `k` nearest records by cosine distance, nearest first
    ///
    /// `model` names the embedder that produced `embedding`.
    async fn query(
        &self,
        collection: &str,
        model: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<IndexMatch>>;

    /// Number of records in the collection (0 if it does not exist)
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Drop the collection and its records; succeeds if it does not exist
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Cosine distance `1 - cos(a, b)`
///
/// A zero-norm vector is treated as orthogonal to everything (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let cosine = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    1.0 - cosine
}

/// Reject `actual` when the collection is bound to another model
pub(crate) fn check_model(collection: &str, bound: Option<&str>, actual: &str) -> Result<()> {
    match bound {
        Some(expected) if expected != actual => Err(AppError::EmbedderMismatch {
            collection: collection.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Open the index backend selected by configuration
pub async fn open_index(config: &IndexConfig) -> Result<Arc<dyn VectorIndex>> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        "file" => Ok(Arc::new(FileIndex::open(&config.path).await?)),
        "pgvector" => {
            let url = config.database_url.as_deref().ok_or_else(|| AppError::Configuration {
                message: "index.database_url is required for the pgvector backend".to_string(),
            })?;
            Ok(Arc::new(PgVectorIndex::connect(url, config.max_connections).await?))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown index backend: {}", other),
        }),
    }
}
