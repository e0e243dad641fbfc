//! In-process vector index

use super::{check_model, cosine_distance, ChunkMetadata, IndexMatch, UpsertBatch, VectorIndex};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// Records of one collection plus the embedder bound by its first upsert
#[derive(Debug, Clone, Default)]
pub(crate) struct Collection {
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub records: BTreeMap<String, StoredRecord>,
}

impl Collection {
    pub fn upsert(&mut self, name: &str, mut batch: UpsertBatch) -> Result<()> {
        let Some(dimension) = self.check_batch(name, &batch)? else {
            return Ok(());
        };
        self.bind(std::mem::take(&mut batch.model), dimension);
        for (id, record) in into_records(batch) {
            self.records.insert(id, record);
        }
        Ok(())
    }

    /// Validate `batch` against this collection without changing it.
    ///
    /// Returns the batch dimension, or `None` for an empty batch.
    pub fn check_batch(&self, name: &str, batch: &UpsertBatch) -> Result<Option<usize>> {
        let Some(dimension) = batch.validate()? else {
            return Ok(None);
        };
        check_model(name, self.model.as_deref(), &batch.model)?;
        self.check_dimension(name, dimension)?;
        Ok(Some(dimension))
    }

    pub fn is_bound(&self) -> bool {
        self.model.is_some()
    }

    pub fn bind(&mut self, model: String, dimension: usize) {
        self.model = Some(model);
        self.dimension = Some(dimension);
    }

    pub fn query(&self, name: &str, model: &str, embedding: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        if self.records.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_model(name, self.model.as_deref(), model)?;
        self.check_dimension(name, embedding.len())?;

        let mut scored: Vec<(f32, &String, &StoredRecord)> = self
            .records
            .iter()
            .map(|(id, record)| (cosine_distance(embedding, &record.embedding), id, record))
            .collect();

        // BTreeMap iteration is id-ordered and the sort is stable, so ties stay id-ordered
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, id, record)| IndexMatch {
                id: id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance,
            })
            .collect())
    }

    fn check_dimension(&self, name: &str, actual: usize) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != actual => Err(AppError::DimensionMismatch {
                collection: name.to_string(),
                expected,
                actual,
            }),
            _ => Ok(()),
        }
    }
}

/// Split a batch into `(id, record)` pairs
pub(crate) fn into_records(batch: UpsertBatch) -> impl Iterator<Item = (String, StoredRecord)> {
    let UpsertBatch {
        ids,
        texts,
        embeddings,
        metadatas,
        ..
    } = batch;

    ids.into_iter()
        .zip(texts)
        .zip(embeddings)
        .zip(metadatas)
        .map(|(((id, text), embedding), metadata)| {
            (
                id,
                StoredRecord {
                    text,
                    embedding,
                    metadata,
                },
            )
        })
}

/// Vector index held entirely in memory
///
/// Contents are lost when the process exits. Used by tests and for
/// short-lived experiments (`index.backend = "memory"`).
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> AppError {
    AppError::Index {
        message: "index lock poisoned".to_string(),
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections
            .entry(collection.to_string())
            .or_default()
            .upsert(collection, batch)
    }

    async fn query(
        &self,
        collection: &str,
        model: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        match collections.get(collection) {
            Some(c) => c.query(collection, model, embedding, k),
            None => Ok(Vec::new()),
        }
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections.get(collection).map_or(0, |c| c.records.len()))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        collections.remove(collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
