//! Local embeddings through fastembed (ONNX runtime)

use super::Embedder;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// all-MiniLM-L6-v2 output dimension
const MINILM_DIMENSION: usize = 384;

/// Local all-MiniLM-L6-v2 embedder
///
/// The model needs exclusive access while encoding, so calls are serialized
/// behind a mutex and run on the blocking pool.
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
}

impl FastEmbedder {
    pub fn new() -> Result<Self> {
        let options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);
        let model = TextEmbedding::try_new(options).map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to initialize FastEmbed model: {}", e),
        })?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = model.lock().map_err(|_| AppError::EmbeddingError {
                message: "FastEmbed model lock poisoned".to_string(),
            })?;
            model.embed(texts, None).map_err(|e| AppError::EmbeddingError {
                message: format!("FastEmbed embedding failed: {}", e),
            })
        })
        .await
        .map_err(|e| AppError::Internal {
            message: format!("Embedding task failed: {}", e),
        })?
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        MINILM_DIMENSION
    }
}
