//! Vector similarity retrieval

use super::{similarity_from_distance, validate_params, RetrievedChunk};
use drunkenbot_common::embeddings::Embedder;
use drunkenbot_common::errors::Result;
use drunkenbot_common::index::VectorIndex;
use drunkenbot_common::metrics;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Nearest-neighbour retriever over one collection
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    collection: String,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Return up to `top_k` chunks, most similar first
    ///
    /// With a `threshold`, results stop at the first chunk whose similarity
    /// falls below it. The index returns ascending distance, so this is the
    /// same as dropping every sub-threshold chunk.
    #[instrument(skip(self, query), fields(collection = %self.collection))]
    pub async fn retrieve(
        &self,
        query: &str,
        threshold: Option<f32>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        validate_params(query, threshold, top_k)?;
        let start = Instant::now();

        let embedding = self.embedder.embed(query).await?;
        let matches = self
            .index
            .query(&self.collection, self.embedder.model_name(), &embedding, top_k)
            .await?;

        let mut results = Vec::with_capacity(matches.len());
        for m in matches {
            let similarity_score = similarity_from_distance(m.distance);
            if threshold.is_some_and(|t| similarity_score < t) {
                break;
            }
            results.push(RetrievedChunk {
                text: m.text,
                metadata: m.metadata,
                similarity_score,
            });
        }

        metrics::record_retrieval(start.elapsed().as_secs_f64(), results.len());
        debug!(results = results.len(), "Retrieved chunks");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use drunkenbot_common::embeddings::HashEmbedder;
    use drunkenbot_common::errors::AppError;
    use drunkenbot_common::index::{ChunkMetadata, IndexMatch, MemoryIndex, UpsertBatch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Index returning fixed distances in the given order
    struct CannedIndex {
        distances: Vec<f32>,
        queries: AtomicUsize,
    }

    impl CannedIndex {
        fn new(distances: Vec<f32>) -> Self {
            Self {
                distances,
                queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for CannedIndex {
        async fn upsert(&self, _collection: &str, _batch: UpsertBatch) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _collection: &str,
            _model: &str,
            _embedding: &[f32],
            k: usize,
        ) -> Result<Vec<IndexMatch>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .distances
                .iter()
                .take(k)
                .enumerate()
                .map(|(i, &distance)| IndexMatch {
                    id: format!("chunk_{i}"),
                    text: format!("chunk {i}"),
                    metadata: ChunkMetadata {
                        artist: "Led Zeppelin".into(),
                        title: "Stairway to Heaven".into(),
                        album: None,
                    },
                    distance,
                })
                .collect())
        }

        async fn count(&self, _collection: &str) -> Result<usize> {
            Ok(self.distances.len())
        }

        async fn delete_collection(&self, _collection: &str) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn retriever(index: Arc<dyn VectorIndex>) -> Retriever {
        Retriever::new(Arc::new(HashEmbedder::new(32)), index, "lyric_chunks")
    }

    #[tokio::test]
    async fn test_threshold_stops_at_first_result_below() {
        let retriever = retriever(Arc::new(CannedIndex::new(vec![0.2, 1.2, 0.4])));

        let results = retriever.retrieve("stairway", Some(0.5), 3).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "chunk 0");
        assert!((results[0].similarity_score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_without_threshold_returns_all() {
        let retriever = retriever(Arc::new(CannedIndex::new(vec![0.2, 1.2, 0.4])));

        let results = retriever.retrieve("stairway", None, 3).await.unwrap();
        let scores: Vec<f32> = results.iter().map(|r| r.similarity_score).collect();
        assert_eq!(scores.len(), 3);
        assert!((scores[1] - 0.4).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_threshold_zero_passes_orthogonal_and_opposite() {
        let retriever = retriever(Arc::new(CannedIndex::new(vec![1.0, 2.0])));
        let results = retriever.retrieve("q", Some(0.0), 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_validation_happens_before_query() {
        let index = Arc::new(CannedIndex::new(vec![0.1]));
        let retriever = retriever(index.clone());

        for (query, threshold, top_k) in [("", None, 1), ("q", Some(2.0), 1), ("q", None, 0)] {
            let err = retriever.retrieve(query, threshold, top_k).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }));
        }
        assert_eq!(index.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retrieves_indexed_chunks_most_similar_first() {
        let embedder = Arc::new(HashEmbedder::new(128));
        let index = Arc::new(MemoryIndex::new());
        let texts = vec![
            "there's a lady who's sure all that glitters is gold".to_string(),
            "and she's buying a stairway to heaven".to_string(),
            "immigrant song ah ah".to_string(),
        ];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();
        let metadata = ChunkMetadata {
            artist: "Led Zeppelin".into(),
            title: "Stairway to Heaven".into(),
            album: Some("Led Zeppelin IV".into()),
        };
        index
            .upsert(
                "lyric_chunks",
                UpsertBatch {
                    model: embedder.model_name().to_string(),
                    ids: vec!["a".into(), "b".into(), "c".into()],
                    texts: texts.clone(),
                    embeddings,
                    metadatas: vec![metadata.clone(); 3],
                },
            )
            .await
            .unwrap();

        let retriever = Retriever::new(embedder, index, "lyric_chunks");
        let results = retriever
            .retrieve("buying a stairway to heaven", None, 2)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, texts[1]);
        assert_eq!(results[0].metadata, metadata);
        assert!(results[0].similarity_score >= results[1].similarity_score);
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.similarity_score)));
    }

    /// Same vectors as the hash embedder under another model name
    struct RenamedEmbedder(HashEmbedder);

    #[async_trait]
    impl Embedder for RenamedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.embed_batch(texts).await
        }

        fn model_name(&self) -> &str {
            "other-model"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    #[tokio::test]
    async fn test_rejects_query_from_another_embedder() {
        let embedder = HashEmbedder::new(64);
        let index = Arc::new(MemoryIndex::new());
        let texts = vec!["whole lotta love".to_string()];
        index
            .upsert(
                "lyric_chunks",
                UpsertBatch {
                    model: embedder.model_name().to_string(),
                    embeddings: embedder.embed_batch(&texts).await.unwrap(),
                    ids: vec!["a".into()],
                    texts,
                    metadatas: vec![ChunkMetadata {
                        artist: "Led Zeppelin".into(),
                        title: "Whole Lotta Love".into(),
                        album: None,
                    }],
                },
            )
            .await
            .unwrap();

        let retriever = Retriever::new(
            Arc::new(RenamedEmbedder(HashEmbedder::new(64))),
            index,
            "lyric_chunks",
        );
        let err = retriever.retrieve("whole lotta love", None, 1).await.unwrap_err();
        assert!(matches!(err, AppError::EmbedderMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_collection_is_empty() {
        let retriever = retriever(Arc::new(MemoryIndex::new()));
        assert!(retriever.retrieve("anything", Some(0.1), 5).await.unwrap().is_empty());
    }
}
