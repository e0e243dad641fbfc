//! Lyric retrieval
//!
//! Embeds a query with the same embedder used for indexing and returns the
//! nearest lyric chunks, scored by cosine similarity in `[0, 1]`.

mod vector;

pub use vector::Retriever;

use drunkenbot_common::errors::{AppError, Result};
use drunkenbot_common::index::ChunkMetadata;
use serde::{Deserialize, Serialize};

/// Retrieved chunk with relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    /// Chunk text
    pub text: String,

    /// Song the chunk came from
    pub metadata: ChunkMetadata,

    /// `1 - distance / 2`, higher is more similar
    pub similarity_score: f32,
}

/// Map a cosine distance in `[0, 2]` to a similarity in `[0, 1]`
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 - distance / 2.0
}

/// Check retrieval parameters before any work is done
pub fn validate_params(query: &str, threshold: Option<f32>, top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(AppError::validation("query", "query must not be empty"));
    }
    if let Some(t) = threshold {
        if !(0.0..=1.0).contains(&t) {
            return Err(AppError::validation(
                "threshold",
                format!("threshold must be within [0, 1], got {}", t),
            ));
        }
    }
    if top_k == 0 {
        return Err(AppError::validation("top_k", "top_k must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(err: AppError) -> Option<String> {
        match err {
            AppError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_similarity_from_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        assert_eq!(similarity_from_distance(1.0), 0.5);
        assert_eq!(similarity_from_distance(2.0), 0.0);
        assert!((similarity_from_distance(0.2) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_validate_params() {
        assert!(validate_params("stairway", None, 5).is_ok());
        assert!(validate_params("stairway", Some(0.0), 1).is_ok());
        assert!(validate_params("stairway", Some(1.0), 1).is_ok());

        assert_eq!(field(validate_params("", None, 5).unwrap_err()).as_deref(), Some("query"));
        assert_eq!(field(validate_params(" \n\t", None, 5).unwrap_err()).as_deref(), Some("query"));
        assert_eq!(
            field(validate_params("q", Some(1.5), 5).unwrap_err()).as_deref(),
            Some("threshold")
        );
        assert_eq!(
            field(validate_params("q", Some(-0.1), 5).unwrap_err()).as_deref(),
            Some("threshold")
        );
        assert_eq!(
            field(validate_params("q", Some(f32::NAN), 5).unwrap_err()).as_deref(),
            Some("threshold")
        );
        assert_eq!(field(validate_params("q", None, 0).unwrap_err()).as_deref(), Some("top_k"));
    }
}
