//! Drunken Bot Common Library
//!
//! Shared code for the gateway, the index builder and the retriever:
//! - Completion post-processing (reasoning tags, overlap removal)
//! - Embedder abstraction and providers
//! - Vector index contract and backends
//! - Error types and handling
//! - Configuration management
//! - Metrics helpers

pub mod config;
pub mod embeddings;
pub mod errors;
pub mod index;
pub mod metrics;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use index::VectorIndex;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default index collection for lyric chunks
pub const DEFAULT_COLLECTION: &str = "lyric_chunks";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
