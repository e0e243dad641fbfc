//! Drunken Bot Ingestion
//!
//! Turns scraped lyric artifacts into an embedded, queryable collection:
//! clean lyrics, split them into token windows, embed and upsert.

pub mod chunker;
pub mod errors;
pub mod indexer;
pub mod preprocess;
pub mod records;

pub use chunker::{Chunker, TextChunk};
pub use errors::IngestionError;
pub use indexer::{FileReport, IndexReport, Indexer};
