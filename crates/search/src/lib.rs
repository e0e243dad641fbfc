//! Drunken Bot Search
//!
//! Similarity retrieval over the lyric index.

pub mod retrieval;

pub use retrieval::{RetrievedChunk, Retriever};
