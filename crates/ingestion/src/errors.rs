//! Ingestion error types

use drunkenbot_common::errors::AppError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Parse error for {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing or invalid key '{key}' in {path}")]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

impl IngestionError {
    /// Problems with a single artifact file; the file is skipped and indexing continues
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::MissingKey { .. })
    }
}
