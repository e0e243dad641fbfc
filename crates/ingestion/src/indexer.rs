//! Index building
//!
//! Reads ingestion artifacts, cleans and chunks each song, embeds the chunks
//! and upserts them into the vector index. Chunk ids are derived from the
//! artist, title and ordinal, so re-running over the same artifacts
//! overwrites instead of duplicating.

use crate::chunker::Chunker;
use crate::errors::IngestionError;
use crate::preprocess::{clean_lyrics, slugify};
use crate::records::{parse_song, ArtistFile, SongRecord};
use drunkenbot_common::embeddings::Embedder;
use drunkenbot_common::index::{ChunkMetadata, UpsertBatch, VectorIndex};
use drunkenbot_common::metrics;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use walkdir::WalkDir;

/// Outcome of indexing one artifact file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    /// The file was rejected as a whole (bad JSON or missing top-level keys)
    pub skipped: bool,
    pub songs_indexed: usize,
    pub songs_skipped: usize,
    pub chunks_written: usize,
}

impl FileReport {
    pub fn skipped(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            skipped: true,
            ..Default::default()
        }
    }
}

/// Totals for a directory run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_skipped: usize,
    pub songs_indexed: usize,
    pub songs_skipped: usize,
    pub chunks_written: usize,
    /// Records in the collection after the run
    pub collection_count: usize,
}

impl IndexReport {
    fn absorb(&mut self, file: &FileReport) {
        self.files_seen += 1;
        if file.skipped {
            self.files_skipped += 1;
        }
        self.songs_indexed += file.songs_indexed;
        self.songs_skipped += file.songs_skipped;
        self.chunks_written += file.chunks_written;
    }
}

/// Builds a lyric collection from artifact files
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunker: Chunker,
    collection: String,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunker: Chunker,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            chunker,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Drop every record in the collection
    pub async fn reset(&self) -> Result<(), IngestionError> {
        info!(collection = %self.collection, "Resetting collection");
        self.index.delete_collection(&self.collection).await?;
        Ok(())
    }

    /// Index a single artifact file
    ///
    /// Structural problems are logged and reported through
    /// [`FileReport::skipped`]. Embedder and index failures are returned.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub async fn index_file(&self, path: &Path) -> Result<FileReport, IngestionError> {
        let bytes = tokio::fs::read(path).await?;
        let file = match ArtistFile::parse(path, &bytes) {
            Ok(file) => file,
            Err(e) if e.is_structural() => {
                error!(error = %e, "Skipping artifact");
                return Ok(FileReport::skipped(path));
            }
            Err(e) => return Err(e),
        };

        let mut report = FileReport {
            path: path.to_path_buf(),
            ..Default::default()
        };

        for (position, entry) in file.songs.iter().enumerate() {
            let song = match parse_song(entry) {
                Ok(song) => song,
                Err(defect) => {
                    warn!(artist = %file.artist, position, reason = defect.as_str(), "Skipping song");
                    metrics::record_song_skipped(defect.as_str());
                    report.songs_skipped += 1;
                    continue;
                }
            };

            let written = self.index_song(&file.artist, &song).await?;
            if written == 0 {
                report.songs_skipped += 1;
            } else {
                report.songs_indexed += 1;
                report.chunks_written += written;
            }
        }

        info!(
            artist = %file.artist,
            songs_indexed = report.songs_indexed,
            songs_skipped = report.songs_skipped,
            chunks = report.chunks_written,
            "Indexed artifact"
        );
        Ok(report)
    }

    /// Chunk, embed and upsert one song; returns the number of chunks written
    async fn index_song(&self, artist: &str, song: &SongRecord) -> Result<usize, IngestionError> {
        let cleaned = clean_lyrics(&song.lyrics);
        if cleaned.is_empty() {
            warn!(artist, title = %song.title, "Skipping song with empty lyrics");
            metrics::record_song_skipped("empty_lyrics");
            return Ok(0);
        }

        let chunks = self.chunker.chunk(&cleaned);
        if chunks.is_empty() {
            warn!(artist, title = %song.title, "Skipping song without chunks");
            metrics::record_song_skipped("no_chunks");
            return Ok(0);
        }

        let texts: Vec<String> = chunks.into_iter().map(|c| c.content).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let artist_slug = slugify(artist);
        let title_slug = slugify(&song.title);
        let metadata = ChunkMetadata {
            artist: artist.to_string(),
            title: song.title.clone(),
            album: song.album.clone(),
        };

        let count = texts.len();
        let batch = UpsertBatch {
            model: self.embedder.model_name().to_string(),
            ids: (0..count)
                .map(|i| format!("{}_{}_{}", artist_slug, title_slug, i))
                .collect(),
            texts,
            embeddings,
            metadatas: vec![metadata; count],
        };
        self.index.upsert(&self.collection, batch).await?;

        metrics::record_indexing(count);
        debug!(artist, title = %song.title, chunks = count, "Indexed song");
        Ok(count)
    }

    /// Index every `*.json` file under `dir` in sorted path order
    #[instrument(skip(self, dir), fields(dir = %dir.display()))]
    pub async fn index_dir(&self, dir: &Path, recursive: bool) -> Result<IndexReport, IngestionError> {
        if !dir.is_dir() {
            return Err(IngestionError::DirectoryNotFound(dir.to_path_buf()));
        }

        let files = artifact_files(dir, recursive)?;
        info!(files = files.len(), "Found artifact files");

        let mut report = IndexReport::default();
        for path in &files {
            let file_report = self.index_file(path).await?;
            report.absorb(&file_report);
        }

        report.collection_count = self.index.count(&self.collection).await?;
        info!(
            collection = %self.collection,
            count = report.collection_count,
            files = report.files_seen,
            files_skipped = report.files_skipped,
            songs = report.songs_indexed,
            chunks = report.chunks_written,
            "Indexing complete"
        );
        Ok(report)
    }
}

fn artifact_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, IngestionError> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(max_depth).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
