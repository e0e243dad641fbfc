//! File-backed vector index
//!
//! Each collection is kept in memory and mirrored to an append-only log,
//! `<dir>/<collection>.jsonl`, holding one JSON entry per line: a `bind`
//! entry naming the embedding model and dimension, then one `put` entry per
//! upserted record. An upsert only appends its own records. Opening the
//! index replays every log and compacts any log that holds overwritten
//! records or a torn final line.

use super::memory::{into_records, Collection, StoredRecord};
use super::{IndexMatch, UpsertBatch, VectorIndex};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const LOG_EXTENSION: &str = "jsonl";

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntry {
    Bind { model: String, dimension: usize },
    Put { id: String, record: StoredRecord },
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum LogEntryRef<'a> {
    Bind { model: &'a str, dimension: usize },
    Put { id: &'a str, record: &'a StoredRecord },
}

fn push_line(buf: &mut Vec<u8>, entry: &LogEntryRef<'_>) -> Result<()> {
    serde_json::to_writer(&mut *buf, entry)?;
    buf.push(b'\n');
    Ok(())
}

/// A collection rebuilt from its log
struct Replay {
    collection: Collection,
    puts: usize,
    torn_tail: bool,
}

impl Replay {
    fn needs_compaction(&self) -> bool {
        self.torn_tail || self.puts > self.collection.records.len()
    }
}

fn replay(path: &Path, bytes: &[u8]) -> Result<Replay> {
    let corrupt = |line: usize, message: String| AppError::Index {
        message: format!("Corrupt log {} at line {}: {}", path.display(), line, message),
    };

    let mut collection = Collection::default();
    let mut puts = 0;
    let mut torn_tail = false;

    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last = lines.len().saturating_sub(1);
    for (n, line) in lines.iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry: LogEntry = match serde_json::from_slice(line) {
            Ok(entry) => entry,
            // An unterminated final line is an interrupted append
            Err(_) if n == last => {
                warn!(path = %path.display(), "Dropping torn entry at end of log");
                torn_tail = true;
                continue;
            }
            Err(e) => return Err(corrupt(n + 1, e.to_string())),
        };

        match entry {
            LogEntry::Bind { model, dimension } => collection.bind(model, dimension),
            LogEntry::Put { id, record } => {
                if !collection.is_bound() {
                    return Err(corrupt(n + 1, "record before bind entry".to_string()));
                }
                collection.records.insert(id, record);
                puts += 1;
            }
        }
    }

    Ok(Replay {
        collection,
        puts,
        torn_tail,
    })
}

pub struct FileIndex {
    dir: PathBuf,
    collections: RwLock<HashMap<String, Collection>>,
}

impl FileIndex {
    /// Open (or create) an index directory and load every collection log in it
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut index = Self {
            dir,
            collections: RwLock::new(HashMap::new()),
        };

        let mut loaded = HashMap::new();
        let mut entries = tokio::fs::read_dir(&index.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let bytes = tokio::fs::read(&path).await?;
            let replayed = replay(&path, &bytes)?;
            if replayed.needs_compaction() {
                index.compact(name, &replayed.collection).await?;
                debug!(collection = name, entries = replayed.puts, "Compacted collection log");
            }
            debug!(
                collection = name,
                records = replayed.collection.records.len(),
                "Loaded collection log"
            );
            loaded.insert(name.to_string(), replayed.collection);
        }

        info!(
            path = %index.dir.display(),
            collections = loaded.len(),
            "File index opened"
        );

        index.collections = RwLock::new(loaded);
        Ok(index)
    }

    fn log_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", collection, LOG_EXTENSION))
    }

    /// Append encoded entries; a failed write is cut back off the log
    async fn append(&self, name: &str, buf: &[u8]) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(name))
            .await?;
        let len = file.metadata().await?.len();

        let written = async {
            file.write_all(buf).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            if let Err(truncate) = file.set_len(len).await {
                warn!(collection = name, error = %truncate, "Failed to roll back partial append");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Rewrite a log with one entry per live record
    async fn compact(&self, name: &str, collection: &Collection) -> Result<()> {
        let path = self.log_path(name);
        let (Some(model), Some(dimension)) = (collection.model.as_deref(), collection.dimension) else {
            return match tokio::fs::remove_file(&path).await {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        };

        let mut buf = Vec::new();
        push_line(&mut buf, &LogEntryRef::Bind { model, dimension })?;
        for (id, record) in &collection.records {
            push_line(&mut buf, &LogEntryRef::Put { id, record })?;
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, &buf).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Collection names become file names, so keep them to a portable alphabet.
fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        && !name.starts_with('.');

    if valid {
        Ok(())
    } else {
        Err(AppError::validation(
            "collection",
            format!("invalid collection name: {:?}", name),
        ))
    }
}

#[async_trait]
impl VectorIndex for FileIndex {
    async fn upsert(&self, collection: &str, mut batch: UpsertBatch) -> Result<()> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;

        let (dimension, bound) = {
            let empty = Collection::default();
            let current = collections.get(collection).unwrap_or(&empty);
            let Some(dimension) = current.check_batch(collection, &batch)? else {
                return Ok(());
            };
            (dimension, current.is_bound())
        };

        let model = std::mem::take(&mut batch.model);
        let records: Vec<(String, StoredRecord)> = into_records(batch).collect();

        let mut buf = Vec::new();
        if !bound {
            push_line(&mut buf, &LogEntryRef::Bind { model: &model, dimension })?;
        }
        for (id, record) in &records {
            push_line(&mut buf, &LogEntryRef::Put { id, record })?;
        }
        self.append(collection, &buf).await?;

        let target = collections.entry(collection.to_string()).or_default();
        if !bound {
            target.bind(model, dimension);
        }
        target.records.extend(records);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        model: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<IndexMatch>> {
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(c) => c.query(collection, model, embedding, k),
            None => Ok(Vec::new()),
        }
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map_or(0, |c| c.records.len()))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        let mut collections = self.collections.write().await;

        match tokio::fs::remove_file(self.log_path(collection)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        collections.remove(collection);
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
