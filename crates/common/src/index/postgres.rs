//! PostgreSQL + pgvector index backend

use super::{check_model, ChunkMetadata, IndexMatch, UpsertBatch, VectorIndex};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    r#"CREATE TABLE IF NOT EXISTS lyric_collections (
        name TEXT PRIMARY KEY,
        model TEXT NOT NULL,
        dimension INTEGER NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS lyric_chunks (
        collection TEXT NOT NULL REFERENCES lyric_collections(name) ON DELETE CASCADE,
        id TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding vector NOT NULL,
        artist TEXT NOT NULL,
        title TEXT NOT NULL,
        album TEXT,
        PRIMARY KEY (collection, id)
    )"#,
];

/// Nearest chunks by cosine distance. Zero vectors give a NaN distance, which
/// is ranked and reported as 1 (orthogonal) so the order matches the values.
const NEAREST_SQL: &str = r#"
SELECT id, text, artist, title, album, distance
FROM (
    SELECT id, text, artist, title, album,
           COALESCE(NULLIF((embedding <=> $2)::float8, 'NaN'::float8), 1.0) AS distance
    FROM lyric_chunks
    WHERE collection = $1
) AS scored
ORDER BY distance, id
LIMIT $3
"#;

/// Vector index stored in PostgreSQL with the pgvector extension
pub struct PgVectorIndex {
    pool: PgPool,
}

impl PgVectorIndex {
    /// Connect and make sure the schema exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        let index = Self { pool };
        index.migrate().await?;
        info!(max_connections, "pgvector index connected");
        Ok(index)
    }

    /// Wrap an existing pool; the schema must already exist
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Model and dimension the collection was built with
    async fn binding(&self, collection: &str) -> Result<Option<(String, usize)>> {
        let row: Option<(String, i32)> =
            sqlx::query_as("SELECT model, dimension FROM lyric_collections WHERE name = $1")
                .bind(collection)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(model, dimension)| (model, dimension as usize)))
    }
}

fn check_dimension(collection: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AppError::DimensionMismatch {
            collection: collection.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()> {
        let Some(dimension) = batch.validate()? else {
            return Ok(());
        };
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO lyric_collections (name, model, dimension) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
        )
        .bind(collection)
        .bind(&batch.model)
        .bind(dimension as i32)
        .execute(&mut *tx)
        .await?;

        let (bound_model, bound_dimension): (String, i32) = sqlx::query_as(
            "SELECT model, dimension FROM lyric_collections WHERE name = $1 FOR UPDATE",
        )
        .bind(collection)
        .fetch_one(&mut *tx)
        .await?;
        check_model(collection, Some(bound_model.as_str()), &batch.model)?;
        check_dimension(collection, bound_dimension as usize, dimension)?;

        let count = batch.len();
        let UpsertBatch {
            ids,
            texts,
            embeddings,
            metadatas,
            ..
        } = batch;

        for (((id, text), embedding), metadata) in
            ids.into_iter().zip(texts).zip(embeddings).zip(metadatas)
        {
            sqlx::query(
                r#"
                INSERT INTO lyric_chunks (collection, id, text, embedding, artist, title, album)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (collection, id) DO UPDATE SET
                    text = EXCLUDED.text,
                    embedding = EXCLUDED.embedding,
                    artist = EXCLUDED.artist,
                    title = EXCLUDED.title,
                    album = EXCLUDED.album
                "#,
            )
            .bind(collection)
            .bind(id)
            .bind(text)
            .bind(Vector::from(embedding))
            .bind(metadata.artist)
            .bind(metadata.title)
            .bind(metadata.album)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(collection, count, "Upserted chunks");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        model: &str,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<IndexMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some((bound_model, dimension)) = self.binding(collection).await? else {
            return Ok(Vec::new());
        };
        check_model(collection, Some(bound_model.as_str()), model)?;
        check_dimension(collection, dimension, embedding.len())?;

        let rows = sqlx::query(NEAREST_SQL)
            .bind(collection)
            .bind(Vector::from(embedding.to_vec()))
            .bind(i64::try_from(k).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<IndexMatch> {
                let distance: f64 = row.try_get("distance")?;
                Ok(IndexMatch {
                    id: row.try_get("id")?,
                    text: row.try_get("text")?,
                    metadata: ChunkMetadata {
                        artist: row.try_get("artist")?,
                        title: row.try_get("title")?,
                        album: row.try_get("album")?,
                    },
                    distance: distance as f32,
                })
            })
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lyric_chunks WHERE collection = $1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM lyric_chunks WHERE collection = $1")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM lyric_collections WHERE name = $1")
            .bind(collection)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "pgvector"
    }
}
