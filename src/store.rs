//! Persisted vector store on SQLite.
//!
//! Chunks and their embeddings live in two tables; a small key/value table
//! records which embedding model and dimensionality built the index.
//! Nearest-neighbor search is a brute-force cosine scan in Rust, which is
//! plenty for a wiki-sized corpus.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{Chunk, RootKind, SearchHit};

/// How a build treats existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Clear the index first, in the same transaction.
    Replace,
    /// Keep existing entries and add new ones.
    Append,
}

/// The embedding model an index was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    /// Unix timestamp of the last write.
    pub built_at: i64,
}

#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub raw_chunks: i64,
    pub summary_chunks: i64,
    pub embedded: i64,
    pub sources: i64,
    pub meta: Option<IndexMeta>,
}

/// Handle to the vector index. Cheap to clone.
#[derive(Debug, Clone)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Write chunks and their vectors, recording the model that produced them.
    ///
    /// Returns the number of chunks written.
    pub async fn write(
        &self,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
        model: &str,
        dims: usize,
        mode: WriteMode,
    ) -> Result<usize> {
        if chunks.len() != vectors.len() {
            bail!(
                "Got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
            bail!(
                "Got a {}-dimensional vector for a {}-dimensional index; check embedding.dims",
                v.len(),
                dims
            );
        }

        if mode == WriteMode::Append {
            if let Some(meta) = self.meta().await? {
                if meta.model != model || meta.dims != dims {
                    bail!(
                        "Index was built with {} ({} dims) but the current model is {} ({} dims); \
                         rebuild without --append",
                        meta.model,
                        meta.dims,
                        model,
                        dims
                    );
                }
            }
        }

        let mut tx = self.pool.begin().await?;

        if mode == WriteMode::Replace {
            sqlx::query("DELETE FROM chunk_vectors")
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, title, root, h1, h2, h3, text, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(&chunk.title)
            .bind(chunk.root.as_str())
            .bind(&chunk.headers.h1)
            .bind(&chunk.headers.h2)
            .bind(&chunk.headers.h3)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to store chunk of {}", chunk.source))?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&chunk.id)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        let built_at = chrono::Utc::now().timestamp();
        for (key, value) in [
            ("model", model.to_string()),
            ("dims", dims.to_string()),
            ("built_at", built_at.to_string()),
        ] {
            sqlx::query(
                "INSERT INTO index_meta (key, value) VALUES (?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(chunks.len())
    }

    /// Model metadata of the current index, `None` if nothing was built yet.
    pub async fn meta(&self) -> Result<Option<IndexMeta>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;

        let mut model = None;
        let mut dims = None;
        let mut built_at = 0;
        for row in &rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                "model" => model = Some(value),
                "dims" => dims = value.parse::<usize>().ok(),
                "built_at" => built_at = value.parse::<i64>().unwrap_or(0),
                _ => {}
            }
        }

        Ok(match (model, dims) {
            (Some(model), Some(dims)) => Some(IndexMeta {
                model,
                dims,
                built_at,
            }),
            _ => None,
        })
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order. An empty index returns no hits; an
    /// index built by another model is an error.
    pub async fn nearest(&self, query: &[f32], model: &str, k: usize) -> Result<Vec<SearchHit>> {
        let meta = match self.meta().await? {
            Some(meta) => meta,
            None => return Ok(Vec::new()),
        };
        if meta.model != model || meta.dims != query.len() {
            bail!(
                "Index was built with {} ({} dims) but queries use {} ({} dims); run `wikiqa index` to rebuild",
                meta.model,
                meta.dims,
                model,
                query.len()
            );
        }

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.title, c.root, c.text, cv.embedding
            FROM chunks c
            JOIN chunk_vectors cv ON cv.chunk_id = c.id
            ORDER BY c.rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let root: String = row.get("root");
                SearchHit {
                    chunk_id: row.get("id"),
                    source: row.get("source"),
                    title: row.get("title"),
                    root: RootKind::parse(&root).unwrap_or(RootKind::Raw),
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                    text: row.get("text"),
                }
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let raw_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE root = 'raw'")
            .fetch_one(&self.pool)
            .await?;
        let summary_chunks: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE root = 'summary'")
                .fetch_one(&self.pool)
                .await?;
        let embedded: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        let sources: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM chunks")
            .fetch_one(&self.pool)
            .await?;

        Ok(StoreStats {
            raw_chunks,
            summary_chunks,
            embedded,
            sources,
            meta: self.meta().await?,
        })
    }
}
