//! Persistent vector store.
//!
//! The [`VectorStore`] trait is what the ingestion and query pipelines see.
//! [`SqliteVectorStore`] keeps chunks, their metadata and their embeddings
//! in `<location>/vectors.sqlite`, partitioned by collection name. Search is
//! a brute-force cosine scan over the collection.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`exists`](VectorStore::exists) | exact content match for a source file |
//! | [`add`](VectorStore::add) | embed and insert a batch |
//! | [`count`](VectorStore::count) | number of chunks in the collection |
//! | [`similarity_search`](VectorStore::similarity_search) | top-k by cosine similarity |

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::VectorDbConfig;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::migrate;
use crate::models::{ChunkMetadata, ScoredChunk};
use crate::retriever::Retriever;

/// Storage operations used by the pipelines.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// True when a chunk with exactly `content` is stored for `source_file`.
    ///
    /// Lookup failures are logged and reported as `false`, so a flaky read
    /// never blocks ingestion.
    async fn exists(&self, source_file: &str, content: &str) -> bool;

    /// Embed and insert `contents`, pairing each with the metadata at the
    /// same position.
    async fn add(&self, contents: &[String], metadatas: &[ChunkMetadata]) -> Result<()>;

    /// Number of chunks stored in the collection.
    async fn count(&self) -> Result<i64>;

    /// Up to `k` chunks ranked by cosine similarity to `query_vec`.
    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;
}

/// SQLite implementation of [`VectorStore`] for one collection.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorStore {
    /// Open the store under `location`, creating the directory, schema and
    /// collection as needed. Reopening addresses the same data.
    pub async fn open_or_create(
        location: &Path,
        config: &VectorDbConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pool = db::connect(location).await?;
        migrate::run_migrations(&pool).await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(config.collection_name())
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await?;

        debug!(
            location = %location.display(),
            collection = config.collection_name(),
            "opened vector store"
        );

        Ok(Self {
            pool,
            collection: config.collection_name().to_string(),
            embedder,
        })
    }

    /// Open an already populated store without creating or migrating
    /// anything. Returns `Ok(None)` when no database file exists yet.
    pub async fn open_existing(
        location: &Path,
        config: &VectorDbConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Option<Self>> {
        let Some(pool) = db::connect_existing(location).await? else {
            return Ok(None);
        };

        Ok(Some(Self {
            pool,
            collection: config.collection_name().to_string(),
            embedder,
        }))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// A retriever returning up to `top_k` chunks per query.
    pub fn as_retriever(&self, top_k: usize) -> Retriever<'_> {
        Retriever::new(self, self.embedder.as_ref(), top_k)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Stored contents for `source_file` whose hash equals that of `content`.
    async fn hash_matches(&self, source_file: &str, content: &str) -> Result<Vec<String>> {
        let contents: Vec<String> = sqlx::query_scalar(
            "SELECT content FROM chunks \
             WHERE collection = ? AND source_file = ? AND content_hash = ?",
        )
        .bind(&self.collection)
        .bind(source_file)
        .bind(content_hash(content))
        .fetch_all(&self.pool)
        .await?;
        Ok(contents)
    }
}

/// Hex SHA-256 of the chunk text, used as an indexed lookup key.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn exists(&self, source_file: &str, content: &str) -> bool {
        match self.hash_matches(source_file, content).await {
            Ok(existing) => existing.iter().any(|c| c == content),
            Err(e) => {
                warn!(source_file, error = %e, "duplicate check failed; treating chunk as new");
                false
            }
        }
    }

    async fn add(&self, contents: &[String], metadatas: &[ChunkMetadata]) -> Result<()> {
        if contents.len() != metadatas.len() {
            bail!(
                "add: {} contents but {} metadata entries",
                contents.len(),
                metadatas.len()
            );
        }
        if contents.is_empty() {
            return Ok(());
        }

        let vectors = self.embedder.embed_texts(contents).await?;
        if vectors.len() != contents.len() {
            bail!(
                "Embedding count mismatch: {} texts, {} vectors",
                contents.len(),
                vectors.len()
            );
        }

        let model = self.embedder.model_name().to_string();
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for ((content, meta), vector) in contents.iter().zip(metadatas).zip(&vectors) {
            let hash = content_hash(content);

            sqlx::query(
                r#"
                INSERT INTO chunks (id, collection, source_file, chunk_index, content,
                                    content_hash, embedding, dims, embedding_model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&self.collection)
            .bind(&meta.source_file)
            .bind(meta.chunk_index)
            .bind(content)
            .bind(&hash)
            .bind(vec_to_blob(vector))
            .bind(vector.len() as i64)
            .bind(&model)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(count = contents.len(), collection = %self.collection, "inserted chunks");
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn similarity_search(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let model = self.embedder.model_name();
        let rows = sqlx::query(
            "SELECT source_file, chunk_index, content, embedding, dims, embedding_model \
             FROM chunks WHERE collection = ? ORDER BY rowid",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut mismatched = 0usize;
        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let dims: i64 = row.get("dims");
            let row_model: String = row.get("embedding_model");
            if row_model != model || dims != query_vec.len() as i64 {
                mismatched += 1;
                continue;
            }

            let blob: Vec<u8> = row.get("embedding");
            scored.push(ScoredChunk {
                content: row.get("content"),
                metadata: ChunkMetadata {
                    source_file: row.get("source_file"),
                    chunk_index: row.get("chunk_index"),
                },
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
            });
        }

        if mismatched > 0 {
            warn!(
                mismatched,
                model,
                dims = query_vec.len(),
                collection = %self.collection,
                "skipped chunks embedded with a different model or dimension"
            );
        }

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }
}
