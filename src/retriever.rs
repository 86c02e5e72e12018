//! Query-time retrieval over a [`VectorStore`].

use anyhow::Result;
use tracing::debug;

use crate::embedding::Embedder;
use crate::models::ScoredChunk;
use crate::store::VectorStore;

/// Embeds a query and returns the nearest stored chunks.
///
/// Results are capped at `top_k`. With a non-zero `min_similarity`, chunks
/// scoring below it are dropped, so fewer than `top_k` (possibly none) may
/// come back.
pub struct Retriever<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
    top_k: usize,
    min_similarity: f64,
}

impl<'a> Retriever<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, top_k: usize) -> Self {
        Self {
            store,
            embedder,
            top_k,
            min_similarity: 0.0,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let mut hits = self.store.similarity_search(&query_vec, self.top_k).await?;

        if self.min_similarity > 0.0 {
            let before = hits.len();
            hits.retain(|h| f64::from(h.score) >= self.min_similarity);
            debug!(
                kept = hits.len(),
                dropped = before - hits.len(),
                threshold = self.min_similarity,
                "applied similarity threshold"
            );
        }

        Ok(hits)
    }
}
