//! Embedding provider abstraction and model availability checks.
//!
//! Defines the [`Embedder`] trait and [`ServiceEmbedder`], which delegates to
//! a [`ModelService`]. [`get_embedder`] refuses to hand out an embedder for a
//! model the service does not host, so misconfiguration is reported up front
//! instead of failing halfway through ingestion.
//!
//! Also provides vector utilities used by the SQLite store:
//! - [`cosine_similarity`]: cosine similarity of two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::config::ModelConfig;
use crate::error::RagError;
use crate::ollama::ModelService;

/// How many available model names to show in an "unavailable" message.
const MAX_LISTED_MODELS: usize = 10;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"nomic-embed-text"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_texts(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// [`Embedder`] that calls a [`ModelService`] with a fixed model.
pub struct ServiceEmbedder {
    service: Arc<dyn ModelService>,
    model: String,
}

#[async_trait]
impl Embedder for ServiceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.service.embed(&self.model, texts).await
    }
}

/// Build an embedder for the configured embedding model after verifying the
/// service actually hosts it.
pub async fn get_embedder(
    service: Arc<dyn ModelService>,
    models: &ModelConfig,
) -> Result<ServiceEmbedder, RagError> {
    ensure_model_available(service.as_ref(), models.embedding_model()).await?;
    Ok(ServiceEmbedder {
        service,
        model: models.embedding_model().to_string(),
    })
}

/// Fail with [`RagError::ModelUnavailable`] unless `model` is listed by the
/// service. An unreachable service is reported through the same variant.
pub async fn ensure_model_available(
    service: &dyn ModelService,
    model: &str,
) -> Result<(), RagError> {
    match service.list_models().await {
        Ok(available) => {
            if available.iter().any(|name| model_matches(model, name)) {
                debug!(model, "model is available");
                Ok(())
            } else {
                Err(RagError::ModelUnavailable(unavailable_message(
                    model,
                    service.base_url(),
                    &available,
                )))
            }
        }
        Err(e) => Err(RagError::ModelUnavailable(format!(
            "Cannot connect to model service at {}: {}",
            service.base_url(),
            e
        ))),
    }
}

/// `requested` matches an exact name or a tagged variant (`name:tag`).
pub fn model_matches(requested: &str, available: &str) -> bool {
    available == requested
        || available
            .strip_prefix(requested)
            .is_some_and(|rest| rest.starts_with(':'))
}

fn unavailable_message(model: &str, base_url: &str, available: &[String]) -> String {
    let mut listed = available
        .iter()
        .take(MAX_LISTED_MODELS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if available.len() > MAX_LISTED_MODELS {
        listed.push_str(&format!(", ... ({} total)", available.len()));
    }
    if listed.is_empty() {
        listed.push_str("(none)");
    }

    format!(
        "Model '{}' not found at {}. Available models: {}",
        model, base_url, listed
    )
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing
/// a BLOB of `vec.len() × 4` bytes.
///
/// # Example
///
/// ```rust
/// use mdrag::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
