//! Error types surfaced by the ingestion and query pipelines.
//!
//! Internal plumbing (HTTP, SQL, file I/O) uses [`anyhow::Result`]. The
//! pipelines translate those failures into [`RagError`] at their public
//! boundary so callers can tell a bad configuration apart from a missing
//! model, a missing or empty database, or a query with no usable context.

use std::path::PathBuf;

/// Errors returned by the public pipeline entry points.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Missing or invalid configuration. Raised before any I/O happens.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The requested model is not served, or the service is unreachable.
    #[error("{0}")]
    ModelUnavailable(String),

    /// The vector database directory does not exist.
    #[error("Vector database not found at '{}'. Run 'mdrag process' first.", .0.display())]
    DatabaseNotFound(PathBuf),

    /// The collection holds no chunks yet.
    #[error("Vector database is empty. Process some documents first.")]
    DatabaseEmpty,

    /// Retrieval produced no usable context, or the model produced no answer.
    #[error("No relevant chunks found (all chunks below similarity threshold {min_similarity})")]
    NoRelevantChunks { min_similarity: f64 },

    /// The generation call failed.
    #[error("Query processing failed: {0}")]
    QueryFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RagError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        RagError::Config(message.into())
    }
}
