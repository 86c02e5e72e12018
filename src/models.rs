//! Core data models used throughout mdrag.
//!
//! These types represent the chunks, per-file results, batch jobs, and
//! queries that flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RagError;

/// Metadata stored alongside every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    /// Absolute path of the file the chunk came from.
    pub source_file: String,
    /// Position of the chunk within its file's chunk sequence.
    pub chunk_index: i64,
}

/// A stored chunk together with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Failure,
}

/// Outcome of ingesting one file.
///
/// Built through [`ProcessingResult::success`] or [`ProcessingResult::failure`];
/// a failure always carries a non-empty message.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub source_file: String,
    pub status: ProcessingStatus,
    pub chunks_added: usize,
    pub chunks_skipped: usize,
    pub message: Option<String>,
    pub processing_time_ms: u64,
}

impl ProcessingResult {
    pub fn success(
        source_file: impl Into<String>,
        chunks_added: usize,
        chunks_skipped: usize,
        message: Option<String>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            source_file: source_file.into(),
            status: ProcessingStatus::Success,
            chunks_added,
            chunks_skipped,
            message,
            processing_time_ms,
        }
    }

    pub fn failure(
        source_file: impl Into<String>,
        message: impl Into<String>,
        processing_time_ms: u64,
    ) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        Self {
            source_file: source_file.into(),
            status: ProcessingStatus::Failure,
            chunks_added: 0,
            chunks_skipped: 0,
            message: Some(message),
            processing_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProcessingStatus::Success
    }
}

/// Aggregate over a batch of files.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingJob {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_chunks_added: usize,
    pub results: Vec<ProcessingResult>,
}

impl ProcessingJob {
    pub fn start() -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            total_files: 0,
            succeeded: 0,
            failed: 0,
            total_chunks_added: 0,
            results: Vec::new(),
        }
    }

    /// Append a result and update the counters. Does not touch `total_files`,
    /// which reflects the number of files discovered.
    pub fn record(&mut self, result: ProcessingResult) {
        self.total_chunks_added += result.chunks_added;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Elapsed milliseconds, or `None` while the job is still running.
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }

    pub fn total_chunks_skipped(&self) -> usize {
        self.results.iter().map(|r| r.chunks_skipped).sum()
    }
}

/// A natural-language question.
#[derive(Debug, Clone)]
pub struct Query {
    text: String,
    created_at: DateTime<Utc>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Result<Self, RagError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(RagError::config("Query text cannot be empty"));
        }
        Ok(Self {
            text,
            created_at: Utc::now(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// The generated answer. Provenance of the retrieved chunks is never exposed.
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub answer: String,
    /// Number of chunks placed in the prompt.
    pub retrieved_chunks: usize,
}
