//! Ingestion pipeline orchestration.
//!
//! Coordinates the per-file flow: read → chunk → dedup check → embed and
//! store. Every file produces a [`ProcessingResult`]; errors are captured in
//! the result instead of propagating, so one bad file never stops a batch.

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, Config, ModelConfig, VectorDbConfig};
use crate::dedup::partition_chunks;
use crate::embedding::{ensure_model_available, get_embedder};
use crate::models::{ProcessingJob, ProcessingResult, ProcessingStatus};
use crate::ollama::{ModelService, OllamaClient};
use crate::store::{SqliteVectorStore, VectorStore};

const MARKDOWN_GLOB: &str = "*.md";

/// Ingest one Markdown file into the store under `db_location`.
pub async fn process_file(
    path: &Path,
    db_location: &Path,
    service: Arc<dyn ModelService>,
    models: &ModelConfig,
    chunking: &ChunkingConfig,
    vector_db: &VectorDbConfig,
) -> ProcessingResult {
    let started = Instant::now();
    let source_file = resolve_source(path);
    info!(source_file = %source_file, "processing file");

    match ingest_file(
        path,
        &source_file,
        db_location,
        service,
        models,
        chunking,
        vector_db,
        started,
    )
    .await
    {
        Ok(result) => result,
        Err(e) => {
            let elapsed = elapsed_ms(started);
            error!(source_file = %source_file, elapsed_ms = elapsed, error = %format!("{:#}", e), "failed to process file");
            ProcessingResult::failure(source_file, format!("{:#}", e), elapsed)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn ingest_file(
    path: &Path,
    source_file: &str,
    db_location: &Path,
    service: Arc<dyn ModelService>,
    models: &ModelConfig,
    chunking: &ChunkingConfig,
    vector_db: &VectorDbConfig,
    started: Instant,
) -> Result<ProcessingResult> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    debug!(chars = text.chars().count(), "read file");

    if text.trim().is_empty() {
        warn!(source_file, "file is empty");
        return Ok(ProcessingResult::success(
            source_file,
            0,
            0,
            Some("File is empty".to_string()),
            elapsed_ms(started),
        ));
    }

    let chunks = chunk_text(&text, chunking);
    info!(chunks = chunks.len(), "chunked file");

    if chunks.is_empty() {
        warn!(source_file, "no chunks generated");
        return Ok(ProcessingResult::success(
            source_file,
            0,
            0,
            Some("No chunks generated".to_string()),
            elapsed_ms(started),
        ));
    }

    let embedder = get_embedder(service, models).await?;
    let store =
        SqliteVectorStore::open_or_create(db_location, vector_db, Arc::new(embedder)).await?;

    let partition = partition_chunks(&store, source_file, chunks).await;
    let added = partition.staged();
    let skipped = partition.skipped;

    let stored = if added > 0 {
        store.add(&partition.contents, &partition.metadatas).await
    } else {
        info!(skipped, "all chunks were duplicates, none added");
        Ok(())
    };
    store.close().await;
    stored?;

    let elapsed = elapsed_ms(started);
    info!(
        source_file,
        added,
        skipped,
        elapsed_ms = elapsed,
        "completed file"
    );

    Ok(ProcessingResult::success(
        source_file,
        added,
        skipped,
        None,
        elapsed,
    ))
}

/// Ingest a single Markdown file or every Markdown file directly inside a
/// directory, sequentially.
pub async fn process_batch(
    path: &Path,
    db_location: &Path,
    service: Arc<dyn ModelService>,
    models: &ModelConfig,
    chunking: &ChunkingConfig,
    vector_db: &VectorDbConfig,
) -> ProcessingJob {
    let mut job = ProcessingJob::start();

    if !path.is_file() && !path.is_dir() {
        job.record(ProcessingResult::failure(
            path.display().to_string(),
            format!("Path does not exist: {}", path.display()),
            0,
        ));
        job.finish();
        return job;
    }

    let files = match batch_files(path) {
        Ok(files) => files,
        Err(e) => {
            job.record(ProcessingResult::failure(
                path.display().to_string(),
                format!("{:#}", e),
                0,
            ));
            job.finish();
            return job;
        }
    };

    job.total_files = files.len();
    info!(files = files.len(), path = %path.display(), "starting batch");

    for file in &files {
        let result = process_file(
            file,
            db_location,
            Arc::clone(&service),
            models,
            chunking,
            vector_db,
        )
        .await;
        job.record(result);
    }

    job.finish();
    info!(
        succeeded = job.succeeded,
        failed = job.failed,
        chunks_added = job.total_chunks_added,
        duration_ms = job.duration_ms().unwrap_or_default(),
        "batch finished"
    );
    job
}

/// Files a batch over `path` covers: the file itself when it is Markdown,
/// otherwise the Markdown files directly inside the directory.
fn batch_files(path: &Path) -> Result<Vec<PathBuf>> {
    let filter = MarkdownFilter::new()?;
    if path.is_file() {
        Ok(if filter.matches(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        })
    } else {
        discover_with(path, &filter)
    }
}

/// Markdown files directly inside `dir`, each once, sorted by path.
///
/// Only entries whose name matches are inspected further. A symlink with a
/// Markdown name is kept unless it points at a directory, so a dangling link
/// surfaces later as a failure for that one file.
pub fn discover_markdown(dir: &Path) -> Result<Vec<PathBuf>> {
    discover_with(dir, &MarkdownFilter::new()?)
}

fn discover_with(dir: &Path, filter: &MarkdownFilter) -> Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e)
                    .with_context(|| format!("Failed to scan directory {}", dir.display()));
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if !filter.matches(entry.path()) {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_file() || (file_type.is_symlink() && !entry.path().is_dir()) {
            files.insert(entry.into_path());
        }
    }

    Ok(files.into_iter().collect())
}

/// Case-insensitive `*.md` file name matcher.
///
/// A bare `.md` name has no stem and does not match.
pub struct MarkdownFilter {
    matcher: GlobMatcher,
}

impl MarkdownFilter {
    pub fn new() -> Result<Self> {
        let glob = GlobBuilder::new(MARKDOWN_GLOB)
            .case_insensitive(true)
            .literal_separator(true)
            .build()?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => path.extension().is_some() && self.matcher.is_match(name),
            None => false,
        }
    }
}

fn resolve_source(path: &Path) -> String {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// `mdrag process`: validate the environment, ingest `path`, print a summary.
///
/// Returns the finished job so the caller can choose the exit status.
pub async fn run_process(
    config: &Config,
    path: &Path,
    db_location: &Path,
    json: bool,
) -> Result<ProcessingJob> {
    if !path.exists() {
        bail!("Path does not exist: {}", path.display());
    }

    let service: Arc<dyn ModelService> =
        Arc::new(OllamaClient::from_config(&config.models, &config.service)?);
    ensure_model_available(service.as_ref(), config.models.embedding_model()).await?;

    std::fs::create_dir_all(db_location).with_context(|| {
        format!(
            "Failed to create database directory: {}",
            db_location.display()
        )
    })?;

    if !json {
        println!("Processing Markdown files...");
    }

    let job = process_batch(
        path,
        db_location,
        service,
        &config.models,
        &config.chunking,
        &config.vector_db,
    )
    .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(job);
    }

    for result in &job.results {
        let name = Path::new(&result.source_file)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| result.source_file.clone());

        match result.status {
            ProcessingStatus::Success => {
                let skipped = if result.chunks_skipped > 0 {
                    format!(" ({} skipped - duplicates)", result.chunks_skipped)
                } else {
                    String::new()
                };
                println!("- {}: Added {} chunks{}", name, result.chunks_added, skipped);
            }
            ProcessingStatus::Failure => {
                println!(
                    "- {}: ERROR: {}",
                    name,
                    result.message.as_deref().unwrap_or("Unknown error")
                );
            }
        }
    }

    println!();
    println!(
        "Summary: Processed {} files | Added {} chunks | Skipped {} chunks",
        job.total_files,
        job.total_chunks_added,
        job.total_chunks_skipped()
    );
    println!("Database location: {}", db_location.display());

    Ok(job)
}
