use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use mdrag::config::{ChunkingConfig, ModelConfig, RetrievalConfig, VectorDbConfig};
use mdrag::error::RagError;
use mdrag::ingest::{process_batch, process_file};
use mdrag::models::{ProcessingStatus, Query};
use mdrag::ollama::ModelService;
use mdrag::query::answer;

const EMBED_MODEL: &str = "embed-model";
const CHAT_MODEL: &str = "chat-model";

/// In-process model service: letter-frequency embeddings and a canned answer.
struct FakeService {
    models: Vec<String>,
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl FakeService {
    fn new(models: &[&str], reply: &str) -> Arc<Self> {
        Arc::new(Self {
            models: models.iter().map(|m| m.to_string()).collect(),
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn full(reply: &str) -> Arc<Self> {
        Self::new(&["embed-model:latest", "chat-model:latest"], reply)
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelService for FakeService {
    fn base_url(&self) -> &str {
        "http://fake.test"
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; 26];
                for c in t.to_ascii_lowercase().chars() {
                    if c.is_ascii_lowercase() {
                        v[(c as u8 - b'a') as usize] += 1.0;
                    }
                }
                v
            })
            .collect())
    }

    async fn generate(&self, _model: &str, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

struct Env {
    models: ModelConfig,
    chunking: ChunkingConfig,
    vector_db: VectorDbConfig,
}

fn env() -> Env {
    Env {
        models: ModelConfig::new(EMBED_MODEL, CHAT_MODEL, "http://fake.test").unwrap(),
        chunking: ChunkingConfig::new(200, 40).unwrap(),
        vector_db: VectorDbConfig::default(),
    }
}

const NOTES: &str = "# Garden notes\n\n\
Apples grow on trees in the orchard behind the house and ripen in autumn.\n\n\
Tomatoes need plenty of sun, regular watering and a stake to climb on.\n\n\
Compost is turned every two weeks so the pile stays warm and breaks down.\n\n\
Slugs are kept away from the lettuce with copper tape around the beds.";

async fn ingest(service: Arc<FakeService>, file: &Path, db: &Path) -> mdrag::models::ProcessingResult {
    let e = env();
    process_file(file, db, service, &e.models, &e.chunking, &e.vector_db).await
}

async fn ask(
    service: Arc<FakeService>,
    db: &Path,
    text: &str,
    retrieval: RetrievalConfig,
) -> Result<mdrag::models::QueryResponse, RagError> {
    let e = env();
    answer(
        &Query::new(text).unwrap(),
        db,
        service,
        &e.models,
        &retrieval,
        &e.vector_db,
    )
    .await
}

// ============ Ingestion ============

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, NOTES).unwrap();
    let db = tmp.path().join("db");
    let service = FakeService::full("unused");

    let first = ingest(service.clone(), &file, &db).await;
    assert_eq!(first.status, ProcessingStatus::Success);
    assert!(first.chunks_added > 1, "expected several chunks: {:?}", first);
    assert_eq!(first.chunks_skipped, 0);
    assert_eq!(
        first.source_file,
        fs::canonicalize(&file).unwrap().display().to_string()
    );

    let second = ingest(service, &file, &db).await;
    assert_eq!(second.status, ProcessingStatus::Success);
    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.chunks_skipped, first.chunks_added);
    assert!(db.join("vectors.sqlite").exists());
}

#[tokio::test]
async fn test_empty_file_succeeds_without_chunks() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("empty.md");
    fs::write(&file, "  \n\n ").unwrap();

    let result = ingest(FakeService::full(""), &file, &tmp.path().join("db")).await;
    assert!(result.is_success());
    assert_eq!(result.chunks_added, 0);
    assert_eq!(result.chunks_skipped, 0);
    assert_eq!(result.message.as_deref(), Some("File is empty"));
}

#[tokio::test]
async fn test_unavailable_embedding_model_fails_file() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, NOTES).unwrap();

    let service = FakeService::new(&["chat-model"], "");
    let result = ingest(service, &file, &tmp.path().join("db")).await;
    assert_eq!(result.status, ProcessingStatus::Failure);
    let message = result.message.unwrap();
    assert!(message.contains("'embed-model' not found"), "{}", message);
    assert!(message.contains("chat-model"));
}

#[tokio::test]
async fn test_unreadable_file_becomes_failure() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("binary.md");
    fs::write(&file, [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let result = ingest(FakeService::full(""), &file, &tmp.path().join("db")).await;
    assert_eq!(result.status, ProcessingStatus::Failure);
    assert!(result.message.unwrap().contains("Failed to read"));
}

#[tokio::test]
async fn test_batch_missing_path() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nowhere");
    let e = env();

    let job = process_batch(
        &missing,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 0);
    assert_eq!(job.failed, 1);
    assert_eq!(job.succeeded, 0);
    assert_eq!(job.results.len(), 1);
    let message = job.results[0].message.as_deref().unwrap();
    assert!(message.starts_with("Path does not exist"));
    assert!(message.contains("nowhere"));
    assert!(job.end_time.is_some());
}

#[tokio::test]
async fn test_batch_empty_directory() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    let e = env();

    let job = process_batch(
        &docs,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 0);
    assert_eq!(job.succeeded, 0);
    assert_eq!(job.failed, 0);
    assert_eq!(job.total_chunks_added, 0);
    assert!(job.results.is_empty());
}

#[tokio::test]
async fn test_batch_directory_counts_add_up() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir_all(docs.join("nested")).unwrap();
    fs::write(docs.join("a.md"), NOTES).unwrap();
    fs::write(docs.join("B.MD"), "Bees visit the clover in the lawn.").unwrap();
    fs::write(docs.join("c.txt"), "not markdown").unwrap();
    fs::write(docs.join("empty.md"), "").unwrap();
    fs::write(docs.join("nested").join("d.md"), "too deep").unwrap();
    let e = env();

    let job = process_batch(
        &docs,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 3);
    assert_eq!(job.results.len(), job.total_files);
    assert_eq!(job.succeeded + job.failed, job.total_files);
    assert_eq!(job.failed, 0);
    let summed: usize = job.results.iter().map(|r| r.chunks_added).sum();
    assert_eq!(job.total_chunks_added, summed);
    assert!(job.results.iter().all(|r| !r.source_file.ends_with("d.md")));
}

#[tokio::test]
async fn test_batch_single_non_markdown_file() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.txt");
    fs::write(&file, NOTES).unwrap();
    let e = env();

    let job = process_batch(
        &file,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 0);
    assert!(job.results.is_empty());
}

#[tokio::test]
async fn test_batch_failure_does_not_stop_other_files() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("a.md"), [0xff, 0xfe]).unwrap();
    fs::write(docs.join("b.md"), NOTES).unwrap();
    let e = env();

    let job = process_batch(
        &docs,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 2);
    assert_eq!(job.failed, 1);
    assert_eq!(job.succeeded, 1);
    assert!(job.total_chunks_added > 0);
}

#[cfg(unix)]
#[tokio::test]
async fn test_batch_ignores_dangling_symlink_with_other_name() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("a.md"), NOTES).unwrap();
    fs::write(docs.join("b.md"), "Bees visit the clover in the lawn.").unwrap();
    std::os::unix::fs::symlink(docs.join("gone.txt"), docs.join("stale-link.txt")).unwrap();
    let e = env();

    let job = process_batch(
        &docs,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 2);
    assert_eq!(job.succeeded, 2);
    assert_eq!(job.failed, 0);
    assert!(job.total_chunks_added >= 2);
}

#[cfg(unix)]
#[tokio::test]
async fn test_batch_dangling_markdown_link_fails_only_that_file() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("a.md"), NOTES).unwrap();
    fs::write(docs.join("b.md"), "Bees visit the clover in the lawn.").unwrap();
    std::os::unix::fs::symlink(docs.join("gone.md"), docs.join("c.md")).unwrap();
    let e = env();

    let job = process_batch(
        &docs,
        &tmp.path().join("db"),
        FakeService::full(""),
        &e.models,
        &e.chunking,
        &e.vector_db,
    )
    .await;

    assert_eq!(job.total_files, 3);
    assert_eq!(job.succeeded, 2);
    assert_eq!(job.failed, 1);
    let failed = job.results.iter().find(|r| !r.is_success()).unwrap();
    assert!(failed.source_file.ends_with("c.md"), "{}", failed.source_file);
    assert!(failed.message.as_deref().unwrap().contains("Failed to read"));
}

// ============ Query ============

#[tokio::test]
async fn test_query_missing_database() {
    let tmp = TempDir::new().unwrap();
    let err = ask(
        FakeService::full("x"),
        &tmp.path().join("absent"),
        "anything?",
        RetrievalConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RagError::DatabaseNotFound(_)));
}

#[tokio::test]
async fn test_query_empty_database() {
    let tmp = TempDir::new().unwrap();
    let db = tmp.path().join("db");
    fs::create_dir(&db).unwrap();

    let err = ask(FakeService::full("x"), &db, "anything?", RetrievalConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DatabaseEmpty));
    assert!(!db.join("vectors.sqlite").exists());
    assert_eq!(fs::read_dir(&db).unwrap().count(), 0);
}

#[tokio::test]
async fn test_query_other_collection_is_empty() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, NOTES).unwrap();
    let db = tmp.path().join("db");
    let service = FakeService::full("x");
    ingest(service.clone(), &file, &db).await;

    let e = env();
    let err = answer(
        &Query::new("apples?").unwrap(),
        &db,
        service,
        &e.models,
        &RetrievalConfig::default(),
        &VectorDbConfig::new("elsewhere").unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RagError::DatabaseEmpty));
}

#[tokio::test]
async fn test_query_model_checked_first() {
    let tmp = TempDir::new().unwrap();
    let service = FakeService::new(&["embed-model"], "x");

    let err = ask(
        service,
        &tmp.path().join("absent"),
        "anything?",
        RetrievalConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, RagError::ModelUnavailable(_)));
    assert!(err.to_string().contains("'chat-model'"));
}

#[tokio::test]
async fn test_query_answers_from_context() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, NOTES).unwrap();
    let db = tmp.path().join("db");
    let service = FakeService::full("  In autumn.\n");

    ingest(service.clone(), &file, &db).await;

    let response = ask(
        service.clone(),
        &db,
        "When do apples ripen?",
        RetrievalConfig::new(2, 0.0).unwrap(),
    )
    .await
    .unwrap();

    assert_eq!(response.answer, "In autumn.");
    assert_eq!(response.retrieved_chunks, 2);

    let prompts = service.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: When do apples ripen?"));
    assert!(!prompts[0].contains(&*file.display().to_string()));
}

#[tokio::test]
async fn test_query_empty_generation_is_no_relevant_chunks() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("notes.md");
    fs::write(&file, NOTES).unwrap();
    let db = tmp.path().join("db");
    let service = FakeService::full("   ");

    ingest(service.clone(), &file, &db).await;

    let err = ask(service, &db, "What about apples?", RetrievalConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoRelevantChunks { .. }));
}

#[tokio::test]
async fn test_query_similarity_floor_is_enforced() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("z.md");
    fs::write(&file, "zzzz zzzz").unwrap();
    let db = tmp.path().join("db");
    let service = FakeService::full("should not be asked");

    ingest(service.clone(), &file, &db).await;

    let err = ask(
        service.clone(),
        &db,
        "apple",
        RetrievalConfig::new(4, 0.5).unwrap(),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        RagError::NoRelevantChunks { min_similarity } if min_similarity == 0.5
    ));
    assert!(service.prompts().is_empty());
}
