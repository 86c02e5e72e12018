//! Retrieval-augmented question answering.
//!
//! Embeds the question, pulls the closest chunks from the store, stuffs
//! them into a single prompt and asks the query model for an answer. Only
//! the answer text leaves this module; chunk provenance stays internal.

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Config, ModelConfig, RetrievalConfig, VectorDbConfig};
use crate::embedding::{ensure_model_available, get_embedder};
use crate::error::RagError;
use crate::models::{Query, QueryResponse, ScoredChunk};
use crate::ollama::{ModelService, OllamaClient};
use crate::store::{SqliteVectorStore, VectorStore};

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Answer `query` from the chunks stored under `db_location`.
///
/// Checks, in order: the query model is served, the database directory
/// exists, and the collection is non-empty.
pub async fn answer(
    query: &Query,
    db_location: &Path,
    service: Arc<dyn ModelService>,
    models: &ModelConfig,
    retrieval: &RetrievalConfig,
    vector_db: &VectorDbConfig,
) -> Result<QueryResponse, RagError> {
    ensure_model_available(service.as_ref(), models.query_model()).await?;

    if !db_location.exists() {
        return Err(RagError::DatabaseNotFound(db_location.to_path_buf()));
    }

    let embedder = get_embedder(Arc::clone(&service), models).await?;
    let Some(store) =
        SqliteVectorStore::open_existing(db_location, vector_db, Arc::new(embedder)).await?
    else {
        return Err(RagError::DatabaseEmpty);
    };

    let outcome = answer_from_store(&store, query, service.as_ref(), models, retrieval).await;
    store.close().await;
    outcome
}

async fn answer_from_store(
    store: &SqliteVectorStore,
    query: &Query,
    service: &dyn ModelService,
    models: &ModelConfig,
    retrieval: &RetrievalConfig,
) -> Result<QueryResponse, RagError> {
    let count = store.count().await?;
    if count == 0 {
        return Err(RagError::DatabaseEmpty);
    }
    debug!(count, collection = store.collection(), "store ready");

    let hits = store
        .as_retriever(retrieval.top_k())
        .with_min_similarity(retrieval.min_similarity())
        .retrieve(query.text())
        .await
        .map_err(|e| RagError::QueryFailed(format!("{:#}", e)))?;

    if hits.is_empty() {
        return Err(RagError::NoRelevantChunks {
            min_similarity: retrieval.min_similarity(),
        });
    }
    info!(retrieved = hits.len(), "retrieved context");

    let prompt = build_prompt(query.text(), &hits);
    let generated = service
        .generate(models.query_model(), &prompt)
        .await
        .map_err(|e| RagError::QueryFailed(format!("{:#}", e)))?;

    let answer = generated.trim();
    if answer.is_empty() {
        return Err(RagError::NoRelevantChunks {
            min_similarity: retrieval.min_similarity(),
        });
    }

    Ok(QueryResponse {
        answer: answer.to_string(),
        retrieved_chunks: hits.len(),
    })
}

/// Single "stuff" prompt: every retrieved chunk, then the question.
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_PREAMBLE, context, question
    )
}

/// `mdrag query`: answer one question and print the answer.
pub async fn run_query(config: &Config, text: &str, db_location: &Path) -> anyhow::Result<()> {
    let query = Query::new(text)?;

    if !db_location.exists() {
        return Err(RagError::DatabaseNotFound(db_location.to_path_buf()).into());
    }

    let service: Arc<dyn ModelService> = Arc::new(
        OllamaClient::from_config(&config.models, &config.service)
            .context("Failed to create model service client")?,
    );

    let response = answer(
        &query,
        db_location,
        service,
        &config.models,
        &config.retrieval,
        &config.vector_db,
    )
    .await?;

    println!("{}", response.answer);
    Ok(())
}
