//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file, then environment variables
//! override individual keys. The result is a set of validated, immutable
//! records that are passed explicitly into every pipeline call:
//!
//! ```toml
//! [db]
//! path = "data/db"
//!
//! [models]
//! embedding_model = "nomic-embed-text"
//! query_model = "llama3.2"
//! base_url = "http://localhost:11434"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 4
//! min_similarity = 0.0
//!
//! [vector_db]
//! collection_name = "documents"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::RagError;

/// Config file read when `--config` is not given. Its absence is not an error.
pub const DEFAULT_CONFIG_PATH: &str = "./config/mdrag.toml";

const DEFAULT_DB_PATH: &str = "data/db";
const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_COLLECTION: &str = "documents";

/// Fully validated configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub models: ModelConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub vector_db: VectorDbConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Timeouts and retry policy for calls to the model service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Timeout for embedding and generation requests.
    pub timeout_secs: u64,
    /// Timeout for the model-list call used by availability checks.
    pub check_timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            check_timeout_secs: 5,
            max_retries: 3,
        }
    }
}

/// Chunk size and overlap, both in characters. `chunk_overlap < chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::config(format!(
                "chunking.chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// How many chunks to retrieve per query and the minimum cosine similarity
/// a chunk needs to be used as context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    top_k: usize,
    min_similarity: f64,
}

impl RetrievalConfig {
    pub fn new(top_k: usize, min_similarity: f64) -> Result<Self, RagError> {
        if top_k == 0 {
            return Err(RagError::config("retrieval.top_k must be >= 1"));
        }
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(RagError::config(
                "retrieval.min_similarity must be in [0.0, 1.0]",
            ));
        }
        Ok(Self {
            top_k,
            min_similarity,
        })
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn min_similarity(&self) -> f64 {
        self.min_similarity
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_similarity: 0.0,
        }
    }
}

/// Model identifiers and the base URL of the service that hosts them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    embedding_model: String,
    query_model: String,
    service_base_url: String,
}

impl ModelConfig {
    pub fn new(
        embedding_model: impl Into<String>,
        query_model: impl Into<String>,
        service_base_url: impl Into<String>,
    ) -> Result<Self, RagError> {
        let embedding_model = embedding_model.into().trim().to_string();
        let query_model = query_model.into().trim().to_string();
        let service_base_url = service_base_url
            .into()
            .trim()
            .trim_end_matches('/')
            .to_string();

        if embedding_model.is_empty() {
            return Err(RagError::config("models.embedding_model must not be empty"));
        }
        if query_model.is_empty() {
            return Err(RagError::config("models.query_model must not be empty"));
        }
        if service_base_url.is_empty() {
            return Err(RagError::config("models.base_url must not be empty"));
        }

        Ok(Self {
            embedding_model,
            query_model,
            service_base_url,
        })
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn query_model(&self) -> &str {
        &self.query_model
    }

    pub fn service_base_url(&self) -> &str {
        &self.service_base_url
    }
}

/// Names the collection (logical partition) inside the vector database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDbConfig {
    collection_name: String,
}

impl VectorDbConfig {
    pub fn new(collection_name: impl Into<String>) -> Result<Self, RagError> {
        let collection_name = collection_name.into().trim().to_string();
        if collection_name.is_empty() {
            return Err(RagError::config(
                "vector_db.collection_name must not be empty",
            ));
        }
        Ok(Self { collection_name })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            collection_name: DEFAULT_COLLECTION.to_string(),
        }
    }
}

// ============ File layer ============

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawConfig {
    db: RawDb,
    models: RawModels,
    chunking: RawChunking,
    retrieval: RawRetrieval,
    vector_db: RawVectorDb,
    service: RawService,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawDb {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawModels {
    embedding_model: Option<String>,
    query_model: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawChunking {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawRetrieval {
    top_k: Option<usize>,
    min_similarity: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawVectorDb {
    collection_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawService {
    timeout_secs: Option<u64>,
    check_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

/// Load configuration from `path` (or [`DEFAULT_CONFIG_PATH`] when absent)
/// and apply environment overrides from the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, RagError> {
    let content = match path {
        Some(p) => Some(read_config_file(p)?),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.is_file() {
                Some(read_config_file(default_path)?)
            } else {
                None
            }
        }
    };

    parse_config(content.as_deref().unwrap_or(""), |key| std::env::var(key).ok())
}

fn read_config_file(path: &Path) -> Result<String, RagError> {
    std::fs::read_to_string(path).map_err(|e| {
        RagError::config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Parse TOML text and overlay environment values provided by `lookup`.
pub fn parse_config<F>(toml_text: &str, lookup: F) -> Result<Config, RagError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw: RawConfig = toml::from_str(toml_text)
        .map_err(|e| RagError::config(format!("Failed to parse config file: {}", e)))?;

    apply_env_overrides(&mut raw, &lookup)?;
    build(raw)
}

fn apply_env_overrides<F>(raw: &mut RawConfig, lookup: &F) -> Result<(), RagError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("OLLAMA_EMBEDDING_MODEL") {
        raw.models.embedding_model = Some(v);
    }
    if let Some(v) = lookup("OLLAMA_QUERY_MODEL") {
        raw.models.query_model = Some(v);
    }
    if let Some(v) = lookup("OLLAMA_BASE_URL") {
        raw.models.base_url = Some(v);
    }
    if let Some(v) = lookup("VECTOR_DB_COLLECTION_NAME") {
        raw.vector_db.collection_name = Some(v);
    }
    if let Some(v) = lookup("MDRAG_DB_PATH") {
        raw.db.path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("CHUNK_SIZE") {
        raw.chunking.chunk_size = Some(parse_env("CHUNK_SIZE", &v)?);
    }
    if let Some(v) = lookup("CHUNK_OVERLAP") {
        raw.chunking.chunk_overlap = Some(parse_env("CHUNK_OVERLAP", &v)?);
    }
    if let Some(v) = lookup("RETRIEVER_TOP_K") {
        raw.retrieval.top_k = Some(parse_env("RETRIEVER_TOP_K", &v)?);
    }
    if let Some(v) = lookup("RETRIEVER_MIN_SIMILARITY") {
        raw.retrieval.min_similarity = Some(parse_env("RETRIEVER_MIN_SIMILARITY", &v)?);
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, RagError> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::config(format!("{} has an invalid value: '{}'", key, value)))
}

fn build(raw: RawConfig) -> Result<Config, RagError> {
    let embedding_model = raw.models.embedding_model.ok_or_else(|| {
        RagError::config("models.embedding_model is required (or set OLLAMA_EMBEDDING_MODEL)")
    })?;
    let query_model = raw.models.query_model.ok_or_else(|| {
        RagError::config("models.query_model is required (or set OLLAMA_QUERY_MODEL)")
    })?;
    let models = ModelConfig::new(
        embedding_model,
        query_model,
        raw.models
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
    )?;

    let chunk_defaults = ChunkingConfig::default();
    let chunking = ChunkingConfig::new(
        raw.chunking
            .chunk_size
            .unwrap_or(chunk_defaults.chunk_size()),
        raw.chunking
            .chunk_overlap
            .unwrap_or(chunk_defaults.chunk_overlap()),
    )?;

    let retrieval_defaults = RetrievalConfig::default();
    let retrieval = RetrievalConfig::new(
        raw.retrieval.top_k.unwrap_or(retrieval_defaults.top_k()),
        raw.retrieval
            .min_similarity
            .unwrap_or(retrieval_defaults.min_similarity()),
    )?;

    let vector_db = VectorDbConfig::new(
        raw.vector_db
            .collection_name
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
    )?;

    let service_defaults = ServiceConfig::default();
    let service = ServiceConfig {
        timeout_secs: raw
            .service
            .timeout_secs
            .unwrap_or(service_defaults.timeout_secs),
        check_timeout_secs: raw
            .service
            .check_timeout_secs
            .unwrap_or(service_defaults.check_timeout_secs),
        max_retries: raw
            .service
            .max_retries
            .unwrap_or(service_defaults.max_retries),
    };
    if service.timeout_secs == 0 || service.check_timeout_secs == 0 {
        return Err(RagError::config("service timeouts must be > 0"));
    }

    Ok(Config {
        db: DbConfig {
            path: raw
                .db
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
        },
        models,
        chunking,
        retrieval,
        vector_db,
        service,
    })
}
