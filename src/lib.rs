//! # mdrag
//!
//! A local retrieval-augmented question answering tool for Markdown notes.
//!
//! mdrag splits Markdown files into overlapping chunks, embeds them through
//! an Ollama model service, and keeps them in a SQLite-backed vector store.
//! Questions are answered by retrieving the closest chunks and handing them
//! to a generation model as context.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Markdown  │──▶│ Chunk+Dedup  │──▶│  SQLite   │
//! │  files     │   │   +Embed     │   │  vectors  │
//! └────────────┘   └──────────────┘   └────┬─────┘
//!                                          │
//!                  ┌──────────┐      ┌─────▼─────┐
//!                  │  Ollama  │◀─────│  Query    │
//!                  │ generate │      │ retriever │
//!                  └──────────┘      └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OLLAMA_EMBEDDING_MODEL=nomic-embed-text
//! export OLLAMA_QUERY_MODEL=llama3.2
//! mdrag process ./notes
//! mdrag query "How do I rotate the API keys?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`models`] | Core data types |
//! | [`chunk`] | Recursive character chunking |
//! | [`ollama`] | Model service client |
//! | [`embedding`] | Embedding provider and model checks |
//! | [`store`] | SQLite vector store |
//! | [`dedup`] | Exact-match chunk deduplication |
//! | [`retriever`] | Top-k retrieval with a similarity floor |
//! | [`ingest`] | File and batch ingestion |
//! | [`query`] | Retrieval-augmented answering |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod ollama;
pub mod query;
pub mod retriever;
pub mod store;
