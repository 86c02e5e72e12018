//! # mdrag CLI
//!
//! The `mdrag` binary ingests Markdown files into a local vector store and
//! answers questions against it.
//!
//! ## Usage
//!
//! ```bash
//! mdrag --config ./config/mdrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mdrag process <path>` | Chunk, embed and store a Markdown file or directory |
//! | `mdrag query "<question>"` | Answer a question from the stored chunks |
//!
//! ## Examples
//!
//! ```bash
//! # Ingest every Markdown file in ./notes into ./data/db
//! mdrag process ./notes
//!
//! # Use a different database directory and print the job as JSON
//! mdrag process ./notes/setup.md -d /tmp/rag --json
//!
//! # Ask a question
//! mdrag query "Which port does the server listen on?"
//! ```
//!
//! Model names and the service URL come from `[models]` in the config file
//! or from `OLLAMA_EMBEDDING_MODEL`, `OLLAMA_QUERY_MODEL` and
//! `OLLAMA_BASE_URL`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mdrag::{config, ingest, query};

/// mdrag: retrieval-augmented question answering over Markdown notes.
#[derive(Parser)]
#[command(
    name = "mdrag",
    about = "mdrag: retrieval-augmented question answering over Markdown notes",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/mdrag.toml` when that file exists. Environment
    /// variables override values from the file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a Markdown file, or every Markdown file in a directory.
    ///
    /// Chunks already stored for the same file are skipped, so running
    /// this twice on unchanged input adds nothing.
    Process {
        /// A `.md` file or a directory containing `.md` files.
        path: PathBuf,

        /// Vector database directory (overrides `[db] path`).
        #[arg(short, long)]
        db_path: Option<PathBuf>,

        /// Print the processing job as JSON instead of the text summary.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question using the processed documents.
    Query {
        /// The question to answer.
        query_text: String,

        /// Vector database directory (overrides `[db] path`).
        #[arg(short, long)]
        db_path: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            path,
            db_path,
            json,
        } => {
            let db_location = db_path.unwrap_or_else(|| cfg.db.path.clone());
            let job = ingest::run_process(&cfg, &path, &db_location, json).await?;
            if job.failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Query {
            query_text,
            db_path,
        } => {
            let db_location = db_path.unwrap_or_else(|| cfg.db.path.clone());
            query::run_query(&cfg, &query_text, &db_location).await?;
        }
    }

    Ok(())
}
