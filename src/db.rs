//! SQLite connection management for the vector database directory.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File created inside the database directory.
pub const DB_FILE_NAME: &str = "vectors.sqlite";

pub fn db_file(location: &Path) -> PathBuf {
    location.join(DB_FILE_NAME)
}

/// Open (creating if needed) the database stored under `location`.
pub async fn connect(location: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(location).with_context(|| {
        format!(
            "Failed to create database directory: {}",
            location.display()
        )
    })?;

    open_pool(&db_file(location), true).await
}

/// Open the database under `location` only if its file already exists.
///
/// Returns `Ok(None)` when nothing has been written there yet, so read-only
/// callers never create files.
pub async fn connect_existing(location: &Path) -> Result<Option<SqlitePool>> {
    let db_path = db_file(location);
    if !db_path.is_file() {
        return Ok(None);
    }
    open_pool(&db_path, false).await.map(Some)
}

async fn open_pool(db_path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open vector database: {}", db_path.display()))?;

    Ok(pool)
}
