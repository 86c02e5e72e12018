//! Exact-match chunk deduplication.
//!
//! A chunk is skipped when the store already holds the identical text for
//! the same source file, or when an identical chunk was already staged from
//! the same file in this run. Near-duplicates and cross-file duplicates are
//! kept.

use std::collections::HashSet;

use crate::models::ChunkMetadata;
use crate::store::VectorStore;

/// Chunks that should be inserted, plus how many were skipped.
#[derive(Debug, Default)]
pub struct Partition {
    pub contents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub skipped: usize,
}

impl Partition {
    pub fn staged(&self) -> usize {
        self.contents.len()
    }
}

/// Split `chunks` into new chunks to insert and duplicates to skip.
///
/// Staged chunks keep the index they had in the file's chunk sequence.
pub async fn partition_chunks(
    store: &dyn VectorStore,
    source_file: &str,
    chunks: Vec<String>,
) -> Partition {
    let mut partition = Partition::default();
    let mut seen: HashSet<String> = HashSet::new();

    for (index, content) in chunks.into_iter().enumerate() {
        if seen.contains(&content) || store.exists(source_file, &content).await {
            partition.skipped += 1;
            continue;
        }

        seen.insert(content.clone());
        partition.metadatas.push(ChunkMetadata {
            source_file: source_file.to_string(),
            chunk_index: index as i64,
        });
        partition.contents.push(content);
    }

    partition
}
