//! Storage and vector index abstractions.
//!
//! [`Store`] covers the relational lookups the answering pipeline needs
//! (indexed files, chunk ranges, display names). [`VectorIndex`] covers
//! scoped nearest-neighbour search. Both are consumed through these narrow
//! contracts so the pipeline can run against SQLite, an in-memory store, or
//! a test double.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChunkText, FileRecord, MatchPoint, Scope};

/// Relational lookups used by the answering pipeline.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`project_files`](Store::project_files) | Files registered in a scope |
/// | [`chunks_in_range`](Store::chunks_in_range) | Ordered chunk texts in `[start, end]` |
/// | [`file_display_name`](Store::file_display_name) | Source label for a file |
#[async_trait]
pub trait Store: Send + Sync {
    /// All files registered in `scope`, indexed or not.
    async fn project_files(&self, scope: Scope) -> Result<Vec<FileRecord>>;

    /// Chunks of `file_id` owned by `user_id` with `start <= chunk_number <= end`,
    /// ascending by chunk number.
    async fn chunks_in_range(
        &self,
        file_id: i64,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkText>>;

    /// Link for crawled pages, filename otherwise. Errors if the file is unknown.
    async fn file_display_name(&self, file_id: i64, user_id: i64) -> Result<String>;
}

/// Scoped nearest-neighbour search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` points owned by exactly `scope`, most relevant first.
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        scope: Scope,
        k: usize,
    ) -> Result<Vec<MatchPoint>>;
}

/// Whether `scope` has at least one indexed file.
pub async fn has_indexed_files(store: &dyn Store, scope: Scope) -> Result<bool> {
    let files = store.project_files(scope).await?;
    Ok(files.iter().any(|f| f.is_indexed))
}
