//! Document ingestion: files and crawled pages into the project index.
//!
//! ```text
//! register file row ──▶ read text ──▶ chunk_text() ──▶ embed (batched, retried)
//!                                                        │
//!        mark indexed ◀── replace chunks + vectors ◀─────┘
//! ```
//!
//! A file row exists as soon as ingestion starts. Any failure afterwards
//! stamps `index_failed_at` and leaves the file unindexed, so answering
//! never retrieves half-written content.

use anyhow::{Context, Result};
use rfp_harness_core::embedding::EmbeddingProvider;
use rfp_harness_core::models::{FileKind, Scope};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::retry::{with_backoff, BackoffPolicy};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub file_id: i64,
    pub chunks: usize,
}

pub struct Ingestor {
    store: SqliteStore,
    embedder: Arc<dyn EmbeddingProvider>,
    backoff: BackoffPolicy,
    max_tokens: usize,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(
        store: SqliteStore,
        embedder: Arc<dyn EmbeddingProvider>,
        backoff: BackoffPolicy,
        max_tokens: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            backoff,
            max_tokens,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(
        store: SqliteStore,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &Config,
    ) -> Self {
        let backoff = BackoffPolicy::new(
            config.retry.search_max_attempts,
            config.retry.search_base_delay(),
        );
        Self::new(
            store,
            embedder,
            backoff,
            config.chunking.max_tokens,
            config.embedding.batch_size,
        )
    }

    /// Index a UTF-8 text file under its file name.
    pub async fn ingest_file(&self, scope: Scope, path: &Path) -> Result<IngestReport> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        let file_id = self
            .store
            .insert_file(scope, FileKind::File, Some(&name), None)
            .await?;

        let text = match std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))
        {
            Ok(text) => text,
            Err(e) => {
                self.store.mark_index_failed(file_id).await?;
                return Err(e);
            }
        };

        self.index(file_id, scope, &text).await
    }

    /// Index a crawled page. `text` is the page content as fetched by the crawler.
    pub async fn add_website(&self, scope: Scope, url: &str, text: &str) -> Result<IngestReport> {
        let file_id = self
            .store
            .insert_file(scope, FileKind::Website, Some(url), Some(url))
            .await?;
        self.index(file_id, scope, text).await
    }

    async fn index(&self, file_id: i64, scope: Scope, text: &str) -> Result<IngestReport> {
        self.store.mark_index_started(file_id).await?;

        match self.write_chunks(file_id, scope, text).await {
            Ok(chunks) => {
                self.store.mark_indexed(file_id).await?;
                info!(file_id, chunks, %scope, "file indexed");
                Ok(IngestReport { file_id, chunks })
            }
            Err(e) => {
                warn!(file_id, %scope, "indexing failed: {:#}", e);
                self.store.mark_index_failed(file_id).await?;
                Err(e)
            }
        }
    }

    async fn write_chunks(&self, file_id: i64, scope: Scope, text: &str) -> Result<usize> {
        let chunks = chunk_text(text, self.max_tokens);
        if chunks.is_empty() {
            anyhow::bail!("no text to index");
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let texts = &texts[..];
            let embedder = self.embedder.as_ref();
            let embedded =
                with_backoff(self.backoff, "chunk embedding", move || embedder.embed(texts))
                    .await?;
            if embedded.len() != batch.len() {
                anyhow::bail!(
                    "embedding provider returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                );
            }
            vectors.extend(embedded);
        }

        self.store
            .replace_chunks(file_id, scope, &chunks, &vectors)
            .await?;
        Ok(chunks.len())
    }
}
