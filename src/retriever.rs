//! Scoped semantic search over the project's vector index.
//!
//! The query text is embedded, then the index is asked for the nearest
//! `limit` points restricted to the `(user, project)` scope. Each upstream
//! call is retried with backoff on transient failures. When retries are
//! exhausted, or on any permanent error, the search fails closed and
//! returns an empty list so the answering loop keeps going.

use anyhow::Result;
use rfp_harness_core::embedding::EmbeddingProvider;
use rfp_harness_core::models::{MatchPoint, Scope};
use rfp_harness_core::store::VectorIndex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::retry::{with_backoff, BackoffPolicy};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    backoff: BackoffPolicy,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            embedder,
            index,
            backoff,
        }
    }

    /// Up to `limit` matches in `scope`, most relevant first. Never errors.
    pub async fn search(&self, query: &str, scope: Scope, limit: usize) -> Vec<MatchPoint> {
        match self.try_search(query, scope, limit).await {
            Ok(matches) => {
                debug!(%scope, limit, hits = matches.len(), "vector search");
                matches
            }
            Err(e) => {
                warn!(%scope, limit, "vector search failed, continuing without context: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn try_search(&self, query: &str, scope: Scope, limit: usize) -> Result<Vec<MatchPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let texts = [query.to_string()];
        let texts = &texts[..];
        let embedder = self.embedder.as_ref();
        let vectors =
            with_backoff(self.backoff, "query embedding", move || embedder.embed(texts)).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let index = self.index.as_ref();
        let query_vec = &query_vec[..];
        let mut matches = with_backoff(self.backoff, "vector search", move || {
            index.nearest_neighbors(query_vec, scope, limit)
        })
        .await?;
        matches.truncate(limit);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rfp_harness_core::error::UpstreamError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FixedEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Fails with a rate limit `failures` times, then returns `hits` points.
    struct FlakyIndex {
        failures: u32,
        calls: AtomicU32,
        hits: usize,
        seen: std::sync::Mutex<Vec<(Scope, usize)>>,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn nearest_neighbors(
            &self,
            _query_vec: &[f32],
            scope: Scope,
            k: usize,
        ) -> Result<Vec<MatchPoint>> {
            self.seen.lock().unwrap().push((scope, k));
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(UpstreamError::RateLimited {
                    service: "index".into(),
                    message: "busy".into(),
                }
                .into());
            }
            Ok((0..self.hits)
                .map(|i| MatchPoint {
                    vector_id: format!("v{}", i),
                    file_id: Some(1),
                    user_id: Some(scope.user_id),
                    chunk_number: Some(i as i64 + 1),
                    distance: 0.9,
                })
                .collect())
        }
    }

    fn flaky(failures: u32, hits: usize) -> Arc<FlakyIndex> {
        Arc::new(FlakyIndex {
            failures,
            calls: AtomicU32::new(0),
            hits,
            seen: std::sync::Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn passes_scope_and_limit_and_truncates() {
        let index = flaky(0, 10);
        let r = Retriever::new(Arc::new(FixedEmbedder), index.clone(), BackoffPolicy::none());
        let scope = Scope::new(4, 9);
        let hits = r.search("uptime sla", scope, 3).await;
        assert_eq!(hits.len(), 3);
        assert_eq!(index.seen.lock().unwrap()[0], (scope, 3));
    }

    #[tokio::test]
    async fn retries_transient_index_failures() {
        let index = flaky(2, 1);
        let r = Retriever::new(
            Arc::new(FixedEmbedder),
            index.clone(),
            BackoffPolicy::new(5, Duration::ZERO),
        );
        assert_eq!(r.search("q", Scope::new(1, 1), 3).await.len(), 1);
        assert_eq!(index.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fails_closed_after_retries() {
        let index = flaky(10, 1);
        let r = Retriever::new(
            Arc::new(FixedEmbedder),
            index.clone(),
            BackoffPolicy::new(5, Duration::ZERO),
        );
        assert!(r.search("q", Scope::new(1, 1), 3).await.is_empty());
        assert_eq!(index.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn disabled_embedder_fails_closed() {
        let index = flaky(0, 1);
        let r = Retriever::new(
            Arc::new(crate::embedding::DisabledProvider),
            index.clone(),
            BackoffPolicy::none(),
        );
        assert!(r.search("q", Scope::new(1, 1), 3).await.is_empty());
        assert_eq!(index.calls.load(Ordering::SeqCst), 0);
    }
}
