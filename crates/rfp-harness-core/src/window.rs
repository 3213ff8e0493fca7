//! Context window assembly around nearest-neighbour matches.
//!
//! Each match is widened into a contiguous run of chunks from the same file:
//! `[max(1, n - WINDOW_BEFORE), n + WINDOW_AFTER]`, joined with blank lines
//! and labelled with the file's display name. At most one window is emitted
//! per file per call; the first (best-ranked) match for a file wins.

use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use crate::models::{ContextWindow, MatchPoint};
use crate::store::Store;

/// Chunks included before the matched chunk.
pub const WINDOW_BEFORE: i64 = 4;
/// Chunks included after the matched chunk.
pub const WINDOW_AFTER: i64 = 3;

/// Inclusive chunk range for a match at `chunk_number`, clipped at 1.
pub fn window_bounds(chunk_number: i64) -> (i64, i64) {
    let start = (chunk_number - WINDOW_BEFORE).max(1);
    let end = chunk_number + WINDOW_AFTER;
    (start, end)
}

/// Expand `matches` into deduplicated context windows.
///
/// Matches missing any of `file_id`, `user_id` or `chunk_number` are skipped,
/// as are matches whose range holds no stored chunks or whose file has no
/// resolvable display name. Chunk lookup errors propagate; the caller decides
/// how to degrade.
pub async fn assemble_windows(
    store: &dyn Store,
    matches: &[MatchPoint],
) -> Result<Vec<ContextWindow>> {
    let mut processed_files: HashSet<i64> = HashSet::new();
    let mut windows = Vec::new();

    for point in matches {
        let (file_id, user_id, chunk_number) =
            match (point.file_id, point.user_id, point.chunk_number) {
                (Some(f), Some(u), Some(c)) => (f, u, c),
                _ => {
                    debug!(vector_id = %point.vector_id, "skipping match with incomplete metadata");
                    continue;
                }
            };

        if processed_files.contains(&file_id) {
            continue;
        }

        let (start, end) = window_bounds(chunk_number);
        let chunks = store.chunks_in_range(file_id, user_id, start, end).await?;
        if chunks.is_empty() {
            debug!(file_id, start, end, "no stored chunks in window");
            continue;
        }

        let source = match store.file_display_name(file_id, user_id).await {
            Ok(name) => name,
            Err(e) => {
                debug!(file_id, "skipping window without a source label: {:#}", e);
                continue;
            }
        };
        let text = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        windows.push(ContextWindow { source, text });
        processed_files.insert(file_id);
    }

    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkText, FileRecord, Scope};
    use crate::store::memory::InMemoryStore;

    fn point(file_id: Option<i64>, user_id: Option<i64>, chunk: Option<i64>) -> MatchPoint {
        MatchPoint {
            vector_id: "v".to_string(),
            file_id,
            user_id,
            chunk_number: chunk,
            distance: 0.9,
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("chunk {}", i)).collect()
    }

    #[test]
    fn bounds_span_eight_chunks() {
        assert_eq!(window_bounds(10), (6, 13));
    }

    #[test]
    fn bounds_clip_at_one() {
        assert_eq!(window_bounds(2), (1, 5));
        assert_eq!(window_bounds(1), (1, 4));
    }

    #[tokio::test]
    async fn window_joins_range_with_blank_lines() {
        let store = InMemoryStore::new();
        let id = store.add_indexed_file(Scope::new(1, 1), "pricing.pdf", &numbered(20));

        let windows = assemble_windows(&store, &[point(Some(id), Some(1), Some(10))])
            .await
            .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].source, "pricing.pdf");
        let expected = (6..=13)
            .map(|i| format!("chunk {}", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        assert_eq!(windows[0].text, expected);
        assert_eq!(store.requested_ranges(), vec![(id, 6, 13)]);
    }

    #[tokio::test]
    async fn same_file_emits_one_window() {
        let store = InMemoryStore::new();
        let id = store.add_indexed_file(Scope::new(1, 1), "a.pdf", &numbered(30));

        let windows = assemble_windows(
            &store,
            &[
                point(Some(id), Some(1), Some(3)),
                point(Some(id), Some(1), Some(25)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(windows.len(), 1);
        assert!(windows[0].text.starts_with("chunk 1"));
    }

    #[tokio::test]
    async fn incomplete_metadata_is_skipped() {
        let store = InMemoryStore::new();
        let id = store.add_indexed_file(Scope::new(1, 1), "a.pdf", &numbered(5));

        let windows = assemble_windows(
            &store,
            &[
                point(None, Some(1), Some(2)),
                point(Some(id), None, Some(2)),
                point(Some(id), Some(1), None),
            ],
        )
        .await
        .unwrap();

        assert!(windows.is_empty());
        assert!(store.requested_ranges().is_empty());
    }

    #[tokio::test]
    async fn orphaned_reference_is_skipped_without_blocking_later_matches() {
        let store = InMemoryStore::new();
        let id = store.add_indexed_file(Scope::new(1, 1), "a.pdf", &numbered(3));

        let windows = assemble_windows(
            &store,
            &[
                point(Some(id), Some(1), Some(50)),
                point(Some(id), Some(1), Some(2)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].text, "chunk 1\n\nchunk 2\n\nchunk 3");
    }

    /// Delegates to an [`InMemoryStore`] but cannot name `unnamed`.
    struct UnlabelledFile {
        inner: InMemoryStore,
        unnamed: i64,
    }

    #[async_trait::async_trait]
    impl Store for UnlabelledFile {
        async fn project_files(&self, scope: Scope) -> Result<Vec<FileRecord>> {
            self.inner.project_files(scope).await
        }

        async fn chunks_in_range(
            &self,
            file_id: i64,
            user_id: i64,
            start: i64,
            end: i64,
        ) -> Result<Vec<ChunkText>> {
            self.inner.chunks_in_range(file_id, user_id, start, end).await
        }

        async fn file_display_name(&self, file_id: i64, user_id: i64) -> Result<String> {
            if file_id == self.unnamed {
                anyhow::bail!("file row missing: {}", file_id);
            }
            self.inner.file_display_name(file_id, user_id).await
        }
    }

    #[tokio::test]
    async fn unnamed_file_is_skipped_and_others_kept() {
        let inner = InMemoryStore::new();
        let scope = Scope::new(1, 1);
        let a = inner.add_indexed_file(scope, "a.pdf", &numbered(2));
        let b = inner.add_indexed_file(scope, "b.pdf", &numbered(2));
        let store = UnlabelledFile { inner, unnamed: a };

        let windows = assemble_windows(
            &store,
            &[point(Some(a), Some(1), Some(1)), point(Some(b), Some(1), Some(1))],
        )
        .await
        .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].source, "b.pdf");
    }

    #[tokio::test]
    async fn distinct_files_keep_match_order() {
        let store = InMemoryStore::new();
        let scope = Scope::new(1, 1);
        let a = store.add_indexed_file(scope, "a.pdf", &numbered(2));
        let b = store.add_indexed_file(scope, "b.pdf", &numbered(2));

        let windows = assemble_windows(
            &store,
            &[point(Some(b), Some(1), Some(1)), point(Some(a), Some(1), Some(1))],
        )
        .await
        .unwrap();

        let sources: Vec<&str> = windows.iter().map(|w| w.source.as_str()).collect();
        assert_eq!(sources, vec!["b.pdf", "a.pdf"]);
    }
}
