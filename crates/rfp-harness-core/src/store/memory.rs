//! In-memory [`Store`] and [`VectorIndex`] implementation for tests.
//!
//! Uses `Vec` behind `std::sync::RwLock` for thread safety. Vector search
//! is brute-force cosine similarity over every stored vector in scope.

use std::sync::{Mutex, RwLock};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{ChunkText, FileKind, FileRecord, MatchPoint, Scope};

use super::{Store, VectorIndex};

struct StoredChunk {
    vector_id: String,
    file_id: i64,
    user_id: i64,
    project_id: i64,
    chunk_number: i64,
    text: String,
    vector: Option<Vec<f32>>,
}

/// In-memory store for tests and examples.
pub struct InMemoryStore {
    files: RwLock<Vec<FileRecord>>,
    chunks: RwLock<Vec<StoredChunk>>,
    ranges: Mutex<Vec<(i64, i64, i64)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
            chunks: RwLock::new(Vec::new()),
            ranges: Mutex::new(Vec::new()),
        }
    }

    /// Register a file and return its id. Files start unindexed.
    pub fn add_file(
        &self,
        scope: Scope,
        kind: FileKind,
        name: Option<&str>,
        link: Option<&str>,
    ) -> i64 {
        let mut files = self.files.write().unwrap();
        let id = files.len() as i64 + 1;
        files.push(FileRecord {
            id,
            user_id: scope.user_id,
            project_id: scope.project_id,
            kind,
            name: name.map(str::to_string),
            link: link.map(str::to_string),
            is_indexed: false,
        });
        id
    }

    pub fn set_indexed(&self, file_id: i64, indexed: bool) {
        let mut files = self.files.write().unwrap();
        if let Some(f) = files.iter_mut().find(|f| f.id == file_id) {
            f.is_indexed = indexed;
        }
    }

    /// Store one chunk for `file_id`. The file must already be registered.
    pub fn add_chunk(
        &self,
        file_id: i64,
        chunk_number: i64,
        text: &str,
        vector: Option<Vec<f32>>,
    ) -> Result<String> {
        let scope = {
            let files = self.files.read().unwrap();
            match files.iter().find(|f| f.id == file_id) {
                Some(f) => Scope::new(f.user_id, f.project_id),
                None => bail!("unknown file: {}", file_id),
            }
        };
        Ok(self.push_chunk(file_id, scope, chunk_number, text, vector))
    }

    /// Register an indexed file whose chunks are numbered from 1.
    pub fn add_indexed_file(&self, scope: Scope, name: &str, chunks: &[String]) -> i64 {
        let id = self.add_file(scope, FileKind::File, Some(name), None);
        for (i, text) in chunks.iter().enumerate() {
            self.push_chunk(id, scope, i as i64 + 1, text, None);
        }
        self.set_indexed(id, true);
        id
    }

    fn push_chunk(
        &self,
        file_id: i64,
        scope: Scope,
        chunk_number: i64,
        text: &str,
        vector: Option<Vec<f32>>,
    ) -> String {
        let vector_id = format!("{}-{}", file_id, chunk_number);
        self.chunks.write().unwrap().push(StoredChunk {
            vector_id: vector_id.clone(),
            file_id,
            user_id: scope.user_id,
            project_id: scope.project_id,
            chunk_number,
            text: text.to_string(),
            vector,
        });
        vector_id
    }

    /// `(file_id, start, end)` of every range lookup, in call order.
    pub fn requested_ranges(&self) -> Vec<(i64, i64, i64)> {
        self.ranges.lock().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn project_files(&self, scope: Scope) -> Result<Vec<FileRecord>> {
        let files = self.files.read().unwrap();
        Ok(files
            .iter()
            .filter(|f| f.user_id == scope.user_id && f.project_id == scope.project_id)
            .cloned()
            .collect())
    }

    async fn chunks_in_range(
        &self,
        file_id: i64,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkText>> {
        self.ranges.lock().unwrap().push((file_id, start, end));
        let chunks = self.chunks.read().unwrap();
        let mut found: Vec<ChunkText> = chunks
            .iter()
            .filter(|c| {
                c.file_id == file_id
                    && c.user_id == user_id
                    && c.chunk_number >= start
                    && c.chunk_number <= end
            })
            .map(|c| ChunkText {
                chunk_number: c.chunk_number,
                text: c.text.clone(),
            })
            .collect();
        found.sort_by_key(|c| c.chunk_number);
        Ok(found)
    }

    async fn file_display_name(&self, file_id: i64, user_id: i64) -> Result<String> {
        let files = self.files.read().unwrap();
        match files
            .iter()
            .find(|f| f.id == file_id && f.user_id == user_id)
        {
            Some(f) => Ok(f.display_name()),
            None => bail!("file not found: {}", file_id),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryStore {
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        scope: Scope,
        k: usize,
    ) -> Result<Vec<MatchPoint>> {
        let chunks = self.chunks.read().unwrap();
        let mut hits: Vec<MatchPoint> = chunks
            .iter()
            .filter(|c| c.user_id == scope.user_id && c.project_id == scope.project_id)
            .filter_map(|c| {
                let vector = c.vector.as_ref()?;
                Some(MatchPoint {
                    vector_id: c.vector_id.clone(),
                    file_id: Some(c.file_id),
                    user_id: Some(c.user_id),
                    chunk_number: Some(c.chunk_number),
                    distance: cosine_similarity(query_vec, vector) as f64,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.distance
                .partial_cmp(&a.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::has_indexed_files;

    #[tokio::test]
    async fn range_lookup_is_ordered_and_clipped() {
        let store = InMemoryStore::new();
        let scope = Scope::new(1, 1);
        let texts: Vec<String> = (1..=5).map(|i| format!("c{}", i)).collect();
        let id = store.add_indexed_file(scope, "a.txt", &texts);

        let got = store.chunks_in_range(id, 1, 2, 4).await.unwrap();
        let numbers: Vec<i64> = got.iter().map(|c| c.chunk_number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
        assert_eq!(store.requested_ranges(), vec![(id, 2, 4)]);
    }

    #[tokio::test]
    async fn range_lookup_respects_owner() {
        let store = InMemoryStore::new();
        let id = store.add_indexed_file(Scope::new(1, 1), "a.txt", &["x".to_string()]);
        assert!(store.chunks_in_range(id, 2, 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn indexed_files_are_scoped() {
        let store = InMemoryStore::new();
        let scope = Scope::new(1, 1);
        store.add_file(scope, FileKind::File, Some("pending.pdf"), None);
        assert!(!has_indexed_files(&store, scope).await.unwrap());

        store.add_indexed_file(Scope::new(1, 2), "other.pdf", &["x".to_string()]);
        assert!(!has_indexed_files(&store, scope).await.unwrap());

        store.add_indexed_file(scope, "ready.pdf", &["y".to_string()]);
        assert!(has_indexed_files(&store, scope).await.unwrap());
    }

    #[tokio::test]
    async fn nearest_neighbors_ranks_by_similarity_within_scope() {
        let store = InMemoryStore::new();
        let scope = Scope::new(1, 1);
        let id = store.add_file(scope, FileKind::File, Some("a.txt"), None);
        store.add_chunk(id, 1, "far", Some(vec![0.0, 1.0])).unwrap();
        store.add_chunk(id, 2, "near", Some(vec![1.0, 0.1])).unwrap();
        let other = store.add_file(Scope::new(2, 1), FileKind::File, Some("b.txt"), None);
        store.add_chunk(other, 1, "foreign", Some(vec![1.0, 0.0])).unwrap();

        let hits = store.nearest_neighbors(&[1.0, 0.0], scope, 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_number, Some(2));
        assert!(hits.iter().all(|h| h.user_id == Some(1)));
    }

    #[tokio::test]
    async fn display_name_unknown_file_errors() {
        let store = InMemoryStore::new();
        assert!(store.file_display_name(99, 1).await.is_err());
    }
}
