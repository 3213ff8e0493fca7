//! SQLite-backed [`Store`] and [`VectorIndex`].
//!
//! Files, chunks, and RFP runs live in the tables created by
//! [`run_migrations`](crate::migrate::run_migrations). Vector search is
//! brute-force cosine similarity over the scope's stored embeddings, which
//! is adequate for per-project corpora.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rfp_harness_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use rfp_harness_core::models::{ChunkText, FileKind, FileRecord, MatchPoint, Scope};
use rfp_harness_core::store::{Store, VectorIndex};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::chunk::Chunk;

/// Lifecycle of an RFP run in the `rfps` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfpStatus {
    Processing,
    Completed,
    Failed,
}

impl RfpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RfpStatus::Processing => "processing",
            RfpStatus::Completed => "completed",
            RfpStatus::Failed => "failed",
        }
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a file in `scope` and return its id. The file starts unindexed.
    pub async fn insert_file(
        &self,
        scope: Scope,
        kind: FileKind,
        name: Option<&str>,
        link: Option<&str>,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO files (user_id, project_id, kind, name, link, is_indexed, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.project_id)
        .bind(kind.as_str())
        .bind(name)
        .bind(link)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn mark_index_started(&self, file_id: i64) -> Result<()> {
        sqlx::query("UPDATE files SET index_started_at = ?, index_failed_at = NULL WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_indexed(&self, file_id: i64) -> Result<()> {
        sqlx::query("UPDATE files SET is_indexed = 1, index_completed_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_index_failed(&self, file_id: i64) -> Result<()> {
        sqlx::query("UPDATE files SET is_indexed = 0, index_failed_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace every chunk of `file_id` with `chunks`, attaching `vectors`
    /// positionally. Returns the new vector ids in chunk order.
    pub async fn replace_chunks(
        &self,
        file_id: i64,
        scope: Scope,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<Vec<String>> {
        if !vectors.is_empty() && vectors.len() != chunks.len() {
            bail!(
                "embedding count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            );
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let vector_id = Uuid::new_v4().to_string();
            let blob = vectors.get(i).map(|v| vec_to_blob(v));
            sqlx::query(
                r#"
                INSERT INTO chunks (vector_id, file_id, user_id, project_id, chunk_number, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&vector_id)
            .bind(file_id)
            .bind(scope.user_id)
            .bind(scope.project_id)
            .bind(chunk.chunk_number)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
            ids.push(vector_id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Delete a file and its chunks. Returns false when no such file exists
    /// for `user_id`.
    pub async fn delete_file(&self, file_id: i64, user_id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE file_id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every file, chunk, and RFP run in `scope`. Returns the number
    /// of files removed.
    pub async fn delete_project(&self, scope: Scope) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE user_id = ? AND project_id = ?")
            .bind(scope.user_id)
            .bind(scope.project_id)
            .execute(&mut *tx)
            .await?;
        let files = sqlx::query("DELETE FROM files WHERE user_id = ? AND project_id = ?")
            .bind(scope.user_id)
            .bind(scope.project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM rfps WHERE user_id = ? AND project_id = ?")
            .bind(scope.user_id)
            .bind(scope.project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(files.rows_affected())
    }

    pub async fn chunk_count(&self, file_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE file_id = ?")
            .bind(file_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn insert_rfp(
        &self,
        scope: Scope,
        name: &str,
        original_path: &str,
        session_id: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO rfps (user_id, project_id, name, session_id, status, original_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.project_id)
        .bind(name)
        .bind(session_id)
        .bind(RfpStatus::Processing.as_str())
        .bind(original_path)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Record a terminal status. `processed_path` is kept when `None`.
    pub async fn set_rfp_status(
        &self,
        rfp_id: i64,
        status: RfpStatus,
        processed_path: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rfps
            SET status = ?, processed_path = COALESCE(?, processed_path), completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(processed_path)
        .bind(chrono::Utc::now().timestamp())
        .bind(rfp_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn rfp_status(&self, rfp_id: i64) -> Result<Option<String>> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM rfps WHERE id = ?")
            .bind(rfp_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }
}

fn file_from_row(row: &SqliteRow) -> FileRecord {
    let kind: String = row.get("kind");
    let is_indexed: i64 = row.get("is_indexed");
    FileRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        kind: FileKind::parse(&kind).unwrap_or(FileKind::File),
        name: row.get("name"),
        link: row.get("link"),
        is_indexed: is_indexed != 0,
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn project_files(&self, scope: Scope) -> Result<Vec<FileRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, project_id, kind, name, link, is_indexed
            FROM files
            WHERE user_id = ? AND project_id = ?
            ORDER BY id
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(file_from_row).collect())
    }

    async fn chunks_in_range(
        &self,
        file_id: i64,
        user_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<ChunkText>> {
        let rows = sqlx::query(
            r#"
            SELECT chunk_number, text
            FROM chunks
            WHERE file_id = ? AND user_id = ? AND chunk_number >= ? AND chunk_number <= ?
            ORDER BY chunk_number
            "#,
        )
        .bind(file_id)
        .bind(user_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkText {
                chunk_number: row.get("chunk_number"),
                text: row.get("text"),
            })
            .collect())
    }

    async fn file_display_name(&self, file_id: i64, user_id: i64) -> Result<String> {
        let row = sqlx::query(
            "SELECT id, user_id, project_id, kind, name, link, is_indexed FROM files WHERE id = ? AND user_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(file_from_row(&row).display_name()),
            None => bail!("file not found: {}", file_id),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    async fn nearest_neighbors(
        &self,
        query_vec: &[f32],
        scope: Scope,
        k: usize,
    ) -> Result<Vec<MatchPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT vector_id, file_id, user_id, chunk_number, embedding
            FROM chunks
            WHERE user_id = ? AND project_id = ? AND embedding IS NOT NULL
            "#,
        )
        .bind(scope.user_id)
        .bind(scope.project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut hits: Vec<MatchPoint> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                MatchPoint {
                    vector_id: row.get("vector_id"),
                    file_id: Some(row.get("file_id")),
                    user_id: Some(row.get("user_id")),
                    chunk_number: Some(row.get("chunk_number")),
                    distance: cosine_similarity(query_vec, &vec) as f64,
                }
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
