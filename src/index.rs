//! Persistent vector index.
//!
//! Entries (vector, chunk text, metadata) live in a SQLite database inside
//! a named directory. The index is create-or-load: [`VectorIndex::load`]
//! attaches to an existing database and refuses to invent one,
//! [`VectorIndex::create_or_load`] creates it on first use. Appends are
//! strictly additive; ingestion happens incrementally across many source
//! documents and must never discard prior entries.
//!
//! Retrieval is a brute-force cosine scan over all rows. Fine at this
//! scale; an ANN structure is an extension point, not a requirement.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::models::RetrievedChunk;

const DB_FILE: &str = "index.sqlite";

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    fn db_path(dir: &Path) -> PathBuf {
        dir.join(DB_FILE)
    }

    /// Attach to a previously persisted index. Returns `Ok(None)` when no
    /// index exists at `dir`.
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        if !Self::db_path(dir).exists() {
            return Ok(None);
        }
        Ok(Some(Self::open(dir, false).await?))
    }

    /// Open the index at `dir`, creating directory, database, and schema
    /// as needed.
    pub async fn create_or_load(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::open(dir, true).await
    }

    async fn open(dir: &Path, create: bool) -> Result<Self> {
        let db_path = Self::db_path(dir);
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(create)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        // Idempotent schema creation.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                digest TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Whether a document with this content digest has been indexed.
    pub async fn document_indexed(&self, digest: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE digest = ?")
            .bind(digest)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Append chunk entries. `texts`, `vectors`, and `metadatas` are
    /// parallel; prior entries are untouched.
    pub async fn append(
        &self,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[serde_json::Value],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        Self::insert_entries(&mut tx, texts, vectors, metadatas).await?;
        tx.commit().await?;
        Ok(texts.len() as u64)
    }

    /// Append a document's chunk entries and record its content digest in
    /// the same transaction. The digest only persists when every entry
    /// does, so a failure partway through leaves the document eligible for
    /// re-ingestion.
    pub async fn append_document(
        &self,
        digest: &str,
        source: &str,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[serde_json::Value],
    ) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        Self::insert_entries(&mut tx, texts, vectors, metadatas).await?;
        sqlx::query("INSERT OR IGNORE INTO documents (digest, source, created_at) VALUES (?, ?, ?)")
            .bind(digest)
            .bind(source)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(texts.len() as u64)
    }

    async fn insert_entries(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        texts: &[String],
        vectors: &[Vec<f32>],
        metadatas: &[serde_json::Value],
    ) -> Result<()> {
        if texts.len() != vectors.len() || texts.len() != metadatas.len() {
            bail!(
                "append arity mismatch: {} texts, {} vectors, {} metadatas",
                texts.len(),
                vectors.len(),
                metadatas.len()
            );
        }

        let now = chrono::Utc::now().timestamp();
        for ((text, vector), metadata) in texts.iter().zip(vectors).zip(metadatas) {
            sqlx::query(
                "INSERT INTO entries (id, text, vector, metadata_json, created_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(text)
            .bind(vec_to_blob(vector))
            .bind(metadata.to_string())
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// The `k` nearest entries to `query` by cosine similarity, best first.
    pub async fn retrieve(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query("SELECT text, vector, metadata_json FROM entries")
            .fetch_all(&self.pool)
            .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| {
                let text: String = row.get("text");
                let blob: Vec<u8> = row.get("vector");
                let metadata_json: String = row.get("metadata_json");
                let metadata = serde_json::from_str(&metadata_json)
                    .unwrap_or(serde_json::Value::Null);
                RetrievedChunk {
                    score: cosine_similarity(query, &blob_to_vec(&blob)),
                    text,
                    metadata,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_basic_properties() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn load_returns_none_without_persisted_index() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(VectorIndex::load(tmp.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_is_additive_across_opens() {
        let tmp = tempfile::tempdir().unwrap();

        let index = VectorIndex::create_or_load(tmp.path()).await.unwrap();
        index
            .append(
                &["alpha".to_string()],
                &[vec![1.0, 0.0]],
                &[serde_json::json!({"source": "doc_0"})],
            )
            .await
            .unwrap();
        index.close().await;

        let index = VectorIndex::load(tmp.path()).await.unwrap().unwrap();
        index
            .append(
                &["beta".to_string()],
                &[vec![0.0, 1.0]],
                &[serde_json::json!({"source": "doc_1"})],
            )
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 2);
        index.close().await;
    }

    #[tokio::test]
    async fn digest_is_recorded_with_its_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let index = VectorIndex::create_or_load(tmp.path()).await.unwrap();
        assert!(!index.document_indexed("abc123").await.unwrap());

        index
            .append_document(
                "abc123",
                "a.txt",
                &["alpha".to_string()],
                &[vec![1.0, 0.0]],
                &[serde_json::json!({"source": "a.txt"})],
            )
            .await
            .unwrap();
        assert!(index.document_indexed("abc123").await.unwrap());
        assert!(!index.document_indexed("def456").await.unwrap());
        assert_eq!(index.count().await.unwrap(), 1);
        index.close().await;
    }

    #[tokio::test]
    async fn failed_append_does_not_record_the_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let index = VectorIndex::create_or_load(tmp.path()).await.unwrap();

        // Arity mismatch fails before anything commits.
        let result = index
            .append_document("abc123", "a.txt", &["alpha".to_string()], &[], &[])
            .await;
        assert!(result.is_err());
        assert!(!index.document_indexed("abc123").await.unwrap());
        assert_eq!(index.count().await.unwrap(), 0);
        index.close().await;
    }

    #[tokio::test]
    async fn retrieve_orders_by_similarity() {
        let tmp = tempfile::tempdir().unwrap();
        let index = VectorIndex::create_or_load(tmp.path()).await.unwrap();
        index
            .append(
                &["east".to_string(), "north".to_string(), "northeast".to_string()],
                &[
                    vec![1.0, 0.0],
                    vec![0.0, 1.0],
                    vec![0.7, 0.7],
                ],
                &[
                    serde_json::json!({"source": "doc_0"}),
                    serde_json::json!({"source": "doc_1"}),
                    serde_json::json!({"source": "doc_2"}),
                ],
            )
            .await
            .unwrap();

        let results = index.retrieve(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "east");
        assert_eq!(results[1].text, "northeast");
        assert!(results[0].score >= results[1].score);
        index.close().await;
    }
}
