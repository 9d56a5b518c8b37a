//! Vector store for canonical decision texts
//!
//! Points live in SQLite with the embedding stored as a little-endian f32
//! BLOB. Queries rank every stored point by cosine similarity in process;
//! the corpus is one point per decision, so a brute-force scan is enough.

use crate::embeddings::cosine_similarity;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Payload stored alongside every vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPayload {
    pub decision_id: String,
    pub canonical_text: String,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace the point with the same id
    async fn upsert(&self, point: VectorPoint) -> Result<()>;

    /// Most similar points first
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>>;

    /// Remove points by id; unknown ids are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Pre-insert check used for content-hash deduplication
    async fn exists_with_hash(&self, content_hash: &str) -> Result<bool>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS decision_vectors (
    id TEXT PRIMARY KEY,
    decision_id TEXT NOT NULL,
    canonical_text TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_vectors_hash ON decision_vectors(content_hash);
"#;

/// SQLite-backed [`VectorStore`]
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteVectorStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open vector store at {:?}", path))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("vector store connection poisoned"))
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM decision_vectors", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, point: VectorPoint) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO decision_vectors
             (id, decision_id, canonical_text, content_hash, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                point.id,
                point.payload.decision_id,
                point.payload.canonical_text,
                point.payload.content_hash,
                to_blob(&point.vector),
            ],
        )?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPoint>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, decision_id, canonical_text, content_hash, embedding FROM decision_vectors",
        )?;

        let rows = stmt.query_map([], |row| {
            let blob: Vec<u8> = row.get(4)?;
            Ok((
                row.get::<_, String>(0)?,
                VectorPayload {
                    decision_id: row.get(1)?,
                    canonical_text: row.get(2)?,
                    content_hash: row.get(3)?,
                },
                blob,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, payload, blob) = row?;
            let stored = from_blob(&blob);
            if stored.len() != vector.len() {
                tracing::warn!(point = %id, "skipping vector with mismatched dimension");
                continue;
            }
            results.push(ScoredPoint {
                id,
                score: cosine_similarity(vector, &stored),
                payload,
            });
        }

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM decision_vectors WHERE id = ?1", [id])?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn exists_with_hash(&self, content_hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM decision_vectors WHERE content_hash = ?1 LIMIT 1",
                [content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn from_blob(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
