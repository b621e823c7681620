//! Embedding store
//!
//! Persists chunk embeddings in sqlite keyed by (collection, chunk_id),
//! alongside flattened scalar metadata: list-valued fields are comma-joined
//! on write and split on read. Content hashes let re-ingestion skip
//! re-embedding unchanged chunks.

use crate::chunk::Chunk;
use crate::error::Result;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Cosine similarity between two vectors; 0.0 for mismatched or zero inputs
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
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// SHA-256 hex digest of chunk content
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

fn join_list(values: &[String]) -> String {
    values.join(",")
}

fn split_list(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(',').map(str::to_string).collect()
    }
}

/// One stored embedding with the metadata subset needed for filtering
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub embedding: Vec<f32>,
    pub article_num: Option<u32>,
    pub section_num: Option<u32>,
    pub doc_type: String,
    pub urgency_tier: String,
    pub topics: Vec<String>,
    pub applies_to: Vec<String>,
}

/// Sqlite-backed embedding store, one row per (collection, chunk_id)
pub struct EmbeddingStore {
    conn: Connection,
}

impl EmbeddingStore {
    /// Open (or create) the store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                collection TEXT NOT NULL,
                chunk_id TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                dims INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                article_num INTEGER,
                section_num INTEGER,
                doc_type TEXT NOT NULL DEFAULT 'cba',
                urgency_tier TEXT NOT NULL DEFAULT 'standard',
                topics TEXT NOT NULL DEFAULT '',
                applies_to TEXT NOT NULL DEFAULT 'all',
                PRIMARY KEY (collection, chunk_id)
            );
            CREATE INDEX IF NOT EXISTS idx_embeddings_collection
                ON embeddings(collection);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace the embedding for a chunk
    pub fn upsert(
        &self,
        collection: &str,
        chunk: &Chunk,
        model: &str,
        embedding: &[f32],
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings
                (collection, chunk_id, content_hash, model, dims, embedding,
                 article_num, section_num, doc_type, urgency_tier, topics, applies_to)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                collection,
                chunk.chunk_id,
                hash_content(&chunk.content),
                model,
                embedding.len() as i64,
                embedding_to_blob(embedding),
                chunk.article_num,
                chunk.section_num,
                chunk.doc_type.to_string(),
                chunk.urgency_tier(),
                join_list(&chunk.topics),
                join_list(&chunk.applies_to),
            ],
        )?;
        Ok(())
    }

    /// Stored content hash for a chunk, if any (drives re-embed skipping)
    pub fn content_hash(&self, collection: &str, chunk_id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_hash FROM embeddings WHERE collection = ?1 AND chunk_id = ?2")?;
        let mut rows = stmt.query(params![collection, chunk_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    /// Load every embedding in a collection
    pub fn load_collection(&self, collection: &str) -> Result<Vec<EmbeddingRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT chunk_id, embedding, article_num, section_num, doc_type,
                   urgency_tier, topics, applies_to
            FROM embeddings
            WHERE collection = ?1
            ORDER BY chunk_id
            "#,
        )?;

        let records = stmt
            .query_map(params![collection], |row| {
                let blob: Vec<u8> = row.get(1)?;
                Ok(EmbeddingRecord {
                    chunk_id: row.get(0)?,
                    embedding: blob_to_embedding(&blob),
                    article_num: row.get::<_, Option<i64>>(2)?.map(|n| n as u32),
                    section_num: row.get::<_, Option<i64>>(3)?.map(|n| n as u32),
                    doc_type: row.get(4)?,
                    urgency_tier: row.get(5)?,
                    topics: split_list(&row.get::<_, String>(6)?),
                    applies_to: split_list(&row.get::<_, String>(7)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Refresh the flattened metadata for an unchanged chunk without
    /// touching its embedding
    pub fn update_metadata(&self, collection: &str, chunk: &Chunk) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE embeddings
            SET article_num = ?3, section_num = ?4, doc_type = ?5,
                urgency_tier = ?6, topics = ?7, applies_to = ?8
            WHERE collection = ?1 AND chunk_id = ?2
            "#,
            params![
                collection,
                chunk.chunk_id,
                chunk.article_num,
                chunk.section_num,
                chunk.doc_type.to_string(),
                chunk.urgency_tier(),
                join_list(&chunk.topics),
                join_list(&chunk.applies_to),
            ],
        )?;
        Ok(())
    }

    /// Drop embeddings for chunks no longer in the snapshot
    pub fn retain_chunks(&self, collection: &str, chunk_ids: &[String]) -> Result<usize> {
        let keep: std::collections::HashSet<&str> =
            chunk_ids.iter().map(String::as_str).collect();
        let mut stmt = self
            .conn
            .prepare("SELECT chunk_id FROM embeddings WHERE collection = ?1")?;
        let existing: Vec<String> = stmt
            .query_map(params![collection], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut removed = 0;
        for chunk_id in existing {
            if !keep.contains(chunk_id.as_str()) {
                removed += self.conn.execute(
                    "DELETE FROM embeddings WHERE collection = ?1 AND chunk_id = ?2",
                    params![collection, chunk_id],
                )?;
            }
        }
        Ok(removed)
    }

    /// Drop every embedding in a collection (re-ingestion)
    pub fn reset_collection(&self, collection: &str) -> Result<usize> {
        let deleted = self
            .conn
            .execute("DELETE FROM embeddings WHERE collection = ?1", params![collection])?;
        Ok(deleted)
    }

    /// Number of embeddings in a collection
    pub fn count(&self, collection: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM embeddings WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
