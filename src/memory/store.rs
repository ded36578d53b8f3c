//! SQLite-backed knowledge store
//!
//! Persists knowledge entries with deterministic hash embeddings. Search is
//! hybrid: case-insensitive substring matches rank first (so lookups stay
//! deterministic with or without useful embeddings), then remaining entries
//! are filled in by cosine similarity.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::embeddings::{embed_hash, cosine_similarity};
use super::{KnowledgeEntry, KnowledgeStore};

/// SQLite-backed knowledge store
pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    collection: String,
    embedding_dim: usize,
}

impl SqliteKnowledgeStore {
    /// Open (or create) a store at the given path
    pub async fn new<P: AsRef<Path>>(path: P, collection: &str, embedding_dim: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            collection: collection.to_string(),
            embedding_dim,
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS knowledge (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_knowledge_collection ON knowledge(collection);
            CREATE INDEX IF NOT EXISTS idx_knowledge_created ON knowledge(created_at DESC);
        "#)?;

        Ok(())
    }

    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    async fn insert(&self, text: &str, metadata: &HashMap<String, String>) -> Result<()> {
        let embedding = embed_hash(text, self.embedding_dim);
        let metadata_json = serde_json::to_string(metadata)?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO knowledge
               (id, collection, content, metadata, embedding, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                uuid::Uuid::new_v4().to_string(),
                self.collection,
                text,
                metadata_json,
                Self::embedding_to_blob(&embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(KnowledgeEntry, Vec<f32>)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            r#"SELECT id, content, metadata, embedding, created_at
               FROM knowledge WHERE collection = ?1
               ORDER BY created_at DESC"#,
        )?;

        let rows = stmt.query_map(params![self.collection], |row| {
            let id: String = row.get(0)?;
            let content: String = row.get(1)?;
            let metadata_json: String = row.get(2)?;
            let embedding_blob: Option<Vec<u8>> = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok((id, content, metadata_json, embedding_blob, created_at))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, content, metadata_json, embedding_blob, created_at) = row?;
            let metadata: HashMap<String, String> =
                serde_json::from_str(&metadata_json).unwrap_or_default();
            let embedding = embedding_blob
                .map(|b| Self::blob_to_embedding(&b))
                .unwrap_or_default();
            let created_at = created_at.parse().unwrap_or_else(|_| Utc::now());

            entries.push((
                KnowledgeEntry { id, content, metadata, created_at },
                embedding,
            ));
        }

        Ok(entries)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn upsert(&self, text: &str, metadata: HashMap<String, String>) -> Result<()> {
        self.insert(text, &metadata).await
    }

    async fn batch_upsert(&self, texts: &[String], metadata: HashMap<String, String>) -> Result<usize> {
        for text in texts {
            self.insert(text, &metadata).await?;
        }
        Ok(texts.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeEntry>> {
        let all = self.load_all().await?;
        let query_lower = query.to_lowercase();
        let query_embedding = embed_hash(query, self.embedding_dim);

        // Substring matches first (already newest-first from the query)
        let mut results: Vec<KnowledgeEntry> = Vec::new();
        let mut rest: Vec<(KnowledgeEntry, f32)> = Vec::new();

        for (entry, embedding) in all {
            if entry.content.to_lowercase().contains(&query_lower) {
                results.push(entry);
            } else {
                let score = cosine_similarity(&query_embedding, &embedding);
                rest.push((entry, score));
            }
        }

        // Fill remaining slots by similarity
        rest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (entry, _score) in rest {
            if results.len() >= k {
                break;
            }
            results.push(entry);
        }

        results.truncate(k);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_test_store() -> (TempDir, SqliteKnowledgeStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteKnowledgeStore::new(dir.path().join("memory.db"), "test", 64)
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_upsert_and_substring_search() {
        let (_dir, store) = open_test_store().await;

        store.upsert("the agent remembers carrots are orange", HashMap::new())
            .await
            .unwrap();

        let hits = store.search("carrots", 5).await.unwrap();
        assert!(hits.iter().any(|e| e.content.contains("carrots are orange")));
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let (_dir, store) = open_test_store().await;

        let metadata: HashMap<String, String> =
            [("source".to_string(), "info_exploration".to_string())].into();
        store.upsert("fact with metadata", metadata).await.unwrap();

        let hits = store.search("fact with metadata", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.get("source").map(String::as_str), Some("info_exploration"));
    }

    #[tokio::test]
    async fn test_batch_upsert_count() {
        let (_dir, store) = open_test_store().await;

        let texts = vec!["alpha fact".to_string(), "beta fact".to_string(), "gamma fact".to_string()];
        let count = store.batch_upsert(&texts, HashMap::new()).await.unwrap();
        assert_eq!(count, 3);

        let hits = store.search("fact", 10).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_search_respects_k() {
        let (_dir, store) = open_test_store().await;

        for i in 0..8 {
            store.upsert(&format!("entry number {}", i), HashMap::new()).await.unwrap();
        }

        let hits = store.search("entry number", 3).await.unwrap();
        assert_eq!(hits.len(), 3);
    }
}
