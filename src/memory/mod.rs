//! Persistent knowledge store
//!
//! Provides:
//! - SQLite-based persistence with deterministic hash embeddings
//! - Hybrid substring + cosine-similarity search
//! - In-memory substring-match fallback so the rest of the system never
//!   fails solely because no storage backend is configured

pub mod embeddings;
pub mod store;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::MemoryConfig;
pub use embeddings::cosine_similarity;
pub use store::SqliteKnowledgeStore;

/// A stored piece of knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique entry ID
    pub id: String,
    /// The remembered text
    pub content: String,
    /// Free-form metadata (e.g. source, originating query)
    pub metadata: HashMap<String, String>,
    /// When this entry was created
    pub created_at: DateTime<Utc>,
}

/// Narrow collaborator interface the abilities depend on.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert a single text chunk
    async fn upsert(&self, text: &str, metadata: HashMap<String, String>) -> Result<()>;

    /// Insert many text chunks, returning the number added
    async fn batch_upsert(&self, texts: &[String], metadata: HashMap<String, String>) -> Result<usize>;

    /// Return up to `k` entries ordered by relevance to the query
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeEntry>>;
}

/// In-memory fallback store. Queries are case-insensitive substring checks,
/// newest entries first.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    entries: Mutex<Vec<KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_entry(text: &str, metadata: HashMap<String, String>) -> KnowledgeEntry {
        KnowledgeEntry {
            id: uuid::Uuid::new_v4().to_string(),
            content: text.to_string(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn upsert(&self, text: &str, metadata: HashMap<String, String>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(Self::make_entry(text, metadata));
        Ok(())
    }

    async fn batch_upsert(&self, texts: &[String], metadata: HashMap<String, String>) -> Result<usize> {
        let mut entries = self.entries.lock().await;
        for text in texts {
            entries.push(Self::make_entry(text, metadata.clone()));
        }
        Ok(texts.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<KnowledgeEntry>> {
        let entries = self.entries.lock().await;
        let query_lower = query.to_lowercase();

        let matches: Vec<KnowledgeEntry> = entries.iter()
            .rev()
            .filter(|e| e.content.to_lowercase().contains(&query_lower))
            .take(k)
            .cloned()
            .collect();

        Ok(matches)
    }
}

/// Open the configured knowledge store.
///
/// Preference order:
/// 1. SQLite at the configured path
/// 2. In-memory substring store
pub async fn open_store(config: &MemoryConfig) -> Arc<dyn KnowledgeStore> {
    if let Some(path) = &config.database_path {
        match SqliteKnowledgeStore::new(path, &config.collection, config.embedding_dim).await {
            Ok(store) => return Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to open SQLite knowledge store, falling back to in-memory"
                );
            }
        }
    }

    Arc::new(InMemoryKnowledgeStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert("the agent remembers carrots are orange", HashMap::new())
            .await
            .unwrap();

        let hits = store.search("carrots", 5).await.unwrap();
        assert!(hits.iter().any(|e| e.content.contains("carrots are orange")));
    }

    #[tokio::test]
    async fn test_in_memory_no_match() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert("unrelated entry", HashMap::new()).await.unwrap();

        let hits = store.search("zebra", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_newest_first_and_k_bound() {
        let store = InMemoryKnowledgeStore::new();
        for i in 0..5 {
            store.upsert(&format!("note {}", i), HashMap::new()).await.unwrap();
        }

        let hits = store.search("note", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "note 4");
        assert_eq!(hits[1].content, "note 3");
    }

    #[tokio::test]
    async fn test_open_store_falls_back_without_path() {
        let config = MemoryConfig {
            database_path: None,
            ..Default::default()
        };
        let store = open_store(&config).await;

        store.upsert("fallback works", HashMap::new()).await.unwrap();
        let hits = store.search("fallback", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
