//! Knowledge store integration tests: persistence across reopen, fallback
//! behavior and the hybrid search ordering guarantees.

use std::collections::HashMap;
use tempfile::TempDir;

use forge_agent::config::MemoryConfig;
use forge_agent::memory::{open_store, KnowledgeStore, SqliteKnowledgeStore};

#[tokio::test]
async fn entries_survive_a_reopen() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("memory.db");

    {
        let store = SqliteKnowledgeStore::new(&db, "agent_memory", 64).await.unwrap();
        store.upsert("persistent fact about lighthouses", HashMap::new())
            .await
            .unwrap();
    }

    let store = SqliteKnowledgeStore::new(&db, "agent_memory", 64).await.unwrap();
    let hits = store.search("lighthouses", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("lighthouses"));
}

#[tokio::test]
async fn collections_are_isolated() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("memory.db");

    let store_a = SqliteKnowledgeStore::new(&db, "collection_a", 64).await.unwrap();
    let store_b = SqliteKnowledgeStore::new(&db, "collection_b", 64).await.unwrap();

    store_a.upsert("only in a", HashMap::new()).await.unwrap();

    assert_eq!(store_a.search("only in a", 5).await.unwrap().len(), 1);
    assert!(store_b.search("only in a", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn substring_hits_rank_before_similarity_fill() {
    let dir = TempDir::new().unwrap();
    let store = SqliteKnowledgeStore::new(dir.path().join("memory.db"), "test", 64)
        .await
        .unwrap();

    store.upsert("notes on rust borrow checker", HashMap::new()).await.unwrap();
    store.upsert("grocery list: milk and eggs", HashMap::new()).await.unwrap();
    store.upsert("the borrow checker rejects aliased mutation", HashMap::new()).await.unwrap();

    let hits = store.search("borrow checker", 3).await.unwrap();
    assert_eq!(hits.len(), 3);
    // Both literal matches come before the similarity-filled entry.
    assert!(hits[0].content.contains("borrow checker"));
    assert!(hits[1].content.contains("borrow checker"));
    assert!(hits[2].content.contains("grocery"));
}

#[tokio::test]
async fn open_store_uses_sqlite_when_path_given() {
    let dir = TempDir::new().unwrap();
    let config = MemoryConfig {
        database_path: Some(dir.path().join("memory.db")),
        ..Default::default()
    };

    let store = open_store(&config).await;
    store.upsert("written through the factory", HashMap::new()).await.unwrap();

    let hits = store.search("factory", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(dir.path().join("memory.db").exists());
}

#[tokio::test]
async fn open_store_degrades_without_a_path() {
    let config = MemoryConfig {
        database_path: None,
        ..Default::default()
    };

    let store = open_store(&config).await;
    store.upsert("ephemeral entry", HashMap::new()).await.unwrap();

    let hits = store.search("ephemeral", 5).await.unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn batch_upsert_reports_inserted_count() {
    let dir = TempDir::new().unwrap();
    let store = SqliteKnowledgeStore::new(dir.path().join("memory.db"), "test", 64)
        .await
        .unwrap();

    let texts: Vec<String> = (0..4).map(|i| format!("chunk {}", i)).collect();
    let count = store.batch_upsert(&texts, HashMap::new()).await.unwrap();
    assert_eq!(count, 4);

    let hits = store.search("chunk", 10).await.unwrap();
    assert_eq!(hits.len(), 4);
}
