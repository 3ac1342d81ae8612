//! End-to-end scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use cachedb::{Config, Engine};
use serde_json::json;

fn test_engine(evict_interval: Duration) -> Engine {
    let store = Arc::new(cachedb::store::memory::InMemoryStoreAdapter::new());
    let mut config = Config::new("postgres://unused");
    config.evict_interval = evict_interval;
    Engine::new(store, config)
}

#[tokio::test]
async fn s1_insert_then_get_marks_dirty() {
    let engine = test_engine(Duration::from_secs(30));
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();
    engine.insert("u", "a", json!({"n": "A"})).unwrap();

    let doc = engine.get("u", "a", true).await.unwrap();
    assert_eq!(doc, Some(json!({"n": "A"})));
    assert_eq!(engine.stats().dirty_records, 1);
}

#[tokio::test]
async fn s2_flush_persists_and_clears_dirty() {
    let engine = test_engine(Duration::from_secs(30));
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();
    engine.insert("u", "a", json!({"n": "A"})).unwrap();

    engine.flush(None).await.unwrap();

    assert_eq!(engine.stats().dirty_records, 0);
    let doc = engine.get("u", "a", false).await.unwrap();
    assert_eq!(doc, Some(json!({"n": "A"})));
}

#[tokio::test]
async fn s3_evict_then_reload_counts_as_miss() {
    let engine = test_engine(Duration::from_millis(0));
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();
    engine.insert("u", "a", json!({"n": "A"})).unwrap();
    engine.flush(None).await.unwrap();

    let removed = engine.evict_idle().unwrap();
    assert_eq!(removed, 1);
    assert_eq!(engine.stats().cached_records, 0);

    let doc = engine.get("u", "a", true).await.unwrap();
    assert_eq!(doc, Some(json!({"n": "A"})));
    assert_eq!(engine.stats().cache_misses, 1);
}

#[tokio::test]
async fn s4_repeated_writes_coalesce_into_one_upsert() {
    let engine = test_engine(Duration::from_secs(30));
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();
    engine.insert("u", "a", json!({"n": "A"})).unwrap();
    engine.insert("u", "a", json!({"n": "B"})).unwrap();
    engine.flush(None).await.unwrap();

    let doc = engine.get("u", "a", false).await.unwrap();
    assert_eq!(doc, Some(json!({"n": "B"})));
}

#[tokio::test]
async fn s5_concurrent_misses_issue_exactly_one_fetch() {
    let store = Arc::new(cachedb::store::memory::InMemoryStoreAdapter::new());
    let config = Config::new("postgres://unused");
    let engine = Arc::new(Engine::new(store.clone(), config));
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(
            async move { engine.get("u", "z", true).await.unwrap() },
        ));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), None);
    }
    assert_eq!(store.fetch_call_count(), 1);
}

#[tokio::test]
async fn s6_crash_safety_across_engine_instances() {
    let store = Arc::new(cachedb::store::memory::InMemoryStoreAdapter::new());
    let config = Config::new("postgres://unused");

    let engine = Engine::new(store.clone(), config.clone());
    engine.create_table("u", &json!({"n": "string"})).await.unwrap();
    engine.insert("u", "c", json!({"n": "C"})).unwrap();
    engine.stop().await.unwrap();

    let fresh = Engine::new(store, config);
    let doc = fresh.get("u", "c", true).await.unwrap();
    assert_eq!(doc, Some(json!({"n": "C"})));
}
