//! In-memory [`StoreAdapter`] fake for tests.
//!
//! Generalizes `server-rust`'s `NullDataStore` (which discards everything)
//! into something that actually remembers what it's given -- spec.md §9
//! requires a working in-memory fake for the S4-S6 property tests, which a
//! no-op store cannot satisfy.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::document::Document;
use crate::store::{StoreAdapter, StoreError, UpsertResult};

/// Per-call counters the test suite uses to assert single-flight and
/// batch-coalescing behavior (e.g. "exactly one `fetch` call for key z").
#[derive(Debug, Default)]
struct Calls {
    fetch: u64,
    upsert_items: u64,
    query: u64,
}

/// In-memory fake store. Thread-safe, cheap to clone via `Arc`.
pub struct InMemoryStoreAdapter {
    tables: Mutex<HashMap<String, HashMap<String, Document>>>,
    calls: Mutex<Calls>,
}

impl InMemoryStoreAdapter {
    /// Creates an empty store with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Number of `fetch` calls made so far. Used to assert single-flight
    /// coalescing (spec.md P6/S5).
    #[must_use]
    pub fn fetch_call_count(&self) -> u64 {
        self.calls.lock().fetch
    }

    /// Total number of items passed to `upsert_batch` across all calls.
    /// Used to assert batch coalescing (spec.md P8/S4).
    #[must_use]
    pub fn upsert_item_count(&self) -> u64 {
        self.calls.lock().upsert_items
    }

    /// Number of `query` calls made so far.
    #[must_use]
    pub fn query_call_count(&self) -> u64 {
        self.calls.lock().query
    }
}

impl Default for InMemoryStoreAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Matches a document against a trivial `field=value` predicate. An empty
/// predicate matches everything. This is a test fixture, not a query
/// language -- the real predicate syntax is opaque to the engine and
/// forwarded verbatim to whatever store implements it.
fn matches_predicate(doc: &Document, predicate: &str) -> bool {
    if predicate.is_empty() {
        return true;
    }
    let Some((field, expected)) = predicate.split_once('=') else {
        return true;
    };
    doc.get(field)
        .map(|v| match v {
            Document::String(s) => s == expected,
            other => other.to_string() == expected,
        })
        .unwrap_or(false)
}

#[async_trait]
impl StoreAdapter for InMemoryStoreAdapter {
    async fn ensure_table(&self, table: &str, _schema_hint: &Document) -> Result<(), StoreError> {
        self.tables.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    async fn fetch(&self, table: &str, key: &str) -> Result<Option<Document>, StoreError> {
        self.calls.lock().fetch += 1;
        Ok(self
            .tables
            .lock()
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    async fn upsert_batch(
        &self,
        table: &str,
        items: Vec<(String, Document)>,
    ) -> Result<Vec<UpsertResult>, StoreError> {
        self.calls.lock().upsert_items += items.len() as u64;
        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let results = items
            .into_iter()
            .map(|(key, doc)| {
                rows.insert(key.clone(), doc);
                UpsertResult {
                    key,
                    outcome: Ok(()),
                }
            })
            .collect();
        Ok(results)
    }

    async fn query(
        &self,
        table: &str,
        predicate: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        self.calls.lock().query += 1;
        let tables = self.tables.lock();
        let Some(rows) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .values()
            .filter(|doc| matches_predicate(doc, predicate))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_missing_key_returns_none() {
        let store = InMemoryStoreAdapter::new();
        store.ensure_table("t", &json!({})).await.unwrap();
        assert!(store.fetch("t", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_fetch_round_trip() {
        let store = InMemoryStoreAdapter::new();
        let doc = json!({"n": "A"});
        store
            .upsert_batch("t", vec![("a".to_string(), doc.clone())])
            .await
            .unwrap();
        assert_eq!(store.fetch("t", "a").await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn upsert_batch_last_write_wins_within_call() {
        let store = InMemoryStoreAdapter::new();
        store
            .upsert_batch(
                "t",
                vec![
                    ("a".to_string(), json!({"n": "A"})),
                    ("a".to_string(), json!({"n": "B"})),
                ],
            )
            .await
            .unwrap();
        assert_eq!(store.fetch("t", "a").await.unwrap(), Some(json!({"n": "B"})));
    }

    #[tokio::test]
    async fn query_empty_table_returns_empty() {
        let store = InMemoryStoreAdapter::new();
        let results = store.query("missing", "", 10).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn query_filters_by_predicate() {
        let store = InMemoryStoreAdapter::new();
        store
            .upsert_batch(
                "t",
                vec![
                    ("a".to_string(), json!({"status": "active"})),
                    ("b".to_string(), json!({"status": "inactive"})),
                ],
            )
            .await
            .unwrap();
        let results = store.query("t", "status=active", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn query_respects_limit() {
        let store = InMemoryStoreAdapter::new();
        store
            .upsert_batch(
                "t",
                vec![
                    ("a".to_string(), json!({"n": 1})),
                    ("b".to_string(), json!({"n": 2})),
                    ("c".to_string(), json!({"n": 3})),
                ],
            )
            .await
            .unwrap();
        let results = store.query("t", "", 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn fetch_call_count_tracks_calls() {
        let store = InMemoryStoreAdapter::new();
        store.fetch("t", "a").await.unwrap();
        store.fetch("t", "b").await.unwrap();
        assert_eq!(store.fetch_call_count(), 2);
    }
}
