//! The persistent store abstraction.
//!
//! `StoreAdapter` is the capability set the engine needs from a durable
//! backend: create a table, fetch one row, upsert a batch, and forward a
//! predicate query. Trimmed from `server-rust`'s `MapDataStore` trait down
//! to spec.md §4.1's four operations -- this engine has no replication or
//! write-behind queueing of its own, so `add_backup`/`pending_operation_count`
//! and friends have no counterpart here.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;

use crate::document::Document;

/// Outcome of a single item within a batch upsert.
#[derive(Debug)]
pub struct UpsertResult {
    /// The key this result applies to.
    pub key: String,
    /// `Ok(())` if the item was durably written; `Err` with the cause otherwise.
    pub outcome: Result<(), StoreError>,
}

/// Errors a [`StoreAdapter`] can report.
///
/// `Clone` so a single outcome can be broadcast to every single-flight
/// waiter on a cache-miss load (see `crate::engine::inflight`).
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The call exceeded its deadline.
    #[error("store operation timed out")]
    Timeout,
    /// A schema-level failure on the named table.
    #[error("schema error: {0}")]
    Schema(String),
    /// The query predicate could not be evaluated.
    #[error("query error: {0}")]
    Query(String),
}

/// Abstraction over the durable key/document store backing the cache.
///
/// Implementations: [`memory::InMemoryStoreAdapter`] (always available, used
/// by tests and property tests S4-S6) and, behind the `postgres` feature,
/// [`postgres::PostgresStoreAdapter`].
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Idempotently ensures the backing table exists with the
    /// `(key TEXT PRIMARY KEY, data JSON, created_at, updated_at)` shape
    /// plus a JSON-path index. Never drops data.
    ///
    /// `schema_hint` is an advisory field-name-to-type-name document (e.g.
    /// `{"n": "string"}`); implementations may use it to annotate the table
    /// but must not reject or alter the fixed column shape based on it.
    async fn ensure_table(&self, table: &str, schema_hint: &Document) -> Result<(), StoreError>;

    /// Single-row lookup. Returns `None` if the key is absent.
    async fn fetch(&self, table: &str, key: &str) -> Result<Option<Document>, StoreError>;

    /// Atomic-per-item batch upsert. Whole-batch atomicity is not required;
    /// callers must inspect each [`UpsertResult`] to learn what succeeded.
    async fn upsert_batch(
        &self,
        table: &str,
        items: Vec<(String, Document)>,
    ) -> Result<Vec<UpsertResult>, StoreError>;

    /// Opaque predicate pass-through. `limit` is capped by the caller.
    async fn query(
        &self,
        table: &str,
        predicate: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Confirms the store is reachable. Called by `Engine::start` before it
    /// spins up the background tasks. Default no-op; [`postgres::PostgresStoreAdapter`]
    /// overrides this to ping the pool, since a pool that was open at
    /// construction time can still have gone unreachable by the time the
    /// engine starts.
    async fn open(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Releases pooled connections and any other held resources. Called by
    /// `Engine::stop` after the shutdown flush. Default no-op.
    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
