//! The engine façade: lifecycle, public operations, background orchestration.
//!
//! Collapses `server-rust`'s `ServiceRegistry`/`ManagedService` registration
//! order and the `ShutdownController` watch-channel cancellation pattern
//! down to the two background tasks this engine owns (flush, evict), plus
//! the single mutex that guards the index, in-flight registry, and stats.

mod evict;
mod flush;
mod inflight;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use flush::FlushOutcome;
use inflight::{InFlightRegistry, LoadOutcome};

use crate::config::Config;
use crate::document::{is_mapping, Document};
use crate::error::{from_store_error, EngineError, EngineResult};
use crate::index::RecordIndex;
use crate::record::{now_millis, CacheEntry, RecordKey};
use crate::stats::Stats;
use crate::store::StoreAdapter;

/// Everything background tasks and public operations need, held behind
/// one `Arc` so flush/evict loops can outlive a single `&Engine` borrow.
struct Shared {
    state: Mutex<EngineState>,
    store: Arc<dyn StoreAdapter>,
    config: Config,
}

/// Index, in-flight registry, and counters: the three things the engine
/// mutex serializes access to (spec.md §5).
struct EngineState {
    index: RecordIndex,
    in_flight: InFlightRegistry,
    stats: Stats,
    failed_tables: HashSet<String>,
}

impl Shared {
    fn new(store: Arc<dyn StoreAdapter>, config: Config) -> Self {
        Self {
            state: Mutex::new(EngineState {
                index: RecordIndex::new(),
                in_flight: InFlightRegistry::new(),
                stats: Stats::default(),
                failed_tables: HashSet::new(),
            }),
            store,
            config,
        }
    }

    fn is_table_failed(&self, table: &str) -> bool {
        self.state.lock().failed_tables.contains(table)
    }

    fn mark_table_failed(&self, table: &str) {
        self.state.lock().failed_tables.insert(table.to_string());
    }

    fn record_store_error(&self) {
        self.state.lock().stats.store_errors += 1;
    }
}

/// The hybrid write-back cache: in-memory index, background flush/eviction,
/// and the public surface applications call.
pub struct Engine {
    shared: Arc<Shared>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    evict_task: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Engine {
    /// Builds an engine over a store (e.g. constructed via
    /// [`crate::store::postgres::PostgresStoreAdapter::connect`]). `start`
    /// confirms the store is reachable and spins up the background tasks.
    #[must_use]
    pub fn new(store: Arc<dyn StoreAdapter>, config: Config) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared::new(store, config)),
            cancel_tx,
            cancel_rx,
            flush_task: Mutex::new(None),
            evict_task: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Confirms the store is reachable, then starts the background flush
    /// and eviction tasks. Idempotent: calling `start` twice on an
    /// already-started engine is a no-op. Returns `StoreUnavailable` if the
    /// store cannot be reached.
    pub async fn start(&self) -> EngineResult<()> {
        {
            let flush_task = self.flush_task.lock();
            if flush_task.is_some() {
                return Ok(());
            }
        }

        self.shared
            .store
            .open()
            .await
            .map_err(|e| from_store_error("", e))?;

        let mut flush_task = self.flush_task.lock();
        if flush_task.is_some() {
            return Ok(());
        }
        info!("starting flush and eviction background tasks");

        *flush_task = Some(tokio::spawn(run_flush_loop(
            Arc::clone(&self.shared),
            self.cancel_rx.clone(),
            self.shared.config.flush_interval,
        )));
        drop(flush_task);

        *self.evict_task.lock() = Some(tokio::spawn(run_evict_loop(
            Arc::clone(&self.shared),
            self.cancel_rx.clone(),
            self.shared.config.evict_interval,
        )));
        Ok(())
    }

    /// Cancels background tasks, waits for their current tick, runs a final
    /// synchronous flush, closes the store, and marks the engine stopped.
    /// Returns the number of entries still dirty after the shutdown flush
    /// (0 unless the store was unavailable throughout).
    pub async fn stop(&self) -> EngineResult<usize> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }
        let _ = self.cancel_tx.send(true);

        if let Some(handle) = self.flush_task.lock().take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.evict_task.lock().take() {
            let _ = handle.await;
        }

        let residual = loop {
            let outcome = flush::run_flush_pass(&self.shared, None).await;
            if outcome.remaining_dirty == 0 || outcome.persisted == 0 {
                break outcome.remaining_dirty;
            }
        };
        if residual > 0 {
            tracing::warn!(residual, "entries still dirty after shutdown flush");
        } else {
            debug!("shutdown flush left no dirty entries");
        }

        if let Err(e) = self.shared.store.close().await {
            tracing::warn!(error = %e, "error closing store during shutdown");
        }

        Ok(residual)
    }

    /// Delegates to `store.ensure_table`. `schema_hint` is advisory (e.g.
    /// `{"n": "string"}`) and never changes the fixed column shape the
    /// store creates.
    pub async fn create_table(&self, table: &str, schema_hint: &Document) -> EngineResult<()> {
        self.ensure_running()?;
        self.shared.store
            .ensure_table(table, schema_hint)
            .await
            .map_err(|e| from_store_error(table, e))
    }

    /// Inserts or replaces a document, marking the entry dirty. Never fails
    /// for store reasons; durability is deferred to the flush engine.
    pub fn insert(&self, table: &str, key: &str, doc: Document) -> EngineResult<()> {
        self.upsert(table, key, doc)
    }

    /// Alias for [`Engine::insert`] -- both create and overwrite.
    pub fn upsert(&self, table: &str, key: &str, doc: Document) -> EngineResult<()> {
        self.ensure_running()?;
        validate_write(table, key, &doc)?;
        let mut state = self.shared.state.lock();
        state.index.upsert(RecordKey::new(table, key), doc, now_millis());
        Ok(())
    }

    /// Reads a document. On a cache hit, returns immediately. On a miss
    /// with `use_cache = true`, loads from the store (single-flight across
    /// concurrent callers for the same key) and caches the result as clean.
    /// With `use_cache = false`, always forwards to the store.
    pub async fn get(
        &self,
        table: &str,
        key: &str,
        use_cache: bool,
    ) -> EngineResult<Option<Document>> {
        self.ensure_running()?;

        if !use_cache {
            return self
                .shared
                .store
                .fetch(table, key)
                .await
                .map_err(|e| from_store_error(table, e));
        }

        let record_key = RecordKey::new(table, key);

        enum Action {
            Hit(Document),
            Follow(tokio::sync::broadcast::Receiver<LoadOutcome>),
            Lead,
        }

        let action = {
            let mut state = self.shared.state.lock();
            if let Some(entry) = state.index.get(&record_key) {
                let doc = entry.document.clone();
                state.index.touch(&record_key, now_millis());
                state.stats.cache_hits += 1;
                Action::Hit(doc)
            } else if let Some(rx) = state.in_flight.subscribe(&record_key) {
                Action::Follow(rx)
            } else {
                state.in_flight.register(record_key.clone());
                state.stats.cache_misses += 1;
                Action::Lead
            }
        };

        match action {
            Action::Hit(doc) => Ok(Some(doc)),
            Action::Follow(mut rx) => rx
                .recv()
                .await
                .map_err(|_| {
                    EngineError::StoreUnavailable(
                        "loader task ended without a result".to_string(),
                    )
                })?
                .map_err(|e| from_store_error(table, e)),
            Action::Lead => {
                let outcome = self.shared.store.fetch(table, key).await;
                let for_caller = outcome.clone();
                {
                    let mut state = self.shared.state.lock();
                    if let Ok(Some(doc)) = &outcome {
                        state.index.put(
                            record_key.clone(),
                            CacheEntry::new(doc.clone(), now_millis(), false),
                        );
                    }
                    state.in_flight.complete(&record_key, outcome);
                }
                for_caller.map_err(|e| from_store_error(table, e))
            }
        }
    }

    /// Forwards an opaque predicate query directly to the store. Never
    /// touches the cache (spec.md P9: query isolation).
    pub async fn query(
        &self,
        table: &str,
        predicate: &str,
        limit: usize,
    ) -> EngineResult<Vec<Document>> {
        self.ensure_running()?;
        self.shared.store
            .query(table, predicate, limit)
            .await
            .map_err(|e| from_store_error(table, e))
    }

    /// Runs one flush pass synchronously over `table` (or every table if `None`).
    pub async fn flush(&self, table: Option<&str>) -> EngineResult<FlushOutcome> {
        self.ensure_running()?;
        Ok(flush::run_flush_pass(&self.shared, table).await)
    }

    /// Runs one eviction pass synchronously. Returns the number of entries removed.
    pub fn evict_idle(&self) -> EngineResult<usize> {
        self.ensure_running()?;
        Ok(evict::run_evict_pass(&self.shared))
    }

    /// Snapshot of the engine's counters.
    #[must_use]
    pub fn stats(&self) -> Stats {
        let state = self.shared.state.lock();
        let mut stats = state.stats;
        stats.cached_records = state.index.len();
        stats.dirty_records = state.index.dirty_count();
        stats
    }

    fn ensure_running(&self) -> EngineResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            Err(EngineError::EngineStopped)
        } else {
            Ok(())
        }
    }
}

fn validate_write(table: &str, key: &str, doc: &Document) -> EngineResult<()> {
    if table.is_empty() || key.is_empty() {
        return Err(EngineError::InvalidArgument(
            "table and key must not be empty".to_string(),
        ));
    }
    if !is_mapping(doc) {
        return Err(EngineError::InvalidArgument(
            "document must be a JSON object".to_string(),
        ));
    }
    Ok(())
}

async fn run_flush_loop(shared: Arc<Shared>, mut cancel_rx: watch::Receiver<bool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = flush::run_flush_pass(&shared, None).await;
                debug!(persisted = outcome.persisted, remaining_dirty = outcome.remaining_dirty, "flush tick complete");
            }
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    break;
                }
            }
        }
    }
}

async fn run_evict_loop(shared: Arc<Shared>, mut cancel_rx: watch::Receiver<bool>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = evict::run_evict_pass(&shared);
                debug!(removed, "eviction tick complete");
            }
            _ = cancel_rx.changed() => {
                if *cancel_rx.borrow() {
                    break;
                }
            }
        }
    }
}
