//! The flush pipeline: batches dirty entries to the store per tick.
//!
//! Follows the `background_flush_task` shape from the write-back cache
//! reference: snapshot dirty entries under the lock, do I/O without it,
//! reconcile under the lock again. Grouping by table and the
//! snapshot/I-O/reconcile split are spec.md §4.3's algorithm verbatim.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::engine::Shared;
use crate::record::RecordKey;

/// Outcome of one flush pass, for stats and for `stop()`'s residual-dirty report.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlushOutcome {
    /// Entries whose document was durably persisted and whose dirty flag was cleared.
    pub persisted: usize,
    /// Entries that remained dirty: either the store rejected them, or the
    /// entry was re-dirtied after the snapshot was taken.
    pub remaining_dirty: usize,
}

/// Runs one flush pass over `scope` (a single table, or every table if `None`).
///
/// Step 1-2 (snapshot + group by table) happen under the engine mutex.
/// Step 3 (the store call) happens without it. Steps 4-6 (reconcile,
/// counters) happen under the mutex again.
pub(crate) async fn run_flush_pass(shared: &Shared, scope: Option<&str>) -> FlushOutcome {
    let grouped: HashMap<String, Vec<(RecordKey, serde_json::Value, u64)>> = {
        let state = shared.state.lock();
        let mut grouped: HashMap<String, Vec<_>> = HashMap::new();
        for snap in state.index.snapshot_dirty(scope) {
            grouped
                .entry(snap.key.table.clone())
                .or_default()
                .push((snap.key, snap.document, snap.version));
        }
        grouped
    };

    let mut outcome = FlushOutcome::default();

    for (table, items) in grouped {
        if shared.is_table_failed(&table) {
            debug!(table = %table, "skipping flush for table with prior schema error");
            continue;
        }

        let batch: Vec<(String, serde_json::Value)> = items
            .iter()
            .map(|(key, doc, _)| (key.key.clone(), doc.clone()))
            .collect();

        let results = match shared.store.upsert_batch(&table, batch).await {
            Ok(results) => results,
            Err(err) => {
                warn!(table = %table, error = %err, "flush batch failed outright");
                shared.record_store_error();
                if matches!(err, crate::store::StoreError::Schema(_)) {
                    shared.mark_table_failed(&table);
                }
                outcome.remaining_dirty += items.len();
                continue;
            }
        };

        let mut acked = HashMap::with_capacity(results.len());
        for result in results {
            match result.outcome {
                Ok(()) => {
                    acked.insert(result.key, ());
                }
                Err(err) => {
                    warn!(table = %table, key = %result.key, error = %err, "item failed to persist");
                    shared.record_store_error();
                }
            }
        }

        let mut table_persisted = 0u64;
        let mut state = shared.state.lock();
        for (key, _, version) in items {
            if acked.contains_key(&key.key) {
                if state.index.clear_dirty_if_unchanged(&key, version) {
                    outcome.persisted += 1;
                    table_persisted += 1;
                } else {
                    // re-dirtied after the snapshot; leave dirty, don't count as persisted
                    outcome.remaining_dirty += 1;
                }
            } else {
                outcome.remaining_dirty += 1;
            }
        }
        state.stats.flushes += table_persisted;
    }

    outcome
}
