//! The eviction pipeline: drops idle clean entries to bound memory.
//!
//! Purely in-memory -- no store I/O -- so unlike the flush pass this runs
//! entirely under the engine mutex in one pass. Dirty entries are skipped
//! unconditionally; this is invariant I2 and is the one rule this pass must
//! never violate.

use tracing::warn;

use crate::engine::Shared;
use crate::record::now_millis;

/// Runs one eviction pass: drops every entry that is clean and has been
/// idle for at least `evict_interval`. Returns the number of entries removed.
pub(crate) fn run_evict_pass(shared: &Shared) -> usize {
    let older_than = now_millis() - shared.config.evict_interval.as_millis() as i64;

    let mut state = shared.state.lock();
    let idle = state.index.idle_clean_keys(older_than);
    for key in &idle {
        // Defense in depth: idle_clean_keys already filters on `!dirty`, so
        // this branch should be unreachable, but eviction of a dirty entry
        // is exactly the bug invariant I2 forbids.
        if let Some(entry) = state.index.get(key) {
            if entry.metadata.dirty {
                warn!(table = %key.table, key = %key.key, "refusing to evict dirty entry");
                continue;
            }
        }
        state.index.remove(key);
    }
    state.stats.evictions += idle.len() as u64;
    idle.len()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::engine::Shared;
    use crate::record::RecordKey;
    use crate::store::memory::InMemoryStoreAdapter;

    fn shared_with_interval(evict_interval: Duration) -> Shared {
        let mut config = Config::new("postgres://unused");
        config.evict_interval = evict_interval;
        Shared::new(Arc::new(InMemoryStoreAdapter::new()), config)
    }

    #[test]
    fn evicts_clean_idle_entries() {
        let shared = shared_with_interval(Duration::from_millis(100));
        {
            let mut state = shared.state.lock();
            let key = RecordKey::new("t", "a");
            state
                .index
                .put(key, crate::record::CacheEntry::new(json!({}), 0, false));
        }
        let removed = run_evict_pass(&shared);
        assert_eq!(removed, 1);
        assert_eq!(shared.state.lock().index.len(), 0);
    }

    #[test]
    fn never_evicts_dirty_entries() {
        let shared = shared_with_interval(Duration::from_millis(100));
        {
            let mut state = shared.state.lock();
            state.index.upsert(RecordKey::new("t", "a"), json!({}), 0);
        }
        let removed = run_evict_pass(&shared);
        assert_eq!(removed, 0);
        assert_eq!(shared.state.lock().index.len(), 1);
    }

    #[test]
    fn spares_recently_accessed_entries() {
        let shared = shared_with_interval(Duration::from_secs(3600));
        {
            let mut state = shared.state.lock();
            let now = now_millis();
            state.index.put(
                RecordKey::new("t", "a"),
                crate::record::CacheEntry::new(json!({}), now, false),
            );
        }
        let removed = run_evict_pass(&shared);
        assert_eq!(removed, 0);
    }
}
