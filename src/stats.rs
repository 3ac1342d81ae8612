//! Counters exposed via [`crate::engine::Engine::stats`].
//!
//! Fields are plain `u64`s rather than atomics: every mutation happens
//! while the engine's single mutex is already held (alongside the index
//! and in-flight registry it serializes), so a second layer of atomicity
//! would be redundant -- see spec.md §5.

use serde::{Deserialize, Serialize};

/// Point-in-time snapshot of the engine's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Number of `get` calls served directly from the index.
    pub cache_hits: u64,
    /// Number of `get` calls that missed the index and loaded from the store.
    pub cache_misses: u64,
    /// Cumulative count of entries cleanly persisted by the flush engine.
    pub flushes: u64,
    /// Cumulative count of entries removed by the eviction engine.
    pub evictions: u64,
    /// Current number of entries held in the index.
    pub cached_records: usize,
    /// Current number of entries with `dirty = true`.
    pub dirty_records: usize,
    /// Cumulative count of store-call failures observed by the flush engine.
    pub store_errors: u64,
}
