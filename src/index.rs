//! The in-memory record index.
//!
//! Trimmed from `server-rust`'s `RecordStore`/`StorageEngine` pair down to
//! the subset this engine needs: a plain map from [`RecordKey`] to
//! [`CacheEntry`], manipulated only while the engine's single mutex is held.
//! There is no sharding by partition here -- spec.md §9 permits but does
//! not require it, and a single `HashMap` is the simpler design for a
//! single-process cache.

use std::collections::HashMap;

use crate::document::Document;
use crate::record::{CacheEntry, RecordKey, RecordMetadata};

/// Snapshot of one dirty entry taken under the engine mutex, carried out to
/// the store call without holding the lock.
#[derive(Debug, Clone)]
pub struct DirtySnapshot {
    /// Key of the snapshotted entry.
    pub key: RecordKey,
    /// Document as of the snapshot.
    pub document: Document,
    /// Version as of the snapshot; used to detect races on reconcile.
    pub version: u64,
}

/// The record index: all cached entries for all tables.
#[derive(Debug, Default)]
pub struct RecordIndex {
    entries: HashMap<RecordKey, CacheEntry>,
}

impl RecordIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the entry for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &RecordKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Inserts or overwrites the entry for `key`.
    pub fn put(&mut self, key: RecordKey, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    /// Applies a mutation to the document at `key`, creating the entry if
    /// absent. Returns the metadata after the mutation.
    pub fn upsert(&mut self, key: RecordKey, document: Document, now: i64) -> RecordMetadata {
        match self.entries.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut occ) => {
                let entry = occ.get_mut();
                entry.document = document;
                entry.metadata.on_mutate(now);
                entry.metadata.clone()
            }
            std::collections::hash_map::Entry::Vacant(vac) => {
                let entry = CacheEntry::new(document, now, true);
                let meta = entry.metadata.clone();
                vac.insert(entry);
                meta
            }
        }
    }

    /// Removes the entry for `key`, if present, returning it.
    pub fn remove(&mut self, key: &RecordKey) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    /// Records an access to `key` at `now`, if the entry is present.
    pub fn touch(&mut self, key: &RecordKey, now: i64) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.metadata.touch(now);
        }
    }

    /// Returns a snapshot of every dirty entry, optionally restricted to one
    /// table. Taken under the engine mutex; the caller performs I/O after
    /// releasing the lock.
    #[must_use]
    pub fn snapshot_dirty(&self, table: Option<&str>) -> Vec<DirtySnapshot> {
        self.entries
            .iter()
            .filter(|(k, e)| e.metadata.dirty && table.is_none_or(|t| k.table == t))
            .map(|(k, e)| DirtySnapshot {
                key: k.clone(),
                document: e.document.clone(),
                version: e.metadata.version,
            })
            .collect()
    }

    /// Clears the dirty flag on `key` iff its version still matches
    /// `observed_version`. Returns whether the flag was cleared.
    pub fn clear_dirty_if_unchanged(&mut self, key: &RecordKey, observed_version: u64) -> bool {
        self.entries
            .get_mut(key)
            .is_some_and(|e| e.metadata.clear_dirty_if_unchanged(observed_version))
    }

    /// Returns every key whose entry is clean (`dirty == false`) and whose
    /// `last_access` is strictly older than `older_than`.
    #[must_use]
    pub fn idle_clean_keys(&self, older_than: i64) -> Vec<RecordKey> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.metadata.dirty && e.metadata.last_access < older_than)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Total number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with `dirty == true`.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.entries.values().filter(|e| e.metadata.dirty).count()
    }

}
