//! Cache entries and the keys that index them.
//!
//! `RecordMetadata` mirrors `server-rust`'s `storage::record::RecordMetadata`
//! closely -- same fields, same dirty-tracking contract -- generalized from
//! a CRDT-specific record to the plain-document model this engine needs.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::document::Document;

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Identifies a record by its owning table and caller-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Table the record belongs to.
    pub table: String,
    /// Caller-supplied key, unique within `table`.
    pub key: String,
}

impl RecordKey {
    /// Creates a new key from borrowed strings.
    #[must_use]
    pub fn new(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }
}

/// Server-internal bookkeeping for a cached record.
///
/// Tracks dirty state, access recency, and the version counter the flush
/// protocol uses to detect races between a snapshot and an intervening write.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    /// Monotonically increasing counter, bumped on every mutation.
    pub version: u64,
    /// True iff the current document has not been acknowledged by the store
    /// since its last mutation.
    pub dirty: bool,
    /// Monotonic timestamp (millis) of the most recent access: insert,
    /// upsert, get (hit or load-through), or dirty-to-clean transition.
    pub last_access: i64,
}

impl RecordMetadata {
    /// Creates metadata for a freshly written (dirty) or loaded (clean) entry.
    #[must_use]
    pub fn new(now: i64, dirty: bool) -> Self {
        Self {
            version: 1,
            dirty,
            last_access: now,
        }
    }

    /// Records an access (read or write) at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_access = now;
    }

    /// Records a mutation: bumps the version, marks dirty, touches access time.
    pub fn on_mutate(&mut self, now: i64) {
        self.version += 1;
        self.dirty = true;
        self.last_access = now;
    }

    /// Clears the dirty flag iff `observed_version` still matches. Returns
    /// whether the flag was cleared.
    pub fn clear_dirty_if_unchanged(&mut self, observed_version: u64) -> bool {
        if self.version == observed_version {
            self.dirty = false;
            true
        } else {
            false
        }
    }
}

/// A complete cache entry: document plus metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The current document.
    pub document: Document,
    /// Dirty-tracking and access-recency metadata.
    pub metadata: RecordMetadata,
}

impl CacheEntry {
    /// Creates a new entry for a freshly inserted (dirty) or loaded (clean) document.
    #[must_use]
    pub fn new(document: Document, now: i64, dirty: bool) -> Self {
        Self {
            document,
            metadata: RecordMetadata::new(now, dirty),
        }
    }
}
