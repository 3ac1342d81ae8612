//! Error kinds exposed to callers of the engine.
//!
//! Mirrors the `thiserror` idiom used by `OperationError`/`ClassifyError`
//! in the operation-routing layer: one flat enum, one variant per kind,
//! no opaque string-only errors on the hot path.

use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by the [`crate::engine::Engine`] and the [`crate::store::StoreAdapter`]
/// trait it drives.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied an empty table/key or a document that is not a JSON object.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backing store could not be reached (connection, network, pool exhaustion).
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store call exceeded its deadline.
    #[error("store operation timed out")]
    Timeout,

    /// `ensure_table` or a subsequent operation hit a schema-level failure.
    /// Fatal for the affected table only.
    #[error("schema error on table {table}: {source}")]
    SchemaError {
        /// The table the error applies to.
        table: String,
        /// Underlying cause.
        source: anyhow::Error,
    },

    /// A `query` predicate could not be evaluated by the store.
    #[error("query error: {0}")]
    QueryError(String),

    /// The engine has been stopped and no longer accepts public operations.
    #[error("engine has been stopped")]
    EngineStopped,
}

/// Convenience alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Maps a [`StoreError`] observed while serving `table` onto the
/// caller-facing [`EngineError`] kind it corresponds to.
pub(crate) fn from_store_error(table: &str, err: StoreError) -> EngineError {
    match err {
        StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
        StoreError::Timeout => EngineError::Timeout,
        StoreError::Schema(msg) => EngineError::SchemaError {
            table: table.to_string(),
            source: anyhow::anyhow!(msg),
        },
        StoreError::Query(msg) => EngineError::QueryError(msg),
    }
}
