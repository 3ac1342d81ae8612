//! Postgres-backed [`StoreAdapter`].
//!
//! Table shape and `CREATE TABLE IF NOT EXISTS`/`ON CONFLICT` idioms are
//! grounded on the L3 database cache pattern from the shared-cache example:
//! one JSONB column per record, an index to support predicate queries, and
//! per-table DDL issued lazily via `ensure_table` rather than a migration.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use crate::config::Config;
use crate::document::Document;
use crate::store::{StoreAdapter, StoreError, UpsertResult};

/// Adapter backed by a real Postgres connection pool.
pub struct PostgresStoreAdapter {
    pool: PgPool,
}

/// Rejects table names that are not a plain identifier. Table names flow
/// into SQL via `format!`, not a bind parameter -- Postgres has no
/// parameterized-identifier syntax -- so this is the injection boundary.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let valid = !table.is_empty()
        && table.len() <= 63
        && table
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Schema(format!(
            "invalid table name: {table:?}"
        )))
    }
}

impl PostgresStoreAdapter {
    /// Opens a connection pool per `config` and returns the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the pool cannot be established.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.db_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Wraps an already-open pool. Useful for tests against a real database.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreAdapter for PostgresStoreAdapter {
    async fn ensure_table(&self, table: &str, schema_hint: &Document) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                key TEXT PRIMARY KEY,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            );
            CREATE INDEX IF NOT EXISTS "idx_{table}_data" ON "{table}" USING GIN (data);
            "#
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        // schema_hint is advisory only -- the column shape above is fixed
        // regardless of its contents. Stash it as a table comment so it's
        // visible to anyone inspecting the schema directly.
        if !schema_hint.is_null() {
            let hint = schema_hint.to_string();
            let comment = format!(r#"COMMENT ON TABLE "{table}" IS $${hint}$$"#);
            let _ = sqlx::query(&comment).execute(&self.pool).await;
        }
        Ok(())
    }

    async fn fetch(&self, table: &str, key: &str) -> Result<Option<Document>, StoreError> {
        validate_table_name(table)?;
        let sql = format!(r#"SELECT data FROM "{table}" WHERE key = $1"#);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.map(|r| r.get::<Document, _>("data")))
    }

    async fn upsert_batch(
        &self,
        table: &str,
        items: Vec<(String, Document)>,
    ) -> Result<Vec<UpsertResult>, StoreError> {
        validate_table_name(table)?;
        let sql = format!(
            r#"
            INSERT INTO "{table}" (key, data, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, updated_at = now()
            "#
        );

        let mut results = Vec::with_capacity(items.len());
        for (key, doc) in items {
            let outcome = sqlx::query(&sql)
                .bind(&key)
                .bind(&doc)
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(classify);
            results.push(UpsertResult { key, outcome });
        }
        Ok(results)
    }

    async fn query(
        &self,
        table: &str,
        predicate: &str,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        validate_table_name(table)?;
        let where_clause = if predicate.is_empty() {
            String::new()
        } else {
            format!("WHERE {predicate}")
        };
        let sql = format!(
            r#"SELECT data FROM "{table}" {where_clause} LIMIT $1"#,
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.get::<Document, _>("data")).collect())
    }

    async fn open(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

/// Maps a `sqlx::Error` to the closest [`StoreError`] variant.
fn classify(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Query(other.to_string()),
    }
}
