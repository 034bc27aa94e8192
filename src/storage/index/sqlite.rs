//! `SQLite` lifecycle index backend.
//!
//! Schema:
//!
//! ```sql
//! lifecycle_index(index_name, kind, event, entity_id, due_at)
//!     PRIMARY KEY (index_name, kind, event, entity_id)
//! idx_lifecycle_due ON lifecycle_index(index_name, kind, event, due_at)
//! lifecycle_indexes(name PRIMARY KEY, created_at)
//! ```
//!
//! Entity ids are stored as `INTEGER` (bit-cast from `u64`) so that range
//! scans stay on the covering index.

use crate::models::{EntityId, EntityKind};
use crate::storage::sqlite::{
    acquire_lock, configure_connection, open_connection, record_operation_metrics,
};
use crate::storage::traits::index::{IndexEntry, IndexKey, IndexOp, LifecycleIndexBackend};
use crate::{Error, Result, current_timestamp_millis};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{instrument, warn};

/// `SQLite`-based lifecycle index.
pub struct SqliteIndexBackend {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the `SQLite` database (None for in-memory).
    db_path: Option<PathBuf>,
}

#[allow(clippy::cast_possible_wrap)]
const fn entity_to_sql(id: EntityId) -> i64 {
    id.get() as i64
}

#[allow(clippy::cast_sign_loss)]
const fn entity_from_sql(raw: i64) -> EntityId {
    EntityId::new(raw as u64)
}

fn limit_to_sql(limit: Option<usize>) -> i64 {
    // SQLite treats a negative LIMIT as "no limit"
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

impl SqliteIndexBackend {
    /// Opens (or creates) the index database at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = open_connection(&db_path)?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(db_path),
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Creates an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::operation("open_sqlite_memory", e))?;
        configure_connection(&conn)?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        backend.initialize()?;
        Ok(backend)
    }

    /// Returns the database path.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS lifecycle_index (
                index_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                event TEXT NOT NULL,
                entity_id INTEGER NOT NULL,
                due_at INTEGER NOT NULL,
                PRIMARY KEY (index_name, kind, event, entity_id)
            );
            CREATE INDEX IF NOT EXISTS idx_lifecycle_due
                ON lifecycle_index(index_name, kind, event, due_at);
            CREATE TABLE IF NOT EXISTS lifecycle_indexes (
                name TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );",
        )
        .map_err(|e| Error::operation("create_lifecycle_schema", e))
    }

    fn register_index(conn: &Connection, index: &str) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO lifecycle_indexes (name, created_at) VALUES (?1, ?2)",
                params![index, current_timestamp_millis()],
            )
            .map_err(|e| Error::operation("register_index", e))?;
        Ok(inserted > 0)
    }

    fn apply_op(conn: &Connection, op: &IndexOp) -> Result<()> {
        match op {
            IndexOp::Upsert { key, due_at } => {
                Self::register_index(conn, &key.index)?;
                conn.execute(
                    "INSERT INTO lifecycle_index (index_name, kind, event, entity_id, due_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (index_name, kind, event, entity_id)
                     DO UPDATE SET due_at = excluded.due_at",
                    params![
                        key.index,
                        key.kind.as_str(),
                        key.event,
                        entity_to_sql(key.entity),
                        due_at
                    ],
                )
                .map_err(|e| Error::operation("upsert_index_entry", e))?;
            },
            IndexOp::Remove(key) => {
                conn.execute(
                    "DELETE FROM lifecycle_index
                     WHERE index_name = ?1 AND kind = ?2 AND event = ?3 AND entity_id = ?4",
                    params![
                        key.index,
                        key.kind.as_str(),
                        key.event,
                        entity_to_sql(key.entity)
                    ],
                )
                .map_err(|e| Error::operation("remove_index_entry", e))?;
            },
        }
        Ok(())
    }
}

impl LifecycleIndexBackend for SqliteIndexBackend {
    #[instrument(skip(self, ops), fields(backend = "sqlite", ops = ops.len()))]
    fn apply(&self, ops: &[IndexOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            in_unit(&conn, |conn| {
                ops.iter().try_for_each(|op| Self::apply_op(conn, op))
            })
        };

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "apply", start, status);
        result
    }

    #[instrument(skip(self), fields(backend = "sqlite"))]
    fn range_query(
        &self,
        index: &str,
        kind: EntityKind,
        event: &str,
        low: i64,
        high: i64,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>> {
        let start = Instant::now();
        let result = (|| {
            let conn = acquire_lock(&self.conn);
            let mut stmt = conn
                .prepare_cached(
                    "SELECT entity_id, due_at FROM lifecycle_index
                     WHERE index_name = ?1 AND kind = ?2 AND event = ?3
                       AND due_at >= ?4 AND due_at <= ?5
                     ORDER BY due_at, entity_id
                     LIMIT ?6",
                )
                .map_err(|e| Error::operation("prepare_range_query", e))?;
            let rows = stmt
                .query_map(
                    params![index, kind.as_str(), event, low, high, limit_to_sql(limit)],
                    |row| {
                        Ok(IndexEntry {
                            entity: entity_from_sql(row.get(0)?),
                            due_at: row.get(1)?,
                        })
                    },
                )
                .map_err(|e| Error::operation("range_query", e))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::operation("read_range_row", e))
        })();

        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("sqlite", "range_query", start, status);
        result
    }

    fn due_at(&self, key: &IndexKey) -> Result<Option<i64>> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT due_at FROM lifecycle_index
             WHERE index_name = ?1 AND kind = ?2 AND event = ?3 AND entity_id = ?4",
            params![
                key.index,
                key.kind.as_str(),
                key.event,
                entity_to_sql(key.entity)
            ],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::operation("lookup_due_at", e))
    }

    fn exists(&self, index: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT 1 FROM lifecycle_indexes WHERE name = ?1",
            params![index],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|e| Error::operation("index_exists", e))
    }

    fn ensure_index(&self, index: &str) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        Self::register_index(&conn, index)
    }

    fn count(&self, index: &str, kind: EntityKind, event: &str) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM lifecycle_index
                 WHERE index_name = ?1 AND kind = ?2 AND event = ?3",
                params![index, kind.as_str(), event],
                |row| row.get(0),
            )
            .map_err(|e| Error::operation("count_index_entries", e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Runs `work` inside `BEGIN IMMEDIATE`.
///
/// Any failure, including a failed `COMMIT`, rolls the transaction back so
/// the connection is never left inside an open transaction.
fn in_unit(conn: &Connection, work: impl FnOnce(&Connection) -> Result<()>) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| Error::operation("begin_transaction", e))?;

    let result = work(conn).and_then(|()| {
        conn.execute("COMMIT", [])
            .map(|_| ())
            .map_err(|e| Error::operation("commit_transaction", e))
    });

    if result.is_err() && !conn.is_autocommit() {
        if let Err(e) = conn.execute("ROLLBACK", []) {
            warn!(error = %e, "Failed to roll back lifecycle index unit");
        }
    }
    result
}
