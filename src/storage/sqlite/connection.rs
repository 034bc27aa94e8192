//! Connection handling for `SQLite` backends.
//!
//! Poison-recovering lock acquisition and the pragmas every connection gets.

use crate::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering the inner value if it was poisoned.
///
/// A panic inside one critical section must not take the commit hook or the
/// sweep down with it, so the poisoned guard is reused and a warning logged.
///
/// # Examples
///
/// ```
/// use graph_lifecycle::storage::sqlite::acquire_lock;
/// use std::sync::Mutex;
///
/// let mutex = Mutex::new(7);
/// assert_eq!(*acquire_lock(&mutex), 7);
/// ```
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("SQLite mutex was poisoned, recovering");
            metrics::counter!("sqlite_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL synchronous mode and a 5 second busy timeout.
///
/// In-memory databases silently stay in `memory` journal mode.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so a failure here is not worth aborting for
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.pragma_update(None, "busy_timeout", "5000")
        .map_err(|e| Error::operation("configure_connection", e))?;
    Ok(())
}

/// Opens (creating if needed) a database file and configures it.
///
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the directory or the database cannot
/// be opened.
pub fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::operation("create_index_dir", e))?;
    }
    let conn = Connection::open(path).map_err(|e| Error::operation("open_index_db", e))?;
    configure_connection(&conn)?;
    Ok(conn)
}
