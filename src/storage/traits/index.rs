//! Lifecycle index backend trait.
//!
//! The lifecycle index maps `(index, kind, event, entity)` to the millisecond
//! timestamp at which the event becomes due for the entity, and answers range
//! queries over those timestamps.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | `InMemoryIndexBackend` | Testing, embedded | `BTreeMap` range scans |
//! | `SqliteIndexBackend` | Default; persistent | B-tree index on `due_at` |
//!
//! # Error Modes and Guarantees
//!
//! | Operation | Atomicity | Notes |
//! |-----------|-----------|-------|
//! | `apply` | All-or-nothing | One unit of work; a failure leaves the index unchanged |
//! | `upsert` | Single unit | Re-indexing the same key overwrites |
//! | `remove` | Single unit | Removing an absent key is a no-op |
//! | `range_query` | Snapshot read | Order is backend-native |

use crate::Result;
use crate::models::{EntityId, EntityKind};

/// Key of one index entry.
///
/// The key is idempotent: upserting the same key twice keeps a single entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    /// Name of the logical index.
    pub index: String,
    /// Kind of the indexed entity.
    pub kind: EntityKind,
    /// Lifecycle event name.
    pub event: String,
    /// Indexed entity.
    pub entity: EntityId,
}

impl IndexKey {
    /// Creates a key.
    pub fn new(
        index: impl Into<String>,
        kind: EntityKind,
        event: impl Into<String>,
        entity: EntityId,
    ) -> Self {
        Self {
            index: index.into(),
            kind,
            event: event.into(),
            entity,
        }
    }
}

/// A single mutation within a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    /// Insert or overwrite the due timestamp for a key.
    Upsert {
        /// Entry key.
        key: IndexKey,
        /// Due timestamp in milliseconds since the epoch.
        due_at: i64,
    },
    /// Remove the entry for a key, if present.
    Remove(IndexKey),
}

/// Result row of a range query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Indexed entity.
    pub entity: EntityId,
    /// Due timestamp in milliseconds since the epoch.
    pub due_at: i64,
}

/// Trait for lifecycle index backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn LifecycleIndexBackend>`
/// - The commit hook and the sweep call in concurrently; every call must be
///   atomic on its own
/// - `apply` must not partially apply a failed unit of work
pub trait LifecycleIndexBackend: Send + Sync {
    /// Applies a unit of work atomically.
    ///
    /// Operations apply in order, so a `Remove` followed by an `Upsert` of the
    /// same key leaves the upserted entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be committed. The index is left
    /// unchanged in that case.
    fn apply(&self, ops: &[IndexOp]) -> Result<()>;

    /// Inserts or overwrites one entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be committed.
    fn upsert(&self, key: &IndexKey, due_at: i64) -> Result<()> {
        self.apply(&[IndexOp::Upsert {
            key: key.clone(),
            due_at,
        }])
    }

    /// Removes one entry. Removing an absent entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit could not be committed.
    fn remove(&self, key: &IndexKey) -> Result<()> {
        self.apply(&[IndexOp::Remove(key.clone())])
    }

    /// Returns entries of `(index, kind, event)` whose due timestamp lies in
    /// `[low, high]`, at most `limit` of them when a limit is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn range_query(
        &self,
        index: &str,
        kind: EntityKind,
        event: &str,
        low: i64,
        high: i64,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>>;

    /// Looks up the due timestamp of a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn due_at(&self, key: &IndexKey) -> Result<Option<i64>>;

    /// Returns `true` if the named index has been created.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn exists(&self, index: &str) -> Result<bool>;

    /// Creates the named index if needed. Returns `true` if it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be created.
    fn ensure_index(&self, index: &str) -> Result<bool>;

    /// Counts the entries of `(index, kind, event)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count(&self, index: &str, kind: EntityKind, event: &str) -> Result<usize>;
}
