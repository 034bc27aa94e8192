//! In-memory lifecycle index backend.

use crate::models::{EntityId, EntityKind};
use crate::storage::traits::index::{IndexEntry, IndexKey, IndexOp, LifecycleIndexBackend};
use crate::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

/// Position of an entry in the ordered due-date set.
type DueSlot = (String, EntityKind, String, i64, EntityId);

#[derive(Debug, Default)]
struct IndexState {
    due_by_key: HashMap<IndexKey, i64>,
    ordered: BTreeSet<DueSlot>,
    indexes: BTreeSet<String>,
}

impl IndexState {
    fn slot(key: &IndexKey, due_at: i64) -> DueSlot {
        (
            key.index.clone(),
            key.kind,
            key.event.clone(),
            due_at,
            key.entity,
        )
    }

    fn upsert(&mut self, key: &IndexKey, due_at: i64) {
        if let Some(previous) = self.due_by_key.insert(key.clone(), due_at) {
            self.ordered.remove(&Self::slot(key, previous));
        }
        self.ordered.insert(Self::slot(key, due_at));
        self.indexes.insert(key.index.clone());
    }

    fn remove(&mut self, key: &IndexKey) {
        if let Some(previous) = self.due_by_key.remove(key) {
            self.ordered.remove(&Self::slot(key, previous));
        }
    }
}

/// Lifecycle index held in process memory.
///
/// Uses `RwLock` for thread-safe access. A unit of work runs under a single
/// write lock, so it is atomic with respect to every reader. Data is not
/// persisted between runs.
///
/// # Example
///
/// ```
/// use graph_lifecycle::models::{EntityId, EntityKind};
/// use graph_lifecycle::storage::index::InMemoryIndexBackend;
/// use graph_lifecycle::storage::{IndexKey, LifecycleIndexBackend};
///
/// let backend = InMemoryIndexBackend::new();
/// let key = IndexKey::new("nodeExpirationIndex", EntityKind::Node, "expiry", EntityId::new(1));
/// backend.upsert(&key, 1_000)?;
///
/// let due = backend.range_query("nodeExpirationIndex", EntityKind::Node, "expiry", 0, 1_000, None)?;
/// assert_eq!(due.len(), 1);
/// # Ok::<(), graph_lifecycle::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InMemoryIndexBackend {
    state: RwLock<IndexState>,
}

impl InMemoryIndexBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of entries across all indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.due_by_key.len()).unwrap_or(0)
    }

    /// Returns `true` if no entries are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_error(operation: &str) -> Error {
    Error::operation(operation, "index lock poisoned")
}

impl LifecycleIndexBackend for InMemoryIndexBackend {
    fn apply(&self, ops: &[IndexOp]) -> Result<()> {
        let mut state = self.state.write().map_err(|_| lock_error("apply"))?;
        for op in ops {
            match op {
                IndexOp::Upsert { key, due_at } => state.upsert(key, *due_at),
                IndexOp::Remove(key) => state.remove(key),
            }
        }
        Ok(())
    }

    fn range_query(
        &self,
        index: &str,
        kind: EntityKind,
        event: &str,
        low: i64,
        high: i64,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>> {
        if low > high {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| lock_error("range_query"))?;
        let start = (
            index.to_string(),
            kind,
            event.to_string(),
            low,
            EntityId::new(0),
        );
        let end = (
            index.to_string(),
            kind,
            event.to_string(),
            high,
            EntityId::new(u64::MAX),
        );
        let entries = state
            .ordered
            .range(start..=end)
            .map(|(_, _, _, due_at, entity)| IndexEntry {
                entity: *entity,
                due_at: *due_at,
            })
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        Ok(entries)
    }

    fn due_at(&self, key: &IndexKey) -> Result<Option<i64>> {
        let state = self.state.read().map_err(|_| lock_error("due_at"))?;
        Ok(state.due_by_key.get(key).copied())
    }

    fn exists(&self, index: &str) -> Result<bool> {
        let state = self.state.read().map_err(|_| lock_error("exists"))?;
        Ok(state.indexes.contains(index))
    }

    fn ensure_index(&self, index: &str) -> Result<bool> {
        let mut state = self.state.write().map_err(|_| lock_error("ensure_index"))?;
        Ok(state.indexes.insert(index.to_string()))
    }

    fn count(&self, index: &str, kind: EntityKind, event: &str) -> Result<usize> {
        let state = self.state.read().map_err(|_| lock_error("count"))?;
        Ok(state
            .due_by_key
            .keys()
            .filter(|k| k.index == index && k.kind == kind && k.event == event)
            .count())
    }
}
