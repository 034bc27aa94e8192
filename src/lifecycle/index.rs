//! Event-aware view over a [`LifecycleIndexBackend`].
//!
//! Translates `(event, entity)` pairs into backend keys, computes due dates
//! through the [`EffectiveDateCalculator`], and keeps each call inside one
//! atomic backend unit of work.

use super::effective_date::EffectiveDateCalculator;
use super::event::{LifecycleEvent, LifecycleEventRegistry};
use crate::Result;
use crate::models::{Entity, EntityId, EntityKind};
use crate::storage::traits::index::{IndexEntry, IndexKey, IndexOp, LifecycleIndexBackend};
use std::sync::Arc;
use tracing::debug;

/// Lower bound of every due-date query.
pub const DUE_RANGE_START: i64 = 0;

/// Range-queryable "due at" index for every registered event.
#[derive(Clone)]
pub struct LifecycleIndex {
    backend: Arc<dyn LifecycleIndexBackend>,
    calculator: EffectiveDateCalculator,
}

impl std::fmt::Debug for LifecycleIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleIndex")
            .field("calculator", &self.calculator)
            .finish_non_exhaustive()
    }
}

impl LifecycleIndex {
    /// Creates an index over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn LifecycleIndexBackend>, calculator: EffectiveDateCalculator) -> Self {
        Self {
            backend,
            calculator,
        }
    }

    /// The calculator used for due dates.
    #[must_use]
    pub const fn calculator(&self) -> &EffectiveDateCalculator {
        &self.calculator
    }

    /// The underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LifecycleIndexBackend> {
        &self.backend
    }

    /// Returns the backend key for an entity, or `None` if the event does not
    /// track its kind.
    #[must_use]
    pub fn key(event: &LifecycleEvent, kind: EntityKind, id: EntityId) -> Option<IndexKey> {
        event
            .binding(kind)
            .map(|binding| IndexKey::new(binding.index_name.clone(), kind, event.name(), id))
    }

    /// Creates every index named by the registry's bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot create an index.
    pub fn ensure_indexes(&self, registry: &LifecycleEventRegistry) -> Result<()> {
        for event in registry.iter() {
            for kind in EntityKind::SWEEP_ORDER {
                if let Some(binding) = event.binding(kind) {
                    if self.backend.ensure_index(&binding.index_name)? {
                        debug!(index = %binding.index_name, "Created lifecycle index");
                    }
                }
            }
        }
        Ok(())
    }

    /// Schedules `entity` for `event`.
    ///
    /// Returns the due date, or `None` if the entity is not scheduled; in that
    /// case the index is not touched and any existing entry stays as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend unit of work fails.
    pub fn index(&self, event: &LifecycleEvent, entity: &dyn Entity) -> Result<Option<i64>> {
        let Some(op) = self.index_op(event, entity) else {
            return Ok(None);
        };
        let due_at = match &op {
            IndexOp::Upsert { due_at, .. } => Some(*due_at),
            IndexOp::Remove(_) => None,
        };
        self.apply(&[op])?;
        Ok(due_at)
    }

    /// Drops the entity's entry for `event`. Absent entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend unit of work fails.
    pub fn remove(&self, event: &LifecycleEvent, kind: EntityKind, id: EntityId) -> Result<()> {
        match Self::remove_op(event, kind, id) {
            Some(op) => self.apply(&[op]),
            None => Ok(()),
        }
    }

    /// Removes the entry of `previous` and schedules `current`, as one unit
    /// of work.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend unit of work fails; nothing is applied
    /// in that case.
    pub fn reindex(
        &self,
        event: &LifecycleEvent,
        previous: &dyn Entity,
        current: &dyn Entity,
    ) -> Result<Option<i64>> {
        let mut ops = Vec::with_capacity(2);
        self.push_reindex_ops(event, previous, current, &mut ops);
        self.apply(&ops)?;
        Ok(ops.iter().find_map(|op| match op {
            IndexOp::Upsert { due_at, .. } => Some(*due_at),
            IndexOp::Remove(_) => None,
        }))
    }

    /// Schedules a batch of entities in one unit of work.
    ///
    /// Returns how many of them were scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend unit of work fails; nothing from the
    /// batch is applied in that case.
    pub fn index_batch<E: Entity>(&self, event: &LifecycleEvent, entities: &[E]) -> Result<usize> {
        let ops: Vec<IndexOp> = entities
            .iter()
            .filter_map(|entity| self.index_op(event, entity))
            .collect();
        self.apply(&ops)?;
        Ok(ops.len())
    }

    /// The upsert scheduling `entity` for `event`, or `None` if it has no
    /// effective date or the event does not track its kind.
    #[must_use]
    pub fn index_op(&self, event: &LifecycleEvent, entity: &dyn Entity) -> Option<IndexOp> {
        let key = Self::key(event, entity.kind(), entity.id())?;
        let due_at = self.calculator.effective_date(entity, event)?;
        Some(IndexOp::Upsert { key, due_at })
    }

    /// The removal of the entity's entry for `event`.
    #[must_use]
    pub fn remove_op(event: &LifecycleEvent, kind: EntityKind, id: EntityId) -> Option<IndexOp> {
        Self::key(event, kind, id).map(IndexOp::Remove)
    }

    /// Appends the removal of `previous` and the upsert of `current`, if any.
    pub fn push_reindex_ops(
        &self,
        event: &LifecycleEvent,
        previous: &dyn Entity,
        current: &dyn Entity,
        ops: &mut Vec<IndexOp>,
    ) {
        let Some(remove) = Self::remove_op(event, previous.kind(), previous.id()) else {
            return;
        };
        ops.push(remove);
        ops.extend(self.index_op(event, current));
    }

    /// Applies planned operations as one backend unit of work.
    ///
    /// An empty plan does not reach the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit of work fails; nothing is applied in
    /// that case.
    pub fn apply(&self, ops: &[IndexOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        self.backend.apply(ops)?;
        for op in ops {
            record_op(op);
        }
        Ok(())
    }

    /// Returns entries of `kind` due for `event` at or before `timestamp`.
    ///
    /// Entries come back in backend order; the only guarantee is that each
    /// one satisfies the bound. An event that does not track `kind` yields
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub fn candidates_due_before(
        &self,
        event: &LifecycleEvent,
        kind: EntityKind,
        timestamp: i64,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>> {
        let Some(binding) = event.binding(kind) else {
            return Ok(Vec::new());
        };
        self.backend.range_query(
            &binding.index_name,
            kind,
            event.name(),
            DUE_RANGE_START,
            timestamp,
            limit,
        )
    }

    /// Returns the entity's due date for `event`, if it is tracked.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lookup fails.
    pub fn due_at(
        &self,
        event: &LifecycleEvent,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<i64>> {
        match Self::key(event, kind, id) {
            Some(key) => self.backend.due_at(&key),
            None => Ok(None),
        }
    }

    /// Number of entries of `kind` tracked for `event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub fn count(&self, event: &LifecycleEvent, kind: EntityKind) -> Result<usize> {
        match event.binding(kind) {
            Some(binding) => self.backend.count(&binding.index_name, kind, event.name()),
            None => Ok(0),
        }
    }
}

fn record_op(op: &IndexOp) {
    let (name, key) = match op {
        IndexOp::Upsert { key, .. } => ("lifecycle_index_upserts_total", key),
        IndexOp::Remove(key) => ("lifecycle_index_removals_total", key),
    };
    metrics::counter!(name, "event" => key.event.clone(), "kind" => key.kind.as_str()).increment(1);
}
