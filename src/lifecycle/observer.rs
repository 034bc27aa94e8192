//! Transactional change observer.
//!
//! Runs inside the host's commit pipeline and keeps the lifecycle index in
//! step with every transaction:
//!
//! - created entities are indexed
//! - changed entities whose driving properties were created, changed or
//!   deleted are reindexed (old entry removed, new one computed), once per
//!   `(entity, event)` pair
//! - deleted entities lose their entry unconditionally
//!
//! Every index operation a transaction implies is planned first and applied
//! as a single backend unit of work. An index failure is returned to the
//! host, which aborts the transaction, and leaves the index untouched.

use super::event::{LifecycleEvent, LifecycleEventRegistry};
use super::index::LifecycleIndex;
use crate::Result;
use crate::models::{Change, Entity, EntityKind, TransactionChangeset};
use crate::storage::traits::graph::CommitHook;
use crate::storage::traits::index::IndexOp;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Index work done for one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserveStats {
    /// Newly created entities that were scheduled.
    pub indexed: usize,
    /// Changed entities that were re-evaluated.
    pub reindexed: usize,
    /// Deleted entities whose entries were dropped.
    pub removed: usize,
}

impl ObserveStats {
    /// Returns `true` if the transaction caused no index work.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.indexed == 0 && self.reindexed == 0 && self.removed == 0
    }
}

/// Commit hook keeping the lifecycle index consistent with the graph.
#[derive(Debug, Clone)]
pub struct ChangeObserver {
    registry: Arc<LifecycleEventRegistry>,
    index: LifecycleIndex,
}

impl ChangeObserver {
    /// Creates an observer for the registered events.
    #[must_use]
    pub const fn new(registry: Arc<LifecycleEventRegistry>, index: LifecycleIndex) -> Self {
        Self { registry, index }
    }

    /// Applies one transaction's diff to the index.
    ///
    /// The whole diff, across every event and kind, is one unit of work.
    ///
    /// # Errors
    ///
    /// Returns the index failure; nothing is applied in that case.
    #[instrument(name = "lifecycle.observe", skip_all)]
    pub fn observe(&self, changes: &dyn TransactionChangeset) -> Result<ObserveStats> {
        let mut stats = ObserveStats::default();
        if changes.is_empty() {
            return Ok(stats);
        }

        let mut ops = Vec::new();
        for event in self.registry.iter() {
            if event.tracks(EntityKind::Node) {
                stats.indexed += self.plan_created(event, changes.created_nodes(), &mut ops);
                stats.reindexed += self.plan_changed(
                    event,
                    changes,
                    EntityKind::Node,
                    changes.changed_nodes(),
                    &mut ops,
                );
                stats.removed += plan_deleted(event, changes.deleted_nodes(), &mut ops);
            }
            if event.tracks(EntityKind::Edge) {
                stats.indexed += self.plan_created(event, changes.created_edges(), &mut ops);
                stats.reindexed += self.plan_changed(
                    event,
                    changes,
                    EntityKind::Edge,
                    changes.changed_edges(),
                    &mut ops,
                );
                stats.removed += plan_deleted(event, changes.deleted_edges(), &mut ops);
            }
        }

        self.index.apply(&ops)?;
        if !stats.is_empty() {
            debug!(
                indexed = stats.indexed,
                reindexed = stats.reindexed,
                removed = stats.removed,
                ops = ops.len(),
                "Lifecycle index updated"
            );
        }
        Ok(stats)
    }

    fn plan_created<E: Entity>(
        &self,
        event: &LifecycleEvent,
        created: &[E],
        ops: &mut Vec<IndexOp>,
    ) -> usize {
        let before = ops.len();
        ops.extend(created.iter().filter_map(|entity| self.index.index_op(event, entity)));
        ops.len() - before
    }

    fn plan_changed<E: Entity>(
        &self,
        event: &LifecycleEvent,
        changes: &dyn TransactionChangeset,
        kind: EntityKind,
        changed: &[Change<E>],
        ops: &mut Vec<IndexOp>,
    ) -> usize {
        let mut reindexed = 0;
        for change in changed {
            if event.should_reindex(changes, kind, change.current.id()) {
                self.index
                    .push_reindex_ops(event, &change.previous, &change.current, ops);
                reindexed += 1;
            }
        }
        reindexed
    }
}

fn plan_deleted<E: Entity>(event: &LifecycleEvent, deleted: &[E], ops: &mut Vec<IndexOp>) -> usize {
    ops.extend(
        deleted
            .iter()
            .filter_map(|entity| LifecycleIndex::remove_op(event, entity.kind(), entity.id())),
    );
    deleted.len()
}

impl CommitHook for ChangeObserver {
    fn before_commit(&self, changes: &dyn TransactionChangeset) -> Result<()> {
        self.observe(changes).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::effective_date::EffectiveDateCalculator;
    use crate::lifecycle::event::{EXPIRY_EVENT, KindBinding, REVIVAL_EVENT};
    use crate::lifecycle::strategy::{DeleteEdge, DeleteOrphanedNode};
    use crate::models::{Changeset, Edge, EntityId, Node};
    use crate::storage::index::InMemoryIndexBackend;

    const NOW: i64 = 50_000;

    fn observer() -> (ChangeObserver, LifecycleIndex, Arc<LifecycleEventRegistry>) {
        let expiry = LifecycleEvent::new(EXPIRY_EVENT)
            .with_binding(
                EntityKind::Node,
                KindBinding::new("nodeExpirationIndex", Arc::new(DeleteOrphanedNode))
                    .with_date_property("expire")
                    .with_ttl_property("ttl"),
            )
            .with_binding(
                EntityKind::Edge,
                KindBinding::new("relationshipExpirationIndex", Arc::new(DeleteEdge))
                    .with_date_property("expire"),
            );
        let revival = LifecycleEvent::new(REVIVAL_EVENT).with_binding(
            EntityKind::Node,
            KindBinding::new("nodeRevivalIndex", Arc::new(DeleteOrphanedNode))
                .with_date_property("revive"),
        );
        let registry = Arc::new(LifecycleEventRegistry::new([revival, expiry]).unwrap());
        let calculator = EffectiveDateCalculator::new(Arc::new(ManualClock::new(NOW)));
        let index = LifecycleIndex::new(Arc::new(InMemoryIndexBackend::new()), calculator);
        (
            ChangeObserver::new(Arc::clone(&registry), index.clone()),
            index,
            registry,
        )
    }

    fn due(index: &LifecycleIndex, registry: &LifecycleEventRegistry, event: &str, id: u64) -> Option<i64> {
        let event = registry.get(event).unwrap();
        index.due_at(event, EntityKind::Node, EntityId::new(id)).unwrap()
    }

    #[test]
    fn test_created_entities_are_indexed() {
        let (observer, index, registry) = observer();
        let node = Node::new(EntityId::new(1))
            .with_property("expire", NOW + 1)
            .with_property("revive", NOW + 2);
        let edge = Edge::new(EntityId::new(1), EntityId::new(1), EntityId::new(2), "LIKES")
            .with_property("expire", NOW + 3);

        let stats = observer
            .observe(&Changeset::new().with_created_node(node).with_created_edge(edge))
            .unwrap();

        assert_eq!(stats.indexed, 3);
        assert_eq!(due(&index, &registry, EXPIRY_EVENT, 1), Some(NOW + 1));
        assert_eq!(due(&index, &registry, REVIVAL_EVENT, 1), Some(NOW + 2));
    }

    #[test]
    fn test_cleared_property_drops_entry() {
        let (observer, index, registry) = observer();
        let before = Node::new(EntityId::new(1)).with_property("expire", NOW);
        observer
            .observe(&Changeset::new().with_created_node(before.clone()))
            .unwrap();

        let stats = observer
            .observe(&Changeset::new().with_changed_node(before, Node::new(EntityId::new(1))))
            .unwrap();

        assert_eq!(stats.reindexed, 1);
        assert_eq!(due(&index, &registry, EXPIRY_EVENT, 1), None);
    }

    #[test]
    fn test_reindex_once_per_event() {
        let (observer, _, _) = observer();
        let before = Node::new(EntityId::new(1))
            .with_property("expire", NOW)
            .with_property("ttl", 5_i64);
        let after = Node::new(EntityId::new(1))
            .with_property("expire", NOW + 1)
            .with_property("ttl", 6_i64);

        let stats = observer
            .observe(&Changeset::new().with_changed_node(before, after))
            .unwrap();

        // expiry reindexes once; revival's property was not touched
        assert_eq!(stats.reindexed, 1);
    }

    #[test]
    fn test_unrelated_change_is_ignored() {
        let (observer, index, registry) = observer();
        let before = Node::new(EntityId::new(1)).with_property("expire", NOW);
        observer
            .observe(&Changeset::new().with_created_node(before.clone()))
            .unwrap();

        let after = before.clone().with_property("name", "Anne");
        let stats = observer
            .observe(&Changeset::new().with_changed_node(before, after))
            .unwrap();

        assert!(stats.is_empty());
        assert_eq!(due(&index, &registry, EXPIRY_EVENT, 1), Some(NOW));
    }

    #[test]
    fn test_deleted_entities_are_removed() {
        let (observer, index, registry) = observer();
        let node = Node::new(EntityId::new(1))
            .with_property("expire", NOW)
            .with_property("revive", NOW);
        observer
            .observe(&Changeset::new().with_created_node(node.clone()))
            .unwrap();

        let stats = observer
            .observe(&Changeset::new().with_deleted_node(node))
            .unwrap();

        assert_eq!(stats.removed, 2);
        assert_eq!(due(&index, &registry, EXPIRY_EVENT, 1), None);
        assert_eq!(due(&index, &registry, REVIVAL_EVENT, 1), None);
    }

    #[test]
    fn test_unparseable_value_is_never_indexed() {
        let (observer, index, registry) = observer();
        let node = Node::new(EntityId::new(1)).with_property("expire", "wrong");
        let stats = observer
            .observe(&Changeset::new().with_created_node(node))
            .unwrap();
        assert_eq!(stats.indexed, 0);
        assert_eq!(due(&index, &registry, EXPIRY_EVENT, 1), None);
    }
}
