//! Transaction diffs.
//!
//! A [`TransactionChangeset`] describes everything a single committed
//! transaction did to the graph. The change observer consumes it to keep the
//! lifecycle indices in step with the live graph.

use super::graph::{Edge, Entity, EntityId, EntityKind, Node};

/// Before/after pair for an entity changed in a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<T> {
    /// State before the transaction.
    pub previous: T,
    /// State after the transaction.
    pub current: T,
}

impl<T: Entity> Change<T> {
    /// Creates a change from the two versions.
    pub const fn new(previous: T, current: T) -> Self {
        Self { previous, current }
    }

    /// `true` if the property is absent before and present after.
    pub fn property_created(&self, key: &str) -> bool {
        !self.previous.has_property(key) && self.current.has_property(key)
    }

    /// `true` if the property is present in both versions with different values.
    pub fn property_changed(&self, key: &str) -> bool {
        match (self.previous.property(key), self.current.property(key)) {
            (Some(before), Some(after)) => before != after,
            _ => false,
        }
    }

    /// `true` if the property is present before and absent after.
    pub fn property_deleted(&self, key: &str) -> bool {
        self.previous.has_property(key) && !self.current.has_property(key)
    }

    /// `true` if the property was created, changed, or deleted.
    pub fn property_touched(&self, key: &str) -> bool {
        self.property_created(key) || self.property_changed(key) || self.property_deleted(key)
    }
}

/// Diff of one transaction, as seen by commit hooks.
///
/// Property predicates are scoped to the transaction: they answer for entities
/// that appear in `changed_nodes()`/`changed_edges()` and return `false` for
/// anything else.
pub trait TransactionChangeset {
    /// Nodes created in this transaction.
    fn created_nodes(&self) -> &[Node];

    /// Edges created in this transaction.
    fn created_edges(&self) -> &[Edge];

    /// Nodes deleted in this transaction (last known state).
    fn deleted_nodes(&self) -> &[Node];

    /// Edges deleted in this transaction (last known state).
    fn deleted_edges(&self) -> &[Edge];

    /// Nodes that existed before and after, with at least one modification.
    fn changed_nodes(&self) -> &[Change<Node>];

    /// Edges that existed before and after, with at least one modification.
    fn changed_edges(&self) -> &[Change<Edge>];

    /// Was property `key` created on the entity in this transaction?
    fn property_created(&self, kind: EntityKind, id: EntityId, key: &str) -> bool;

    /// Was property `key` changed on the entity in this transaction?
    fn property_changed(&self, kind: EntityKind, id: EntityId, key: &str) -> bool;

    /// Was property `key` deleted from the entity in this transaction?
    fn property_deleted(&self, kind: EntityKind, id: EntityId, key: &str) -> bool;

    /// Returns `true` if the transaction touched nothing.
    fn is_empty(&self) -> bool {
        self.created_nodes().is_empty()
            && self.created_edges().is_empty()
            && self.deleted_nodes().is_empty()
            && self.deleted_edges().is_empty()
            && self.changed_nodes().is_empty()
            && self.changed_edges().is_empty()
    }
}

/// Owned [`TransactionChangeset`].
///
/// Built either by hand (tests, hosts that already compute diffs) or from
/// before/after snapshots via [`Changeset::record_node`] and
/// [`Changeset::record_edge`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changeset {
    created_nodes: Vec<Node>,
    created_edges: Vec<Edge>,
    deleted_nodes: Vec<Node>,
    deleted_edges: Vec<Edge>,
    changed_nodes: Vec<Change<Node>>,
    changed_edges: Vec<Change<Edge>>,
}

impl Changeset {
    /// Creates an empty changeset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a created node.
    #[must_use]
    pub fn with_created_node(mut self, node: Node) -> Self {
        self.created_nodes.push(node);
        self
    }

    /// Adds a created edge.
    #[must_use]
    pub fn with_created_edge(mut self, edge: Edge) -> Self {
        self.created_edges.push(edge);
        self
    }

    /// Adds a deleted node.
    #[must_use]
    pub fn with_deleted_node(mut self, node: Node) -> Self {
        self.deleted_nodes.push(node);
        self
    }

    /// Adds a deleted edge.
    #[must_use]
    pub fn with_deleted_edge(mut self, edge: Edge) -> Self {
        self.deleted_edges.push(edge);
        self
    }

    /// Adds a changed node.
    #[must_use]
    pub fn with_changed_node(mut self, previous: Node, current: Node) -> Self {
        self.changed_nodes.push(Change::new(previous, current));
        self
    }

    /// Adds a changed edge.
    #[must_use]
    pub fn with_changed_edge(mut self, previous: Edge, current: Edge) -> Self {
        self.changed_edges.push(Change::new(previous, current));
        self
    }

    /// Classifies a node from its before/after states.
    ///
    /// Identical states are ignored.
    pub fn record_node(&mut self, before: Option<&Node>, after: Option<&Node>) {
        match (before, after) {
            (None, Some(created)) => self.created_nodes.push(created.clone()),
            (Some(deleted), None) => self.deleted_nodes.push(deleted.clone()),
            (Some(previous), Some(current)) if previous != current => {
                self.changed_nodes
                    .push(Change::new(previous.clone(), current.clone()));
            },
            _ => {},
        }
    }

    /// Classifies an edge from its before/after states.
    ///
    /// Identical states are ignored.
    pub fn record_edge(&mut self, before: Option<&Edge>, after: Option<&Edge>) {
        match (before, after) {
            (None, Some(created)) => self.created_edges.push(created.clone()),
            (Some(deleted), None) => self.deleted_edges.push(deleted.clone()),
            (Some(previous), Some(current)) if previous != current => {
                self.changed_edges
                    .push(Change::new(previous.clone(), current.clone()));
            },
            _ => {},
        }
    }

    fn with_change<F>(&self, kind: EntityKind, id: EntityId, predicate: F) -> bool
    where
        F: Fn(&dyn ChangeProbe) -> bool,
    {
        match kind {
            EntityKind::Node => self
                .changed_nodes
                .iter()
                .find(|c| c.current.id == id)
                .is_some_and(|c| predicate(c)),
            EntityKind::Edge => self
                .changed_edges
                .iter()
                .find(|c| c.current.id == id)
                .is_some_and(|c| predicate(c)),
        }
    }
}

/// Object-safe view over [`Change`] so nodes and edges share the lookups.
trait ChangeProbe {
    fn created(&self, key: &str) -> bool;
    fn changed(&self, key: &str) -> bool;
    fn deleted(&self, key: &str) -> bool;
}

impl<T: Entity> ChangeProbe for Change<T> {
    fn created(&self, key: &str) -> bool {
        self.property_created(key)
    }

    fn changed(&self, key: &str) -> bool {
        self.property_changed(key)
    }

    fn deleted(&self, key: &str) -> bool {
        self.property_deleted(key)
    }
}

impl TransactionChangeset for Changeset {
    fn created_nodes(&self) -> &[Node] {
        &self.created_nodes
    }

    fn created_edges(&self) -> &[Edge] {
        &self.created_edges
    }

    fn deleted_nodes(&self) -> &[Node] {
        &self.deleted_nodes
    }

    fn deleted_edges(&self) -> &[Edge] {
        &self.deleted_edges
    }

    fn changed_nodes(&self) -> &[Change<Node>] {
        &self.changed_nodes
    }

    fn changed_edges(&self) -> &[Change<Edge>] {
        &self.changed_edges
    }

    fn property_created(&self, kind: EntityKind, id: EntityId, key: &str) -> bool {
        self.with_change(kind, id, |c| c.created(key))
    }

    fn property_changed(&self, kind: EntityKind, id: EntityId, key: &str) -> bool {
        self.with_change(kind, id, |c| c.changed(key))
    }

    fn property_deleted(&self, kind: EntityKind, id: EntityId, key: &str) -> bool {
        self.with_change(kind, id, |c| c.deleted(key))
    }
}
