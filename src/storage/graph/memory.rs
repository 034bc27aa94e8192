//! In-memory graph store.
//!
//! Every unit of work runs against a staged copy of the committed graph. On
//! success the touched entities are diffed into a [`Changeset`], the
//! registered commit hooks see it, and only then is the staged copy
//! published. A failing unit or a failing hook discards the staged copy.

use crate::models::{Changeset, Edge, EntityId, EntityKind, Node, PropertyValue};
use crate::storage::sqlite::acquire_lock;
use crate::storage::traits::graph::{BulkEntitySource, CommitHook, GraphStore, GraphWrite};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::{Arc, Mutex, RwLock};
use tracing::instrument;

#[derive(Debug, Clone, Default)]
struct GraphData {
    nodes: BTreeMap<EntityId, Node>,
    edges: BTreeMap<EntityId, Edge>,
    next_node: u64,
    next_edge: u64,
}

/// Staged mutable view handed to a unit of work.
///
/// Reads see the unit's own writes. Nothing becomes visible to other readers
/// until the unit commits.
#[derive(Debug)]
pub struct GraphTransaction {
    data: GraphData,
    touched_nodes: BTreeSet<EntityId>,
    touched_edges: BTreeSet<EntityId>,
}

impl GraphTransaction {
    const fn new(data: GraphData) -> Self {
        Self {
            data,
            touched_nodes: BTreeSet::new(),
            touched_edges: BTreeSet::new(),
        }
    }

    /// Creates a node. `build` receives the fresh node and returns it with
    /// whatever tags and properties it should carry.
    pub fn create_node(&mut self, build: impl FnOnce(Node) -> Node) -> EntityId {
        self.data.next_node += 1;
        let id = EntityId::new(self.data.next_node);
        let mut node = build(Node::new(id));
        node.id = id;
        self.data.nodes.insert(id, node);
        self.touched_nodes.insert(id);
        id
    }

    /// Creates an edge between two existing nodes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if either endpoint does not exist.
    pub fn create_edge(
        &mut self,
        from: EntityId,
        to: EntityId,
        edge_type: &str,
        build: impl FnOnce(Edge) -> Edge,
    ) -> Result<EntityId> {
        for endpoint in [from, to] {
            if !self.data.nodes.contains_key(&endpoint) {
                return Err(Error::InvalidInput(format!(
                    "edge endpoint node {endpoint} does not exist"
                )));
            }
        }
        self.data.next_edge += 1;
        let id = EntityId::new(self.data.next_edge);
        let mut edge = build(Edge::new(id, from, to, edge_type));
        edge.id = id;
        edge.from = from;
        edge.to = to;
        self.data.edges.insert(id, edge);
        self.touched_edges.insert(id);
        Ok(id)
    }

    /// Sets a property. Returns `false` if the entity does not exist.
    pub fn set_property(
        &mut self,
        kind: EntityKind,
        id: EntityId,
        key: &str,
        value: impl Into<PropertyValue>,
    ) -> bool {
        let value = value.into();
        let updated = match kind {
            EntityKind::Node => self
                .data
                .nodes
                .get_mut(&id)
                .map(|node| node.properties.insert(key.to_string(), value))
                .is_some(),
            EntityKind::Edge => self
                .data
                .edges
                .get_mut(&id)
                .map(|edge| edge.properties.insert(key.to_string(), value))
                .is_some(),
        };
        if updated {
            self.touch(kind, id);
        }
        updated
    }

    /// Removes a property. Returns `true` if it was present.
    pub fn remove_property(&mut self, kind: EntityKind, id: EntityId, key: &str) -> bool {
        let removed = match kind {
            EntityKind::Node => self
                .data
                .nodes
                .get_mut(&id)
                .is_some_and(|node| node.properties.remove(key).is_some()),
            EntityKind::Edge => self
                .data
                .edges
                .get_mut(&id)
                .is_some_and(|edge| edge.properties.remove(key).is_some()),
        };
        if removed {
            self.touch(kind, id);
        }
        removed
    }

    fn touch(&mut self, kind: EntityKind, id: EntityId) {
        match kind {
            EntityKind::Node => self.touched_nodes.insert(id),
            EntityKind::Edge => self.touched_edges.insert(id),
        };
    }

    fn changeset(&self, committed: &GraphData) -> Changeset {
        let mut changes = Changeset::new();
        for id in &self.touched_nodes {
            changes.record_node(committed.nodes.get(id), self.data.nodes.get(id));
        }
        for id in &self.touched_edges {
            changes.record_edge(committed.edges.get(id), self.data.edges.get(id));
        }
        changes
    }

    fn set_tag(&mut self, node: EntityId, tag: &str, present: bool) -> bool {
        let Some(target) = self.data.nodes.get_mut(&node) else {
            return false;
        };
        let changed = if present {
            target.tags.insert(tag.to_string())
        } else {
            target.tags.remove(tag)
        };
        if changed {
            self.touched_nodes.insert(node);
        }
        true
    }
}

impl GraphWrite for GraphTransaction {
    fn node(&self, id: EntityId) -> Option<&Node> {
        self.data.nodes.get(&id)
    }

    fn edge(&self, id: EntityId) -> Option<&Edge> {
        self.data.edges.get(&id)
    }

    fn incident_edges(&self, node: EntityId) -> Vec<EntityId> {
        self.data
            .edges
            .values()
            .filter(|edge| edge.touches(node))
            .map(|edge| edge.id)
            .collect()
    }

    fn delete_node(&mut self, id: EntityId) -> Result<bool> {
        if !self.data.nodes.contains_key(&id) {
            return Ok(false);
        }
        let incident = self.incident_edges(id);
        if !incident.is_empty() {
            return Err(Error::InvalidInput(format!(
                "node {id} still has {} edge(s)",
                incident.len()
            )));
        }
        self.data.nodes.remove(&id);
        self.touched_nodes.insert(id);
        Ok(true)
    }

    fn delete_edge(&mut self, id: EntityId) -> Result<bool> {
        let removed = self.data.edges.remove(&id).is_some();
        if removed {
            self.touched_edges.insert(id);
        }
        Ok(removed)
    }

    fn add_tag(&mut self, node: EntityId, tag: &str) -> Result<bool> {
        Ok(self.set_tag(node, tag, true))
    }

    fn remove_tag(&mut self, node: EntityId, tag: &str) -> Result<bool> {
        Ok(self.set_tag(node, tag, false))
    }
}

/// Graph store held in process memory.
///
/// Writers are serialized; readers see the last committed state.
///
/// # Example
///
/// ```
/// use graph_lifecycle::storage::graph::InMemoryGraphStore;
/// use graph_lifecycle::storage::GraphStore;
///
/// let store = InMemoryGraphStore::new();
/// let id = store.transact(|tx| Ok(tx.create_node(|n| n.with_tag("Session"))))?;
/// assert!(store.node(id)?.is_some());
/// # Ok::<(), graph_lifecycle::Error>(())
/// ```
#[derive(Default)]
pub struct InMemoryGraphStore {
    data: RwLock<GraphData>,
    writer: Mutex<()>,
    hooks: RwLock<Vec<Arc<dyn CommitHook>>>,
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish_non_exhaustive()
    }
}

impl InMemoryGraphStore {
    /// Creates an empty store with no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a hook that sees every subsequent transaction before it
    /// commits.
    pub fn register_hook(&self, hook: Arc<dyn CommitHook>) {
        match self.hooks.write() {
            Ok(mut hooks) => hooks.push(hook),
            Err(poisoned) => poisoned.into_inner().push(hook),
        }
    }

    /// Returns the number of committed nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.data.read().map(|d| d.nodes.len()).unwrap_or(0)
    }

    /// Returns the number of committed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.data.read().map(|d| d.edges.len()).unwrap_or(0)
    }

    /// Runs `work` as one atomic unit of work.
    ///
    /// # Errors
    ///
    /// Returns the work's error or the first failing commit hook's error. The
    /// committed graph is left untouched in both cases.
    #[instrument(skip_all)]
    pub fn transact<T>(&self, work: impl FnOnce(&mut GraphTransaction) -> Result<T>) -> Result<T> {
        let _writer = acquire_lock(&self.writer);

        let staged = self
            .data
            .read()
            .map_err(|_| Error::operation("begin_unit", "graph lock poisoned"))?
            .clone();
        let mut tx = GraphTransaction::new(staged);
        let value = work(&mut tx)?;

        let changes = {
            let committed = self
                .data
                .read()
                .map_err(|_| Error::operation("diff_unit", "graph lock poisoned"))?;
            tx.changeset(&committed)
        };

        let hooks = self
            .hooks
            .read()
            .map_err(|_| Error::operation("commit_hooks", "hook lock poisoned"))?
            .clone();
        for hook in &hooks {
            hook.before_commit(&changes)?;
        }

        let mut committed = self
            .data
            .write()
            .map_err(|_| Error::operation("commit_unit", "graph lock poisoned"))?;
        *committed = tx.data;
        Ok(value)
    }
}

impl GraphStore for InMemoryGraphStore {
    fn node(&self, id: EntityId) -> Result<Option<Node>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::operation("read_node", "graph lock poisoned"))?;
        Ok(data.nodes.get(&id).cloned())
    }

    fn edge(&self, id: EntityId) -> Result<Option<Edge>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::operation("read_edge", "graph lock poisoned"))?;
        Ok(data.edges.get(&id).cloned())
    }

    fn write_unit(
        &self,
        work: &mut dyn FnMut(&mut dyn GraphWrite) -> Result<bool>,
    ) -> Result<bool> {
        self.transact(|tx| work(tx))
    }
}

fn after_bound(after: Option<EntityId>) -> (Bound<EntityId>, Bound<EntityId>) {
    after.map_or((Bound::Unbounded, Bound::Unbounded), |id| {
        (Bound::Excluded(id), Bound::Unbounded)
    })
}

impl BulkEntitySource for InMemoryGraphStore {
    fn scan_nodes(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Node>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::operation("scan_nodes", "graph lock poisoned"))?;
        Ok(data
            .nodes
            .range(after_bound(after))
            .take(limit)
            .map(|(_, node)| node.clone())
            .collect())
    }

    fn scan_edges(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Edge>> {
        let data = self
            .data
            .read()
            .map_err(|_| Error::operation("scan_edges", "graph lock poisoned"))?;
        Ok(data
            .edges
            .range(after_bound(after))
            .take(limit)
            .map(|(_, edge)| edge.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionChangeset;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Changeset>>,
        reject: bool,
    }

    impl CommitHook for Recorder {
        fn before_commit(&self, changes: &dyn TransactionChangeset) -> Result<()> {
            let mut copy = Changeset::new();
            for node in changes.created_nodes() {
                copy = copy.with_created_node(node.clone());
            }
            for node in changes.deleted_nodes() {
                copy = copy.with_deleted_node(node.clone());
            }
            for change in changes.changed_nodes() {
                copy = copy.with_changed_node(change.previous.clone(), change.current.clone());
            }
            self.seen.lock().unwrap().push(copy);
            if self.reject {
                return Err(Error::operation("before_commit", "rejected"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_hooks_see_diff() {
        let store = InMemoryGraphStore::new();
        let recorder = Arc::new(Recorder::default());
        store.register_hook(recorder.clone());

        let id = store
            .transact(|tx| Ok(tx.create_node(|n| n.with_property("expire", 5_i64))))
            .unwrap();
        store
            .transact(|tx| {
                tx.set_property(EntityKind::Node, id, "expire", 9_i64);
                Ok(())
            })
            .unwrap();
        store.transact(|tx| tx.delete_node(id)).unwrap();

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].created_nodes().len(), 1);
        assert!(seen[1].property_changed(EntityKind::Node, id, "expire"));
        assert_eq!(seen[2].deleted_nodes().len(), 1);
    }

    #[test]
    fn test_hook_error_aborts_unit() {
        let store = InMemoryGraphStore::new();
        store.register_hook(Arc::new(Recorder {
            reject: true,
            ..Recorder::default()
        }));

        let result = store.transact(|tx| Ok(tx.create_node(|n| n)));
        assert!(result.is_err());
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_work_error_discards_changes() {
        let store = InMemoryGraphStore::new();
        let result: Result<()> = store.transact(|tx| {
            tx.create_node(|n| n);
            Err(Error::InvalidInput("stop".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_delete_node_with_edges_is_rejected() {
        let store = InMemoryGraphStore::new();
        let (a, _) = store
            .transact(|tx| {
                let a = tx.create_node(|n| n);
                let b = tx.create_node(|n| n);
                tx.create_edge(a, b, "LIKES", |e| e)?;
                Ok((a, b))
            })
            .unwrap();

        let result = store.transact(|tx| tx.delete_node(a));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_create_edge_requires_endpoints() {
        let store = InMemoryGraphStore::new();
        let result = store.transact(|tx| {
            let a = tx.create_node(|n| n);
            tx.create_edge(a, EntityId::new(99), "LIKES", |e| e)
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_scan_pages_by_id() {
        let store = InMemoryGraphStore::new();
        store
            .transact(|tx| {
                for _ in 0..5 {
                    tx.create_node(|n| n);
                }
                Ok(())
            })
            .unwrap();

        let first = store.scan_nodes(None, 2).unwrap();
        let second = store.scan_nodes(Some(first[1].id), 2).unwrap();
        let third = store.scan_nodes(Some(second[1].id), 2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].id, EntityId::new(5));
    }

    #[test]
    fn test_tag_changes_are_recorded() {
        let store = InMemoryGraphStore::new();
        let id = store.transact(|tx| Ok(tx.create_node(|n| n.with_tag("A")))).unwrap();
        store
            .transact(|tx| {
                tx.remove_tag(id, "A")?;
                tx.add_tag(id, "B")
            })
            .unwrap();

        let node = store.node(id).unwrap().unwrap();
        assert!(node.has_tag("B"));
        assert!(!node.has_tag("A"));
    }
}
