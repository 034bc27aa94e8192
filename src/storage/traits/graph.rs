//! Host graph store traits.
//!
//! The graph store is an external collaborator: it owns entity identity and
//! property storage, runs transactions, and lets this crate observe them.
//!
//! # Error Modes and Guarantees
//!
//! | Operation | Atomicity | Notes |
//! |-----------|-----------|-------|
//! | `write_unit` | All-or-nothing | An `Err` from the work or from a commit hook discards every change |
//! | `node` / `edge` | Snapshot read | Sees only committed state |
//! | `scan_nodes` / `scan_edges` | Per page | Keyset pagination by ascending id |

use crate::Result;
use crate::models::{Edge, EntityId, Node, TransactionChangeset};

/// Mutable view of the graph inside one atomic unit of work.
///
/// Strategies receive this handle. Reads observe the writes already made in
/// the same unit.
pub trait GraphWrite {
    /// Looks up a node.
    fn node(&self, id: EntityId) -> Option<&Node>;

    /// Looks up an edge.
    fn edge(&self, id: EntityId) -> Option<&Edge>;

    /// Returns the ids of every edge that starts or ends at `node`.
    fn incident_edges(&self, node: EntityId) -> Vec<EntityId>;

    /// Deletes a node.
    ///
    /// Returns `false` if the node does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the node still has incident
    /// edges; edges must be removed first.
    fn delete_node(&mut self, id: EntityId) -> Result<bool>;

    /// Deletes an edge.
    ///
    /// Returns `false` if the edge does not exist.
    fn delete_edge(&mut self, id: EntityId) -> Result<bool>;

    /// Adds a tag to a node. Returns `false` if the node does not exist.
    fn add_tag(&mut self, node: EntityId, tag: &str) -> Result<bool>;

    /// Removes a tag from a node. Returns `false` if the node does not exist.
    fn remove_tag(&mut self, node: EntityId, tag: &str) -> Result<bool>;
}

/// A graph store that runs atomic units of work.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn GraphStore>`
/// - Use interior mutability for the mutable state
/// - `write_unit` must publish all of the unit's changes or none of them
pub trait GraphStore: Send + Sync {
    /// Reads a committed node.
    fn node(&self, id: EntityId) -> Result<Option<Node>>;

    /// Reads a committed edge.
    fn edge(&self, id: EntityId) -> Result<Option<Edge>>;

    /// Runs `work` inside one atomic unit of work and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the work's error, or the store's, after discarding the unit.
    fn write_unit(&self, work: &mut dyn FnMut(&mut dyn GraphWrite) -> Result<bool>)
    -> Result<bool>;
}

/// Callback invoked synchronously inside the host's commit pipeline.
pub trait CommitHook: Send + Sync {
    /// Called with the transaction's diff before it becomes visible.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the transaction.
    fn before_commit(&self, changes: &dyn TransactionChangeset) -> Result<()>;
}

/// Bounded-batch iteration over every existing entity, for startup backfill.
pub trait BulkEntitySource: Send + Sync {
    /// Returns up to `limit` nodes with ids strictly greater than `after`,
    /// in ascending id order.
    fn scan_nodes(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Node>>;

    /// Returns up to `limit` edges with ids strictly greater than `after`,
    /// in ascending id order.
    fn scan_edges(&self, after: Option<EntityId>, limit: usize) -> Result<Vec<Edge>>;
}
