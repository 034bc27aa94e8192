//! Lifecycle strategies.
//!
//! A strategy is the unit of work run against a due entity. It reports
//! whether the entity should leave the event's index: `true` ends tracking,
//! `false` leaves the entry in place for the next sweep.
//!
//! | Identifier | Aliases | Kinds | Behaviour |
//! |------------|---------|-------|-----------|
//! | `force` | `deleteNodeAndRelationships` | node | delete incident edges, then the node |
//! | `orphan` | `deleteOrphanedNodeOnly` | node | delete the node only once it has no edges |
//! | `delete` | `deleteRelationship` | edge | delete the edge |
//! | `addRemoveLabels` | `tags` | node | remove then add the configured tags |
//! | `composite(a, b)` | | members' | run members in order, removed if any member says so |
//! | `compositeAll(a, b)` | | members' | run members in order, removed if every member says so |
//!
//! Every strategy treats an entity that no longer exists as already handled.

use crate::config::TagToggleConfig;
use crate::models::{EntityId, EntityKind};
use crate::storage::traits::graph::GraphWrite;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A unit of work applied to an entity whose lifecycle event is due.
///
/// Implementations are stateless apart from configuration captured at
/// construction, so one instance may be shared across threads and events.
pub trait LifecycleStrategy: Send + Sync + fmt::Debug {
    /// Identifier used in logs and metrics.
    fn name(&self) -> &str;

    /// Returns `true` if the strategy can act on entities of `kind`.
    fn applies_to(&self, kind: EntityKind) -> bool;

    /// Applies the strategy inside the caller's unit of work.
    ///
    /// Returns `true` if the entity should be removed from the event's index.
    ///
    /// # Errors
    ///
    /// Any error aborts the unit of work; the sweep keeps the index entry and
    /// retries on the next tick.
    fn apply(&self, tx: &mut dyn GraphWrite, kind: EntityKind, id: EntityId) -> Result<bool>;
}

/// Deletes a node together with every incident edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteNodeAndEdges;

impl LifecycleStrategy for DeleteNodeAndEdges {
    fn name(&self) -> &str {
        "force"
    }

    fn applies_to(&self, kind: EntityKind) -> bool {
        kind == EntityKind::Node
    }

    fn apply(&self, tx: &mut dyn GraphWrite, _kind: EntityKind, id: EntityId) -> Result<bool> {
        if tx.node(id).is_none() {
            return Ok(true);
        }
        for edge in tx.incident_edges(id) {
            tx.delete_edge(edge)?;
        }
        tx.delete_node(id)?;
        Ok(true)
    }
}

/// Deletes a node only when it has no incident edges.
///
/// A node that still has edges keeps its index entry, so the next sweep
/// checks it again.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOrphanedNode;

impl LifecycleStrategy for DeleteOrphanedNode {
    fn name(&self) -> &str {
        "orphan"
    }

    fn applies_to(&self, kind: EntityKind) -> bool {
        kind == EntityKind::Node
    }

    fn apply(&self, tx: &mut dyn GraphWrite, _kind: EntityKind, id: EntityId) -> Result<bool> {
        if tx.node(id).is_none() {
            return Ok(true);
        }
        let edges = tx.incident_edges(id).len();
        if edges > 0 {
            debug!(node = %id, edges, "Node still connected, deferring delete");
            return Ok(false);
        }
        tx.delete_node(id)
    }
}

/// Deletes an edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteEdge;

impl LifecycleStrategy for DeleteEdge {
    fn name(&self) -> &str {
        "delete"
    }

    fn applies_to(&self, kind: EntityKind) -> bool {
        kind == EntityKind::Edge
    }

    fn apply(&self, tx: &mut dyn GraphWrite, _kind: EntityKind, id: EntityId) -> Result<bool> {
        tx.delete_edge(id)?;
        Ok(true)
    }
}

/// Removes one list of tags from a node and adds another.
///
/// Reaching the tagged state ends tracking for the event; a later change to
/// the driving property schedules it again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddRemoveTags {
    add: Vec<String>,
    remove: Vec<String>,
}

impl AddRemoveTags {
    /// Creates the strategy from the tags to add and the tags to remove.
    #[must_use]
    pub const fn new(add: Vec<String>, remove: Vec<String>) -> Self {
        Self { add, remove }
    }

    /// Tags added on apply.
    #[must_use]
    pub fn tags_to_add(&self) -> &[String] {
        &self.add
    }

    /// Tags removed on apply.
    #[must_use]
    pub fn tags_to_remove(&self) -> &[String] {
        &self.remove
    }
}

impl LifecycleStrategy for AddRemoveTags {
    fn name(&self) -> &str {
        "addRemoveLabels"
    }

    fn applies_to(&self, kind: EntityKind) -> bool {
        kind == EntityKind::Node
    }

    fn apply(&self, tx: &mut dyn GraphWrite, _kind: EntityKind, id: EntityId) -> Result<bool> {
        for tag in &self.remove {
            tx.remove_tag(id, tag)?;
        }
        for tag in &self.add {
            tx.add_tag(id, tag)?;
        }
        Ok(true)
    }
}

/// How a composite combines its members' verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositePolicy {
    /// Removed if any member reports removal.
    #[default]
    Any,
    /// Removed only if every member reports removal.
    All,
}

/// Ordered sequence of strategies applied to the same entity.
///
/// Once the entity is gone the remaining members are skipped, and the
/// composite reports removal.
#[derive(Debug, Clone)]
pub struct CompositeStrategy {
    name: String,
    members: Vec<Arc<dyn LifecycleStrategy>>,
    policy: CompositePolicy,
}

impl CompositeStrategy {
    /// Creates a composite from its members.
    #[must_use]
    pub fn new(members: Vec<Arc<dyn LifecycleStrategy>>, policy: CompositePolicy) -> Self {
        let keyword = match policy {
            CompositePolicy::Any => "composite",
            CompositePolicy::All => "compositeAll",
        };
        let joined = members
            .iter()
            .map(|m| m.name().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self {
            name: format!("{keyword}({joined})"),
            members,
            policy,
        }
    }

    /// The member strategies in execution order.
    #[must_use]
    pub fn members(&self) -> &[Arc<dyn LifecycleStrategy>] {
        &self.members
    }
}

fn entity_exists(tx: &dyn GraphWrite, kind: EntityKind, id: EntityId) -> bool {
    match kind {
        EntityKind::Node => tx.node(id).is_some(),
        EntityKind::Edge => tx.edge(id).is_some(),
    }
}

impl LifecycleStrategy for CompositeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, kind: EntityKind) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.applies_to(kind))
    }

    fn apply(&self, tx: &mut dyn GraphWrite, kind: EntityKind, id: EntityId) -> Result<bool> {
        let mut any = false;
        let mut all = true;
        for member in &self.members {
            if !entity_exists(tx, kind, id) {
                return Ok(true);
            }
            let removed = member.apply(tx, kind, id)?;
            any |= removed;
            all &= removed;
        }
        Ok(match self.policy {
            CompositePolicy::Any => any,
            CompositePolicy::All => all,
        })
    }
}

/// Builds a strategy for one event binding.
type StrategyFactory = Arc<dyn Fn(&TagToggleConfig) -> Arc<dyn LifecycleStrategy> + Send + Sync>;

/// Resolves strategy identifiers from configuration.
///
/// Built-in identifiers are registered by [`StrategyRegistry::with_builtins`];
/// hosts add their own with [`StrategyRegistry::register`] before the
/// service is built.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: BTreeMap<String, StrategyFactory>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("identifiers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in identifier.
    #[must_use]
    pub fn with_builtins() -> Self {
        let force: Arc<dyn LifecycleStrategy> = Arc::new(DeleteNodeAndEdges);
        let orphan: Arc<dyn LifecycleStrategy> = Arc::new(DeleteOrphanedNode);
        let delete: Arc<dyn LifecycleStrategy> = Arc::new(DeleteEdge);

        let mut registry = Self::new();
        for alias in ["force", "deleteNodeAndRelationships"] {
            registry.register_shared(alias, Arc::clone(&force));
        }
        for alias in ["orphan", "deleteOrphanedNodeOnly"] {
            registry.register_shared(alias, Arc::clone(&orphan));
        }
        for alias in ["delete", "deleteRelationship"] {
            registry.register_shared(alias, Arc::clone(&delete));
        }
        for alias in ["addRemoveLabels", "tags"] {
            registry.register(alias, |tags: &TagToggleConfig| {
                Arc::new(AddRemoveTags::new(tags.add.clone(), tags.remove.clone()))
                    as Arc<dyn LifecycleStrategy>
            });
        }
        registry
    }

    /// Registers a factory under `identifier`, replacing any previous one.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn(&TagToggleConfig) -> Arc<dyn LifecycleStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(identifier.into(), Arc::new(factory));
    }

    /// Registers one shared instance under `identifier`.
    pub fn register_shared(&mut self, identifier: impl Into<String>, strategy: Arc<dyn LifecycleStrategy>) {
        self.register(identifier, move |_: &TagToggleConfig| Arc::clone(&strategy));
    }

    /// Returns `true` if `identifier` names a registered strategy.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier.trim())
    }

    /// Resolves `identifier` for entities of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StrategyResolution`] if the identifier is unknown, a
    /// composite expression is malformed, or the strategy cannot act on `kind`.
    pub fn resolve(
        &self,
        identifier: &str,
        kind: EntityKind,
        tags: &TagToggleConfig,
    ) -> Result<Arc<dyn LifecycleStrategy>> {
        let strategy = self.resolve_expression(identifier.trim(), tags)?;
        if !strategy.applies_to(kind) {
            return Err(resolution_error(
                identifier,
                format!("strategy does not apply to {kind}s"),
            ));
        }
        Ok(strategy)
    }

    fn resolve_expression(
        &self,
        identifier: &str,
        tags: &TagToggleConfig,
    ) -> Result<Arc<dyn LifecycleStrategy>> {
        if let Some((policy, inner)) = parse_composite(identifier)? {
            let members = split_members(inner)
                .into_iter()
                .map(|member| self.resolve_expression(member, tags))
                .collect::<Result<Vec<_>>>()?;
            if members.is_empty() {
                return Err(resolution_error(identifier, "composite has no members"));
            }
            return Ok(Arc::new(CompositeStrategy::new(members, policy)));
        }

        self.factories
            .get(identifier)
            .map(|factory| factory(tags))
            .ok_or_else(|| resolution_error(identifier, "unknown strategy identifier"))
    }
}

fn resolution_error(identifier: &str, reason: impl Into<String>) -> Error {
    Error::StrategyResolution {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}

/// Recognizes `composite(...)` and `compositeAll(...)`.
fn parse_composite(identifier: &str) -> Result<Option<(CompositePolicy, &str)>> {
    let (policy, rest) = if let Some(rest) = identifier.strip_prefix("compositeAll") {
        (CompositePolicy::All, rest)
    } else if let Some(rest) = identifier.strip_prefix("composite") {
        (CompositePolicy::Any, rest)
    } else {
        return Ok(None);
    };
    let rest = rest.trim_start();
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| resolution_error(identifier, "expected composite(a, b, ...)"))?;
    Ok(Some((policy, inner)))
}

/// Splits composite members on top-level commas so nested composites survive.
fn split_members(inner: &str) -> Vec<&str> {
    let mut members = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                members.push(inner[start..i].trim());
                start = i + 1;
            },
            _ => {},
        }
    }
    members.push(inner[start..].trim());
    members.retain(|m| !m.is_empty());
    members
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::graph::InMemoryGraphStore;
    use test_case::test_case;

    fn no_tags() -> TagToggleConfig {
        TagToggleConfig::default()
    }

    #[test_case("force", EntityKind::Node, "force" ; "force")]
    #[test_case("deleteNodeAndRelationships", EntityKind::Node, "force" ; "force alias")]
    #[test_case("orphan", EntityKind::Node, "orphan" ; "orphan")]
    #[test_case(" deleteOrphanedNodeOnly ", EntityKind::Node, "orphan" ; "orphan alias trimmed")]
    #[test_case("delete", EntityKind::Edge, "delete" ; "edge delete")]
    #[test_case("tags", EntityKind::Node, "addRemoveLabels" ; "tags alias")]
    #[test_case("composite(orphan, tags)", EntityKind::Node, "composite(orphan,addRemoveLabels)" ; "composite")]
    #[test_case("compositeAll(delete)", EntityKind::Edge, "compositeAll(delete)" ; "composite all")]
    fn test_resolve(identifier: &str, kind: EntityKind, expected: &str) {
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry.resolve(identifier, kind, &no_tags()).unwrap();
        assert_eq!(strategy.name(), expected);
    }

    #[test_case("nonsense" ; "unknown")]
    #[test_case("composite()" ; "empty composite")]
    #[test_case("composite(orphan" ; "unclosed composite")]
    #[test_case("composite(orphan, nonsense)" ; "unknown member")]
    fn test_resolve_rejects(identifier: &str) {
        let registry = StrategyRegistry::with_builtins();
        let result = registry.resolve(identifier, EntityKind::Node, &no_tags());
        assert!(matches!(result, Err(Error::StrategyResolution { .. })));
    }

    #[test]
    fn test_resolve_rejects_wrong_kind() {
        let registry = StrategyRegistry::with_builtins();
        assert!(registry.resolve("delete", EntityKind::Node, &no_tags()).is_err());
        assert!(registry.resolve("orphan", EntityKind::Edge, &no_tags()).is_err());
        assert!(registry.resolve("composite(delete, orphan)", EntityKind::Edge, &no_tags()).is_err());
    }

    #[test]
    fn test_nested_composite() {
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry
            .resolve("composite(compositeAll(orphan, tags), force)", EntityKind::Node, &no_tags())
            .unwrap();
        assert_eq!(
            strategy.name(),
            "composite(compositeAll(orphan,addRemoveLabels),force)"
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = StrategyRegistry::with_builtins();
        registry.register_shared("purge", Arc::new(DeleteNodeAndEdges));
        assert!(registry.contains("purge"));
        assert!(registry.resolve("purge", EntityKind::Node, &no_tags()).is_ok());
    }

    fn connected_pair(store: &InMemoryGraphStore) -> (EntityId, EntityId, EntityId) {
        store
            .transact(|tx| {
                let a = tx.create_node(|n| n);
                let b = tx.create_node(|n| n);
                let e = tx.create_edge(a, b, "LIKES", |e| e)?;
                Ok((a, b, e))
            })
            .unwrap()
    }

    #[test]
    fn test_force_deletes_edges_first() {
        let store = InMemoryGraphStore::new();
        let (a, b, _) = connected_pair(&store);

        let removed = store
            .transact(|tx| DeleteNodeAndEdges.apply(tx, EntityKind::Node, a))
            .unwrap();

        assert!(removed);
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
        assert!(store.transact(|tx| Ok(tx.node(b).is_some())).unwrap());
    }

    #[test]
    fn test_orphan_waits_for_edges() {
        let store = InMemoryGraphStore::new();
        let (a, _, edge) = connected_pair(&store);

        let removed = store
            .transact(|tx| DeleteOrphanedNode.apply(tx, EntityKind::Node, a))
            .unwrap();
        assert!(!removed);
        assert_eq!(store.node_count(), 2);

        store.transact(|tx| tx.delete_edge(edge)).unwrap();
        let removed = store
            .transact(|tx| DeleteOrphanedNode.apply(tx, EntityKind::Node, a))
            .unwrap();
        assert!(removed);
        assert_eq!(store.node_count(), 1);
    }

    #[test]
    fn test_missing_entity_counts_as_removed() {
        let store = InMemoryGraphStore::new();
        let ghost = EntityId::new(42);
        let strategies: [&dyn LifecycleStrategy; 3] =
            [&DeleteNodeAndEdges, &DeleteOrphanedNode, &DeleteEdge];
        for strategy in strategies {
            let kind = if strategy.applies_to(EntityKind::Node) {
                EntityKind::Node
            } else {
                EntityKind::Edge
            };
            assert!(store.transact(|tx| strategy.apply(tx, kind, ghost)).unwrap());
        }
    }

    #[test]
    fn test_tag_toggle() {
        let store = InMemoryGraphStore::new();
        let id = store
            .transact(|tx| Ok(tx.create_node(|n| n.with_tag("ActiveProfile").with_tag("Bar"))))
            .unwrap();
        let strategy = AddRemoveTags::new(
            vec!["InactiveProfile".to_string(), "Foo".to_string()],
            vec!["ActiveProfile".to_string(), "Bar".to_string()],
        );

        assert!(store.transact(|tx| strategy.apply(tx, EntityKind::Node, id)).unwrap());

        let tags: Vec<String> = store
            .transact(|tx| Ok(tx.node(id).map(|n| n.tags.iter().cloned().collect()).unwrap_or_default()))
            .unwrap();
        assert_eq!(tags, vec!["Foo".to_string(), "InactiveProfile".to_string()]);
    }

    #[test]
    fn test_composite_short_circuits_after_delete() {
        let store = InMemoryGraphStore::new();
        let id = store.transact(|tx| Ok(tx.create_node(|n| n))).unwrap();
        let composite = CompositeStrategy::new(
            vec![
                Arc::new(DeleteOrphanedNode),
                Arc::new(AddRemoveTags::new(vec!["Never".to_string()], Vec::new())),
            ],
            CompositePolicy::All,
        );
        assert!(store.transact(|tx| composite.apply(tx, EntityKind::Node, id)).unwrap());
        assert_eq!(store.node_count(), 0);
    }

    #[test]
    fn test_composite_policies() {
        let store = InMemoryGraphStore::new();
        let (a, _, _) = connected_pair(&store);
        let members: Vec<Arc<dyn LifecycleStrategy>> = vec![
            Arc::new(DeleteOrphanedNode),
            Arc::new(AddRemoveTags::new(vec!["Stale".to_string()], Vec::new())),
        ];

        let any = CompositeStrategy::new(members.clone(), CompositePolicy::Any);
        let all = CompositeStrategy::new(members, CompositePolicy::All);
        assert!(store.transact(|tx| any.apply(tx, EntityKind::Node, a)).unwrap());
        assert!(!store.transact(|tx| all.apply(tx, EntityKind::Node, a)).unwrap());
    }
}
