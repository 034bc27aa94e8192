//! Lifecycle event definitions.
//!
//! A [`LifecycleEvent`] names a transition (expiry, revival, or a custom one)
//! and, per entity kind, which properties drive it, which index tracks it and
//! which strategy runs when it is due. Events are immutable once registered.

use super::strategy::LifecycleStrategy;
use crate::models::{EntityId, EntityKind, TransactionChangeset};
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Name of the built-in revival event.
pub const REVIVAL_EVENT: &str = "revival";

/// Name of the built-in expiry event.
pub const EXPIRY_EVENT: &str = "expiry";

/// How one entity kind participates in an event.
#[derive(Debug, Clone)]
pub struct KindBinding {
    /// Name of the index tracking this kind for the event.
    pub index_name: String,
    /// Property holding an absolute due date in epoch milliseconds.
    pub date_property: Option<String>,
    /// Property holding a time-to-live in milliseconds, relative to indexing time.
    pub ttl_property: Option<String>,
    /// Strategy applied when the event is due.
    pub strategy: Arc<dyn LifecycleStrategy>,
}

impl KindBinding {
    /// Creates a binding with no driving properties.
    #[must_use]
    pub fn new(index_name: impl Into<String>, strategy: Arc<dyn LifecycleStrategy>) -> Self {
        Self {
            index_name: index_name.into(),
            date_property: None,
            ttl_property: None,
            strategy,
        }
    }

    /// Sets the absolute-date property.
    #[must_use]
    pub fn with_date_property(mut self, property: impl Into<String>) -> Self {
        self.date_property = Some(property.into());
        self
    }

    /// Sets the TTL property.
    #[must_use]
    pub fn with_ttl_property(mut self, property: impl Into<String>) -> Self {
        self.ttl_property = Some(property.into());
        self
    }

    /// The properties whose changes reschedule an entity.
    pub fn driving_properties(&self) -> impl Iterator<Item = &str> {
        self.date_property
            .iter()
            .chain(self.ttl_property.iter())
            .map(String::as_str)
    }

    fn validate(&self, event: &str, kind: EntityKind) -> Result<()> {
        if self.index_name.trim().is_empty() {
            return Err(Error::Configuration(format!(
                "event '{event}' tracks {kind}s without an index name"
            )));
        }
        if self.date_property.is_none() && self.ttl_property.is_none() {
            return Err(Error::Configuration(format!(
                "event '{event}' tracks {kind}s without a date or TTL property"
            )));
        }
        if self.date_property.is_some() && self.date_property == self.ttl_property {
            return Err(Error::Configuration(format!(
                "event '{event}' uses the same property for the {kind} date and TTL"
            )));
        }
        if !self.strategy.applies_to(kind) {
            return Err(Error::Configuration(format!(
                "event '{event}' binds strategy '{}' which cannot act on {kind}s",
                self.strategy.name()
            )));
        }
        Ok(())
    }
}

/// An immutable lifecycle event definition.
///
/// # Example
///
/// ```
/// use graph_lifecycle::lifecycle::event::{KindBinding, LifecycleEvent};
/// use graph_lifecycle::lifecycle::strategy::DeleteOrphanedNode;
/// use graph_lifecycle::EntityKind;
/// use std::sync::Arc;
///
/// let event = LifecycleEvent::new("expiry")
///     .with_offset_millis(500)
///     .with_binding(
///         EntityKind::Node,
///         KindBinding::new("nodeExpirationIndex", Arc::new(DeleteOrphanedNode))
///             .with_date_property("expire"),
///     );
/// assert!(event.tracks(EntityKind::Node));
/// assert!(!event.tracks(EntityKind::Edge));
/// ```
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    name: String,
    offset_millis: i64,
    node: Option<KindBinding>,
    edge: Option<KindBinding>,
}

impl LifecycleEvent {
    /// Creates an event that tracks nothing yet.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            offset_millis: 0,
            node: None,
            edge: None,
        }
    }

    /// Sets the offset added to every computed due date.
    #[must_use]
    pub const fn with_offset_millis(mut self, offset_millis: i64) -> Self {
        self.offset_millis = offset_millis;
        self
    }

    /// Binds an entity kind, replacing any previous binding for it.
    #[must_use]
    pub fn with_binding(mut self, kind: EntityKind, binding: KindBinding) -> Self {
        match kind {
            EntityKind::Node => self.node = Some(binding),
            EntityKind::Edge => self.edge = Some(binding),
        }
        self
    }

    /// The unique event name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Offset added to computed due dates, in milliseconds.
    #[must_use]
    pub const fn offset_millis(&self) -> i64 {
        self.offset_millis
    }

    /// Returns the binding for `kind`, if the event tracks it.
    #[must_use]
    pub const fn binding(&self, kind: EntityKind) -> Option<&KindBinding> {
        match kind {
            EntityKind::Node => self.node.as_ref(),
            EntityKind::Edge => self.edge.as_ref(),
        }
    }

    /// Returns `true` if the event tracks entities of `kind`.
    #[must_use]
    pub const fn tracks(&self, kind: EntityKind) -> bool {
        self.binding(kind).is_some()
    }

    /// Returns `true` if any of the event's driving properties for `kind` was
    /// created, changed, or deleted on the entity in this transaction.
    ///
    /// A deleted property counts: re-evaluating it drops the stale entry.
    #[must_use]
    pub fn should_reindex(
        &self,
        changes: &dyn TransactionChangeset,
        kind: EntityKind,
        id: EntityId,
    ) -> bool {
        self.binding(kind).is_some_and(|binding| {
            binding.driving_properties().any(|key| {
                changes.property_created(kind, id, key)
                    || changes.property_changed(kind, id, key)
                    || changes.property_deleted(kind, id, key)
            })
        })
    }

    /// Checks the event's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the event has no name, tracks no
    /// kind, or has a binding that is incomplete or bound to a strategy that
    /// cannot act on its kind.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("event name must not be empty".to_string()));
        }
        if self.node.is_none() && self.edge.is_none() {
            return Err(Error::Configuration(format!(
                "event '{}' tracks neither nodes nor edges",
                self.name
            )));
        }
        for kind in EntityKind::SWEEP_ORDER {
            if let Some(binding) = self.binding(kind) {
                binding.validate(&self.name, kind)?;
            }
        }
        Ok(())
    }
}

/// Ordered set of registered events.
///
/// Registration order is the order the sweep visits events in.
#[derive(Debug, Clone, Default)]
pub struct LifecycleEventRegistry {
    events: Vec<Arc<LifecycleEvent>>,
}

impl LifecycleEventRegistry {
    /// Builds a registry from events in sweep order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if an event is invalid or two events
    /// share a name.
    pub fn new(events: impl IntoIterator<Item = LifecycleEvent>) -> Result<Self> {
        let mut names = BTreeSet::new();
        let mut registered = Vec::new();
        for event in events {
            event.validate()?;
            if !names.insert(event.name().to_string()) {
                return Err(Error::Configuration(format!(
                    "event '{}' is registered twice",
                    event.name()
                )));
            }
            registered.push(Arc::new(event));
        }
        Ok(Self { events: registered })
    }

    /// Iterates events in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<LifecycleEvent>> {
        self.events.iter()
    }

    /// Looks up an event by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<LifecycleEvent>> {
        self.events.iter().find(|e| e.name() == name)
    }

    /// Number of registered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no event is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns `true` if some event tracks entities of `kind`.
    #[must_use]
    pub fn tracks(&self, kind: EntityKind) -> bool {
        self.events.iter().any(|e| e.tracks(kind))
    }
}
