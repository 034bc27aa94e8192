//! Graph entity types.
//!
//! The host store owns entity identity and property storage. This crate only
//! reads properties (to compute effective dates) and issues strategy calls, so
//! the model is deliberately small:
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | Vertex with tags and a property bag |
//! | [`Edge`] | Directed, typed connection between two nodes with a property bag |
//! | [`PropertyValue`] | Scalar property value |
//!
//! # Example
//!
//! ```rust
//! use graph_lifecycle::models::{Entity, EntityId, EntityKind, Node, PropertyValue};
//!
//! let node = Node::new(EntityId::new(1))
//!     .with_tag("Session")
//!     .with_property("expire", 1_700_000_000_000_i64);
//!
//! assert_eq!(node.kind(), EntityKind::Node);
//! assert_eq!(node.property("expire"), Some(&PropertyValue::Int(1_700_000_000_000)));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Property bag of an entity.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Identifier of a node or an edge.
///
/// Node and edge identifiers live in separate spaces: node 7 and edge 7 are
/// different entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates an entity ID from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Kind of graph entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A vertex.
    Node,
    /// A relationship between two vertices.
    Edge,
}

impl EntityKind {
    /// Both kinds, edges first (the order the sweep visits them).
    pub const SWEEP_ORDER: [Self; 2] = [Self::Edge, Self::Node];

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
        }
    }

    /// Parses a kind name. Accepts `relationship` as an alias for `edge`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "node" | "nodes" => Some(Self::Node),
            "edge" | "edges" | "relationship" | "relationships" => Some(Self::Edge),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Text.
    Text(String),
}

impl PropertyValue {
    /// Interprets the value as a millisecond quantity.
    ///
    /// Integers are taken as-is and text must parse as a base-10 integer.
    /// Floats and booleans never parse, matching how the values render.
    #[must_use]
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse::<i64>().ok(),
            Self::Float(_) | Self::Bool(_) => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Read access to an entity's identity and properties.
///
/// Everything that computes effective dates works against this trait so that
/// nodes and edges share one code path.
pub trait Entity {
    /// The entity identifier.
    fn id(&self) -> EntityId;

    /// Whether this is a node or an edge.
    fn kind(&self) -> EntityKind;

    /// All properties.
    fn properties(&self) -> &Properties;

    /// Looks up a single property.
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties().get(key)
    }

    /// Returns `true` if the property is present.
    fn has_property(&self, key: &str) -> bool {
        self.properties().contains_key(key)
    }
}

/// A graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node identifier.
    pub id: EntityId,
    /// Tags (labels) carried by the node.
    pub tags: BTreeSet<String>,
    /// Property bag.
    pub properties: Properties,
}

impl Node {
    /// Creates a node with no tags and no properties.
    #[must_use]
    pub const fn new(id: EntityId) -> Self {
        Self {
            id,
            tags: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the node carries the tag.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

impl Entity for Node {
    fn id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Node
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

/// A directed, typed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Edge identifier.
    pub id: EntityId,
    /// Source node.
    pub from: EntityId,
    /// Target node.
    pub to: EntityId,
    /// Relationship type, e.g. `LIKES`.
    pub edge_type: String,
    /// Property bag.
    pub properties: Properties,
}

impl Edge {
    /// Creates an edge with no properties.
    #[must_use]
    pub fn new(id: EntityId, from: EntityId, to: EntityId, edge_type: impl Into<String>) -> Self {
        Self {
            id,
            from,
            to,
            edge_type: edge_type.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns `true` if the edge touches the node at either end.
    #[must_use]
    pub fn touches(&self, node: EntityId) -> bool {
        self.from == node || self.to == node
    }
}

impl Entity for Edge {
    fn id(&self) -> EntityId {
        self.id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Edge
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}
