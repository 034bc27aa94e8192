//! Data models for graph lifecycle management.
//!
//! This module contains the entity and changeset types shared by the index,
//! the change observer, the strategies, and the storage backends.

mod changeset;
pub mod graph;

pub use changeset::{Change, Changeset, TransactionChangeset};
pub use graph::{Edge, Entity, EntityId, EntityKind, Node, Properties, PropertyValue};
