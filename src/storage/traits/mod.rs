//! Storage backend traits.

pub mod graph;
pub mod index;

pub use graph::{BulkEntitySource, CommitHook, GraphStore, GraphWrite};
pub use index::{IndexEntry, IndexKey, IndexOp, LifecycleIndexBackend};
