//! Graph store implementations.
//!
//! | Store | Use Case | Features |
//! |-------|----------|----------|
//! | [`InMemoryGraphStore`] | Testing, embedding, the CLI demo | Staged units of work, commit hooks |
//!
//! Production hosts implement [`GraphStore`] and [`CommitHook`] registration
//! over their own transaction machinery.

mod memory;

pub use memory::{GraphTransaction, InMemoryGraphStore};

pub use crate::storage::traits::graph::{BulkEntitySource, CommitHook, GraphStore, GraphWrite};
