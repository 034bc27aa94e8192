//! Lifecycle index backend implementations.
//!
//! | Backend | Use Case | Features |
//! |---------|----------|----------|
//! | [`SqliteIndexBackend`] | Default; persistent | B-tree index on `(index, kind, event, due_at)` |
//! | [`InMemoryIndexBackend`] | Testing, embedded hosts | Ordered set range scans |

mod memory;
mod sqlite;

pub use memory::InMemoryIndexBackend;
pub use sqlite::SqliteIndexBackend;
