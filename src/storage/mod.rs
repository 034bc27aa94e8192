//! Storage layer abstraction.
//!
//! Two independent collaborators meet here:
//! - **Graph store**: the host store that owns entities ([`GraphStore`]).
//! - **Lifecycle index**: the range-queryable "due at" index
//!   ([`LifecycleIndexBackend`]).
//!
//! The commit hook and the sweep both write to the lifecycle index without a
//! shared lock. Correctness rests on each backend applying every unit of work
//! atomically; a backend for another store must give the same guarantee.

// Allow significant_drop_tightening - dropping guards slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

pub mod graph;
pub mod index;
pub mod sqlite;
pub mod traits;

pub use traits::{
    BulkEntitySource, CommitHook, GraphStore, GraphWrite, IndexEntry, IndexKey, IndexOp,
    LifecycleIndexBackend,
};
