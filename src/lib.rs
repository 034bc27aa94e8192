//! # Graph Lifecycle
//!
//! Time-based lifecycle transitions for the nodes and edges of a graph store.
//!
//! Any entity may carry an absolute expiry timestamp, a relative time-to-live,
//! or a revival date. When that moment is reached, the configured lifecycle
//! event fires a strategy that deletes, tags, or otherwise transitions the
//! entity.
//!
//! ## Architecture
//!
//! - A range-queryable secondary index per entity kind and event
//!   ([`lifecycle::LifecycleIndex`]) records when each entity becomes due.
//! - A commit hook ([`lifecycle::ChangeObserver`]) keeps that index consistent
//!   with every transaction observed on the host store.
//! - A timer-driven sweep ([`lifecycle::SweepScheduler`]) drains due candidates
//!   in bounded batches and dispatches pluggable strategies.
//!
//! ## Example
//!
//! ```rust,ignore
//! use graph_lifecycle::{LifecycleConfig, LifecycleService};
//! use graph_lifecycle::storage::graph::InMemoryGraphStore;
//! use graph_lifecycle::storage::index::InMemoryIndexBackend;
//! use std::sync::Arc;
//!
//! let config = LifecycleConfig::default().with_node_expiration_property("expire");
//! let store = Arc::new(InMemoryGraphStore::new());
//! let service = LifecycleService::builder(config)
//!     .with_store(store.clone())
//!     .with_index_backend(Arc::new(InMemoryIndexBackend::new()))
//!     .build()?;
//! store.register_hook(service.observer());
//! service.scheduler().tick()?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod storage;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LifecycleConfig;
pub use lifecycle::{
    ChangeObserver, EffectiveDateCalculator, LifecycleEvent, LifecycleEventRegistry,
    LifecycleIndex, LifecycleService, LifecycleStrategy, SweepResult, SweepScheduler,
};
pub use models::{Change, Changeset, Edge, EntityId, EntityKind, Node, PropertyValue};
pub use storage::{GraphStore, LifecycleIndexBackend};

/// Error type for lifecycle operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Configuration` | Startup validation rejects the configuration |
/// | `StrategyResolution` | A strategy identifier cannot be resolved at bootstrap |
/// | `InvalidInput` | A store write would break graph integrity |
/// | `OperationFailed` | Index or store I/O fails, config files cannot be read |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The configuration is invalid.
    ///
    /// Raised when:
    /// - Neither node nor edge scheduling is configured
    /// - The TTL and absolute-date property are identical for a tracked kind
    /// - An index is configured without a strategy
    /// - `max_no_expirations` is negative
    ///
    /// Always fatal: raised before any index or sweep activity begins.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A strategy identifier could not be resolved.
    ///
    /// Raised when:
    /// - The identifier is not registered
    /// - A `composite(...)` expression is malformed or empty
    /// - The strategy cannot act on the entity kind it is bound to
    #[error("cannot resolve strategy '{identifier}': {reason}")]
    StrategyResolution {
        /// The identifier as it appeared in configuration.
        identifier: String,
        /// Why resolution failed.
        reason: String,
    },

    /// Invalid input was provided to a store write.
    ///
    /// Raised when:
    /// - An edge references a node that does not exist
    /// - A node is deleted while it still has incident edges
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - `SQLite` statements or transactions fail
    /// - A lock cannot be acquired
    /// - Configuration files cannot be read or parsed
    /// - A commit hook rejects a transaction
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds an [`Error::OperationFailed`] from an operation name and a cause.
    pub fn operation(operation: impl Into<String>, cause: impl ToString) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Configuration("nothing to schedule".to_string());
        assert_eq!(err.to_string(), "invalid configuration: nothing to schedule");

        let err = Error::StrategyResolution {
            identifier: "purge".to_string(),
            reason: "not registered".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot resolve strategy 'purge': not registered"
        );

        let err = Error::operation("index_upsert", "disk full");
        assert_eq!(err.to_string(), "operation 'index_upsert' failed: disk full");
    }

    #[test]
    fn test_current_timestamp_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(current_timestamp_millis() > 1_577_836_800_000);
    }
}
