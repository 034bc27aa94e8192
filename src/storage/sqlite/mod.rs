//! Shared `SQLite` infrastructure for the persistent index backend.
//!
//! ## Module Structure
//!
//! - [`connection`]: Connection handling ([`Mutex<Connection>`](rusqlite::Connection), lock acquisition, pragmas)
//! - [`metrics`]: Operation metrics recording
//!
//! `SQLite` WAL mode lets the sweep read while the commit hook writes, even
//! though each backend serializes its own statements behind one mutex.

mod connection;
mod metrics;

pub use connection::{acquire_lock, configure_connection, open_connection};
pub use metrics::record_operation_metrics;
