//! Metrics recording for `SQLite` backends.

use std::time::Instant;

/// Records the count and latency of one storage operation.
///
/// Emits `storage_operations_total` and `storage_operation_duration_ms`,
/// both labelled by backend, operation and status (`success` or `error`).
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}
