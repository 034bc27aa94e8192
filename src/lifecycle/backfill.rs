//! Startup backfill.
//!
//! Indexes every entity that already exists when the service starts. The
//! source is walked in bounded pages (edges first, then nodes) and each page
//! is written as one unit of work per event, so no single unit grows with the
//! size of the graph.

use super::event::LifecycleEventRegistry;
use super::index::LifecycleIndex;
use crate::models::{Entity, EntityId, EntityKind};
use crate::storage::traits::graph::BulkEntitySource;
use crate::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Work done by a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    /// Nodes read from the source.
    pub nodes_scanned: usize,
    /// Edges read from the source.
    pub edges_scanned: usize,
    /// Index entries written, across all events.
    pub indexed: usize,
    /// Pages read.
    pub batches: usize,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Indexes every entity of `source` for every registered event.
///
/// Kinds that no event tracks are not scanned.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `batch_size` is zero, or the first
/// source or index failure. Pages written before the failure stay indexed.
#[instrument(name = "lifecycle.backfill", skip_all, fields(batch_size = batch_size))]
pub fn backfill(
    registry: &LifecycleEventRegistry,
    index: &LifecycleIndex,
    source: &dyn BulkEntitySource,
    batch_size: usize,
) -> Result<BackfillStats> {
    if batch_size == 0 {
        return Err(Error::Configuration(
            "backfill batch size must be positive".to_string(),
        ));
    }
    let start = Instant::now();
    let mut stats = BackfillStats::default();

    if registry.tracks(EntityKind::Edge) {
        let scanned = backfill_kind(registry, index, EntityKind::Edge, batch_size, &mut stats, |after| {
            source.scan_edges(after, batch_size)
        })?;
        stats.edges_scanned = scanned;
    }
    if registry.tracks(EntityKind::Node) {
        let scanned = backfill_kind(registry, index, EntityKind::Node, batch_size, &mut stats, |after| {
            source.scan_nodes(after, batch_size)
        })?;
        stats.nodes_scanned = scanned;
    }

    stats.duration_ms = duration_to_millis(start.elapsed());
    metrics::counter!("lifecycle_backfill_indexed_total")
        .increment(u64::try_from(stats.indexed).unwrap_or(u64::MAX));
    info!(
        nodes_scanned = stats.nodes_scanned,
        edges_scanned = stats.edges_scanned,
        indexed = stats.indexed,
        batches = stats.batches,
        duration_ms = stats.duration_ms,
        "Lifecycle backfill completed"
    );
    Ok(stats)
}

fn backfill_kind<E, F>(
    registry: &LifecycleEventRegistry,
    index: &LifecycleIndex,
    kind: EntityKind,
    batch_size: usize,
    stats: &mut BackfillStats,
    mut next_page: F,
) -> Result<usize>
where
    E: Entity,
    F: FnMut(Option<EntityId>) -> Result<Vec<E>>,
{
    let mut scanned = 0;
    let mut after = None;
    loop {
        let page = next_page(after)?;
        if page.is_empty() {
            break;
        }
        stats.batches += 1;
        scanned += page.len();
        for event in registry.iter().filter(|e| e.tracks(kind)) {
            stats.indexed += index.index_batch(event, &page)?;
        }
        after = page.last().map(Entity::id);
        if page.len() < batch_size {
            break;
        }
    }
    Ok(scanned)
}
