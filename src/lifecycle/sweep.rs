//! Timer-driven sweep.
//!
//! Each tick visits every registered event in registration order and, per
//! event, edges before nodes. For every `(event, kind)` it pulls up to
//! `max_no_expirations` candidates due at or before "now", runs the bound
//! strategy on each inside its own unit of work, and drops the index entry
//! when the strategy reports removal. Remaining candidates wait for the next
//! tick.
//!
//! A failing unit of work keeps the entry, so the entity is retried on the
//! next tick. Ticks never overlap.
//!
//! # Example
//!
//! ```rust,ignore
//! use graph_lifecycle::lifecycle::sweep::spawn_sweep_loop;
//! use std::time::Duration;
//!
//! let handle = spawn_sweep_loop(service.scheduler(), Duration::from_millis(100));
//! // ...
//! let stats = handle.shutdown().await;
//! tracing::info!(ticks = stats.ticks, "sweep stopped");
//! ```

use super::event::{LifecycleEvent, LifecycleEventRegistry};
use super::index::LifecycleIndex;
use crate::Result;
use crate::clock::Clock;
use crate::models::{EntityId, EntityKind};
use crate::storage::sqlite::acquire_lock;
use crate::storage::traits::graph::{GraphStore, GraphWrite};
use crate::storage::traits::index::IndexEntry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, instrument, warn};

/// Converts a duration to milliseconds, capping at `u64::MAX`.
#[inline]
fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Converts u64 to f64 for metrics, capping at `u32::MAX`.
#[inline]
fn u64_to_f64(value: u64) -> f64 {
    let capped = u32::try_from(value).unwrap_or(u32::MAX);
    f64::from(capped)
}

/// Whether a tick is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    /// No tick is running.
    Idle,
    /// A tick is running.
    Running,
}

/// Outcome of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepResult {
    /// The "now" the tick swept up to.
    pub now: i64,
    /// Strategy invocations (successful or not).
    pub applied: usize,
    /// Entries dropped from the index after their strategy reported removal.
    pub removed: usize,
    /// Entries kept because their strategy asked for another pass.
    pub retained: usize,
    /// Units of work or index calls that failed; the entries stay tracked.
    pub failed: usize,
    /// Duration of the tick in milliseconds.
    pub duration_ms: u64,
}

impl SweepResult {
    /// Returns `true` if the tick did any work.
    #[must_use]
    pub const fn has_work(&self) -> bool {
        self.applied > 0 || self.failed > 0
    }

    /// Returns a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.has_work() {
            format!(
                "applied {} strategies, removed {}, retained {}, failed {} in {}ms",
                self.applied, self.removed, self.retained, self.failed, self.duration_ms
            )
        } else {
            format!("nothing due ({}ms)", self.duration_ms)
        }
    }
}

/// Resets the running flag when a tick ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drains due candidates and dispatches strategies.
pub struct SweepScheduler {
    registry: Arc<LifecycleEventRegistry>,
    index: LifecycleIndex,
    store: Arc<dyn GraphStore>,
    clock: Arc<dyn Clock>,
    max_per_event: usize,
    tick_lock: Mutex<()>,
    running: AtomicBool,
}

impl std::fmt::Debug for SweepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SweepScheduler")
            .field("events", &self.registry.len())
            .field("max_per_event", &self.max_per_event)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SweepScheduler {
    /// Creates a scheduler.
    ///
    /// `max_per_event` caps strategy invocations per event and entity kind
    /// in a single tick; `0` makes every tick a no-op.
    #[must_use]
    pub fn new(
        registry: Arc<LifecycleEventRegistry>,
        index: LifecycleIndex,
        store: Arc<dyn GraphStore>,
        clock: Arc<dyn Clock>,
        max_per_event: usize,
    ) -> Self {
        Self {
            registry,
            index,
            store,
            clock,
            max_per_event,
            tick_lock: Mutex::new(()),
            running: AtomicBool::new(false),
        }
    }

    /// The per-event, per-kind cap.
    #[must_use]
    pub const fn max_per_event(&self) -> usize {
        self.max_per_event
    }

    /// Whether a tick is currently running.
    #[must_use]
    pub fn state(&self) -> SweepState {
        if self.running.load(Ordering::SeqCst) {
            SweepState::Running
        } else {
            SweepState::Idle
        }
    }

    /// Runs one sweep.
    ///
    /// Concurrent callers are serialized. Failures of individual candidates
    /// or index queries are logged and counted in the result; they do not
    /// stop the tick.
    ///
    /// # Errors
    ///
    /// None of the built-in stores or backends fail a tick as a whole.
    #[instrument(
        name = "lifecycle.sweep",
        skip(self),
        fields(events = self.registry.len(), max_per_event = self.max_per_event)
    )]
    pub fn tick(&self) -> Result<SweepResult> {
        let _serial = acquire_lock(&self.tick_lock);
        self.running.store(true, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);

        let start = Instant::now();
        let mut result = SweepResult {
            now: self.clock.now_millis(),
            ..SweepResult::default()
        };

        for event in self.registry.iter() {
            for kind in EntityKind::SWEEP_ORDER {
                self.sweep_kind(event, kind, &mut result);
            }
        }

        result.duration_ms = duration_to_millis(start.elapsed());
        metrics::counter!("lifecycle_sweep_ticks_total").increment(1);
        metrics::histogram!("lifecycle_sweep_duration_ms").record(u64_to_f64(result.duration_ms));

        if result.has_work() {
            info!(
                applied = result.applied,
                removed = result.removed,
                retained = result.retained,
                failed = result.failed,
                duration_ms = result.duration_ms,
                "Lifecycle sweep completed"
            );
        }
        Ok(result)
    }

    fn sweep_kind(&self, event: &LifecycleEvent, kind: EntityKind, result: &mut SweepResult) {
        let Some(binding) = event.binding(kind) else {
            return;
        };
        if self.max_per_event == 0 {
            return;
        }

        let candidates = match self.index.candidates_due_before(
            event,
            kind,
            result.now,
            Some(self.max_per_event),
        ) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(event = event.name(), kind = %kind, error = %e, "Failed to query due candidates");
                record_failure(event, kind);
                result.failed += 1;
                return;
            },
        };

        for IndexEntry { entity, due_at } in candidates.into_iter().take(self.max_per_event) {
            debug!(event = event.name(), kind = %kind, entity = %entity, due_at, "Applying strategy");
            result.applied += 1;
            metrics::counter!(
                "lifecycle_sweep_applied_total",
                "event" => event.name().to_string(),
                "kind" => kind.as_str()
            )
            .increment(1);

            let strategy = Arc::clone(&binding.strategy);
            let outcome = self.store.write_unit(&mut |tx: &mut dyn GraphWrite| {
                if !exists(tx, kind, entity) {
                    return Ok(true);
                }
                strategy.apply(tx, kind, entity)
            });

            match outcome {
                Ok(true) => self.drop_entry(event, kind, entity, result),
                Ok(false) => result.retained += 1,
                Err(e) => {
                    warn!(
                        event = event.name(),
                        kind = %kind,
                        entity = %entity,
                        strategy = binding.strategy.name(),
                        error = %e,
                        "Strategy failed, keeping entity scheduled"
                    );
                    record_failure(event, kind);
                    result.failed += 1;
                },
            }
        }
    }

    fn drop_entry(
        &self,
        event: &LifecycleEvent,
        kind: EntityKind,
        entity: EntityId,
        result: &mut SweepResult,
    ) {
        match self.index.remove(event, kind, entity) {
            Ok(()) => {
                result.removed += 1;
                metrics::counter!(
                    "lifecycle_sweep_removed_total",
                    "event" => event.name().to_string(),
                    "kind" => kind.as_str()
                )
                .increment(1);
            },
            Err(e) => {
                warn!(
                    event = event.name(),
                    kind = %kind,
                    entity = %entity,
                    error = %e,
                    "Failed to drop index entry after strategy"
                );
                record_failure(event, kind);
                result.failed += 1;
            },
        }
    }
}

fn exists(tx: &dyn GraphWrite, kind: EntityKind, id: EntityId) -> bool {
    match kind {
        EntityKind::Node => tx.node(id).is_some(),
        EntityKind::Edge => tx.edge(id).is_some(),
    }
}

fn record_failure(event: &LifecycleEvent, kind: EntityKind) {
    metrics::counter!(
        "lifecycle_sweep_failures_total",
        "event" => event.name().to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Totals collected by a sweep loop over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepLoopStats {
    /// Ticks that ran.
    pub ticks: u64,
    /// Ticks that returned an error or panicked.
    pub failed_ticks: u64,
    /// Strategy invocations across all ticks.
    pub applied: u64,
    /// Index entries dropped across all ticks.
    pub removed: u64,
}

impl SweepLoopStats {
    fn record(&mut self, result: &SweepResult) {
        self.ticks += 1;
        self.applied += u64::try_from(result.applied).unwrap_or(u64::MAX);
        self.removed += u64::try_from(result.removed).unwrap_or(u64::MAX);
    }
}

/// Drives `scheduler` every `period` until `shutdown` turns `true` or its
/// sender is dropped.
///
/// A slow tick delays the next one rather than causing a burst. Each tick
/// runs on the blocking pool.
pub async fn run_sweep_loop(
    scheduler: Arc<SweepScheduler>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> SweepLoopStats {
    let mut stats = SweepLoopStats::default();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        period_ms = duration_to_millis(period),
        max_per_event = scheduler.max_per_event(),
        "Lifecycle sweep loop started"
    );

    while !*shutdown.borrow() {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }

            _ = ticker.tick() => {
                let scheduler = Arc::clone(&scheduler);
                match tokio::task::spawn_blocking(move || scheduler.tick()).await {
                    Ok(Ok(result)) => stats.record(&result),
                    Ok(Err(e)) => {
                        stats.ticks += 1;
                        stats.failed_ticks += 1;
                        warn!(error = %e, "Lifecycle sweep tick failed");
                    },
                    Err(e) => {
                        stats.ticks += 1;
                        stats.failed_ticks += 1;
                        warn!(error = %e, "Lifecycle sweep tick panicked");
                    },
                }
            }
        }
    }

    info!(
        ticks = stats.ticks,
        failed_ticks = stats.failed_ticks,
        applied = stats.applied,
        removed = stats.removed,
        "Lifecycle sweep loop stopped"
    );
    stats
}

/// Handle to a spawned sweep loop.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<SweepLoopStats>,
}

impl SweepHandle {
    /// Signals the loop to stop and waits for the tick in progress to finish.
    pub async fn shutdown(self) -> SweepLoopStats {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Lifecycle sweep loop did not stop cleanly");
                SweepLoopStats::default()
            },
        }
    }

    /// Returns `true` once the loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns [`run_sweep_loop`] on the current Tokio runtime.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
#[must_use]
pub fn spawn_sweep_loop(scheduler: Arc<SweepScheduler>, period: Duration) -> SweepHandle {
    let (shutdown, receiver) = watch::channel(false);
    let task = tokio::spawn(run_sweep_loop(scheduler, period, receiver));
    SweepHandle { shutdown, task }
}
