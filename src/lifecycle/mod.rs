//! Lifecycle scheduling.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`EffectiveDateCalculator`] | Entity properties to due date |
//! | [`LifecycleIndex`] | Due dates per `(index, kind, event)`, range-queryable |
//! | [`ChangeObserver`] | Commit hook keeping the index in step with the graph |
//! | [`SweepScheduler`] | Drains due candidates in bounded batches |
//! | [`LifecycleStrategy`] | What happens to a due entity |
//! | [`LifecycleService`] | Validated startup wiring of all of the above |

pub mod backfill;
pub mod effective_date;
pub mod event;
pub mod index;
pub mod observer;
pub mod service;
pub mod strategy;
pub mod sweep;

pub use backfill::{BackfillStats, backfill};
pub use effective_date::EffectiveDateCalculator;
pub use event::{EXPIRY_EVENT, KindBinding, LifecycleEvent, LifecycleEventRegistry, REVIVAL_EVENT};
pub use index::LifecycleIndex;
pub use observer::{ChangeObserver, ObserveStats};
pub use service::{LifecycleService, LifecycleServiceBuilder};
pub use strategy::{LifecycleStrategy, StrategyRegistry};
pub use sweep::{
    SweepHandle, SweepLoopStats, SweepResult, SweepScheduler, SweepState, run_sweep_loop,
    spawn_sweep_loop,
};
