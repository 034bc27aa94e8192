//! Lifecycle service.
//!
//! Wires the configuration, the index, the change observer and the sweep
//! scheduler together. Startup is all-or-nothing: [`LifecycleServiceBuilder::build`]
//! validates the configuration and resolves every strategy before any index
//! is created, so a bad configuration never leaves partial index state.

use super::backfill::{BackfillStats, backfill};
use super::effective_date::EffectiveDateCalculator;
use super::event::LifecycleEventRegistry;
use super::index::LifecycleIndex;
use super::observer::ChangeObserver;
use super::strategy::StrategyRegistry;
use super::sweep::{SweepHandle, SweepScheduler, spawn_sweep_loop};
use crate::clock::{Clock, SystemClock};
use crate::config::LifecycleConfig;
use crate::storage::index::InMemoryIndexBackend;
use crate::storage::traits::graph::{BulkEntitySource, GraphStore};
use crate::storage::traits::index::LifecycleIndexBackend;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// A running lifecycle setup for one graph store.
pub struct LifecycleService {
    config: LifecycleConfig,
    registry: Arc<LifecycleEventRegistry>,
    index: LifecycleIndex,
    observer: Arc<ChangeObserver>,
    scheduler: Arc<SweepScheduler>,
}

impl std::fmt::Debug for LifecycleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleService")
            .field("events", &self.registry.len())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl LifecycleService {
    /// Starts building a service for `config`.
    #[must_use]
    pub fn builder(config: LifecycleConfig) -> LifecycleServiceBuilder {
        LifecycleServiceBuilder {
            config,
            store: None,
            index_backend: None,
            clock: None,
            strategies: None,
        }
    }

    /// The configuration the service was built from.
    #[must_use]
    pub const fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// The registered events.
    #[must_use]
    pub const fn registry(&self) -> &Arc<LifecycleEventRegistry> {
        &self.registry
    }

    /// The lifecycle index.
    #[must_use]
    pub const fn index(&self) -> &LifecycleIndex {
        &self.index
    }

    /// The commit hook to register with the host store.
    #[must_use]
    pub fn observer(&self) -> Arc<ChangeObserver> {
        Arc::clone(&self.observer)
    }

    /// The sweep scheduler.
    #[must_use]
    pub fn scheduler(&self) -> Arc<SweepScheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Indexes every entity that existed before the observer was registered.
    ///
    /// # Errors
    ///
    /// Returns the first source or index failure.
    pub fn initialize(&self, source: &dyn BulkEntitySource) -> Result<BackfillStats> {
        let stats = backfill(
            &self.registry,
            &self.index,
            source,
            self.config.backfill_batch_size,
        )?;
        info!(
            nodes = stats.nodes_scanned,
            edges = stats.edges_scanned,
            indexed = stats.indexed,
            "Lifecycle index initialized"
        );
        Ok(stats)
    }

    /// Spawns the sweep loop at the configured interval.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn_sweep(&self) -> SweepHandle {
        spawn_sweep_loop(self.scheduler(), self.config.sweep_interval())
    }
}

/// Builder for a [`LifecycleService`].
pub struct LifecycleServiceBuilder {
    config: LifecycleConfig,
    store: Option<Arc<dyn GraphStore>>,
    index_backend: Option<Arc<dyn LifecycleIndexBackend>>,
    clock: Option<Arc<dyn Clock>>,
    strategies: Option<StrategyRegistry>,
}

impl LifecycleServiceBuilder {
    /// Sets the host store the sweep writes to. Required.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the index backend. Defaults to an in-memory index.
    #[must_use]
    pub fn with_index_backend(mut self, backend: Arc<dyn LifecycleIndexBackend>) -> Self {
        self.index_backend = Some(backend);
        self
    }

    /// Sets the clock. Defaults to the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the strategy registry. Defaults to the built-in strategies.
    #[must_use]
    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Validates the configuration, resolves strategies and creates the
    /// indexes of every tracked kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no store was set or the
    /// configuration is invalid, [`Error::StrategyResolution`] if a strategy
    /// cannot be resolved, or the index backend's error if an index cannot be
    /// created.
    pub fn build(self) -> Result<LifecycleService> {
        let store = self
            .store
            .ok_or_else(|| Error::Configuration("a graph store is required".to_string()))?;
        let strategies = self.strategies.unwrap_or_else(StrategyRegistry::with_builtins);
        let registry = Arc::new(self.config.build_registry(&strategies)?);

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let backend = self
            .index_backend
            .unwrap_or_else(|| Arc::new(InMemoryIndexBackend::new()) as Arc<dyn LifecycleIndexBackend>);
        let index = LifecycleIndex::new(backend, EffectiveDateCalculator::new(Arc::clone(&clock)));
        index.ensure_indexes(&registry)?;

        let observer = Arc::new(ChangeObserver::new(Arc::clone(&registry), index.clone()));
        let scheduler = Arc::new(SweepScheduler::new(
            Arc::clone(&registry),
            index.clone(),
            store,
            clock,
            self.config.max_per_event(),
        ));

        info!(
            events = registry.len(),
            max_per_event = self.config.max_per_event(),
            sweep_interval_ms = self.config.sweep_interval_millis,
            "Lifecycle service ready"
        );

        Ok(LifecycleService {
            config: self.config,
            registry,
            index,
            observer,
            scheduler,
        })
    }
}
