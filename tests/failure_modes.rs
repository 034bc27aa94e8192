//! Transient index failures never lose an entity from scheduling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use graph_lifecycle::lifecycle::EXPIRY_EVENT;
use graph_lifecycle::storage::graph::InMemoryGraphStore;
use graph_lifecycle::storage::index::InMemoryIndexBackend;
use graph_lifecycle::storage::{IndexEntry, IndexKey, IndexOp};
use graph_lifecycle::{
    EntityKind, Error, GraphStore, LifecycleConfig, LifecycleIndexBackend, LifecycleService,
    ManualClock, Result,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const START: i64 = 1_700_000_000_000;

/// In-memory index that fails every call while `down` is set, or a single
/// armed `apply` call.
#[derive(Default)]
struct FlakyBackend {
    inner: InMemoryIndexBackend,
    down: AtomicBool,
    /// Remaining `apply` calls before the armed one fails; 0 when disarmed.
    fail_apply_in: AtomicUsize,
}

impl FlakyBackend {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Makes the `nth` next `apply` call fail, counting from 1.
    fn fail_nth_apply(&self, nth: usize) {
        self.fail_apply_in.store(nth, Ordering::SeqCst);
    }

    fn armed_apply_fails(&self) -> bool {
        self.fail_apply_in
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok_and(|n| n == 1)
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::operation(operation, "index unavailable"));
        }
        Ok(())
    }
}

impl LifecycleIndexBackend for FlakyBackend {
    fn apply(&self, ops: &[IndexOp]) -> Result<()> {
        self.check("apply")?;
        if self.armed_apply_fails() {
            return Err(Error::operation("apply", "armed failure"));
        }
        self.inner.apply(ops)
    }

    fn range_query(
        &self,
        index: &str,
        kind: EntityKind,
        event: &str,
        low: i64,
        high: i64,
        limit: Option<usize>,
    ) -> Result<Vec<IndexEntry>> {
        self.check("range_query")?;
        self.inner.range_query(index, kind, event, low, high, limit)
    }

    fn due_at(&self, key: &IndexKey) -> Result<Option<i64>> {
        self.check("due_at")?;
        self.inner.due_at(key)
    }

    fn exists(&self, index: &str) -> Result<bool> {
        self.check("exists")?;
        self.inner.exists(index)
    }

    fn ensure_index(&self, index: &str) -> Result<bool> {
        self.check("ensure_index")?;
        self.inner.ensure_index(index)
    }

    fn count(&self, index: &str, kind: EntityKind, event: &str) -> Result<usize> {
        self.check("count")?;
        self.inner.count(index, kind, event)
    }
}

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<InMemoryGraphStore>,
    backend: Arc<FlakyBackend>,
    service: LifecycleService,
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let store = Arc::new(InMemoryGraphStore::new());
    let backend = Arc::new(FlakyBackend::default());
    let service = LifecycleService::builder(
        LifecycleConfig::default().with_node_expiration_property("expire"),
    )
    .with_store(store.clone())
    .with_index_backend(backend.clone())
    .with_clock(clock.clone())
    .build()
    .unwrap();
    store.register_hook(service.observer());
    Harness {
        clock,
        store,
        backend,
        service,
    }
}

#[test]
fn index_failure_aborts_the_host_transaction() {
    let h = harness();
    h.backend.set_down(true);

    let result = h
        .store
        .transact(|tx| Ok(tx.create_node(|n| n.with_property("expire", START + 10))));

    assert!(matches!(result, Err(Error::OperationFailed { .. })));
    assert_eq!(h.store.node_count(), 0);
}

#[test]
fn failed_tick_retries_on_the_next_one() {
    let h = harness();
    let node = h
        .store
        .transact(|tx| Ok(tx.create_node(|n| n.with_property("expire", START + 10))))
        .unwrap();

    h.clock.set(START + 20);
    h.backend.set_down(true);
    let failed = h.service.scheduler().tick().unwrap();
    assert!(failed.failed > 0);
    assert_eq!(failed.removed, 0);
    assert!(h.store.node(node).unwrap().is_some());

    h.backend.set_down(false);
    let recovered = h.service.scheduler().tick().unwrap();
    assert_eq!(recovered.removed, 1);
    assert!(h.store.node(node).unwrap().is_none());
}

#[test]
fn unavailable_index_fails_startup() {
    let backend = Arc::new(FlakyBackend::default());
    backend.set_down(true);
    let result = LifecycleService::builder(
        LifecycleConfig::default().with_node_expiration_property("expire"),
    )
    .with_store(Arc::new(InMemoryGraphStore::new()))
    .with_index_backend(backend)
    .build();
    assert!(result.is_err());
}

fn expiry_due(h: &Harness, node: graph_lifecycle::EntityId) -> Option<i64> {
    let event = h.service.registry().get(EXPIRY_EVENT).unwrap();
    h.service.index().due_at(event, EntityKind::Node, node).unwrap()
}

/// Clears `cleared`'s date and moves `moved`'s in one transaction.
fn clear_and_move(
    h: &Harness,
    cleared: graph_lifecycle::EntityId,
    moved: graph_lifecycle::EntityId,
) -> Result<()> {
    h.store.transact(|tx| {
        tx.remove_property(EntityKind::Node, cleared, "expire");
        tx.set_property(EntityKind::Node, moved, "expire", START + 200);
        Ok(())
    })
}

#[test]
fn transaction_index_work_is_one_unit() {
    let h = harness();
    let (cleared, moved) = h
        .store
        .transact(|tx| {
            let a = tx.create_node(|n| n.with_property("expire", START + 100));
            let b = tx.create_node(|n| n.with_property("expire", START + 100));
            Ok((a, b))
        })
        .unwrap();

    // A second apply within the same transaction would fail; there is none.
    h.backend.fail_nth_apply(2);
    clear_and_move(&h, cleared, moved).unwrap();
    h.backend.fail_nth_apply(0);

    assert_eq!(expiry_due(&h, cleared), None);
    assert_eq!(expiry_due(&h, moved), Some(START + 200));
}

#[test]
fn aborted_transaction_keeps_every_entry() {
    let h = harness();
    let (cleared, moved) = h
        .store
        .transact(|tx| {
            let a = tx.create_node(|n| n.with_property("expire", START + 100));
            let b = tx.create_node(|n| n.with_property("expire", START + 100));
            Ok((a, b))
        })
        .unwrap();

    h.backend.fail_nth_apply(1);
    let result = clear_and_move(&h, cleared, moved);
    assert!(matches!(result, Err(Error::OperationFailed { .. })));

    // The host rolled back, so both nodes keep their original date and entry.
    let node = h.store.node(cleared).unwrap().unwrap();
    assert!(node.properties.contains_key("expire"));
    assert_eq!(expiry_due(&h, cleared), Some(START + 100));
    assert_eq!(expiry_due(&h, moved), Some(START + 100));

    h.clock.set(START + 150);
    let swept = h.service.scheduler().tick().unwrap();
    assert_eq!(swept.removed, 2);
    assert!(h.store.node(cleared).unwrap().is_none());
    assert!(h.store.node(moved).unwrap().is_none());
}
