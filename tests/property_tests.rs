//! Property-based tests for the lifecycle index.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Removing an entry twice equals removing it once
//! - An entity is a candidate under bound T iff its effective date is <= T
//! - Absolute date and TTL together resolve to the later of the two

#![allow(clippy::expect_used, clippy::unwrap_used)]

use graph_lifecycle::lifecycle::event::KindBinding;
use graph_lifecycle::lifecycle::strategy::DeleteOrphanedNode;
use graph_lifecycle::lifecycle::{EXPIRY_EVENT, EffectiveDateCalculator, LifecycleEvent, LifecycleIndex};
use graph_lifecycle::storage::index::InMemoryIndexBackend;
use graph_lifecycle::storage::{IndexKey, LifecycleIndexBackend};
use graph_lifecycle::{EntityId, EntityKind, ManualClock, Node};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const NOW: i64 = 1_000_000;

fn expiry_event(ttl: bool) -> LifecycleEvent {
    let mut binding =
        KindBinding::new("nodeExpirationIndex", Arc::new(DeleteOrphanedNode)).with_date_property("expire");
    if ttl {
        binding = binding.with_ttl_property("ttl");
    }
    LifecycleEvent::new(EXPIRY_EVENT).with_binding(EntityKind::Node, binding)
}

fn index() -> LifecycleIndex {
    LifecycleIndex::new(
        Arc::new(InMemoryIndexBackend::new()),
        EffectiveDateCalculator::new(Arc::new(ManualClock::new(NOW))),
    )
}

proptest! {
    /// Property: a second removal is a no-op.
    #[test]
    fn prop_removal_is_idempotent(
        dues in prop::collection::btree_map(1_u64..500, 0_i64..10_000, 1..30),
        victim in 1_u64..500,
    ) {
        let backend = InMemoryIndexBackend::new();
        for (id, due) in &dues {
            let key = IndexKey::new("idx", EntityKind::Node, EXPIRY_EVENT, EntityId::new(*id));
            backend.upsert(&key, *due).unwrap();
        }
        let key = IndexKey::new("idx", EntityKind::Node, EXPIRY_EVENT, EntityId::new(victim));

        backend.remove(&key).unwrap();
        let once = backend.range_query("idx", EntityKind::Node, EXPIRY_EVENT, i64::MIN, i64::MAX, None).unwrap();
        backend.remove(&key).unwrap();
        let twice = backend.range_query("idx", EntityKind::Node, EXPIRY_EVENT, i64::MIN, i64::MAX, None).unwrap();

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.len(), dues.len() - usize::from(dues.contains_key(&victim)));
    }

    /// Property: candidacy under a bound matches the effective date exactly.
    #[test]
    fn prop_candidates_match_effective_dates(
        dates in prop::collection::vec(prop::option::of(0_i64..20_000), 1..40),
        bound in 0_i64..20_000,
    ) {
        let event = expiry_event(false);
        let index = index();
        let nodes: Vec<Node> = dates
            .iter()
            .enumerate()
            .map(|(i, date)| {
                let node = Node::new(EntityId::new(i as u64 + 1));
                match date {
                    Some(d) => node.with_property("expire", *d),
                    None => node,
                }
            })
            .collect();
        index.index_batch(&event, &nodes).unwrap();

        let candidates: BTreeSet<EntityId> = index
            .candidates_due_before(&event, EntityKind::Node, bound, None)
            .unwrap()
            .into_iter()
            .map(|entry| entry.entity)
            .collect();
        let expected: BTreeSet<EntityId> = nodes
            .iter()
            .zip(&dates)
            .filter(|(_, date)| date.is_some_and(|d| d <= bound))
            .map(|(node, _)| node.id)
            .collect();
        prop_assert_eq!(candidates, expected);
    }

    /// Property: clearing the driving property drops the entity from candidacy.
    #[test]
    fn prop_cleared_property_is_never_a_candidate(date in 0_i64..20_000) {
        let event = expiry_event(false);
        let index = index();
        let before = Node::new(EntityId::new(1)).with_property("expire", date);
        let after = Node::new(EntityId::new(1));

        index.index(&event, &before).unwrap();
        index.reindex(&event, &before, &after).unwrap();

        let candidates = index
            .candidates_due_before(&event, EntityKind::Node, i64::MAX, None)
            .unwrap();
        prop_assert!(candidates.is_empty());
    }

    /// Property: with both an absolute date and a TTL, the later one wins.
    #[test]
    fn prop_later_date_wins(date in 0_i64..2_000_000, ttl in -1_000_000_i64..1_000_000) {
        let event = expiry_event(true);
        let calculator = EffectiveDateCalculator::new(Arc::new(ManualClock::new(NOW)));
        let node = Node::new(EntityId::new(1))
            .with_property("expire", date)
            .with_property("ttl", ttl);

        prop_assert_eq!(
            calculator.effective_date(&node, &event),
            Some(date.max(NOW + ttl))
        );
    }
}
