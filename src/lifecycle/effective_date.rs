//! Effective-date computation.
//!
//! | Properties present | Effective date |
//! |--------------------|----------------|
//! | neither | not scheduled |
//! | absolute date `d` | `d + offset` |
//! | TTL `t` | `now + t + offset` |
//! | both | the later of the two; the absolute date on a tie |
//!
//! A value that does not parse as integer milliseconds is treated as absent
//! and logged. The result is never cached: TTLs are relative to the moment
//! of (re)indexing.

use super::event::LifecycleEvent;
use crate::clock::Clock;
use crate::models::{Entity, EntityId, EntityKind};
use std::sync::Arc;
use tracing::warn;

/// Computes when a lifecycle event becomes due for an entity.
#[derive(Clone)]
pub struct EffectiveDateCalculator {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EffectiveDateCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveDateCalculator").finish_non_exhaustive()
    }
}

impl EffectiveDateCalculator {
    /// Creates a calculator reading TTL base times from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current time according to the calculator's clock.
    #[must_use]
    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    /// Returns the due timestamp of `event` for `entity`, or `None` if the
    /// entity is not scheduled for it.
    #[must_use]
    pub fn effective_date(&self, entity: &dyn Entity, event: &LifecycleEvent) -> Option<i64> {
        let kind = entity.kind();
        let binding = event.binding(kind)?;
        let offset = event.offset_millis();

        let absolute = binding
            .date_property
            .as_deref()
            .and_then(|key| parse_millis(entity, event, key))
            .map(|date| date.saturating_add(offset));
        let relative = binding
            .ttl_property
            .as_deref()
            .and_then(|key| parse_millis(entity, event, key))
            .map(|ttl| self.now().saturating_add(ttl).saturating_add(offset));

        match (absolute, relative) {
            (Some(absolute), Some(relative)) => {
                let chosen = absolute.max(relative);
                warn!(
                    event = event.name(),
                    kind = %kind,
                    entity = %entity.id(),
                    absolute,
                    relative,
                    chosen,
                    "Entity has both an absolute date and a TTL, using the later"
                );
                Some(chosen)
            },
            (absolute, relative) => absolute.or(relative),
        }
    }
}

fn parse_millis(entity: &dyn Entity, event: &LifecycleEvent, key: &str) -> Option<i64> {
    let value = entity.property(key)?;
    let parsed = value.as_millis();
    if parsed.is_none() {
        record_parse_failure(event.name(), entity.kind(), entity.id(), key, &value.to_string());
    }
    parsed
}

fn record_parse_failure(event: &str, kind: EntityKind, id: EntityId, key: &str, value: &str) {
    warn!(
        event,
        kind = %kind,
        entity = %id,
        property = key,
        value,
        "Scheduling property is not an integer, ignoring it"
    );
    metrics::counter!(
        "lifecycle_property_parse_failures_total",
        "event" => event.to_string(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::lifecycle::event::KindBinding;
    use crate::lifecycle::strategy::{DeleteEdge, DeleteOrphanedNode};
    use crate::models::{Edge, Node};
    use test_case::test_case;

    const NOW: i64 = 1_000_000;

    fn calculator() -> EffectiveDateCalculator {
        EffectiveDateCalculator::new(Arc::new(ManualClock::new(NOW)))
    }

    fn event(offset: i64) -> LifecycleEvent {
        LifecycleEvent::new("expiry")
            .with_offset_millis(offset)
            .with_binding(
                EntityKind::Node,
                KindBinding::new("nodeExpirationIndex", Arc::new(DeleteOrphanedNode))
                    .with_date_property("expire")
                    .with_ttl_property("ttl"),
            )
    }

    fn node() -> Node {
        Node::new(EntityId::new(1))
    }

    #[test]
    fn test_unscheduled_without_properties() {
        assert_eq!(calculator().effective_date(&node(), &event(0)), None);
    }

    #[test_case(NOW + 2_000, 0, Some(NOW + 2_000) ; "absolute")]
    #[test_case(NOW + 2_000, 500, Some(NOW + 2_500) ; "absolute with offset")]
    #[test_case(0, -100, Some(-100) ; "offset may go negative")]
    fn test_absolute(date: i64, offset: i64, expected: Option<i64>) {
        let entity = node().with_property("expire", date);
        assert_eq!(calculator().effective_date(&entity, &event(offset)), expected);
    }

    #[test_case(-20, 0, Some(NOW - 20) ; "already past")]
    #[test_case(3_000, 0, Some(NOW + 3_000) ; "future")]
    #[test_case(3_000, 1_000, Some(NOW + 4_000) ; "with offset")]
    fn test_ttl(ttl: i64, offset: i64, expected: Option<i64>) {
        let entity = node().with_property("ttl", ttl);
        assert_eq!(calculator().effective_date(&entity, &event(offset)), expected);
    }

    #[test]
    fn test_text_values_parse() {
        let entity = node().with_property("expire", (NOW + 5).to_string());
        assert_eq!(calculator().effective_date(&entity, &event(0)), Some(NOW + 5));
    }

    #[test_case("wrong" ; "word")]
    #[test_case("12.5" ; "decimal text")]
    #[test_case("" ; "empty")]
    fn test_unparseable_absolute_is_absent(value: &str) {
        let entity = node().with_property("expire", value);
        assert_eq!(calculator().effective_date(&entity, &event(0)), None);
    }

    #[test]
    fn test_unparseable_date_falls_back_to_ttl() {
        let entity = node().with_property("expire", "wrong").with_property("ttl", 10_i64);
        assert_eq!(calculator().effective_date(&entity, &event(0)), Some(NOW + 10));
    }

    #[test_case(NOW + 100, 50, NOW + 100 ; "absolute later")]
    #[test_case(NOW + 100, 500, NOW + 500 ; "ttl later")]
    #[test_case(NOW + 100, 100, NOW + 100 ; "tie")]
    fn test_both_present_later_wins(date: i64, ttl: i64, expected: i64) {
        let entity = node().with_property("expire", date).with_property("ttl", ttl);
        assert_eq!(calculator().effective_date(&entity, &event(0)), Some(expected));
    }

    #[test]
    fn test_untracked_kind_is_unscheduled() {
        let edge = Edge::new(EntityId::new(1), EntityId::new(2), EntityId::new(3), "LIKES")
            .with_property("expire", NOW);
        assert_eq!(calculator().effective_date(&edge, &event(0)), None);

        let edge_event = LifecycleEvent::new("expiry").with_binding(
            EntityKind::Edge,
            KindBinding::new("relationshipExpirationIndex", Arc::new(DeleteEdge))
                .with_date_property("expire"),
        );
        assert_eq!(calculator().effective_date(&edge, &edge_event), Some(NOW));
    }

    #[test]
    fn test_ttl_follows_the_clock() {
        let clock = Arc::new(ManualClock::new(NOW));
        let calculator = EffectiveDateCalculator::new(clock.clone());
        let entity = node().with_property("ttl", 100_i64);

        assert_eq!(calculator.effective_date(&entity, &event(0)), Some(NOW + 100));
        clock.advance(1_000);
        assert_eq!(calculator.effective_date(&entity, &event(0)), Some(NOW + 1_100));
    }
}
