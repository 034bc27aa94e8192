//! Configuration management.
//!
//! [`LifecycleConfig`] is an immutable value: every `with_*` method consumes
//! the config and returns an updated copy. It is validated once at startup by
//! [`LifecycleConfig::build_registry`]; nothing is indexed or swept before
//! that succeeds.
//!
//! # Sources
//!
//! | Source | Entry point |
//! |--------|-------------|
//! | Code | [`LifecycleConfig::default`] + `with_*` |
//! | TOML file | [`LifecycleConfig::load_from_file`] |
//! | Platform config dir | [`LifecycleConfig::load_default`] |
//! | Environment | [`LifecycleConfig::with_env_overrides`] |

mod file;

pub use file::{
    ConfigFile, LoggingSettings, MetricsSettings, ObservabilitySettings, TagList, parse_tag_list,
};

use crate::lifecycle::{
    EXPIRY_EVENT, KindBinding, LifecycleEvent, LifecycleEventRegistry, REVIVAL_EVENT,
    StrategyRegistry,
};
use crate::models::EntityKind;
use crate::{Error, Result};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding `maxNoExpirations`.
pub const ENV_MAX_NO_EXPIRATIONS: &str = "GRAPH_LIFECYCLE_MAX_NO_EXPIRATIONS";

/// Environment variable overriding `sweepIntervalMillis`.
pub const ENV_SWEEP_INTERVAL_MS: &str = "GRAPH_LIFECYCLE_SWEEP_INTERVAL_MS";

/// Tags a tag-toggle strategy adds and removes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagToggleConfig {
    /// Tags added to the node.
    pub add: Vec<String>,
    /// Tags removed from the node (applied before `add`).
    pub remove: Vec<String>,
}

impl TagToggleConfig {
    /// Creates a toggle from the two lists.
    pub fn new<A, R>(add: A, remove: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            add: add.into_iter().map(Into::into).collect(),
            remove: remove.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses both lists from their `"[A, B]"` text form.
    #[must_use]
    pub fn parse(add: &str, remove: &str) -> Self {
        Self {
            add: parse_tag_list(add),
            remove: parse_tag_list(remove),
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct LifecycleConfig {
    /// Index holding node expiry dates.
    pub node_expiration_index: String,
    /// Index holding edge expiry dates.
    pub relationship_expiration_index: String,
    /// Index holding node revival dates.
    pub node_revival_index: String,
    /// Index holding edge revival dates.
    pub relationship_revival_index: String,
    /// Property with the absolute node expiry date.
    pub node_expiration_property: Option<String>,
    /// Property with the absolute edge expiry date.
    pub relationship_expiration_property: Option<String>,
    /// Property with the node time-to-live.
    pub node_ttl_property: Option<String>,
    /// Property with the edge time-to-live.
    pub relationship_ttl_property: Option<String>,
    /// Property with the absolute node revival date.
    pub node_revival_property: Option<String>,
    /// Property with the absolute edge revival date.
    pub relationship_revival_property: Option<String>,
    /// Strategy run when a node expires.
    pub node_expiration_strategy: Option<String>,
    /// Strategy run when an edge expires.
    pub relationship_expiration_strategy: Option<String>,
    /// Strategy run when a node is revived.
    pub node_revival_strategy: Option<String>,
    /// Strategy run when an edge is revived.
    pub relationship_revival_strategy: Option<String>,
    /// Tags toggled when a node expires.
    pub node_expiration_tags: TagToggleConfig,
    /// Tags toggled when a node is revived.
    pub node_revival_tags: TagToggleConfig,
    /// Per-event, per-kind cap on strategy invocations in one tick.
    pub max_no_expirations: i64,
    /// Offset added to every computed expiry date.
    pub expiry_offset_millis: i64,
    /// Offset added to every computed revival date.
    pub revival_offset_millis: i64,
    /// Sweep period.
    pub sweep_interval_millis: u64,
    /// Page size of the startup backfill.
    pub backfill_batch_size: usize,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            node_expiration_index: "nodeExpirationIndex".to_string(),
            relationship_expiration_index: "relationshipExpirationIndex".to_string(),
            node_revival_index: "nodeRevivalIndex".to_string(),
            relationship_revival_index: "relationshipRevivalIndex".to_string(),
            node_expiration_property: None,
            relationship_expiration_property: None,
            node_ttl_property: None,
            relationship_ttl_property: None,
            node_revival_property: None,
            relationship_revival_property: None,
            node_expiration_strategy: Some("orphan".to_string()),
            relationship_expiration_strategy: Some("delete".to_string()),
            node_revival_strategy: None,
            relationship_revival_strategy: None,
            node_expiration_tags: TagToggleConfig::default(),
            node_revival_tags: TagToggleConfig::default(),
            max_no_expirations: 1000,
            expiry_offset_millis: 0,
            revival_offset_millis: 0,
            sweep_interval_millis: 100,
            backfill_batch_size: 1000,
            observability: ObservabilitySettings::default(),
        }
    }
}

/// Settings of one (event, kind) pair, as seen by normalization and validation.
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    event: &'static str,
    kind: EntityKind,
    index: &'a str,
    date_property: Option<&'a str>,
    ttl_property: Option<&'a str>,
    strategy: Option<&'a str>,
}

impl Slot<'_> {
    /// A slot is tracked when it has an index and at least one driving property.
    fn is_tracked(&self) -> bool {
        !self.index.trim().is_empty()
            && (self.date_property.is_some() || self.ttl_property.is_some())
    }
}

impl LifecycleConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the absolute node expiry property.
    #[must_use]
    pub fn with_node_expiration_property(mut self, property: impl Into<String>) -> Self {
        self.node_expiration_property = Some(property.into());
        self
    }

    /// Sets the absolute edge expiry property.
    #[must_use]
    pub fn with_relationship_expiration_property(mut self, property: impl Into<String>) -> Self {
        self.relationship_expiration_property = Some(property.into());
        self
    }

    /// Sets the node TTL property.
    #[must_use]
    pub fn with_node_ttl_property(mut self, property: impl Into<String>) -> Self {
        self.node_ttl_property = Some(property.into());
        self
    }

    /// Sets the edge TTL property.
    #[must_use]
    pub fn with_relationship_ttl_property(mut self, property: impl Into<String>) -> Self {
        self.relationship_ttl_property = Some(property.into());
        self
    }

    /// Sets the node revival property.
    #[must_use]
    pub fn with_node_revival_property(mut self, property: impl Into<String>) -> Self {
        self.node_revival_property = Some(property.into());
        self
    }

    /// Sets the edge revival property.
    #[must_use]
    pub fn with_relationship_revival_property(mut self, property: impl Into<String>) -> Self {
        self.relationship_revival_property = Some(property.into());
        self
    }

    /// Sets the node expiry strategy identifier.
    #[must_use]
    pub fn with_node_expiration_strategy(mut self, identifier: impl Into<String>) -> Self {
        self.node_expiration_strategy = Some(identifier.into());
        self
    }

    /// Sets the edge expiry strategy identifier.
    #[must_use]
    pub fn with_relationship_expiration_strategy(mut self, identifier: impl Into<String>) -> Self {
        self.relationship_expiration_strategy = Some(identifier.into());
        self
    }

    /// Sets the node revival strategy identifier.
    #[must_use]
    pub fn with_node_revival_strategy(mut self, identifier: impl Into<String>) -> Self {
        self.node_revival_strategy = Some(identifier.into());
        self
    }

    /// Sets the edge revival strategy identifier.
    #[must_use]
    pub fn with_relationship_revival_strategy(mut self, identifier: impl Into<String>) -> Self {
        self.relationship_revival_strategy = Some(identifier.into());
        self
    }

    /// Sets the tags toggled when a node expires.
    #[must_use]
    pub fn with_node_expiration_tags(mut self, tags: TagToggleConfig) -> Self {
        self.node_expiration_tags = tags;
        self
    }

    /// Sets the tags toggled when a node is revived.
    #[must_use]
    pub fn with_node_revival_tags(mut self, tags: TagToggleConfig) -> Self {
        self.node_revival_tags = tags;
        self
    }

    /// Renames the node expiry index.
    #[must_use]
    pub fn with_node_expiration_index(mut self, index: impl Into<String>) -> Self {
        self.node_expiration_index = index.into();
        self
    }

    /// Renames the edge expiry index.
    #[must_use]
    pub fn with_relationship_expiration_index(mut self, index: impl Into<String>) -> Self {
        self.relationship_expiration_index = index.into();
        self
    }

    /// Renames the node revival index.
    #[must_use]
    pub fn with_node_revival_index(mut self, index: impl Into<String>) -> Self {
        self.node_revival_index = index.into();
        self
    }

    /// Renames the edge revival index.
    #[must_use]
    pub fn with_relationship_revival_index(mut self, index: impl Into<String>) -> Self {
        self.relationship_revival_index = index.into();
        self
    }

    /// Sets the per-event, per-kind batch cap.
    #[must_use]
    pub const fn with_max_no_expirations(mut self, max: i64) -> Self {
        self.max_no_expirations = max;
        self
    }

    /// Sets the expiry offset.
    #[must_use]
    pub const fn with_expiry_offset_millis(mut self, offset: i64) -> Self {
        self.expiry_offset_millis = offset;
        self
    }

    /// Sets the revival offset.
    #[must_use]
    pub const fn with_revival_offset_millis(mut self, offset: i64) -> Self {
        self.revival_offset_millis = offset;
        self
    }

    /// Sets the sweep period.
    #[must_use]
    pub const fn with_sweep_interval_millis(mut self, millis: u64) -> Self {
        self.sweep_interval_millis = millis;
        self
    }

    /// Sets the backfill page size.
    #[must_use]
    pub const fn with_backfill_batch_size(mut self, size: usize) -> Self {
        self.backfill_batch_size = size;
        self
    }

    /// Sets the observability settings.
    #[must_use]
    pub fn with_observability(mut self, settings: ObservabilitySettings) -> Self {
        self.observability = settings;
        self
    }

    /// The sweep period as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_millis)
    }

    /// The batch cap as a count. Negative caps (rejected by validation) map to 0.
    #[must_use]
    pub fn max_per_event(&self) -> usize {
        usize::try_from(self.max_no_expirations).unwrap_or(0)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Ok(Self::default().apply_file(file))
    }

    /// Loads configuration from the platform config directory.
    ///
    /// Reads `<config_dir>/graph-lifecycle/config.toml` when it exists, and
    /// falls back to defaults otherwise.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs
            .config_dir()
            .join("graph-lifecycle")
            .join("config.toml");
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded lifecycle configuration");
                config
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Applies values present in a parsed config file.
    #[must_use]
    pub fn apply_file(mut self, file: ConfigFile) -> Self {
        fn set<T>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }
        fn set_opt(target: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *target = value;
            }
        }
        fn set_tags(target: &mut Vec<String>, value: Option<TagList>) {
            if let Some(list) = value {
                *target = list.into_tags();
            }
        }

        set(&mut self.node_expiration_index, file.node_expiration_index);
        set(
            &mut self.relationship_expiration_index,
            file.relationship_expiration_index,
        );
        set(&mut self.node_revival_index, file.node_revival_index);
        set(
            &mut self.relationship_revival_index,
            file.relationship_revival_index,
        );
        set_opt(&mut self.node_expiration_property, file.node_expiration_property);
        set_opt(
            &mut self.relationship_expiration_property,
            file.relationship_expiration_property,
        );
        set_opt(&mut self.node_ttl_property, file.node_ttl_property);
        set_opt(&mut self.relationship_ttl_property, file.relationship_ttl_property);
        set_opt(&mut self.node_revival_property, file.node_revival_property);
        set_opt(
            &mut self.relationship_revival_property,
            file.relationship_revival_property,
        );
        set_opt(&mut self.node_expiration_strategy, file.node_expiration_strategy);
        set_opt(
            &mut self.relationship_expiration_strategy,
            file.relationship_expiration_strategy,
        );
        set_opt(&mut self.node_revival_strategy, file.node_revival_strategy);
        set_opt(
            &mut self.relationship_revival_strategy,
            file.relationship_revival_strategy,
        );
        set_tags(
            &mut self.node_expiration_tags.add,
            file.node_expiration_labels_to_add,
        );
        set_tags(
            &mut self.node_expiration_tags.remove,
            file.node_expiration_labels_to_remove,
        );
        set_tags(&mut self.node_revival_tags.add, file.node_revival_labels_to_add);
        set_tags(
            &mut self.node_revival_tags.remove,
            file.node_revival_labels_to_remove,
        );
        set(&mut self.max_no_expirations, file.max_no_expirations);
        set(&mut self.expiry_offset_millis, file.expiry_offset_millis);
        set(&mut self.revival_offset_millis, file.revival_offset_millis);
        set(&mut self.sweep_interval_millis, file.sweep_interval_millis);
        set(&mut self.backfill_batch_size, file.backfill_batch_size);
        set(&mut self.observability, file.observability);
        self
    }

    /// Applies overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_NO_EXPIRATIONS) {
            match raw.trim().parse::<i64>() {
                Ok(max) => self.max_no_expirations = max,
                Err(e) => warn!(var = ENV_MAX_NO_EXPIRATIONS, value = %raw, error = %e, "Ignoring override"),
            }
        }
        if let Some(raw) = lookup(ENV_SWEEP_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(millis) => self.sweep_interval_millis = millis,
                Err(e) => warn!(var = ENV_SWEEP_INTERVAL_MS, value = %raw, error = %e, "Ignoring override"),
            }
        }
        self
    }

    /// Drops settings that can never take effect.
    ///
    /// A kind whose index name is blank has its driving properties cleared.
    /// A kind with no driving property keeps its index name, but the index is
    /// never created because the kind is not tracked.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        fn clear(index: &str, props: [&mut Option<String>; 2]) {
            if index.trim().is_empty() {
                for prop in props {
                    *prop = None;
                }
            }
        }
        clear(
            &self.node_expiration_index,
            [
                &mut self.node_expiration_property,
                &mut self.node_ttl_property,
            ],
        );
        clear(
            &self.relationship_expiration_index,
            [
                &mut self.relationship_expiration_property,
                &mut self.relationship_ttl_property,
            ],
        );
        if self.node_revival_index.trim().is_empty() {
            self.node_revival_property = None;
        }
        if self.relationship_revival_index.trim().is_empty() {
            self.relationship_revival_property = None;
        }

        for prop in [
            &mut self.node_expiration_property,
            &mut self.relationship_expiration_property,
            &mut self.node_ttl_property,
            &mut self.relationship_ttl_property,
            &mut self.node_revival_property,
            &mut self.relationship_revival_property,
        ] {
            if prop.as_deref().is_some_and(|p| p.trim().is_empty()) {
                *prop = None;
            }
        }
        self
    }

    fn slots(&self) -> [Slot<'_>; 4] {
        [
            Slot {
                event: REVIVAL_EVENT,
                kind: EntityKind::Node,
                index: &self.node_revival_index,
                date_property: self.node_revival_property.as_deref(),
                ttl_property: None,
                strategy: self.node_revival_strategy.as_deref(),
            },
            Slot {
                event: REVIVAL_EVENT,
                kind: EntityKind::Edge,
                index: &self.relationship_revival_index,
                date_property: self.relationship_revival_property.as_deref(),
                ttl_property: None,
                strategy: self.relationship_revival_strategy.as_deref(),
            },
            Slot {
                event: EXPIRY_EVENT,
                kind: EntityKind::Node,
                index: &self.node_expiration_index,
                date_property: self.node_expiration_property.as_deref(),
                ttl_property: self.node_ttl_property.as_deref(),
                strategy: self.node_expiration_strategy.as_deref(),
            },
            Slot {
                event: EXPIRY_EVENT,
                kind: EntityKind::Edge,
                index: &self.relationship_expiration_index,
                date_property: self.relationship_expiration_property.as_deref(),
                ttl_property: self.relationship_ttl_property.as_deref(),
                strategy: self.relationship_expiration_strategy.as_deref(),
            },
        ]
    }

    /// Returns `true` if `kind` is tracked for `event` after normalization.
    #[must_use]
    pub fn tracks(&self, event: &str, kind: EntityKind) -> bool {
        self.clone()
            .normalized()
            .slots()
            .iter()
            .any(|slot| slot.event == event && slot.kind == kind && slot.is_tracked())
    }

    /// Validates the normalized configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if nothing is tracked, a TTL property
    /// equals the absolute-date property of the same kind, a tracked kind has
    /// no strategy, `max_no_expirations` is negative, or the sweep interval or
    /// backfill batch size is zero.
    pub fn validate(&self) -> Result<()> {
        let normalized = self.clone().normalized();
        normalized.validate_normalized()
    }

    fn validate_normalized(&self) -> Result<()> {
        let slots = self.slots();
        if !slots.iter().any(Slot::is_tracked) {
            return Err(Error::Configuration(
                "neither node nor relationship scheduling is configured".to_string(),
            ));
        }

        for slot in slots.iter().filter(|slot| slot.is_tracked()) {
            if let (Some(date), Some(ttl)) = (slot.date_property, slot.ttl_property) {
                if date == ttl {
                    return Err(Error::Configuration(format!(
                        "{} {} uses '{date}' as both the absolute-date and the TTL property",
                        slot.kind, slot.event
                    )));
                }
            }
            if slot.strategy.is_none_or(|s| s.trim().is_empty()) {
                return Err(Error::Configuration(format!(
                    "index '{}' ({} {}) has no strategy",
                    slot.index, slot.kind, slot.event
                )));
            }
        }

        if self.max_no_expirations < 0 {
            return Err(Error::Configuration(format!(
                "maxNoExpirations must not be negative, got {}",
                self.max_no_expirations
            )));
        }
        if self.sweep_interval_millis == 0 {
            return Err(Error::Configuration(
                "sweepIntervalMillis must be positive".to_string(),
            ));
        }
        if self.backfill_batch_size == 0 {
            return Err(Error::Configuration(
                "backfillBatchSize must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates the configuration and builds the event registry.
    ///
    /// Events register in sweep order: `revival`, then `expiry`. An event that
    /// tracks no kind is left out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if validation fails, or
    /// [`Error::StrategyResolution`] if a strategy identifier is unknown or
    /// cannot act on its kind.
    pub fn build_registry(&self, strategies: &StrategyRegistry) -> Result<LifecycleEventRegistry> {
        let normalized = self.clone().normalized();
        normalized.validate_normalized()?;

        let mut events = Vec::with_capacity(2);
        for (name, offset) in [
            (REVIVAL_EVENT, normalized.revival_offset_millis),
            (EXPIRY_EVENT, normalized.expiry_offset_millis),
        ] {
            let mut event = LifecycleEvent::new(name).with_offset_millis(offset);
            let mut tracked = false;
            for slot in normalized
                .slots()
                .iter()
                .filter(|slot| slot.event == name && slot.is_tracked())
            {
                let identifier = slot.strategy.unwrap_or_default();
                let tags = normalized.tags_for(slot.event, slot.kind);
                let strategy = strategies.resolve(identifier, slot.kind, &tags)?;
                let mut binding = KindBinding::new(slot.index, strategy);
                if let Some(property) = slot.date_property {
                    binding = binding.with_date_property(property);
                }
                if let Some(property) = slot.ttl_property {
                    binding = binding.with_ttl_property(property);
                }
                info!(
                    event = name,
                    kind = %slot.kind,
                    index = slot.index,
                    strategy = identifier,
                    "Registered lifecycle binding"
                );
                event = event.with_binding(slot.kind, binding);
                tracked = true;
            }
            if tracked {
                events.push(event);
            }
        }

        LifecycleEventRegistry::new(events)
    }

    fn tags_for(&self, event: &str, kind: EntityKind) -> TagToggleConfig {
        match (event, kind) {
            (REVIVAL_EVENT, EntityKind::Node) => self.node_revival_tags.clone(),
            (EXPIRY_EVENT, EntityKind::Node) => self.node_expiration_tags.clone(),
            _ => TagToggleConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use test_case::test_case;

    fn builtins() -> StrategyRegistry {
        StrategyRegistry::with_builtins()
    }

    #[test]
    fn test_defaults() {
        let config = LifecycleConfig::default();
        assert_eq!(config.node_expiration_index, "nodeExpirationIndex");
        assert_eq!(config.relationship_revival_index, "relationshipRevivalIndex");
        assert_eq!(config.node_expiration_strategy.as_deref(), Some("orphan"));
        assert_eq!(config.relationship_expiration_strategy.as_deref(), Some("delete"));
        assert_eq!(config.max_no_expirations, 1000);
        assert_eq!(config.sweep_interval(), Duration::from_millis(100));
        assert_eq!(config.backfill_batch_size, 1000);
    }

    #[test]
    fn test_nothing_tracked_is_rejected() {
        let err = LifecycleConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_same_ttl_and_date_property_is_rejected() {
        let config = LifecycleConfig::default()
            .with_node_expiration_property("expire")
            .with_node_ttl_property("expire");
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_revival_without_strategy_is_rejected() {
        let config = LifecycleConfig::default().with_node_revival_property("revive");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("nodeRevivalIndex"));
    }

    #[test_case(LifecycleConfig::default().with_node_expiration_property("e").with_max_no_expirations(-1) ; "negative cap")]
    #[test_case(LifecycleConfig::default().with_node_expiration_property("e").with_sweep_interval_millis(0) ; "zero interval")]
    #[test_case(LifecycleConfig::default().with_node_expiration_property("e").with_backfill_batch_size(0) ; "zero batch")]
    fn test_numeric_bounds(config: LifecycleConfig) {
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_zero_cap_is_valid() {
        let config = LifecycleConfig::default()
            .with_node_expiration_property("expire")
            .with_max_no_expirations(0);
        assert!(config.validate().is_ok());
        assert_eq!(config.max_per_event(), 0);
    }

    #[test]
    fn test_blank_index_ignores_properties() {
        let config = LifecycleConfig::default()
            .with_node_expiration_index(" ")
            .with_node_expiration_property("expire")
            .with_relationship_ttl_property("ttl");
        let normalized = config.clone().normalized();
        assert_eq!(normalized.node_expiration_property, None);
        assert!(!config.tracks(EXPIRY_EVENT, EntityKind::Node));
        assert!(config.tracks(EXPIRY_EVENT, EntityKind::Edge));
    }

    #[test]
    fn test_untracked_kind_needs_no_strategy() {
        let mut config = LifecycleConfig::default().with_node_expiration_property("expire");
        config.relationship_expiration_strategy = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_registry_orders_revival_first() {
        let config = LifecycleConfig::default()
            .with_node_expiration_property("expire")
            .with_node_ttl_property("ttl")
            .with_node_revival_property("lastActive")
            .with_node_revival_strategy("addRemoveLabels")
            .with_node_revival_tags(TagToggleConfig::parse("[ActiveProfile]", "[InactiveProfile]"))
            .with_revival_offset_millis(10)
            .with_expiry_offset_millis(20);
        let registry = config.build_registry(&builtins()).unwrap();

        let names: Vec<&str> = registry.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec![REVIVAL_EVENT, EXPIRY_EVENT]);

        let revival = registry.get(REVIVAL_EVENT).unwrap();
        assert_eq!(revival.offset_millis(), 10);
        assert!(revival.tracks(EntityKind::Node));
        assert!(!revival.tracks(EntityKind::Edge));

        let expiry = registry.get(EXPIRY_EVENT).unwrap();
        assert_eq!(expiry.offset_millis(), 20);
        let binding = expiry.binding(EntityKind::Node).unwrap();
        assert_eq!(binding.index_name, "nodeExpirationIndex");
        assert_eq!(binding.date_property.as_deref(), Some("expire"));
        assert_eq!(binding.ttl_property.as_deref(), Some("ttl"));
        assert_eq!(binding.strategy.name(), "orphan");
    }

    #[test]
    fn test_build_registry_skips_untracked_event() {
        let config = LifecycleConfig::default().with_relationship_ttl_property("ttl");
        let registry = config.build_registry(&builtins()).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(REVIVAL_EVENT).is_none());
    }

    #[test]
    fn test_unknown_strategy_is_rejected() {
        let config = LifecycleConfig::default()
            .with_node_expiration_property("expire")
            .with_node_expiration_strategy("purge");
        assert!(matches!(
            config.build_registry(&builtins()),
            Err(Error::StrategyResolution { .. })
        ));
    }

    #[test]
    fn test_node_strategy_on_edges_is_rejected() {
        let config = LifecycleConfig::default()
            .with_relationship_expiration_property("expire")
            .with_relationship_expiration_strategy("force");
        assert!(matches!(
            config.build_registry(&builtins()),
            Err(Error::StrategyResolution { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_NO_EXPIRATIONS, "25"),
            (ENV_SWEEP_INTERVAL_MS, "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = LifecycleConfig::default()
            .with_overrides_from(|key| vars.get(key).map(ToString::to_string));
        assert_eq!(config.max_no_expirations, 25);
        assert_eq!(config.sweep_interval_millis, 100);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
nodeExpirationProperty = "expire"
relationshipTtlProperty = "ttl"
nodeExpirationStrategy = "force"
maxNoExpirations = 7
expiryOffsetMillis = 5000
"nodeExpirationStrategy.labelsToAdd" = "[InactiveProfile, Foo]"
"#
        )
        .unwrap();

        let config = LifecycleConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.node_expiration_property.as_deref(), Some("expire"));
        assert_eq!(config.relationship_ttl_property.as_deref(), Some("ttl"));
        assert_eq!(config.node_expiration_strategy.as_deref(), Some("force"));
        assert_eq!(config.max_no_expirations, 7);
        assert_eq!(config.expiry_offset_millis, 5000);
        assert_eq!(
            config.node_expiration_tags.add,
            vec!["InactiveProfile".to_string(), "Foo".to_string()]
        );
        assert_eq!(config.relationship_expiration_strategy.as_deref(), Some("delete"));
    }

    #[test]
    fn test_load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "maxNoExpirations = \"many\"").unwrap();
        let err = LifecycleConfig::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("parse_config_file"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = LifecycleConfig::load_from_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(err, Err(Error::OperationFailed { .. })));
    }
}
