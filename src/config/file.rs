//! On-disk configuration format.
//!
//! Keys use the camelCase option names the lifecycle settings are known by,
//! so a file reads like:
//!
//! ```toml
//! nodeExpirationProperty = "expire"
//! nodeTtlProperty = "ttl"
//! maxNoExpirations = 500
//! "nodeRevivalStrategy.labelsToAdd" = "[ActiveProfile, Bar]"
//!
//! [observability.logging]
//! format = "json"
//! ```

use serde::Deserialize;

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    /// Index holding node expiry dates.
    pub node_expiration_index: Option<String>,
    /// Index holding edge expiry dates.
    pub relationship_expiration_index: Option<String>,
    /// Index holding node revival dates.
    pub node_revival_index: Option<String>,
    /// Index holding edge revival dates.
    pub relationship_revival_index: Option<String>,
    /// Absolute node expiry property.
    pub node_expiration_property: Option<String>,
    /// Absolute edge expiry property.
    pub relationship_expiration_property: Option<String>,
    /// Node TTL property.
    pub node_ttl_property: Option<String>,
    /// Edge TTL property.
    pub relationship_ttl_property: Option<String>,
    /// Node revival property.
    pub node_revival_property: Option<String>,
    /// Edge revival property.
    pub relationship_revival_property: Option<String>,
    /// Node expiry strategy identifier.
    pub node_expiration_strategy: Option<String>,
    /// Edge expiry strategy identifier.
    pub relationship_expiration_strategy: Option<String>,
    /// Node revival strategy identifier.
    pub node_revival_strategy: Option<String>,
    /// Edge revival strategy identifier.
    pub relationship_revival_strategy: Option<String>,
    /// Tags added when a node expires.
    #[serde(rename = "nodeExpirationStrategy.labelsToAdd")]
    pub node_expiration_labels_to_add: Option<TagList>,
    /// Tags removed when a node expires.
    #[serde(rename = "nodeExpirationStrategy.labelsToRemove")]
    pub node_expiration_labels_to_remove: Option<TagList>,
    /// Tags added when a node is revived.
    #[serde(rename = "nodeRevivalStrategy.labelsToAdd")]
    pub node_revival_labels_to_add: Option<TagList>,
    /// Tags removed when a node is revived.
    #[serde(rename = "nodeRevivalStrategy.labelsToRemove")]
    pub node_revival_labels_to_remove: Option<TagList>,
    /// Per-event, per-kind cap on strategy invocations in one tick.
    pub max_no_expirations: Option<i64>,
    /// Offset added to every expiry date.
    pub expiry_offset_millis: Option<i64>,
    /// Offset added to every revival date.
    pub revival_offset_millis: Option<i64>,
    /// Sweep period.
    pub sweep_interval_millis: Option<u64>,
    /// Page size of the startup backfill.
    pub backfill_batch_size: Option<usize>,
    /// Logging and metrics.
    pub observability: Option<ObservabilitySettings>,
}

/// A tag list written either as a TOML array or as `"[A, B]"` text.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagList {
    /// `["A", "B"]`
    Items(Vec<String>),
    /// `"[A, B]"` or `"A, B"`
    Text(String),
}

impl TagList {
    /// Flattens the list into trimmed, non-empty tag names.
    #[must_use]
    pub fn into_tags(self) -> Vec<String> {
        match self {
            Self::Items(items) => items
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect(),
            Self::Text(text) => parse_tag_list(&text),
        }
    }
}

/// Parses `"[A, B]"` (brackets optional) into `["A", "B"]`.
#[must_use]
pub fn parse_tag_list(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('[').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(']').unwrap_or(trimmed);
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Observability section of the config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Logging section of the config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive, e.g. `graph_lifecycle=debug`.
    pub level: Option<String>,
    /// Append log output to this file instead of stderr.
    pub file: Option<String>,
}

/// Metrics section of the config file.
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct MetricsSettings {
    /// Whether the Prometheus exporter is installed.
    pub enabled: Option<bool>,
    /// Port of the HTTP listener.
    pub port: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("[ActiveProfile, Bar]", &["ActiveProfile", "Bar"] ; "bracketed")]
    #[test_case("Foo,Bar", &["Foo", "Bar"] ; "bare")]
    #[test_case("[ InactiveProfile ]", &["InactiveProfile"] ; "single padded")]
    #[test_case("[]", &[] ; "empty brackets")]
    #[test_case("[A,,B]", &["A", "B"] ; "empty member")]
    fn test_parse_tag_list(text: &str, expected: &[&str]) {
        assert_eq!(parse_tag_list(text), expected);
    }

    #[test]
    fn test_config_file_parses_dotted_tag_keys() {
        let file: ConfigFile = toml::from_str(
            r#"
            nodeExpirationProperty = "expire"
            maxNoExpirations = 10
            "nodeRevivalStrategy.labelsToAdd" = "[ActiveProfile, Bar]"
            "nodeRevivalStrategy.labelsToRemove" = ["InactiveProfile", " Foo "]

            [observability.metrics]
            enabled = true
            port = 9191
            "#,
        )
        .unwrap();

        assert_eq!(file.node_expiration_property.as_deref(), Some("expire"));
        assert_eq!(file.max_no_expirations, Some(10));
        assert_eq!(
            file.node_revival_labels_to_add.map(TagList::into_tags),
            Some(vec!["ActiveProfile".to_string(), "Bar".to_string()])
        );
        assert_eq!(
            file.node_revival_labels_to_remove.map(TagList::into_tags),
            Some(vec!["InactiveProfile".to_string(), "Foo".to_string()])
        );
        let metrics = file.observability.and_then(|o| o.metrics).unwrap();
        assert_eq!(metrics.enabled, Some(true));
        assert_eq!(metrics.port, Some(9191));
    }
}
