//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const ENV_LOG: &str = "GRAPH_LIFECYCLE_LOG";

/// Environment variable selecting the log format.
pub const ENV_LOG_FORMAT: &str = "GRAPH_LIFECYCLE_LOG_FORMAT";

/// Output format of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name. Unknown names fall back to [`LogFormat::Pretty`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Event filter.
    pub filter: EnvFilter,
    /// Append to this file instead of writing to stderr.
    pub file: Option<PathBuf>,
}

impl Clone for LoggingConfig {
    fn clone(&self) -> Self {
        Self {
            format: self.format,
            filter: EnvFilter::new(self.filter.to_string()),
            file: self.file.clone(),
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// The filter comes from `GRAPH_LIFECYCLE_LOG`, then `RUST_LOG`, then the
    /// settings, then `info` (`debug` when `verbose`).
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::from_lookup(settings, verbose, |key| std::env::var(key).ok())
    }

    /// Same as [`LoggingConfig::from_settings`] with an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(settings: Option<&LoggingSettings>, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default_level = if verbose { "debug" } else { "info" };
        let directive = lookup(ENV_LOG)
            .or_else(|| lookup("RUST_LOG"))
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        let filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(default_level));

        let format = lookup(ENV_LOG_FORMAT)
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map_or(LogFormat::Pretty, |f| LogFormat::parse(&f));

        let file = settings
            .and_then(|s| s.file.as_deref())
            .filter(|f| !f.trim().is_empty())
            .map(PathBuf::from);

        Self {
            format,
            filter,
            file,
        }
    }
}
