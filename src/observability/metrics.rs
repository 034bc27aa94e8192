//! Prometheus metrics exporter.
//!
//! The lifecycle code records through the `metrics` facade unconditionally.
//! Without an installed recorder those calls are no-ops; with one, the
//! exporter serves them over HTTP or keeps them for [`MetricsHandle::render`].

use crate::config::MetricsSettings;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;

/// Environment variable enabling the exporter.
pub const ENV_METRICS_ENABLED: &str = "GRAPH_LIFECYCLE_METRICS_ENABLED";

/// Environment variable setting the listener port.
pub const ENV_METRICS_PORT: &str = "GRAPH_LIFECYCLE_METRICS_PORT";

const DEFAULT_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// Whether a recorder is installed at all.
    pub enabled: bool,
    /// Address of the HTTP listener.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_settings(None)
    }

    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        Self::from_lookup(settings, |key| std::env::var(key).ok())
    }

    /// Builds metrics configuration from settings and an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup<F>(settings: Option<&MetricsSettings>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_PORT);

        let mut config = Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        };

        if let Some(enabled) = lookup(ENV_METRICS_ENABLED).map(|v| parse_bool(&v)) {
            config.enabled = enabled;
        }
        if let Some(port) = lookup(ENV_METRICS_PORT).and_then(|v| v.trim().parse::<u16>().ok()) {
            config.listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        }

        config
    }
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsHandle {
    prometheus: PrometheusHandle,
}

impl std::fmt::Debug for MetricsHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsHandle").finish_non_exhaustive()
    }
}

impl MetricsHandle {
    /// Renders the current metrics in the Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.prometheus.render()
    }
}

/// Installs the Prometheus recorder when metrics are enabled.
///
/// With `expose`, an HTTP listener serves `/metrics` on `config.listen_addr`.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed or the
/// listener cannot be started.
pub fn install_prometheus(config: &MetricsConfig, expose: bool) -> Result<Option<MetricsHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new();
    let prometheus = if expose {
        let builder = builder.with_http_listener(config.listen_addr);
        install_listener(builder)?
    } else {
        builder
            .install_recorder()
            .map_err(|e| Error::operation("metrics_recorder_install", e))?
    };

    tracing::info!(
        expose,
        listen_addr = %config.listen_addr,
        "Prometheus metrics recorder installed"
    );
    Ok(Some(MetricsHandle { prometheus }))
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::operation("metrics_runtime_init", e))?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("graph-lifecycle-metrics-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::operation("metrics_runtime_thread", e))?;
    Ok(prometheus)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder
            .build()
            .map_err(|e| Error::operation("metrics_exporter_build", e))?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder)
        .map_err(|e| Error::operation("metrics_recorder_install", e))
}

fn parse_bool(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    value == "true" || value == "1" || value == "yes"
}
