//! Observability and telemetry.
//!
//! Installs the process-wide `tracing` subscriber and, when enabled, the
//! Prometheus recorder. Library code only emits events and metrics; calling
//! [`init`] is up to the binary embedding the crate.

mod logging;
mod metrics;

pub use logging::{ENV_LOG, ENV_LOG_FORMAT, LogFormat, LoggingConfig};
pub use metrics::{
    ENV_METRICS_ENABLED, ENV_METRICS_PORT, MetricsConfig, MetricsHandle, install_prometheus,
};

use crate::config::ObservabilitySettings;
use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Full observability configuration.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
    /// Whether to expose metrics via HTTP listener.
    pub metrics_expose: bool,
}

/// Options for environment-based initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
    /// Whether to expose metrics via HTTP listener.
    pub metrics_expose: bool,
}

/// Handle for observability runtime components.
#[derive(Debug)]
pub struct ObservabilityHandle {
    metrics: Option<MetricsHandle>,
}

impl ObservabilityHandle {
    /// The installed metrics recorder, if metrics are enabled.
    #[must_use]
    pub const fn metrics(&self) -> Option<&MetricsHandle> {
        self.metrics.as_ref()
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Initializes observability using environment variables.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if any
/// component fails to initialize.
pub fn init_from_env(options: InitOptions) -> Result<ObservabilityHandle> {
    init(build_config(None, options))
}

/// Initializes observability from config settings with env overrides.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if any
/// component fails to initialize.
pub fn init_from_config(
    settings: &ObservabilitySettings,
    options: InitOptions,
) -> Result<ObservabilityHandle> {
    init(build_config(Some(settings), options))
}

fn build_config(
    settings: Option<&ObservabilitySettings>,
    options: InitOptions,
) -> ObservabilityConfig {
    let logging = LoggingConfig::from_settings(
        settings.and_then(|cfg| cfg.logging.as_ref()),
        options.verbose,
    );
    let metrics = MetricsConfig::from_settings(settings.and_then(|cfg| cfg.metrics.as_ref()));

    ObservabilityConfig {
        logging,
        metrics,
        metrics_expose: options.metrics_expose,
    }
}

/// Initializes logging and metrics for the process.
///
/// # Errors
///
/// Returns an error if observability has already been initialized or if any
/// component fails to initialize.
pub fn init(config: ObservabilityConfig) -> Result<ObservabilityHandle> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::operation(
            "observability_init",
            "observability already initialized",
        ));
    }

    let metrics = install_prometheus(&config.metrics, config.metrics_expose)?;

    match (&config.logging.file, config.logging.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .with(config.logging.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (Some(log_file), LogFormat::Pretty) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .with(config.logging.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .with(config.logging.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(io::stderr)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_thread_names(true),
                )
                .with(config.logging.filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    OBSERVABILITY_INIT
        .set(())
        .map_err(|()| Error::operation("observability_init", "failed to mark observability initialized"))?;

    Ok(ObservabilityHandle { metrics })
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_log_dir", e))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::operation("open_log_file", format!("{}: {e}", path.display())))?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::operation("observability_init", e)
}
