//! Binary entry point for graph-lifecycle.
//!
//! Inspects lifecycle configuration and persisted lifecycle indexes.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::multiple_crate_versions)]

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use graph_lifecycle::config::LifecycleConfig;
use graph_lifecycle::lifecycle::StrategyRegistry;
use graph_lifecycle::observability::{self, InitOptions};
use graph_lifecycle::storage::index::SqliteIndexBackend;
use graph_lifecycle::{EntityKind, LifecycleIndexBackend};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

/// Time-based lifecycle transitions for graph entities.
#[derive(Parser)]
#[command(name = "graph-lifecycle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Load and validate a configuration, then list the registered events.
    Validate {
        /// Configuration file (defaults to the platform config directory).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List entries of a `SQLite` lifecycle index that are due.
    Due {
        /// Index database file.
        #[arg(long)]
        db: PathBuf,

        /// Index name, e.g. `nodeExpirationIndex`.
        #[arg(long)]
        index: String,

        /// Entity kind: `node` or `edge`.
        #[arg(long)]
        kind: String,

        /// Event name: `expiry` or `revival`.
        #[arg(long, default_value = "expiry")]
        event: String,

        /// Upper bound in epoch milliseconds (defaults to now).
        #[arg(long)]
        before: Option<i64>,

        /// Maximum number of entries.
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
}

/// One registered event binding, as printed by `validate`.
#[derive(Debug, Serialize)]
struct BindingSummary {
    event: String,
    offset_millis: i64,
    kind: EntityKind,
    index: String,
    date_property: Option<String>,
    ttl_property: Option<String>,
    strategy: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Validate {
            config: Some(path), ..
        } => match LifecycleConfig::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return ExitCode::FAILURE;
            },
        },
        _ => LifecycleConfig::load_default(),
    }
    .with_env_overrides();

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    let result = match cli.command {
        Commands::Validate { json, .. } => cmd_validate(&config, json),
        Commands::Due {
            db,
            index,
            kind,
            event,
            before,
            limit,
        } => cmd_due(db, &index, &kind, &event, before, limit),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn cmd_validate(config: &LifecycleConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = config.build_registry(&StrategyRegistry::with_builtins())?;

    let mut bindings = Vec::new();
    for event in registry.iter() {
        for kind in EntityKind::SWEEP_ORDER {
            if let Some(binding) = event.binding(kind) {
                bindings.push(BindingSummary {
                    event: event.name().to_string(),
                    offset_millis: event.offset_millis(),
                    kind,
                    index: binding.index_name.clone(),
                    date_property: binding.date_property.clone(),
                    ttl_property: binding.ttl_property.clone(),
                    strategy: binding.strategy.name().to_string(),
                });
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&bindings)?);
        return Ok(());
    }

    println!("Configuration is valid.");
    println!(
        "  max per event: {}, sweep interval: {} ms, backfill batch: {}",
        config.max_no_expirations, config.sweep_interval_millis, config.backfill_batch_size
    );
    for b in &bindings {
        println!(
            "  {:<8} {:<5} index={} date={} ttl={} strategy={} offset={}ms",
            b.event,
            b.kind,
            b.index,
            b.date_property.as_deref().unwrap_or("-"),
            b.ttl_property.as_deref().unwrap_or("-"),
            b.strategy,
            b.offset_millis
        );
    }
    Ok(())
}

fn cmd_due(
    db: PathBuf,
    index: &str,
    kind: &str,
    event: &str,
    before: Option<i64>,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::parse(kind).ok_or_else(|| format!("unknown entity kind '{kind}'"))?;
    if !db.exists() {
        return Err(format!("index database {} does not exist", db.display()).into());
    }
    let backend = SqliteIndexBackend::new(&db)?;
    if !backend.exists(index)? {
        return Err(format!("index '{index}' does not exist in {}", db.display()).into());
    }

    let high = before.unwrap_or_else(graph_lifecycle::current_timestamp_millis);
    let entries = backend.range_query(index, kind, event, 0, high, Some(limit))?;
    let total = backend.count(index, kind, event)?;

    println!("{} of {total} {kind} entries due for '{event}' in {index}:", entries.len());
    for entry in entries {
        let when = DateTime::<Utc>::from_timestamp_millis(entry.due_at)
            .map_or_else(|| entry.due_at.to_string(), |dt| dt.to_rfc3339());
        println!("  {:>12}  {when}", entry.entity.get());
    }
    Ok(())
}
