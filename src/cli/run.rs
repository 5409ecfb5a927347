//! `run` command: the long-running relay

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{Config, paths};
use crate::data::{DataContext, DataMask};
use crate::plugins::{PluginCatalog, PluginLoader, PluginRegistry};
use crate::services::{ConsumersHandle, ConsumersService, ConsumersSnapshot, ServiceSettings};
use crate::watcher::{DeclarationWatcher, spawn_poller};

/// Arguments of the `run` command
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Declared consumers file (overrides declarationPath)
    #[arg(long)]
    pub declaration: Option<PathBuf>,

    /// Plugin discovery directory (overrides pluginsDir)
    #[arg(long)]
    pub plugins_dir: Option<PathBuf>,

    /// Push data contexts read from stdin, one JSON document per line
    #[arg(long)]
    pub stdin: bool,
}

/// Run until ctrl-c, then unload every consumer
pub async fn run(config: Config, args: RunArgs) -> Result<()> {
    let plugins_dir = resolve_plugins_dir(&config, args.plugins_dir.as_deref())?;
    let registry = build_registry(&plugins_dir)?;
    tracing::info!(
        "Available sink types: {}",
        registry.names().join(", ")
    );

    let settings = ServiceSettings {
        pipeline: config.pipeline_settings(),
        trace_dir: config.trace_dir(),
    };
    let handle = ConsumersHandle::spawn(ConsumersService::new(
        PluginCatalog::with_builtins(),
        registry,
        settings,
    ));

    let declaration = args
        .declaration
        .unwrap_or_else(|| config.declaration_path());
    let poll_interval = config.poll_interval()?;
    let poller = spawn_poller(
        DeclarationWatcher::new(declaration),
        poll_interval,
        handle.sender(),
    );

    let producer = args.stdin.then(|| spawn_stdin_producer(handle.snapshots()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");

    poller.abort();
    if let Some(producer) = producer {
        producer.abort();
    }
    handle.shutdown().await?;

    Ok(())
}

/// Plugin directory to scan
///
/// An explicitly configured directory must exist; the default one is created
/// on first run.
pub fn resolve_plugins_dir(config: &Config, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit.map(Path::to_path_buf).or_else(|| config.plugins_dir.clone()) {
        return Ok(dir);
    }

    let dir = paths::plugins_dir();
    paths::ensure_dir(&dir)
        .with_context(|| format!("Failed to create plugins directory: {}", dir.display()))?;
    Ok(dir)
}

/// Discovered plugins plus the built-in sinks
pub fn build_registry(plugins_dir: &Path) -> Result<PluginRegistry> {
    let candidates = PluginLoader::with_dir(plugins_dir.to_path_buf())
        .discover()
        .context("Plugin discovery failed")?;
    let mut registry = PluginRegistry::from_candidates(candidates);
    crate::sinks::register_builtins(&mut registry);
    Ok(registry)
}

/// Data context of one input line
///
/// A serialized context (`eventType` + `data`) is taken as is; any other JSON
/// document becomes the data of a custom context.
pub fn context_from_line(line: &str) -> Result<DataContext> {
    let value: Value = serde_json::from_str(line).context("input line is not JSON")?;

    let is_context = value.get("eventType").is_some_and(Value::is_string)
        && value.get("data").is_some();
    if is_context {
        return serde_json::from_value(value).context("invalid data context");
    }

    Ok(DataContext::new("custom", value).custom())
}

fn spawn_stdin_producer(snapshots: watch::Receiver<Arc<ConsumersSnapshot>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        let mask = DataMask::all();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::info!("stdin closed, no more data");
                    return;
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let context = match context_from_line(&line) {
                Ok(context) => context.shared(),
                Err(e) => {
                    tracing::warn!("Skipping input line: {:#}", e);
                    continue;
                }
            };

            let snapshot = snapshots.borrow().clone();
            let results = snapshot.broadcast(context, &mask).await;
            tracing::trace!("Pushed to {} consumer(s)", results.len());
        }
    })
}
