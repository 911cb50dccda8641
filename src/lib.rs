// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod sched;
pub mod watch;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{CliArgs, CliCommand};
use crate::config::load_taskfile;
use crate::errors::TaskdagError;
use crate::exec::ProcessExecutor;
use crate::graph::TaskId;
use crate::sched::{SchedCore, SchedRuntime, TaskBatch};
use crate::watch::InvalidationPropagator;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - taskfile loading
/// - scheduler core / runtime
/// - executor
/// - (optional) file watcher
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        CliCommand::List => run_list(&args.config),
        CliCommand::Run { tasks, watch } => run_tasks(&args.config, &tasks, watch).await,
    }
}

/// `taskdag list`: print the tasks defined in the taskfile, sorted by name.
fn run_list(config_path: &str) -> Result<()> {
    let (graph, ids) = load_taskfile(config_path)?;

    if ids.is_empty() {
        println!("No tasks found in {config_path}");
        return Ok(());
    }

    let width = ids.keys().map(String::len).max().unwrap_or(0);

    println!("Available tasks:");
    for (name, id) in ids.iter() {
        let meta = graph.meta(*id);
        let description = meta.description.as_deref().unwrap_or("No description");
        println!("  {name:<width$}  {description}");
    }
    Ok(())
}

/// `taskdag run <task...>`: run the requested tasks after their
/// dependencies, optionally watching their inputs afterwards.
async fn run_tasks(config_path: &str, tasks: &[String], watch: bool) -> Result<()> {
    let (graph, ids) = load_taskfile(config_path)?;
    let graph = Arc::new(graph);

    let targets = resolve_targets(&ids, tasks)?;
    info!(?tasks, watch, "starting task run");

    // Ctrl-C → graceful shutdown.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            shutdown.cancel();
        });
    }

    let (batch_tx, batch_rx) = mpsc::channel::<TaskBatch>(64);

    // Optional file watcher. Its forwarding task keeps a sender alive, so
    // the batch stream stays open; without it the stream closes once the
    // initial batch is sent and the scheduler exits when the graph settles.
    let _watcher_handle = if watch {
        let propagator = InvalidationPropagator::new(Arc::clone(&graph), targets.clone())?;
        Some(watch::spawn_watcher(propagator, batch_tx.clone())?)
    } else {
        None
    };

    // Seed the run: invalidating the targets pulls in their stale
    // dependency chains.
    batch_tx
        .send(targets)
        .await
        .map_err(|_| anyhow::anyhow!("scheduler channel closed before the initial batch"))?;
    drop(batch_tx);

    let executor = Arc::new(ProcessExecutor::new()?);
    let core = SchedCore::new(graph);
    let runtime = SchedRuntime::new(core, batch_rx, shutdown, executor);
    runtime.run().await?;
    Ok(())
}

/// Resolve command-line task names to graph identities.
fn resolve_targets(ids: &BTreeMap<String, TaskId>, tasks: &[String]) -> Result<TaskBatch> {
    let mut targets = HashSet::new();
    for name in tasks {
        match ids.get(name) {
            Some(id) => {
                targets.insert(*id);
            }
            None => return Err(TaskdagError::TaskNotFound(name.clone()).into()),
        }
    }
    Ok(targets)
}
