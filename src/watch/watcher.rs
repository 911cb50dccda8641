// src/watch/watcher.rs

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::sched::TaskBatch;
use crate::watch::propagate::InvalidationPropagator;

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive
/// for as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Directory names whose contents never seed invalidations.
const IGNORED_DIRS: [&str; 3] = ["node_modules", ".git", "target"];

/// Spawn a filesystem watcher over the propagator's watch directories and
/// forward non-empty invalidation batches to the scheduler.
///
/// The forwarding task owns `batch_tx` and runs until the notify callback
/// is dropped, so the scheduler's batch stream stays open exactly as long
/// as the returned handle lives.
pub fn spawn_watcher(
    propagator: InvalidationPropagator,
    batch_tx: mpsc::Sender<TaskBatch>,
) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    // Closure called synchronously by notify whenever an event arrives.
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    // We can't log via tracing here easily, so fallback to stderr.
                    eprintln!("taskdag: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("taskdag: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    for dir in propagator.watch_dirs() {
        watcher.watch(dir, RecursiveMode::Recursive)?;
        info!("file watcher started on {:?}", dir);
    }

    // Async task that consumes notify events and forwards invalidation
    // batches to the scheduler.
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");

            if !matches!(
                event.kind,
                EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
            ) {
                continue;
            }

            let paths = event
                .paths
                .iter()
                .filter(|path| !is_ignored(path))
                .map(PathBuf::as_path);
            let batch = propagator.batch_for_paths(paths);
            if batch.is_empty() {
                continue;
            }

            debug!(tasks = batch.len(), "forwarding invalidation batch");
            if batch_tx.send(batch).await.is_err() {
                // Scheduler is gone; nothing left to invalidate.
                break;
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => IGNORED_DIRS.iter().any(|dir| name == OsStr::new(dir)),
        _ => false,
    })
}
