// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::graph::{TaskGraph, TaskId};

/// Compiled input patterns for a single watched task.
///
/// Patterns are evaluated against paths relative to the task's `cwd`; a
/// path outside the `cwd` never matches.
#[derive(Clone)]
pub struct WatchProfile {
    task: TaskId,
    cwd: PathBuf,
    inputs: GlobSet,
}

impl fmt::Debug for WatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchProfile")
            .field("task", &self.task)
            .field("cwd", &self.cwd)
            .finish_non_exhaustive()
    }
}

impl WatchProfile {
    pub fn for_task(graph: &TaskGraph, task: TaskId) -> Result<Self> {
        let meta = graph.meta(task);
        // Canonicalize once so notify paths compare against a stable base.
        let cwd = meta.cwd.canonicalize().unwrap_or_else(|_| meta.cwd.clone());
        let inputs = build_globset(&meta.inputs)
            .with_context(|| format!("building input globset for task '{}'", meta.name))?;
        Ok(Self { task, cwd, inputs })
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Returns true if the changed absolute path falls inside this task's
    /// `cwd` and matches one of its input patterns.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(rel) = path.strip_prefix(&self.cwd) else {
            return false;
        };
        let rel_str = rel.to_string_lossy().replace('\\', "/");
        self.inputs.is_match(rel_str.as_str())
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
