// src/graph/task.rs

//! Task metadata and the task definition surface.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::graph::TaskId;

/// Context handed to an in-process task routine.
///
/// The cancellation token fires when the scheduler revokes the run; routines
/// that block should select against it.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub cancel: CancellationToken,
}

/// An in-process task routine.
pub type RoutineFn = Arc<
    dyn Fn(RunContext) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync,
>;

/// External command forms a task can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// A single command line, run through the platform shell.
    Shell(String),
    /// An explicit program plus arguments, spawned directly.
    Argv { program: String, args: Vec<String> },
}

/// What a task does when it runs.
#[derive(Clone)]
pub enum TaskAction {
    Command(CommandSpec),
    Routine(RoutineFn),
    /// A task with neither a command nor a routine; it completes immediately.
    Noop,
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Command(spec) => f.debug_tuple("Command").field(spec).finish(),
            TaskAction::Routine(_) => f.write_str("Routine(..)"),
            TaskAction::Noop => f.write_str("Noop"),
        }
    }
}

/// Static task information derived from its definition.
#[derive(Debug, Clone)]
pub struct TaskMeta {
    pub name: String,
    pub description: Option<String>,
    /// Working directory for the action and root for input matching.
    pub cwd: PathBuf,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Glob patterns, relative to `cwd`, for the files this task reads.
    pub inputs: Vec<String>,
    /// Glob patterns, relative to `cwd`, for the files this task writes.
    pub outputs: Vec<String>,
    /// Long-running task that is not expected to exit on its own.
    pub persistent: bool,
    /// Whether a persistent task may be cancelled and restarted by a watch
    /// invalidation.
    pub interruptible: bool,
}

/// Definition of a single task, as handed to [`TaskGraph::define_task`].
///
/// Dependencies are identities of previously defined tasks, so a definition
/// can never close a cycle.
///
/// [`TaskGraph::define_task`]: crate::graph::TaskGraph::define_task
#[derive(Clone)]
pub struct TaskConfig {
    pub name: String,
    pub description: Option<String>,
    /// In-process routine; takes precedence over `command` when both are set.
    pub run: Option<RoutineFn>,
    pub command: Option<CommandSpec>,
    pub env: BTreeMap<String, String>,
    /// Defaults to the graph's base directory when `None`.
    pub cwd: Option<PathBuf>,
    /// Defaults to `["**/*"]` when `None`.
    pub inputs: Option<Vec<String>>,
    /// Defaults to `["**/*"]` when `None`.
    pub outputs: Option<Vec<String>>,
    pub persistent: bool,
    pub interruptible: bool,
    pub depends_on: Vec<TaskId>,
}

impl TaskConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            run: None,
            command: None,
            env: BTreeMap::new(),
            cwd: None,
            inputs: None,
            outputs: None,
            persistent: false,
            interruptible: false,
            depends_on: Vec::new(),
        }
    }
}
