// src/sched/mod.rs

//! Incremental task scheduler.
//!
//! This module ties together:
//! - the pure state machine that tracks task freshness across invalidation
//!   batches and decides what to launch, cancel and commit
//! - the async shell that owns the run futures, executes the core's
//!   commands and reacts to:
//!   - invalidation batches (initial targets and watch events)
//!   - run exits
//!   - shutdown signals
//!
//! The pure core lives in [`core`]; the async/IO shell is implemented in
//! [`runtime`].

use std::collections::HashSet;

use crate::graph::TaskId;

/// Identity of a single execution of a task.
///
/// A task can be launched many times over the life of the scheduler; only
/// the exit of the run currently recorded as live may mark the task up to
/// date. Exits of superseded runs are settlement bookkeeping.
pub type RunId = u64;

/// One invalidation batch: tasks whose outputs can no longer be trusted.
pub type TaskBatch = HashSet<TaskId>;

/// How a run's action ended, as reported by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The action settled without a hard failure. This includes actions
    /// whose process exited non-zero and runs revoked by cancellation.
    Completed,
    /// The action could not be carried out at all, e.g. the process failed
    /// to spawn.
    Failed(String),
}

/// Events flowing into the scheduler from the outside world.
#[derive(Debug, Clone)]
pub enum SchedEvent {
    /// A batch of tasks must be considered out of date.
    Invalidate(TaskBatch),
    /// No further invalidation batches will arrive.
    BatchStreamClosed,
    /// A run's future finished and its action is fully settled.
    RunExited {
        task: TaskId,
        run_id: RunId,
        outcome: RunOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod runtime;

pub use self::core::{CoreCommand, CoreStep, RunFailure, SchedCore};
pub use runtime::SchedRuntime;
