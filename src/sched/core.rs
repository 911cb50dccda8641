// src/sched/core.rs

//! Pure scheduler state machine.
//!
//! This module contains a synchronous, deterministic core that consumes
//! [`SchedEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`sched::runtime::SchedRuntime`) is responsible
//! for reading events from channels, spawning run futures, cancelling them
//! and handling Ctrl+C.
//!
//! # Task states
//!
//! Between events, every task is in at most one of these states:
//! - **dirty**: its output can no longer be trusted; it must run again.
//! - **pending**: dirty, and additionally waiting for an in-flight
//!   dependency. A pending task is never promoted, no matter what its
//!   dependencies look like right now.
//! - **ready**: promoted for launch. Drained at the end of every step, so
//!   the set is empty between events.
//! - **running**: has a live run, identified by a [`RunId`].
//! - **up to date**: its most recent live run completed and nothing has
//!   invalidated it since.
//!
//! Runs that were revoked but whose exit has not yet been observed are
//! tracked separately in the settling map; they belong to no state above
//! and their exits never mark anything up to date.
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, filesystem, or processes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::graph::{TaskGraph, TaskId};
use crate::sched::{RunId, RunOutcome, SchedEvent, TaskBatch};

/// Instructions from the core to the async shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start a new run of `task`. The run must not act before every listed
    /// superseded run of the same task has settled.
    Launch {
        task: TaskId,
        run_id: RunId,
        await_settlement_of: Vec<RunId>,
    },
    /// Revoke a live run. The shell cancels it; the run keeps existing
    /// until its exit is reported back.
    Cancel { task: TaskId, run_id: RunId },
}

/// The result of applying one event to the core.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

/// The hard failure that stopped the scheduler, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub task: String,
    pub message: String,
}

/// Pure scheduler state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct SchedCore {
    graph: Arc<TaskGraph>,
    dirty: HashSet<TaskId>,
    pending: HashSet<TaskId>,
    up_to_date: HashSet<TaskId>,
    ready: HashSet<TaskId>,
    /// Live run per task. A task has at most one live run.
    running: HashMap<TaskId, RunId>,
    /// Revoked runs whose exits have not been observed yet, oldest first.
    settling: HashMap<TaskId, Vec<RunId>>,
    stream_closed: bool,
    failure: Option<RunFailure>,
    next_run_id: RunId,
}

impl SchedCore {
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        Self {
            graph,
            dirty: HashSet::new(),
            pending: HashSet::new(),
            up_to_date: HashSet::new(),
            ready: HashSet::new(),
            running: HashMap::new(),
            settling: HashMap::new(),
            stream_closed: false,
            failure: None,
            next_run_id: 1,
        }
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    /// Expose freshness (for tests).
    pub fn is_up_to_date(&self, task: TaskId) -> bool {
        self.up_to_date.contains(&task)
    }

    /// Expose dirtiness (for tests).
    pub fn is_dirty(&self, task: TaskId) -> bool {
        self.dirty.contains(&task)
    }

    /// Expose the pending marker (for tests).
    pub fn is_pending(&self, task: TaskId) -> bool {
        self.pending.contains(&task)
    }

    /// Expose whether a task has a live run (for tests).
    pub fn is_running(&self, task: TaskId) -> bool {
        self.running.contains_key(&task)
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: SchedEvent) -> CoreStep {
        match event {
            SchedEvent::Invalidate(batch) => self.on_invalidate(batch),
            SchedEvent::BatchStreamClosed => self.on_stream_closed(),
            SchedEvent::RunExited {
                task,
                run_id,
                outcome,
            } => self.on_run_exited(task, run_id, outcome),
            SchedEvent::ShutdownRequested => self.on_shutdown(),
        }
    }

    /// Apply one invalidation batch.
    ///
    /// Marking and promotion are two separate phases. Readiness of one batch
    /// member can depend on another member being dirty already, so promoting
    /// while still marking would let a task slip through as ready before the
    /// rest of the batch has landed, with nothing left to wake its
    /// dependents afterwards.
    fn on_invalidate(&mut self, batch: TaskBatch) -> CoreStep {
        let mut commands = Vec::new();
        let mut visited = HashSet::new();
        let mut marked = Vec::new();

        let mut batch: Vec<TaskId> = batch.into_iter().collect();
        batch.sort();
        for task in batch {
            self.mark_dirty(task, &mut visited, &mut marked, &mut commands);
        }
        for task in marked {
            self.check_ready(task);
        }

        self.launch_ready(&mut commands);
        self.finish_step(commands)
    }

    /// Invalidate one task, recursing into dependencies that are themselves
    /// stale. Dependencies come before their dependents in `marked`.
    fn mark_dirty(
        &mut self,
        task: TaskId,
        visited: &mut HashSet<TaskId>,
        marked: &mut Vec<TaskId>,
        commands: &mut Vec<CoreCommand>,
    ) {
        if !visited.insert(task) {
            return;
        }

        if self.running.contains_key(&task) {
            self.cancel_running(task, commands);
        } else {
            self.ready.remove(&task);
        }

        self.dirty.insert(task);

        if !self.up_to_date.remove(&task) {
            // The task was already stale, so its dependency chain has not
            // produced trustworthy output since the last invalidation.
            let graph = Arc::clone(&self.graph);
            for &dep in graph.dependencies_of(task) {
                self.mark_dirty(dep, visited, marked, commands);
            }
        }

        marked.push(task);
    }

    /// Promote a dirty task if nothing is holding it back.
    ///
    /// Promotion marks every already-dirty dependent as pending: the
    /// promoted task is about to produce fresh output, so those dependents
    /// must wait for it even if their dependencies happen to look satisfied
    /// at this instant.
    fn check_ready(&mut self, task: TaskId) {
        assert!(
            self.dirty.contains(&task),
            "readiness check on a task that is not dirty"
        );

        if self.pending.contains(&task) {
            return;
        }
        let graph = Arc::clone(&self.graph);
        if !graph
            .dependencies_of(task)
            .iter()
            .all(|dep| self.up_to_date.contains(dep))
        {
            return;
        }

        self.dirty.remove(&task);
        self.ready.insert(task);

        for &dependent in graph.dependents_of(task) {
            if self.dirty.contains(&dependent) {
                self.pending.insert(dependent);
            }
        }
    }

    /// Revoke the live run of a task.
    fn cancel_running(&mut self, task: TaskId, commands: &mut Vec<CoreCommand>) {
        let Some(run_id) = self.running.remove(&task) else {
            panic!("cancel requested for a task with no live run");
        };
        self.settling.entry(task).or_default().push(run_id);
        commands.push(CoreCommand::Cancel { task, run_id });
    }

    fn on_run_exited(&mut self, task: TaskId, run_id: RunId, outcome: RunOutcome) -> CoreStep {
        if self.running.get(&task) == Some(&run_id) {
            self.running.remove(&task);
            return match outcome {
                RunOutcome::Completed => {
                    let mut commands = Vec::new();
                    self.commit_completion(task);
                    self.launch_ready(&mut commands);
                    self.finish_step(commands)
                }
                RunOutcome::Failed(message) => self.abort_on_failure(task, message),
            };
        }

        // Exit of a superseded run: settlement bookkeeping only. Whatever
        // the outcome, a revoked run proves nothing about the task.
        self.record_settlement(task, run_id);
        self.finish_step(Vec::new())
    }

    fn record_settlement(&mut self, task: TaskId, run_id: RunId) {
        let Some(runs) = self.settling.get_mut(&task) else {
            panic!("exit reported for untracked run {run_id} of task {task:?}");
        };
        let Some(pos) = runs.iter().position(|&r| r == run_id) else {
            panic!("exit reported for untracked run {run_id} of task {task:?}");
        };
        runs.remove(pos);
        if runs.is_empty() {
            self.settling.remove(&task);
        }
    }

    /// A live run finished cleanly: the task is now authoritative, and
    /// dependents that were only waiting on it may become ready.
    ///
    /// A pending dependent is released only when none of its dependencies
    /// are still ready or running; otherwise the release is left to the
    /// last such dependency to complete. Dependencies that are merely dirty
    /// do not hold the marker: their own promotion re-marks the dependent.
    fn commit_completion(&mut self, task: TaskId) {
        self.up_to_date.insert(task);

        let graph = Arc::clone(&self.graph);
        for &dependent in graph.dependents_of(task) {
            if !self.pending.contains(&dependent) {
                continue;
            }
            if self.has_dep_in_flight(dependent) {
                continue;
            }
            self.pending.remove(&dependent);
            self.check_ready(dependent);
        }
    }

    fn has_dep_in_flight(&self, task: TaskId) -> bool {
        self.graph
            .dependencies_of(task)
            .iter()
            .any(|dep| self.ready.contains(dep) || self.running.contains_key(dep))
    }

    /// A live run reported a hard failure: record it, revoke everything
    /// still running and stop.
    fn abort_on_failure(&mut self, task: TaskId, message: String) -> CoreStep {
        let task = self.graph.meta(task).name.clone();
        self.failure = Some(RunFailure { task, message });

        let mut commands = Vec::new();
        self.cancel_all_running(&mut commands);
        CoreStep {
            commands,
            keep_running: false,
        }
    }

    fn cancel_all_running(&mut self, commands: &mut Vec<CoreCommand>) {
        let mut live: Vec<TaskId> = self.running.keys().copied().collect();
        live.sort();
        for task in live {
            self.cancel_running(task, commands);
        }
    }

    fn on_stream_closed(&mut self) -> CoreStep {
        self.stream_closed = true;
        self.finish_step(Vec::new())
    }

    fn on_shutdown(&mut self) -> CoreStep {
        let mut commands = Vec::new();
        self.cancel_all_running(&mut commands);
        CoreStep {
            commands,
            keep_running: false,
        }
    }

    /// Start a run for everything promoted during this step.
    fn launch_ready(&mut self, commands: &mut Vec<CoreCommand>) {
        if self.ready.is_empty() {
            return;
        }
        let mut promoted: Vec<TaskId> = self.ready.drain().collect();
        promoted.sort();
        for task in promoted {
            let run_id = self.next_run_id;
            self.next_run_id += 1;
            self.running.insert(task, run_id);
            let await_settlement_of = self.settling.get(&task).cloned().unwrap_or_default();
            commands.push(CoreCommand::Launch {
                task,
                run_id,
                await_settlement_of,
            });
        }
    }

    /// The scheduler is done once no more batches can arrive and no task is
    /// dirty, ready or running. Settling runs do not hold the loop open;
    /// the shell drains them after the loop exits.
    fn finish_step(&self, commands: Vec<CoreCommand>) -> CoreStep {
        let keep_running = !(self.stream_closed
            && self.dirty.is_empty()
            && self.ready.is_empty()
            && self.running.is_empty());
        CoreStep {
            commands,
            keep_running,
        }
    }
}
