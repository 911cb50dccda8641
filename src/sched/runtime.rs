// src/sched/runtime.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, TaskdagError};
use crate::exec::{ExecRequest, Executor};
use crate::graph::{RunContext, TaskAction, TaskGraph, TaskId};
use crate::sched::core::{CoreCommand, SchedCore};
use crate::sched::{RunId, RunOutcome, SchedEvent, TaskBatch};

/// Shell-side bookkeeping for one spawned run.
struct RunHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Drives the scheduler core in response to invalidation batches and run
/// exits, and delegates actual task execution to an [`Executor`].
///
/// This is a pure IO shell around [`SchedCore`], which contains all the
/// scheduling semantics. This struct handles async IO: reading batches and
/// run exits from channels, spawning and cancelling run futures, and
/// draining revoked runs before returning.
pub struct SchedRuntime {
    core: SchedCore,
    graph: Arc<TaskGraph>,
    batch_rx: mpsc::Receiver<TaskBatch>,
    shutdown: CancellationToken,
    executor: Arc<dyn Executor>,
    run_tx: mpsc::Sender<SchedEvent>,
    run_rx: mpsc::Receiver<SchedEvent>,
    handles: HashMap<RunId, RunHandle>,
    stream_closed: bool,
}

impl fmt::Debug for SchedRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedRuntime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl SchedRuntime {
    pub fn new(
        core: SchedCore,
        batch_rx: mpsc::Receiver<TaskBatch>,
        shutdown: CancellationToken,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let graph = Arc::clone(core.graph());
        let (run_tx, run_rx) = mpsc::channel(64);
        Self {
            core,
            graph,
            batch_rx,
            shutdown,
            executor,
            run_tx,
            run_rx,
            handles: HashMap::new(),
            stream_closed: false,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes invalidation batches, run exits and the shutdown signal.
    /// - Feeds them into the scheduler core.
    /// - Executes commands returned by the core (spawn runs, cancel runs).
    ///
    /// After the loop exits, every outstanding run future is awaited, so by
    /// the time this returns no task action is still in flight.
    pub async fn run(mut self) -> Result<()> {
        info!("taskdag scheduler started");

        loop {
            let event = self.next_event().await;
            debug!(?event, "scheduler received event");

            if let SchedEvent::RunExited { run_id, .. } = &event {
                // The run future has sent its exit; nothing left to cancel.
                self.handles.remove(run_id);
            }

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command);
            }

            if !step.keep_running {
                info!("core requested exit; stopping scheduler");
                break;
            }
        }

        self.drain().await;

        if let Some(failure) = self.core.failure() {
            return Err(TaskdagError::TaskFailed {
                task: failure.task.clone(),
                message: failure.message.clone(),
            });
        }
        info!("scheduler exiting");
        Ok(())
    }

    async fn next_event(&mut self) -> SchedEvent {
        tokio::select! {
            _ = self.shutdown.cancelled() => SchedEvent::ShutdownRequested,
            Some(event) = self.run_rx.recv() => event,
            batch = self.batch_rx.recv(), if !self.stream_closed => {
                match batch {
                    Some(batch) => SchedEvent::Invalidate(batch),
                    None => {
                        self.stream_closed = true;
                        SchedEvent::BatchStreamClosed
                    }
                }
            }
        }
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Launch {
                task,
                run_id,
                await_settlement_of,
            } => {
                self.launch(task, run_id, await_settlement_of);
            }
            CoreCommand::Cancel { task, run_id } => {
                debug!(task = %self.graph.meta(task).name, run_id, "revoking run");
                if let Some(handle) = self.handles.get(&run_id) {
                    handle.cancel.cancel();
                }
            }
        }
    }

    /// Spawn the future for one run.
    ///
    /// The future first awaits the join handles of any superseded runs it
    /// must outlive, then performs the task's action unless the run was
    /// already revoked while it waited. It always reports its exit back,
    /// whether live or revoked.
    fn launch(&mut self, task: TaskId, run_id: RunId, await_settlement_of: Vec<RunId>) {
        debug!(task = %self.graph.meta(task).name, run_id, "launching run");

        let mut superseded = Vec::new();
        for prior in await_settlement_of {
            // A missing handle means an even newer run already owns that
            // settlement; awaiting the newer run covers it.
            if let Some(handle) = self.handles.remove(&prior) {
                superseded.push(handle.join);
            }
        }

        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();
        let graph = Arc::clone(&self.graph);
        let executor = Arc::clone(&self.executor);
        let run_tx = self.run_tx.clone();

        let join = tokio::spawn(async move {
            for handle in superseded {
                let _ = handle.await;
            }

            let outcome = if run_cancel.is_cancelled() {
                RunOutcome::Completed
            } else {
                match run_action(&graph, task, executor.as_ref(), run_cancel.clone()).await {
                    Ok(()) => RunOutcome::Completed,
                    Err(err) => RunOutcome::Failed(format!("{:#}", anyhow::Error::from(err))),
                }
            };

            let _ = run_tx
                .send(SchedEvent::RunExited {
                    task,
                    run_id,
                    outcome,
                })
                .await;
        });

        self.handles.insert(run_id, RunHandle { cancel, join });
    }

    /// Await every outstanding run future, revoked ones included.
    async fn drain(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        // No more events are consumed; exit reports must fail fast rather
        // than wait for channel capacity.
        self.run_rx.close();
        debug!(
            outstanding = self.handles.len(),
            "waiting for outstanding runs to settle"
        );
        for (_, handle) in self.handles.drain() {
            let _ = handle.join.await;
        }
    }
}

/// Perform a task's action, honouring cancellation.
async fn run_action(
    graph: &TaskGraph,
    task: TaskId,
    executor: &dyn Executor,
    cancel: CancellationToken,
) -> Result<()> {
    let meta = graph.meta(task);
    match graph.action(task) {
        TaskAction::Command(spec) => {
            let request = ExecRequest {
                task: meta.name.clone(),
                command: spec.clone(),
                cwd: meta.cwd.clone(),
                env: meta.env.clone(),
            };
            executor.execute(request, cancel).await
        }
        TaskAction::Routine(run) => {
            run(RunContext { cancel }).await?;
            Ok(())
        }
        TaskAction::Noop => Ok(()),
    }
}
