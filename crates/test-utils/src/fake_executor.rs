use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use taskdag::errors::Result;
use taskdag::exec::{ExecRequest, Executor};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A fake executor that:
/// - records which tasks were "run", in order
/// - completes every action immediately and successfully.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    executed: Arc<Mutex<Vec<String>>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Executor for FakeExecutor {
    fn execute(
        &self,
        request: ExecRequest,
        _cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>> {
        let executed = Arc::clone(&self.executed);
        Box::pin(async move {
            executed.lock().unwrap().push(request.task);
            Ok(())
        })
    }
}

/// An executor whose actions block until the test releases them.
///
/// Every task name has a gate; `execute` records the start, then waits on
/// the gate. With `respect_cancel` the action also returns once its run's
/// cancellation token fires, like a well-behaved process. Without it the
/// action ignores cancellation until released, which is how tests hold a
/// run in the "cancelled but not settled" state.
#[derive(Clone)]
pub struct ControllableExecutor {
    started: Arc<Mutex<Vec<String>>>,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    respect_cancel: bool,
}

impl ControllableExecutor {
    pub fn new(respect_cancel: bool) -> Self {
        Self {
            started: Arc::new(Mutex::new(Vec::new())),
            gates: Arc::new(Mutex::new(HashMap::new())),
            respect_cancel,
        }
    }

    fn gate(&self, task: &str) -> Arc<Notify> {
        Arc::clone(
            self.gates
                .lock()
                .unwrap()
                .entry(task.to_string())
                .or_default(),
        )
    }

    /// Let one blocked (or future) run of `task` complete.
    pub fn release(&self, task: &str) {
        self.gate(task).notify_one();
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn start_count(&self, task: &str) -> usize {
        self.started
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == task)
            .count()
    }

    /// Wait until `task` has been started `count` times.
    pub async fn wait_for_start(&self, task: &str, count: usize) {
        for _ in 0..100 {
            if self.start_count(task) >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task '{task}' did not reach {count} start(s) within 1s");
    }
}

impl Executor for ControllableExecutor {
    fn execute(
        &self,
        request: ExecRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>> {
        let gate = self.gate(&request.task);
        let started = Arc::clone(&self.started);
        let respect_cancel = self.respect_cancel;
        Box::pin(async move {
            started.lock().unwrap().push(request.task);
            if respect_cancel {
                tokio::select! {
                    _ = gate.notified() => {}
                    _ = cancel.cancelled() => {}
                }
            } else {
                gate.notified().await;
            }
            Ok(())
        })
    }
}
