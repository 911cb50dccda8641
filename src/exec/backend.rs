// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The scheduler shell talks to an [`Executor`] instead of spawning
//! processes itself. This makes it easy to swap in a fake executor in tests
//! while keeping the production implementation in [`command`].
//!
//! - [`ProcessExecutor`](super::ProcessExecutor) is the default
//!   implementation: it runs the command as an OS process.
//! - Tests can provide their own `Executor` that, for example, records
//!   which tasks were executed and completes instantly, or blocks until
//!   the test releases it.
//!
//! [`command`]: super::command

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::errors::Result;
use crate::graph::CommandSpec;

/// Everything an executor needs to carry out one command action.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Task name, used to prefix the command's output.
    pub task: String,
    pub command: CommandSpec,
    pub cwd: PathBuf,
    /// Extra environment variables layered over the inherited environment.
    pub env: BTreeMap<String, String>,
}

/// Trait abstracting how command actions are carried out.
///
/// The returned future settles only once the action is truly over: for a
/// process that means the child has been reaped, cancelled or not. An `Err`
/// is reserved for actions that could not be carried out at all (such as a
/// spawn failure); an action that ran and exited non-zero is `Ok`.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        request: ExecRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;
}
