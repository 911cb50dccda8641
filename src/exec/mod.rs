// src/exec/mod.rs

//! Task execution layer.
//!
//! This module is responsible for actually carrying out command actions,
//! using `tokio::process::Command`, and for relaying their prefixed output.
//!
//! - [`backend`] provides the [`Executor`] trait that the scheduler shell
//!   talks to, so tests can replace process spawning with a fake.
//! - [`command`] implements the production [`ProcessExecutor`]: spawn,
//!   stream output line by line under a `name | ` prefix, kill on
//!   cancellation, and reap the child before settling.

pub mod backend;
pub mod command;

pub use backend::{ExecRequest, Executor};
pub use command::ProcessExecutor;
