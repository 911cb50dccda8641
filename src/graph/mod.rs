// src/graph/mod.rs

//! Task graph representation.
//!
//! - [`task`] holds task metadata, actions and the definition surface.
//! - [`arena`] stores defined tasks in an append-only arena and keeps
//!   adjacency in both directions for scheduling and watch propagation.

pub mod arena;
pub mod task;

pub use arena::{TaskGraph, TaskId};
pub use task::{CommandSpec, RoutineFn, RunContext, TaskAction, TaskConfig, TaskMeta};
