// src/watch/mod.rs

//! Watch mode plumbing.
//!
//! - [`patterns`] compiles each watched task's input globs.
//! - [`propagate`] builds the watch set for the requested targets and turns
//!   changed paths into invalidation batches.
//! - [`watcher`] bridges filesystem notifications into batches on the
//!   scheduler's channel.

pub mod patterns;
pub mod propagate;
pub mod watcher;

pub use patterns::WatchProfile;
pub use propagate::InvalidationPropagator;
pub use watcher::{WatcherHandle, spawn_watcher};
