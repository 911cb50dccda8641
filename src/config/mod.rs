// src/config/mod.rs

//! Taskfile loading and validation for taskdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a taskfile from disk and build the task graph (`loader.rs`).
//! - Validate cross-task references and ordering (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_from_path, load_taskfile};
pub use model::{RawCommand, TaskEntry, Taskfile};
