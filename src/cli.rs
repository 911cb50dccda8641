// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! NOTE: this expects `clap` to be built with the `derive` feature, e.g.:
//! `clap = { version = "4.5.53", features = ["derive"] }` in `Cargo.toml`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `taskdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "taskdag",
    version,
    about = "Run tasks from a dependency graph, re-running them as their files change.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the taskfile (TOML).
    ///
    /// Default: `Taskfile.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "Taskfile.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TASKDAG_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run the given tasks after their dependencies.
    Run {
        /// Names of the tasks to run.
        #[arg(required = true, value_name = "TASK")]
        tasks: Vec<String>,

        /// Keep watching task inputs and re-run affected tasks on changes.
        #[arg(short, long)]
        watch: bool,
    },

    /// List the tasks defined in the taskfile.
    #[command(alias = "ls")]
    List,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
