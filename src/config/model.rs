// src/config/model.rs

//! Serde model for `Taskfile.toml`.
//!
//! A taskfile is a table of task definitions:
//!
//! ```toml
//! [tasks.codegen]
//! command = "npm run codegen"
//!
//! [tasks.build]
//! description = "Compile the web app"
//! command = ["npm", "run", "build"]
//! cwd = "web"
//! inputs = ["src/**/*.ts"]
//! depends_on = ["codegen"]
//!
//! [tasks.dev-server]
//! command = { program = "npm", args = ["run", "dev"] }
//! persistent = true
//! depends_on = ["build"]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{Result, TaskdagError};
use crate::graph::CommandSpec;

#[derive(Debug, Clone, Deserialize)]
pub struct Taskfile {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskEntry>,
}

/// One `[tasks.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskEntry {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub command: Option<RawCommand>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Relative paths are resolved against the taskfile's directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub inputs: Option<Vec<String>>,
    #[serde(default)]
    pub outputs: Option<Vec<String>>,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub interruptible: bool,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// The three accepted `command` forms.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCommand {
    /// `command = "npm run build"`: one line for the platform shell.
    Line(String),
    /// `command = ["npm", "run", "build"]`: program plus args, no shell.
    Argv(Vec<String>),
    /// `command = { program = "npm", args = ["run", "build"] }`.
    Program {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl RawCommand {
    /// Normalise into the executor's command form.
    pub fn to_spec(&self, task: &str) -> Result<CommandSpec> {
        match self {
            RawCommand::Line(line) => Ok(CommandSpec::Shell(line.clone())),
            RawCommand::Argv(argv) => {
                let Some((program, args)) = argv.split_first() else {
                    return Err(TaskdagError::ConfigError(format!(
                        "task '{task}' has an empty command list"
                    )));
                };
                Ok(CommandSpec::Argv {
                    program: program.clone(),
                    args: args.to_vec(),
                })
            }
            RawCommand::Program { program, args } => Ok(CommandSpec::Argv {
                program: program.clone(),
                args: args.clone(),
            }),
        }
    }
}
