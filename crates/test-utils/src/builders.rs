#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use taskdag::graph::{CommandSpec, RoutineFn, TaskConfig, TaskGraph, TaskId};

/// Builder for a [`TaskGraph`] to simplify test setup.
///
/// Dependencies are given by name and must be defined before the tasks
/// that use them:
///
/// ```ignore
/// let (graph, ids) = GraphBuilder::new()
///     .task("c", TaskSpec::new("echo c"))
///     .task("b", TaskSpec::new("echo b").depends_on("c"))
///     .build();
/// ```
pub struct GraphBuilder {
    graph: TaskGraph,
    ids: BTreeMap<String, TaskId>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: TaskGraph::new("."),
            ids: BTreeMap::new(),
        }
    }

    pub fn task(mut self, name: &str, spec: TaskSpec) -> Self {
        let mut config = TaskConfig::new(name);
        config.run = spec.routine;
        config.command = spec.command;
        config.cwd = spec.cwd;
        config.inputs = spec.inputs;
        config.persistent = spec.persistent;
        config.interruptible = spec.interruptible;
        config.depends_on = spec
            .depends_on
            .iter()
            .map(|dep| {
                *self
                    .ids
                    .get(dep)
                    .unwrap_or_else(|| panic!("dependency '{dep}' not defined before '{name}'"))
            })
            .collect();

        let id = self
            .graph
            .define_task(config)
            .expect("failed to define task from builder");
        self.ids.insert(name.to_string(), id);
        self
    }

    pub fn build(self) -> (Arc<TaskGraph>, BTreeMap<String, TaskId>) {
        (Arc::new(self.graph), self.ids)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one task definition.
pub struct TaskSpec {
    command: Option<CommandSpec>,
    routine: Option<RoutineFn>,
    cwd: Option<PathBuf>,
    inputs: Option<Vec<String>>,
    persistent: bool,
    interruptible: bool,
    depends_on: Vec<String>,
}

impl TaskSpec {
    /// A task running a single shell command line.
    pub fn new(cmd: &str) -> Self {
        Self {
            command: Some(CommandSpec::Shell(cmd.to_string())),
            routine: None,
            cwd: None,
            inputs: None,
            persistent: false,
            interruptible: false,
            depends_on: vec![],
        }
    }

    /// A task with no action; it completes immediately when launched.
    pub fn noop() -> Self {
        let mut spec = Self::new("");
        spec.command = None;
        spec
    }

    /// A task backed by an in-process routine instead of a command.
    pub fn routine(f: RoutineFn) -> Self {
        let mut spec = Self::noop();
        spec.routine = Some(f);
        spec
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.depends_on.push(dep.to_string());
        self
    }

    pub fn persistent(mut self, val: bool) -> Self {
        self.persistent = val;
        self
    }

    pub fn interruptible(mut self, val: bool) -> Self {
        self.interruptible = val;
        self
    }

    pub fn input(mut self, pattern: &str) -> Self {
        let inputs = self.inputs.get_or_insert(vec![]);
        inputs.push(pattern.to_string());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}
