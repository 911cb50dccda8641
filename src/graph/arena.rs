// src/graph/arena.rs

use std::path::PathBuf;

use crate::errors::{Result, TaskdagError};
use crate::graph::task::{TaskAction, TaskConfig, TaskMeta};

/// Identity of a task within its [`TaskGraph`].
///
/// All scheduler and watch state is keyed by `TaskId`, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct TaskNode {
    meta: TaskMeta,
    action: TaskAction,
    /// Direct dependencies: tasks that must be up to date before this one
    /// can run.
    deps: Vec<TaskId>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskId>,
}

/// Append-only arena of task definitions plus adjacency in both directions.
///
/// A task's dependencies must already be defined when the task is added, so
/// cycles are unrepresentable by construction and no separate acyclicity
/// check is needed here.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    /// Base directory that tasks without an explicit `cwd` inherit.
    default_cwd: PathBuf,
}

impl TaskGraph {
    pub fn new(default_cwd: impl Into<PathBuf>) -> Self {
        Self {
            nodes: Vec::new(),
            default_cwd: default_cwd.into(),
        }
    }

    /// Add a task to the graph, wiring up dependents on its dependencies.
    ///
    /// Fails if the task depends on a persistent task without being marked
    /// persistent itself: the dependent would wait forever for a dependency
    /// that never completes.
    pub fn define_task(&mut self, config: TaskConfig) -> Result<TaskId> {
        let TaskConfig {
            name,
            description,
            run,
            command,
            env,
            cwd,
            inputs,
            outputs,
            persistent,
            interruptible,
            depends_on,
        } = config;

        let mut deps: Vec<TaskId> = Vec::new();
        for dep in depends_on {
            let dep_meta = &self.nodes[dep.index()].meta;
            if dep_meta.persistent && !persistent {
                return Err(TaskdagError::ConfigError(format!(
                    "Task \"{name}\" depends on persistent task \"{dep_name}\", \
                     so it must also be marked as persistent.",
                    dep_name = dep_meta.name,
                )));
            }
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }

        let action = match (run, command) {
            (Some(run), _) => TaskAction::Routine(run),
            (None, Some(command)) => TaskAction::Command(command),
            (None, None) => TaskAction::Noop,
        };

        let meta = TaskMeta {
            name,
            description,
            cwd: cwd.unwrap_or_else(|| self.default_cwd.clone()),
            env,
            inputs: inputs.unwrap_or_else(default_globs),
            outputs: outputs.unwrap_or_else(default_globs),
            persistent,
            interruptible,
        };

        let id = TaskId(self.nodes.len());
        for &dep in &deps {
            self.nodes[dep.index()].dependents.push(id);
        }
        self.nodes.push(TaskNode {
            meta,
            action,
            deps,
            dependents: Vec::new(),
        });
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All task identities, in definition order.
    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.nodes.len()).map(TaskId)
    }

    pub fn meta(&self, task: TaskId) -> &TaskMeta {
        &self.nodes[task.index()].meta
    }

    pub fn action(&self, task: TaskId) -> &TaskAction {
        &self.nodes[task.index()].action
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, task: TaskId) -> &[TaskId] {
        &self.nodes[task.index()].deps
    }

    /// Immediate dependents of a task (tasks that list this one in their
    /// `depends_on`).
    pub fn dependents_of(&self, task: TaskId) -> &[TaskId] {
        &self.nodes[task.index()].dependents
    }

    /// Whether a watch invalidation is allowed to cancel and re-run this
    /// task. Persistent tasks opt in via `interruptible`.
    pub fn is_restartable(&self, task: TaskId) -> bool {
        let meta = self.meta(task);
        !meta.persistent || meta.interruptible
    }
}

fn default_globs() -> Vec<String> {
    vec![String::from("**/*")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::CommandSpec;

    fn config(name: &str) -> TaskConfig {
        let mut cfg = TaskConfig::new(name);
        cfg.command = Some(CommandSpec::Shell(format!("echo {name}")));
        cfg
    }

    #[test]
    fn dependents_are_wired_both_ways() {
        let mut graph = TaskGraph::new(".");
        let c = graph.define_task(config("c")).unwrap();
        let b = {
            let mut cfg = config("b");
            cfg.depends_on = vec![c];
            graph.define_task(cfg).unwrap()
        };
        let a = {
            let mut cfg = config("a");
            cfg.depends_on = vec![b];
            graph.define_task(cfg).unwrap()
        };

        assert_eq!(graph.dependencies_of(a), &[b]);
        assert_eq!(graph.dependencies_of(b), &[c]);
        assert_eq!(graph.dependents_of(c), &[b]);
        assert_eq!(graph.dependents_of(b), &[a]);
        assert!(graph.dependents_of(a).is_empty());
    }

    #[test]
    fn duplicate_dependencies_are_collapsed() {
        let mut graph = TaskGraph::new(".");
        let dep = graph.define_task(config("dep")).unwrap();
        let mut cfg = config("top");
        cfg.depends_on = vec![dep, dep];
        let top = graph.define_task(cfg).unwrap();

        assert_eq!(graph.dependencies_of(top), &[dep]);
        assert_eq!(graph.dependents_of(dep), &[top]);
    }

    #[test]
    fn non_persistent_task_cannot_depend_on_persistent_task() {
        let mut graph = TaskGraph::new(".");
        let server = {
            let mut cfg = config("server");
            cfg.persistent = true;
            graph.define_task(cfg).unwrap()
        };
        let mut cfg = config("smoke");
        cfg.depends_on = vec![server];
        let err = graph.define_task(cfg).unwrap_err();

        assert!(err.to_string().contains(
            "Task \"smoke\" depends on persistent task \"server\", \
             so it must also be marked as persistent."
        ));
    }

    #[test]
    fn persistent_task_may_depend_on_persistent_task() {
        let mut graph = TaskGraph::new(".");
        let server = {
            let mut cfg = config("server");
            cfg.persistent = true;
            graph.define_task(cfg).unwrap()
        };
        let mut cfg = config("proxy");
        cfg.persistent = true;
        cfg.depends_on = vec![server];
        assert!(graph.define_task(cfg).is_ok());
    }

    #[test]
    fn defaults_fill_cwd_and_globs() {
        let mut graph = TaskGraph::new("/srv/project");
        let id = graph.define_task(config("build")).unwrap();
        let meta = graph.meta(id);

        assert_eq!(meta.cwd, PathBuf::from("/srv/project"));
        assert_eq!(meta.inputs, vec![String::from("**/*")]);
        assert_eq!(meta.outputs, vec![String::from("**/*")]);
        assert!(!meta.persistent);
        assert!(!meta.interruptible);
    }

    #[test]
    fn restartable_covers_persistent_interruptible_combinations() {
        let mut graph = TaskGraph::new(".");
        let plain = graph.define_task(config("plain")).unwrap();
        let watcher = {
            let mut cfg = config("watcher");
            cfg.persistent = true;
            cfg.interruptible = true;
            graph.define_task(cfg).unwrap()
        };
        let server = {
            let mut cfg = config("server");
            cfg.persistent = true;
            graph.define_task(cfg).unwrap()
        };

        assert!(graph.is_restartable(plain));
        assert!(graph.is_restartable(watcher));
        assert!(!graph.is_restartable(server));
    }
}
