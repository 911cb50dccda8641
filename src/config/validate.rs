// src/config/validate.rs

//! Semantic validation of a parsed taskfile.
//!
//! Deserialization only guarantees the document is well-formed TOML.
//! Cross-task checks live here so the loader can surface one clear
//! error instead of panicking mid-build.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::Taskfile;
use crate::errors::{Result, TaskdagError};

/// Check that every `depends_on` entry names a defined task and that no
/// task depends on itself.
pub fn validate_dependencies(doc: &Taskfile) -> Result<()> {
    for (name, task) in doc.tasks.iter() {
        for dep in task.depends_on.iter() {
            if dep == name {
                return Err(TaskdagError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `depends_on`",
                    name
                )));
            }
            if !doc.tasks.contains_key(dep) {
                return Err(TaskdagError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `depends_on`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Order task names so every dependency comes before its dependents,
/// rejecting cycles.
///
/// Callers must run [`validate_dependencies`] first; an unknown name
/// would otherwise show up here as a phantom graph node.
pub fn definition_order(doc: &Taskfile) -> Result<Vec<&str>> {
    // Edge direction: dep -> task
    // For:
    //   [tasks.b]
    //   depends_on = ["a"]
    // we add edge a -> b, so a topological sort yields dependencies
    // first.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in doc.tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in doc.tasks.iter() {
        for dep in task.depends_on.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TaskdagError::DependencyCycle(format!(
                "cycle detected in task graph involving task '{}'",
                node
            )))
        }
    }
}
