// src/config/loader.rs

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::Taskfile;
use crate::config::validate::{definition_order, validate_dependencies};
use crate::errors::Result;
use crate::graph::{TaskConfig, TaskGraph, TaskId};

/// Load a taskfile from a given path and return the raw document.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependency references, cycles). Use [`load_taskfile`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Taskfile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading taskfile at {:?}", path))?;

    let doc: Taskfile = toml::from_str(&contents)
        .with_context(|| format!("parsing TOML taskfile at {:?}", path))?;

    Ok(doc)
}

/// Load a taskfile from path and build the task graph from it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` defaults).
/// - Checks for:
///   - unknown `depends_on` references,
///   - self-dependencies,
///   - cycles.
/// - Defines tasks dependencies-first, resolving relative `cwd`s against
///   the taskfile's directory.
///
/// The returned map resolves the names given on the command line to
/// their [`TaskId`]s.
pub fn load_taskfile(path: impl AsRef<Path>) -> Result<(TaskGraph, BTreeMap<String, TaskId>)> {
    let path = path.as_ref();
    let doc = load_from_path(path)?;
    let base_dir = taskfile_dir(path);
    build_graph(&doc, &base_dir)
}

/// Directory that relative `cwd`s and the default task `cwd` resolve against.
fn taskfile_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Build a [`TaskGraph`] from a parsed document.
pub fn build_graph(
    doc: &Taskfile,
    base_dir: &Path,
) -> Result<(TaskGraph, BTreeMap<String, TaskId>)> {
    validate_dependencies(doc)?;
    let order = definition_order(doc)?;

    let mut graph = TaskGraph::new(base_dir);
    let mut ids: BTreeMap<String, TaskId> = BTreeMap::new();

    for name in order {
        let entry = &doc.tasks[name];
        let mut config = TaskConfig::new(name);
        config.description = entry.description.clone();
        config.command = entry
            .command
            .as_ref()
            .map(|raw| raw.to_spec(name))
            .transpose()?;
        config.env = entry.env.clone();
        config.cwd = entry.cwd.as_ref().map(|cwd| {
            if cwd.is_absolute() {
                cwd.clone()
            } else {
                base_dir.join(cwd)
            }
        });
        config.inputs = entry.inputs.clone();
        config.outputs = entry.outputs.clone();
        config.persistent = entry.persistent;
        config.interruptible = entry.interruptible;
        // Topological order guarantees every dependency is already defined.
        config.depends_on = entry
            .depends_on
            .iter()
            .map(|dep| ids[dep.as_str()])
            .collect();

        let id = graph.define_task(config)?;
        ids.insert(name.to_string(), id);
    }

    Ok((graph, ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::errors::TaskdagError;
    use crate::graph::{CommandSpec, TaskAction};

    fn write_taskfile(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Taskfile.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn command_of(graph: &TaskGraph, id: TaskId) -> CommandSpec {
        match graph.action(id) {
            TaskAction::Command(spec) => spec.clone(),
            other => panic!("expected a command action, got {other:?}"),
        }
    }

    #[test]
    fn loads_all_three_command_forms() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.line]
            command = "npm run build"

            [tasks.argv]
            command = ["cargo", "check", "--workspace"]

            [tasks.table]
            command = { program = "python", args = ["-m", "http.server"] }
            "#,
        );

        let (graph, ids) = load_taskfile(&path).unwrap();

        assert_eq!(
            command_of(&graph, ids["line"]),
            CommandSpec::Shell("npm run build".to_string())
        );
        assert_eq!(
            command_of(&graph, ids["argv"]),
            CommandSpec::Argv {
                program: "cargo".to_string(),
                args: vec!["check".to_string(), "--workspace".to_string()],
            }
        );
        assert_eq!(
            command_of(&graph, ids["table"]),
            CommandSpec::Argv {
                program: "python".to_string(),
                args: vec!["-m".to_string(), "http.server".to_string()],
            }
        );
    }

    #[test]
    fn defaults_resolve_against_taskfile_directory() {
        let (dir, path) = write_taskfile(
            r#"
            [tasks.build]
            command = "make"

            [tasks.web]
            command = "npm run build"
            cwd = "web"
            "#,
        );

        let (graph, ids) = load_taskfile(&path).unwrap();

        let build = graph.meta(ids["build"]);
        assert_eq!(build.cwd, dir.path());
        assert_eq!(build.inputs, vec!["**/*".to_string()]);
        assert_eq!(build.outputs, vec!["**/*".to_string()]);
        assert!(build.env.is_empty());
        assert!(!build.persistent);
        assert!(!build.interruptible);
        assert!(build.description.is_none());

        let web = graph.meta(ids["web"]);
        assert_eq!(web.cwd, dir.path().join("web"));
    }

    #[test]
    fn dependencies_resolve_regardless_of_definition_order() {
        // `app` is defined before the tasks it depends on.
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.app]
            command = "npm run build"
            depends_on = ["codegen", "vendor"]

            [tasks.codegen]
            command = "npm run codegen"

            [tasks.vendor]
            command = "npm run vendor"
            "#,
        );

        let (graph, ids) = load_taskfile(&path).unwrap();

        let deps = graph.dependencies_of(ids["app"]);
        assert!(deps.contains(&ids["codegen"]));
        assert!(deps.contains(&ids["vendor"]));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.app]
            command = "npm run build"
            depends_on = ["nope"]
            "#,
        );

        let err = load_taskfile(&path).unwrap_err();
        assert!(
            err.to_string().contains("unknown dependency 'nope'"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn self_dependency_is_rejected() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.app]
            command = "npm run build"
            depends_on = ["app"]
            "#,
        );

        let err = load_taskfile(&path).unwrap_err();
        assert!(
            err.to_string().contains("cannot depend on itself"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.a]
            command = "true"
            depends_on = ["b"]

            [tasks.b]
            command = "true"
            depends_on = ["a"]
            "#,
        );

        let err = load_taskfile(&path).unwrap_err();
        assert!(matches!(err, TaskdagError::DependencyCycle(_)));
    }

    #[test]
    fn empty_command_list_is_rejected() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.app]
            command = []
            "#,
        );

        let err = load_taskfile(&path).unwrap_err();
        assert!(
            err.to_string().contains("empty command list"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn persistent_dependency_rule_is_enforced() {
        let (_dir, path) = write_taskfile(
            r#"
            [tasks.server]
            command = "npm run dev"
            persistent = true

            [tasks.smoke]
            command = "curl localhost:3000"
            depends_on = ["server"]
            "#,
        );

        let err = load_taskfile(&path).unwrap_err();
        assert!(
            err.to_string()
                .contains("so it must also be marked as persistent"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn empty_file_yields_empty_graph() {
        let (_dir, path) = write_taskfile("");

        let (graph, ids) = load_taskfile(&path).unwrap();
        assert_eq!(graph.len(), 0);
        assert!(ids.is_empty());
    }

    #[test]
    fn missing_file_error_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_taskfile(dir.path().join("Missing.toml")).unwrap_err();
        assert!(
            err.to_string().contains("Missing.toml"),
            "error does not name the file: {err}"
        );
    }

    #[test]
    fn invalid_toml_error_names_the_path() {
        let (_dir, path) = write_taskfile("[tasks.app\ncommand = ");
        let err = load_taskfile(&path).unwrap_err();
        // `{:#}` renders the full context chain.
        let chain = format!("{err:#}");
        assert!(
            chain.contains("Taskfile.toml"),
            "error does not name the file: {chain}"
        );
        assert!(
            chain.contains("TOML parse error"),
            "error does not carry the parse failure: {chain}"
        );
    }
}
