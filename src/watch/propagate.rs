// src/watch/propagate.rs

//! DAG-aware invalidation propagation.
//!
//! A changed file only seeds the tasks whose inputs it matches directly;
//! which other tasks re-run is decided by reachability towards the
//! requested targets. Stale intermediate tasks ride along in a buffer and
//! are committed the moment a path reaches a target, so work is never
//! invalidated for branches nobody asked for.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::graph::{TaskGraph, TaskId};
use crate::sched::TaskBatch;
use crate::watch::patterns::WatchProfile;

pub struct InvalidationPropagator {
    graph: Arc<TaskGraph>,
    /// The tasks the user asked to run.
    targets: HashSet<TaskId>,
    profiles: Vec<WatchProfile>,
    watch_dirs: BTreeSet<PathBuf>,
}

impl std::fmt::Debug for InvalidationPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationPropagator")
            .field("targets", &self.targets)
            .field("watch_dirs", &self.watch_dirs)
            .finish_non_exhaustive()
    }
}

impl InvalidationPropagator {
    pub fn new(graph: Arc<TaskGraph>, targets: HashSet<TaskId>) -> Result<Self> {
        let mut propagator = Self {
            graph,
            targets,
            profiles: Vec::new(),
            watch_dirs: BTreeSet::new(),
        };

        let mut roots: Vec<TaskId> = propagator.targets.iter().copied().collect();
        roots.sort();
        let mut visited = HashSet::new();
        for root in roots {
            propagator.add_watched(root, &mut visited)?;
        }
        Ok(propagator)
    }

    /// Register a task and everything below it, dependencies first.
    ///
    /// A persistent, non-interruptible task is traversed but never watched:
    /// no file change may restart it, so observing its files would be
    /// pointless. Its dependencies are still fair game.
    fn add_watched(&mut self, task: TaskId, visited: &mut HashSet<TaskId>) -> Result<()> {
        if !visited.insert(task) {
            return Ok(());
        }
        let graph = Arc::clone(&self.graph);
        for &dep in graph.dependencies_of(task) {
            self.add_watched(dep, visited)?;
        }
        if graph.is_restartable(task) {
            let profile = WatchProfile::for_task(&graph, task)?;
            self.watch_dirs.insert(profile.cwd().to_path_buf());
            self.profiles.push(profile);
        }
        Ok(())
    }

    /// Directories the filesystem watcher must observe.
    pub fn watch_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watch_dirs.iter().map(PathBuf::as_path)
    }

    /// Watched tasks whose inputs match the changed path.
    pub fn seed_tasks(&self, path: &Path) -> Vec<TaskId> {
        self.profiles
            .iter()
            .filter(|profile| profile.matches(path))
            .map(WatchProfile::task)
            .collect()
    }

    /// Walk upward from the seeds and collect the tasks to invalidate.
    ///
    /// A buffer of restartable tasks rides along each path; reaching a
    /// requested target commits the buffer and continues past the target
    /// with an empty one. A persistent, non-interruptible task on the path
    /// is passed through without entering the buffer, so it can never be
    /// invalidated itself.
    pub fn propagate(&self, seeds: &HashSet<TaskId>) -> TaskBatch {
        let mut batch = TaskBatch::new();
        let mut sorted: Vec<TaskId> = seeds.iter().copied().collect();
        sorted.sort();
        for seed in sorted {
            self.visit(seed, vec![seed], &mut batch);
        }
        batch
    }

    fn visit(&self, task: TaskId, mut buffer: Vec<TaskId>, batch: &mut TaskBatch) {
        if self.targets.contains(&task) {
            batch.extend(buffer.drain(..));
        }
        for &dependent in self.graph.dependents_of(task) {
            let mut next = buffer.clone();
            if self.graph.is_restartable(dependent) {
                next.push(dependent);
            }
            self.visit(dependent, next, batch);
        }
    }

    /// Batch for one filesystem event's paths; empty when nothing watched
    /// reaches a target.
    pub fn batch_for_paths<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> TaskBatch {
        let mut seeds = HashSet::new();
        for path in paths {
            seeds.extend(self.seed_tasks(path));
        }
        if seeds.is_empty() {
            return TaskBatch::new();
        }
        self.propagate(&seeds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CommandSpec, TaskConfig};

    fn task(graph: &mut TaskGraph, name: &str, cwd: &str, deps: &[TaskId]) -> TaskId {
        let mut cfg = TaskConfig::new(name);
        cfg.command = Some(CommandSpec::Shell(format!("echo {name}")));
        cfg.cwd = Some(PathBuf::from(cwd));
        cfg.depends_on = deps.to_vec();
        graph.define_task(cfg).unwrap()
    }

    fn persistent_task(
        graph: &mut TaskGraph,
        name: &str,
        cwd: &str,
        deps: &[TaskId],
        interruptible: bool,
    ) -> TaskId {
        let mut cfg = TaskConfig::new(name);
        cfg.command = Some(CommandSpec::Shell(format!("echo {name}")));
        cfg.cwd = Some(PathBuf::from(cwd));
        cfg.depends_on = deps.to_vec();
        cfg.persistent = true;
        cfg.interruptible = interruptible;
        graph.define_task(cfg).unwrap()
    }

    fn targets(tasks: &[TaskId]) -> HashSet<TaskId> {
        tasks.iter().copied().collect()
    }

    fn seeds(tasks: &[TaskId]) -> HashSet<TaskId> {
        tasks.iter().copied().collect()
    }

    fn sorted(batch: TaskBatch) -> Vec<TaskId> {
        let mut v: Vec<TaskId> = batch.into_iter().collect();
        v.sort();
        v
    }

    #[test]
    fn chain_invalidates_everything_between_seed_and_target() {
        let mut graph = TaskGraph::new("/w");
        let c = task(&mut graph, "c", "/w/c", &[]);
        let b = task(&mut graph, "b", "/w/b", &[c]);
        let a = task(&mut graph, "a", "/w/a", &[b]);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[a])).unwrap();

        assert_eq!(sorted(prop.propagate(&seeds(&[c]))), vec![c, b, a]);
        assert_eq!(sorted(prop.propagate(&seeds(&[b]))), vec![b, a]);
        assert_eq!(sorted(prop.propagate(&seeds(&[a]))), vec![a]);
    }

    #[test]
    fn seeds_with_no_path_to_a_target_produce_nothing() {
        let mut graph = TaskGraph::new("/w");
        let a = task(&mut graph, "a", "/w/a", &[]);
        let stray = task(&mut graph, "stray", "/w/stray", &[]);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[a])).unwrap();

        assert!(prop.propagate(&seeds(&[stray])).is_empty());
    }

    #[test]
    fn diamond_commits_both_paths() {
        let mut graph = TaskGraph::new("/w");
        let s = task(&mut graph, "s", "/w/s", &[]);
        let m1 = task(&mut graph, "m1", "/w/m1", &[s]);
        let m2 = task(&mut graph, "m2", "/w/m2", &[s]);
        let t = task(&mut graph, "t", "/w/t", &[m1, m2]);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[t])).unwrap();

        assert_eq!(sorted(prop.propagate(&seeds(&[s]))), vec![s, m1, m2, t]);
    }

    #[test]
    fn non_interruptible_persistent_task_is_never_in_a_batch() {
        let mut graph = TaskGraph::new("/w");
        let c = task(&mut graph, "c", "/w/c", &[]);
        let server = persistent_task(&mut graph, "server", "/w/server", &[c], false);
        let smoke = persistent_task(&mut graph, "smoke", "/w/smoke", &[server], true);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[smoke])).unwrap();

        // The only path from c to the target runs through the server, which
        // is passed through without ever entering the batch.
        assert_eq!(sorted(prop.propagate(&seeds(&[c]))), vec![c, smoke]);
    }

    #[test]
    fn change_below_a_persistent_target_rebuilds_only_the_chain_below() {
        let mut graph = TaskGraph::new("/w");
        let build = task(&mut graph, "build", "/w/build", &[]);
        let server = persistent_task(&mut graph, "server", "/w/server", &[build], false);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[server])).unwrap();

        assert_eq!(sorted(prop.propagate(&seeds(&[build]))), vec![build]);
    }

    #[test]
    fn non_interruptible_persistent_task_is_not_watched() {
        let mut graph = TaskGraph::new("/w");
        let build = task(&mut graph, "build", "/w/build", &[]);
        let server = persistent_task(&mut graph, "server", "/w/server", &[build], false);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[server])).unwrap();

        let dirs: Vec<&Path> = prop.watch_dirs().collect();
        assert_eq!(dirs, vec![Path::new("/w/build")]);
        assert!(prop.seed_tasks(Path::new("/w/server/config.toml")).is_empty());
        assert_eq!(
            prop.seed_tasks(Path::new("/w/build/main.c")),
            vec![build]
        );
    }

    #[test]
    fn batch_for_paths_merges_seeds_across_paths() {
        let mut graph = TaskGraph::new("/w");
        let b = task(&mut graph, "b", "/w/b", &[]);
        let c = task(&mut graph, "c", "/w/c", &[]);
        let a = task(&mut graph, "a", "/w/a", &[b, c]);
        let prop = InvalidationPropagator::new(Arc::new(graph), targets(&[a])).unwrap();

        let batch = prop.batch_for_paths([
            Path::new("/w/b/src.rs"),
            Path::new("/w/c/src.rs"),
            Path::new("/w/unrelated/file"),
        ]);
        assert_eq!(sorted(batch), vec![b, c, a]);
    }
}
