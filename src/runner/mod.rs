//! Task runner for build runs
//!
//! A build run is a list of named tasks. Each task may declare tasks it
//! `requires` (must run before it) and tasks it precedes (its
//! `dependencies`, which must run after it). The runner orders them with a
//! stable topological sort: when several tasks are ready, the one registered
//! first runs first, so tasks without constraints keep registration order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use crate::utils::reporter::Reporter;

/// What the runner does after a task returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Go on with the next task
    Continue,
    /// The task had nothing to do; go on with the next task
    Skip,
    /// Stop the run here, successfully
    Exit,
}

/// Task body
pub type TaskFn<C> = fn(&mut C, &Reporter) -> Result<TaskOutcome>;

/// A named step of a run
pub struct Task<C> {
    name: &'static str,
    description: Option<&'static str>,
    run: TaskFn<C>,
    requires: Vec<&'static str>,
    dependencies: Vec<&'static str>,
}

impl<C> Task<C> {
    pub fn new(name: &'static str, run: TaskFn<C>) -> Self {
        Self {
            name,
            description: None,
            run,
            requires: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Progress line printed when the task starts
    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    /// Tasks that must run before this one
    pub fn requires(mut self, names: &[&'static str]) -> Self {
        self.requires.extend_from_slice(names);
        self
    }

    /// Tasks that must run after this one
    pub fn precedes(mut self, names: &[&'static str]) -> Self {
        self.dependencies.extend_from_slice(names);
        self
    }
}

/// Result of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub success: bool,
    pub elapsed: Duration,
    /// Names of the tasks that ran, in order
    pub executed: Vec<&'static str>,
}

/// Ordered collection of tasks over a context `C`
pub struct Runner<C> {
    tasks: Vec<Task<C>>,
}

impl<C> Default for Runner<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Runner<C> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Register a task; names must be unique
    pub fn register(&mut self, task: Task<C>) -> Result<()> {
        if self.tasks.iter().any(|t| t.name == task.name) {
            bail!("Task '{}' is already registered", task.name);
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Task names in execution order
    pub fn ordered_names(&self) -> Result<Vec<&'static str>> {
        Ok(self.order()?.into_iter().map(|i| self.tasks[i].name).collect())
    }

    /// Compute the execution order as indices into `self.tasks`
    fn order(&self) -> Result<Vec<usize>> {
        let index: HashMap<&str, usize> = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name, i))
            .collect();

        let mut unknown = Vec::new();
        // edges[a] contains b when a must run before b
        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.tasks.len()];

        for (i, task) in self.tasks.iter().enumerate() {
            for name in &task.requires {
                match index.get(name) {
                    Some(&before) => {
                        edges[before].insert(i);
                    }
                    None => unknown.push(format!("{} (required by {})", name, task.name)),
                }
            }
            for name in &task.dependencies {
                match index.get(name) {
                    Some(&after) => {
                        edges[i].insert(after);
                    }
                    None => unknown.push(format!("{} (preceded by {})", name, task.name)),
                }
            }
        }

        if !unknown.is_empty() {
            bail!("Unknown task(s): {}", unknown.join(", "));
        }

        if let Some(cycle) = self.detect_cycle(&edges) {
            let names: Vec<&str> = cycle.iter().map(|&i| self.tasks[i].name).collect();
            bail!(
                "Circular task ordering detected: {} -> {}",
                names.join(" -> "),
                names[0]
            );
        }

        let mut in_degree = vec![0usize; self.tasks.len()];
        for targets in &edges {
            for &t in targets {
                in_degree[t] += 1;
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.tasks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut sorted = Vec::with_capacity(self.tasks.len());

        while let Some(current) = ready.pop_first() {
            sorted.push(current);
            for &next in &edges[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert(next);
                }
            }
        }

        Ok(sorted)
    }

    /// DFS cycle detection; returns the tasks forming the first cycle found
    fn detect_cycle(&self, edges: &[BTreeSet<usize>]) -> Option<Vec<usize>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for start in 0..self.tasks.len() {
            if !visited.contains(&start) {
                if let Some(cycle) =
                    dfs_cycle(start, edges, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    /// Run every task in order
    ///
    /// Errors end the run; the error is reported together with its causes.
    /// The final line says whether the build succeeded and how long it took.
    pub fn run(&self, ctx: &mut C, reporter: &Reporter) -> RunSummary {
        let start = Instant::now();
        let mut executed = Vec::new();

        let result = self.run_ordered(ctx, reporter, &mut executed);
        let elapsed = start.elapsed();

        let success = match result {
            Ok(()) => {
                reporter.success(format!(
                    "Build has ended successfully, took {:.3}s.",
                    elapsed.as_secs_f64()
                ));
                true
            }
            Err(err) => {
                reporter.report_error(&err);
                reporter.failure(format!(
                    "Build has ended with failure, took {:.3}s.",
                    elapsed.as_secs_f64()
                ));
                false
            }
        };
        reporter.flush();

        RunSummary {
            success,
            elapsed,
            executed,
        }
    }

    fn run_ordered(
        &self,
        ctx: &mut C,
        reporter: &Reporter,
        executed: &mut Vec<&'static str>,
    ) -> Result<()> {
        for i in self.order()? {
            let task = &self.tasks[i];
            if let Some(description) = task.description {
                reporter.info(description);
            }

            let started = Instant::now();
            tracing::debug!(task = task.name, "task started");
            executed.push(task.name);

            let outcome = (task.run)(ctx, reporter);
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(TaskOutcome::Continue) => {
                    tracing::debug!(task = task.name, elapsed_ms, "task finished");
                }
                Ok(TaskOutcome::Skip) => {
                    tracing::debug!(task = task.name, elapsed_ms, "task skipped");
                }
                Ok(TaskOutcome::Exit) => {
                    tracing::debug!(task = task.name, elapsed_ms, "task ended the run");
                    return Ok(());
                }
                Err(err) => {
                    tracing::debug!(task = task.name, elapsed_ms, error = %err, "task failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn dfs_cycle(
    node: usize,
    edges: &[BTreeSet<usize>],
    visited: &mut HashSet<usize>,
    rec_stack: &mut HashSet<usize>,
    path: &mut Vec<usize>,
) -> Option<Vec<usize>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    for &next in &edges[node] {
        if !visited.contains(&next) {
            if let Some(cycle) = dfs_cycle(next, edges, visited, rec_stack, path) {
                return Some(cycle);
            }
        } else if rec_stack.contains(&next) {
            let cycle_start = path.iter().position(|&n| n == next).unwrap_or(0);
            return Some(path[cycle_start..].to_vec());
        }
    }

    rec_stack.remove(&node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Trace {
        ran: Vec<&'static str>,
    }

    fn first(ctx: &mut Trace, _: &Reporter) -> Result<TaskOutcome> {
        ctx.ran.push("first");
        Ok(TaskOutcome::Continue)
    }

    fn second(ctx: &mut Trace, _: &Reporter) -> Result<TaskOutcome> {
        ctx.ran.push("second");
        Ok(TaskOutcome::Continue)
    }

    fn third(ctx: &mut Trace, _: &Reporter) -> Result<TaskOutcome> {
        ctx.ran.push("third");
        Ok(TaskOutcome::Continue)
    }

    fn stop(ctx: &mut Trace, _: &Reporter) -> Result<TaskOutcome> {
        ctx.ran.push("stop");
        Ok(TaskOutcome::Exit)
    }

    fn fail(_: &mut Trace, _: &Reporter) -> Result<TaskOutcome> {
        bail!("task exploded")
    }

    #[test]
    fn test_registration_order_without_constraints() {
        let mut runner = Runner::new();
        runner.register(Task::new("a", first)).unwrap();
        runner.register(Task::new("b", second)).unwrap();
        runner.register(Task::new("c", third)).unwrap();

        assert_eq!(runner.ordered_names().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_requires_and_precedes() {
        let mut runner = Runner::new();
        runner
            .register(Task::new("package", third).requires(&["compile"]))
            .unwrap();
        runner.register(Task::new("compile", second)).unwrap();
        runner
            .register(Task::new("check", first).precedes(&["compile"]))
            .unwrap();

        assert_eq!(
            runner.ordered_names().unwrap(),
            vec!["check", "compile", "package"]
        );
    }

    #[test]
    fn test_duplicate_task_name() {
        let mut runner = Runner::new();
        runner.register(Task::new("a", first)).unwrap();
        let err = runner.register(Task::new("a", second)).unwrap_err();
        assert!(err.to_string().contains("'a' is already registered"));
    }

    #[test]
    fn test_unknown_task_names() {
        let mut runner = Runner::new();
        runner
            .register(Task::new("a", first).requires(&["ghost"]))
            .unwrap();

        let err = runner.ordered_names().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut runner = Runner::new();
        runner.register(Task::new("a", first).requires(&["c"])).unwrap();
        runner.register(Task::new("b", second).requires(&["a"])).unwrap();
        runner.register(Task::new("c", third).requires(&["b"])).unwrap();

        let err = runner.ordered_names().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Circular"));
        assert!(message.contains('a') && message.contains('b') && message.contains('c'));
    }

    #[test]
    fn test_run_stops_on_exit() {
        let mut runner = Runner::new();
        runner.register(Task::new("a", first)).unwrap();
        runner.register(Task::new("stop", stop)).unwrap();
        runner.register(Task::new("c", third)).unwrap();

        let mut trace = Trace::default();
        let summary = runner.run(&mut trace, &Reporter::console(false, true));

        assert!(summary.success);
        assert_eq!(trace.ran, vec!["first", "stop"]);
        assert_eq!(summary.executed, vec!["a", "stop"]);
    }

    #[test]
    fn test_run_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");

        let mut runner = Runner::new();
        runner
            .register(Task::new("a", first).description("Doing the first thing..."))
            .unwrap();
        runner.register(Task::new("boom", fail)).unwrap();
        runner.register(Task::new("c", third)).unwrap();

        let mut trace = Trace::default();
        let reporter = Reporter::new(false, true, Some(&log)).unwrap();
        let summary = runner.run(&mut trace, &reporter);
        drop(reporter);

        assert!(!summary.success);
        assert_eq!(trace.ran, vec!["first"]);

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("INFO  Doing the first thing..."));
        assert!(content.contains("ERROR task exploded"));
        assert!(content.contains("FAIL  Build has ended with failure, took "));
    }
}
