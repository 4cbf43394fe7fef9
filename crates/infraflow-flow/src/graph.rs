//! Task graph construction
//!
//! A [`Graph`] collects named tasks and their dependencies. Conditions
//! (`do_if`) are decided while the graph is built, so the compiled topology
//! is static for the whole run.

use crate::error::GraphError;
use crate::flow::Flow;
use futures_util::future::BoxFuture;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Boxed task body. Receives the shared flow state.
pub type TaskFn<S> = Arc<dyn Fn(Arc<S>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Handle of a task inside its graph, usable as a dependency of later tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub(crate) usize);

/// Option passed to [`Graph::add_task`]
#[derive(Debug, Clone)]
pub enum TaskOption {
    /// Wait for the listed tasks to succeed first
    Dependencies(Vec<TaskId>),
    /// Fail the task if it does not complete in time
    Timeout(Duration),
    /// Include the task only if true; otherwise it succeeds without running
    DoIf(bool),
}

pub fn dependencies(ids: impl IntoIterator<Item = TaskId>) -> TaskOption {
    TaskOption::Dependencies(ids.into_iter().collect())
}

pub fn timeout(duration: Duration) -> TaskOption {
    TaskOption::Timeout(duration)
}

pub fn do_if(condition: bool) -> TaskOption {
    TaskOption::DoIf(condition)
}

pub(crate) struct TaskSpec<S> {
    pub(crate) name: String,
    pub(crate) func: TaskFn<S>,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) enabled: bool,
}

/// Builder for a flow of dependent tasks over shared state `S`
pub struct Graph<S> {
    name: String,
    tasks: Vec<TaskSpec<S>>,
}

impl<S: Send + Sync + 'static> Graph<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Add a task and return its handle
    pub fn add_task<F, Fut>(
        &mut self,
        name: impl Into<String>,
        func: F,
        options: impl IntoIterator<Item = TaskOption>,
    ) -> TaskId
    where
        F: Fn(Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut spec = TaskSpec {
            name: name.into(),
            func: Arc::new(move |state| -> BoxFuture<'static, anyhow::Result<()>> {
                Box::pin(func(state))
            }),
            dependencies: Vec::new(),
            timeout: None,
            enabled: true,
        };

        for option in options {
            match option {
                TaskOption::Dependencies(ids) => spec.dependencies.extend(ids),
                TaskOption::Timeout(duration) => spec.timeout = Some(duration),
                TaskOption::DoIf(condition) => spec.enabled = spec.enabled && condition,
            }
        }

        let id = TaskId(self.tasks.len());
        self.tasks.push(spec);
        id
    }

    /// Add a dependency edge after both tasks exist
    pub fn add_dependency(&mut self, task: TaskId, dependency: TaskId) {
        if let Some(spec) = self.tasks.get_mut(task.0) {
            spec.dependencies.push(dependency);
        }
    }

    /// Validate the graph and produce a runnable flow
    pub fn compile(self) -> Result<Flow<S>, GraphError> {
        let mut names = HashSet::new();
        for spec in &self.tasks {
            if !names.insert(spec.name.as_str()) {
                return Err(GraphError::DuplicateTask {
                    graph: self.name.clone(),
                    task: spec.name.clone(),
                });
            }
        }

        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.tasks.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.tasks.len()).map(|i| graph.add_node(i)).collect();

        for (index, spec) in self.tasks.iter().enumerate() {
            for dep in &spec.dependencies {
                let Some(&dep_node) = nodes.get(dep.0) else {
                    return Err(GraphError::UnknownDependency {
                        graph: self.name.clone(),
                        task: spec.name.clone(),
                        dependency: dep.0,
                    });
                };
                graph.update_edge(dep_node, nodes[index], ());
            }
        }

        toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
            graph: self.name.clone(),
            task: self.tasks[graph[cycle.node_id()]].name.clone(),
        })?;

        let mut dependents = vec![Vec::new(); self.tasks.len()];
        let mut pending = vec![0usize; self.tasks.len()];
        for edge in graph.raw_edges() {
            let (from, to) = (graph[edge.source()], graph[edge.target()]);
            dependents[from].push(to);
            pending[to] += 1;
        }

        tracing::debug!(
            graph = %self.name,
            tasks = self.tasks.len(),
            edges = graph.edge_count(),
            "Compiled flow graph"
        );

        Ok(Flow::new(self.name, self.tasks, dependents, pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: Arc<()>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_compile_valid_graph() {
        let mut g = Graph::<()>::new("test");
        let a = g.add_task("a", noop, []);
        let b = g.add_task("b", noop, [dependencies([a])]);
        let _c = g.add_task("c", noop, [dependencies([a, b]), timeout(Duration::from_secs(1))]);
        assert_eq!(g.len(), 3);
        assert!(g.compile().is_ok());
    }

    #[test]
    fn test_compile_detects_cycle() {
        let mut g = Graph::<()>::new("cyclic");
        let a = g.add_task("a", noop, []);
        let b = g.add_task("b", noop, [dependencies([a])]);
        g.add_dependency(a, b);

        match g.compile() {
            Err(GraphError::Cycle { graph, .. }) => assert_eq!(graph, "cyclic"),
            other => panic!("expected cycle error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_compile_detects_duplicate_names() {
        let mut g = Graph::<()>::new("dup");
        g.add_task("a", noop, []);
        g.add_task("a", noop, []);
        assert!(matches!(
            g.compile(),
            Err(GraphError::DuplicateTask { task, .. }) if task == "a"
        ));
    }

    #[test]
    fn test_compile_detects_unknown_dependency() {
        let mut other = Graph::<()>::new("other");
        other.add_task("x", noop, []);
        let foreign = other.add_task("y", noop, []);

        let mut g = Graph::<()>::new("main");
        g.add_task("a", noop, [dependencies([foreign])]);
        assert!(matches!(
            g.compile(),
            Err(GraphError::UnknownDependency { dependency: 1, .. })
        ));
    }

    #[test]
    fn test_do_if_false_is_sticky() {
        let mut g = Graph::<()>::new("cond");
        g.add_task("a", noop, [do_if(false), do_if(true)]);
        assert!(!g.tasks[0].enabled);
    }
}
