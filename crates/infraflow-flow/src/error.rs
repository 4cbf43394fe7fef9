//! Flow error types

use std::time::Duration;
use thiserror::Error;

/// Errors detected while compiling a graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate task name in graph {graph:?}: {task}")]
    DuplicateTask { graph: String, task: String },

    #[error("Task {task:?} in graph {graph:?} depends on unknown task #{dependency}")]
    UnknownDependency {
        graph: String,
        task: String,
        dependency: usize,
    },

    #[error("Graph {graph:?} contains a dependency cycle through task {task:?}")]
    Cycle { graph: String, task: String },
}

/// Why a single task did not succeed
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("canceled")]
    Canceled,

    #[error("panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    /// The underlying task error, if the task returned one
    pub fn source_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// A failed task, wrapped with its name
#[derive(Error, Debug)]
#[error("task {task:?} failed: {error}")]
pub struct TaskFailure {
    pub task: String,
    #[source]
    pub error: TaskError,
}

/// Joined failures of a flow run
#[derive(Error, Debug)]
#[error(
    "flow {flow:?} failed with {} error(s): {}",
    .failures.len(),
    join_failures(.failures)
)]
pub struct FlowError {
    pub flow: String,
    pub failures: Vec<TaskFailure>,
    /// Tasks that never started because a dependency failed or the run was canceled
    pub not_run: Vec<String>,
}

fn join_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl FlowError {
    /// Every underlying failure of the run
    pub fn causes(&self) -> impl Iterator<Item = &TaskFailure> {
        self.failures.iter()
    }

    /// Failure of a specific task, if it failed
    pub fn failure_of(&self, task: &str) -> Option<&TaskFailure> {
        self.failures.iter().find(|f| f.task == task)
    }

    /// Find the first underlying error of type `E` among all failures
    pub fn find_cause<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.failures
            .iter()
            .filter_map(|f| f.error.source_error())
            .find_map(|e| e.downcast_ref::<E>())
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
