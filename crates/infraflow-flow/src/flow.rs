//! Flow execution
//!
//! Tasks start as soon as all of their dependencies have succeeded and run
//! concurrently on the tokio runtime. A failing task never aborts siblings
//! that are already running, but none of its (transitive) dependents is
//! started. All failures are collected into one [`FlowError`].

use crate::error::{FlowError, TaskError, TaskFailure};
use crate::graph::TaskSpec;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hook invoked while a flow runs so that progress reaches durable storage
///
/// Called after every finished task with `force == false` (implementations
/// may skip writes) and once after the run with `force == true`, regardless
/// of the outcome.
#[async_trait]
pub trait PersistHook<S>: Send + Sync {
    async fn persist(&self, state: &S, force: bool) -> anyhow::Result<()>;
}

/// Options of a single run
pub struct RunOptions<S> {
    pub cancel: CancellationToken,
    pub persist: Option<Arc<dyn PersistHook<S>>>,
}

impl<S> Default for RunOptions<S> {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            persist: None,
        }
    }
}

impl<S> RunOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_persist(mut self, hook: Arc<dyn PersistHook<S>>) -> Self {
        self.persist = Some(hook);
        self
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Default)]
pub struct FlowReport {
    /// Tasks whose body ran and succeeded, in completion order
    pub succeeded: Vec<String>,
    /// Tasks excluded by `do_if(false)`
    pub skipped: Vec<String>,
    pub duration: Duration,
}

/// A compiled, runnable flow
pub struct Flow<S> {
    name: String,
    tasks: Vec<TaskSpec<S>>,
    dependents: Vec<Vec<usize>>,
    pending: Vec<usize>,
}

impl<S: Send + Sync + 'static> Flow<S> {
    pub(crate) fn new(
        name: String,
        tasks: Vec<TaskSpec<S>>,
        dependents: Vec<Vec<usize>>,
        pending: Vec<usize>,
    ) -> Self {
        Self {
            name,
            tasks,
            dependents,
            pending,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names of all tasks in insertion order
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// Run the flow to completion
    pub async fn run(&self, state: Arc<S>, options: RunOptions<S>) -> Result<FlowReport, FlowError> {
        let start = Instant::now();
        let mut pending = self.pending.clone();
        let mut ready: VecDeque<usize> = (0..self.tasks.len()).filter(|&i| pending[i] == 0).collect();
        let mut started = vec![false; self.tasks.len()];
        let mut join_set: JoinSet<Result<(), TaskError>> = JoinSet::new();
        let mut running: HashMap<Id, usize> = HashMap::new();
        let mut report = FlowReport::default();
        let mut failures: Vec<TaskFailure> = Vec::new();

        info!(flow = %self.name, tasks = self.tasks.len(), "Starting flow");

        loop {
            while let Some(index) = ready.pop_front() {
                if options.cancel.is_cancelled() {
                    break;
                }
                started[index] = true;
                let task = &self.tasks[index];

                if !task.enabled {
                    debug!(flow = %self.name, task = %task.name, "Skipping task (condition not met)");
                    report.skipped.push(task.name.clone());
                    self.release_dependents(index, &mut pending, &mut ready);
                    continue;
                }

                debug!(flow = %self.name, task = %task.name, "Starting task");
                let handle = join_set.spawn(execute_task(
                    task.func.clone(),
                    state.clone(),
                    task.timeout,
                    options.cancel.clone(),
                ));
                running.insert(handle.id(), index);
            }

            let Some(joined) = join_set.join_next_with_id().await else {
                break;
            };

            let (id, result) = match joined {
                Ok((id, result)) => (id, result),
                Err(e) => (e.id(), Err(join_failure(e))),
            };
            let Some(index) = running.remove(&id) else {
                error!(flow = %self.name, task_id = %id, "Finished task is not part of the flow");
                continue;
            };
            let task = &self.tasks[index];

            match result {
                Ok(()) => {
                    info!(
                        flow = %self.name,
                        task = %task.name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Task succeeded"
                    );
                    report.succeeded.push(task.name.clone());
                    self.release_dependents(index, &mut pending, &mut ready);
                }
                Err(error) => {
                    error!(flow = %self.name, task = %task.name, error = %error, "Task failed");
                    failures.push(TaskFailure {
                        task: task.name.clone(),
                        error,
                    });
                }
            }

            if let Some(hook) = &options.persist {
                if let Err(e) = hook.persist(&state, false).await {
                    warn!(flow = %self.name, error = %e, "Failed to persist intermediate state");
                }
            }
        }

        if let Some(hook) = &options.persist {
            if let Err(e) = hook.persist(&state, true).await {
                error!(flow = %self.name, error = %e, "Failed to persist state");
                failures.push(TaskFailure {
                    task: "persist state".to_string(),
                    error: TaskError::Failed(e),
                });
            }
        }

        let not_run: Vec<String> = self
            .tasks
            .iter()
            .zip(&started)
            .filter(|(_, started)| !**started)
            .map(|(t, _)| t.name.clone())
            .collect();

        if options.cancel.is_cancelled() && failures.is_empty() && !not_run.is_empty() {
            failures.push(TaskFailure {
                task: self.name.clone(),
                error: TaskError::Canceled,
            });
        }

        report.duration = start.elapsed();

        if failures.is_empty() {
            info!(
                flow = %self.name,
                succeeded = report.succeeded.len(),
                skipped = report.skipped.len(),
                elapsed_ms = report.duration.as_millis() as u64,
                "Flow completed"
            );
            Ok(report)
        } else {
            if !not_run.is_empty() {
                warn!(flow = %self.name, not_run = ?not_run, "Tasks not started");
            }
            Err(FlowError {
                flow: self.name.clone(),
                failures,
                not_run,
            })
        }
    }

    fn release_dependents(&self, index: usize, pending: &mut [usize], ready: &mut VecDeque<usize>) {
        for &dependent in &self.dependents[index] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }
}

async fn execute_task<S: Send + Sync + 'static>(
    func: crate::graph::TaskFn<S>,
    state: Arc<S>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
) -> Result<(), TaskError> {
    let body = async move {
        let fut = func(state);
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result.map_err(TaskError::Failed),
                Err(_) => Err(TaskError::Timeout(limit)),
            },
            None => fut.await.map_err(TaskError::Failed),
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(TaskError::Canceled),
        caught = AssertUnwindSafe(body).catch_unwind() => match caught {
            Ok(result) => result,
            Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
        },
    }
}

/// Failure of a task whose tokio task ended without an outcome
fn join_failure(err: JoinError) -> TaskError {
    if err.is_panic() {
        TaskError::Panicked(panic_message(err.into_panic().as_ref()))
    } else {
        TaskError::Canceled
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
