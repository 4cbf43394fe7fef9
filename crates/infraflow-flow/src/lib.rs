//! infraflow task flows
//!
//! Building blocks shared by every infraflow reconciliation:
//!
//! - [`Whiteboard`]: the key/value state tasks read and write, exported as a
//!   flat map so progress survives restarts
//! - [`Graph`]: named tasks with dependencies, timeouts and build-time
//!   conditions, compiled into a [`Flow`]
//! - [`Flow::run`]: concurrent execution in dependency order with joined
//!   errors and a [`PersistHook`]
//!
//! ```ignore
//! use infraflow_flow::{Graph, RunOptions, dependencies, timeout};
//!
//! let mut g = Graph::new("reconcile");
//! let network = g.add_task("ensure network", |ctx: Arc<Ctx>| async move { ctx.ensure_network().await }, [timeout(TIMEOUT)]);
//! g.add_task("ensure subnet", |ctx: Arc<Ctx>| async move { ctx.ensure_subnet().await }, [dependencies([network])]);
//! let report = g.compile()?.run(ctx, RunOptions::new()).await?;
//! ```

pub mod error;
pub mod flow;
pub mod graph;
pub mod whiteboard;

// Re-exports
pub use error::{FlowError, GraphError, TaskError, TaskFailure};
pub use flow::{Flow, FlowReport, PersistHook, RunOptions};
pub use graph::{Graph, TaskId, TaskOption, dependencies, do_if, timeout};
pub use tokio_util::sync::CancellationToken;
pub use whiteboard::{DELETED_MARKER, Whiteboard};
