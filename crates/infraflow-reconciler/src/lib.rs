//! infraflow reconciler
//!
//! Converges the network infrastructure of one cluster (network, subnet,
//! router, security group, SSH keypair, egress public IP) to an
//! [`InfrastructureConfig`], and tears it down again.
//!
//! ```ignore
//! use infraflow_reconciler::{FlowContext, FlowContextOptions};
//!
//! let store = Arc::new(FileStateStore::new(".", &cluster.technical_id));
//! let state = store.load_flat_state().await?;
//! let ctx = Arc::new(FlowContext::new(
//!     FlowContextOptions::new(config, cluster, providers)
//!         .with_state(state)
//!         .with_persister(store),
//! )?);
//! let result = ctx.reconcile().await?;
//! println!("{}", serde_json::to_string_pretty(&result.status)?);
//! ```
//!
//! Progress is written through the persister while the flow runs, so an
//! interrupted run resumes from the IDs it already knows.

pub mod config;
pub mod context;
pub mod converge;
pub mod delete;
pub mod error;
pub mod keys;
pub mod reconcile;
pub mod settings;
pub mod status;

// Re-exports
pub use config::{ClusterInfo, InfrastructureConfig, NetworksConfig, RouterRef};
pub use context::{FlowContext, FlowContextOptions, RunResult};
pub use error::{ConfigError, ReconcileError, Result};
pub use settings::Settings;
pub use status::{
    FloatingPoolStatus, InfrastructureStatus, NetworkStatus, RouterStatus, SecurityGroupStatus,
    SubnetStatus,
};
