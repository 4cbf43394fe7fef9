//! infraflow cloud abstraction
//!
//! Provider-neutral model of the network infrastructure a cluster needs,
//! the capability traits each backend implements, and the pieces shared by
//! every backend: error type, retry classification and state persistence.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              infraflow-reconciler                │
//! │         (FlowContext: reconcile/delete)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                infraflow-cloud                   │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          Capability traits                │   │
//! │  │  NetworkProvider, RouterProvider, ...     │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │    Retry     │  │  State file  │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │   openstack   │ │     iaas      │
//! │   (legacy)    │ │   (unified)   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod error;
pub mod provider;
pub mod resource;
pub mod retry;
pub mod state;

// Re-exports
pub use error::{CloudError, ErrorReason, ResourceKind, Result, ignore_not_found};
pub use provider::{
    KeypairProvider, NetworkProvider, Providers, PublicIpProvider, RetryConfig, RouterProvider,
    SecurityGroupProvider, ServerProvider, find_existing, single_match,
};
pub use resource::{
    Direction, EtherType, ExternalGateway, FixedIp, GatewaySpec, Keypair, Network, NetworkSpec,
    PublicIp, PublicIpSpec, Route, Router, RouterInterface, RouterSpec, SecurityGroup,
    SecurityGroupRule, Server, Subnet, SubnetFilter, SubnetSpec,
};
pub use retry::{ErrorClass, is_retryable, retry_on_transient};
pub use state::{ClusterState, FileStateStore, StateLock, StatePersister};
