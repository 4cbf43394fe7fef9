//! Unified IaaS backend for infraflow
//!
//! Implements the infraflow capability traits on the unified IaaS API.
//! Routers attach subnets directly instead of through ports, list endpoints
//! are filtered client-side, and public IPs carry their logical name in the
//! `infraflow.io/name` label.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod provider;
pub mod types;

pub use client::IaasClient;
pub use error::{ErrorBody, IaasError, Result};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryIaas;
pub use provider::{BACKEND_NAME, IaasProvider, providers};
