//! Legacy OpenStack backend for infraflow
//!
//! Implements the infraflow capability traits on Neutron and Nova.
//! Router interfaces are router-owned ports, router gateways are
//! `external_gateway_info`, and public IPs are floating IPs identified by
//! their description.
//!
//! The HTTP client itself is behind [`OpenStackClient`]; construct the
//! capability bundle with [`providers`].
//!
//! ```ignore
//! use infraflow_cloud_openstack::providers;
//!
//! let providers = providers(Arc::new(my_neutron_client));
//! let ctx = FlowContext::new(options.with_providers(providers))?;
//! ```

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod provider;
pub mod types;

pub use client::OpenStackClient;
pub use error::{NeutronFault, OpenStackError, Result};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryOpenStack;
pub use provider::{BACKEND_NAME, OpenStackProvider, providers};
