//! Provider capability traits
//!
//! Each backend implements these traits on top of its own client. The
//! reconciler only ever sees a [`Providers`] bundle, selected once when the
//! flow context is built.

use crate::error::{CloudError, ResourceKind, Result};
use crate::resource::{
    Keypair, Network, NetworkSpec, PublicIp, PublicIpSpec, Route, Router, RouterInterface,
    RouterSpec, SecurityGroup, SecurityGroupRule, Server, Subnet, SubnetFilter, SubnetSpec,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Networks and subnets
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn get_network(&self, id: &str) -> Result<Network>;

    async fn list_networks_by_name(&self, name: &str) -> Result<Vec<Network>>;

    /// External networks with the given name
    async fn list_external_networks(&self, name: &str) -> Result<Vec<Network>>;

    async fn create_network(&self, spec: &NetworkSpec) -> Result<Network>;

    async fn update_network(&self, id: &str, spec: &NetworkSpec) -> Result<Network>;

    async fn delete_network(&self, id: &str) -> Result<()>;

    async fn get_subnet(&self, id: &str) -> Result<Subnet>;

    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>>;

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<Subnet>;

    async fn update_subnet_dns(&self, id: &str, dns_nameservers: &[String]) -> Result<Subnet>;

    async fn delete_subnet(&self, id: &str) -> Result<()>;
}

/// Routers, their interfaces and static routes
#[async_trait]
pub trait RouterProvider: Send + Sync {
    async fn get_router(&self, id: &str) -> Result<Router>;

    async fn list_routers_by_name(&self, name: &str) -> Result<Vec<Router>>;

    /// Routers with an interface in any subnet of the network
    async fn list_routers_attached_to_network(&self, network_id: &str) -> Result<Vec<Router>>;

    async fn create_router(&self, spec: &RouterSpec) -> Result<Router>;

    async fn update_router(&self, id: &str, spec: &RouterSpec) -> Result<Router>;

    async fn update_routes(&self, id: &str, routes: &[Route]) -> Result<Router>;

    async fn delete_router(&self, id: &str) -> Result<()>;

    async fn find_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<Option<RouterInterface>>;

    async fn add_router_interface(&self, router_id: &str, subnet_id: &str)
    -> Result<RouterInterface>;

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()>;
}

/// Security groups and their rules
#[async_trait]
pub trait SecurityGroupProvider: Send + Sync {
    async fn get_security_group(&self, id: &str) -> Result<SecurityGroup>;

    async fn list_security_groups_by_name(&self, name: &str) -> Result<Vec<SecurityGroup>>;

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup>;

    async fn delete_security_group(&self, id: &str) -> Result<()>;

    async fn create_rule(&self, rule: &SecurityGroupRule) -> Result<SecurityGroupRule>;

    async fn delete_rule(&self, rule: &SecurityGroupRule) -> Result<()>;
}

/// SSH keypairs, addressed by name
#[async_trait]
pub trait KeypairProvider: Send + Sync {
    async fn get_keypair(&self, name: &str) -> Result<Keypair>;

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<Keypair>;

    async fn delete_keypair(&self, name: &str) -> Result<()>;
}

/// Public (floating) IP addresses
#[async_trait]
pub trait PublicIpProvider: Send + Sync {
    async fn get_public_ip(&self, id: &str) -> Result<PublicIp>;

    async fn list_public_ips_by_name(&self, name: &str) -> Result<Vec<PublicIp>>;

    async fn create_public_ip(&self, spec: &PublicIpSpec) -> Result<PublicIp>;

    async fn delete_public_ip(&self, id: &str) -> Result<()>;
}

/// Read-only view on compute, used to guard deletion of the network
#[async_trait]
pub trait ServerProvider: Send + Sync {
    async fn list_servers_in_network(&self, network_id: &str) -> Result<Vec<Server>>;
}

/// Capabilities of one backend
#[derive(Clone)]
pub struct Providers {
    /// Backend name (e.g., "openstack", "iaas")
    pub backend: &'static str,
    pub network: Arc<dyn NetworkProvider>,
    pub router: Arc<dyn RouterProvider>,
    pub security_group: Arc<dyn SecurityGroupProvider>,
    pub keypair: Arc<dyn KeypairProvider>,
    pub public_ip: Arc<dyn PublicIpProvider>,
    pub server: Arc<dyn ServerProvider>,
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Providers {
    /// Bundle a backend that implements every capability on one type
    pub fn from_backend<B>(backend: &'static str, inner: Arc<B>) -> Self
    where
        B: NetworkProvider
            + RouterProvider
            + SecurityGroupProvider
            + KeypairProvider
            + PublicIpProvider
            + ServerProvider
            + 'static,
    {
        Self {
            backend,
            network: inner.clone(),
            router: inner.clone(),
            security_group: inner.clone(),
            keypair: inner.clone(),
            public_ip: inner.clone(),
            server: inner,
        }
    }
}

/// Retry configuration for provider operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: std::time::Duration,

    /// Maximum delay between retries
    pub max_delay: std::time::Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: std::time::Duration::from_secs(1),
            max_delay: std::time::Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }
}

/// Reduce a by-name listing to at most one resource
pub fn single_match<T>(kind: ResourceKind, name: &str, mut found: Vec<T>) -> Result<Option<T>> {
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop()),
        count => Err(CloudError::MultipleMatches {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

/// Find a resource by its known ID, falling back to a lookup by name.
///
/// An empty ID or a NotFound on the ID triggers the name lookup. More than
/// one resource with the name is an error.
pub async fn find_existing<T, G, GF, L, LF>(
    kind: ResourceKind,
    id: Option<&str>,
    name: &str,
    get: G,
    list_by_name: L,
) -> Result<Option<T>>
where
    G: FnOnce(String) -> GF,
    GF: Future<Output = Result<T>>,
    L: FnOnce(String) -> LF,
    LF: Future<Output = Result<Vec<T>>>,
{
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        match get(id.to_string()).await {
            Ok(found) => return Ok(Some(found)),
            Err(e) if e.is_not_found() => {
                tracing::debug!(%kind, id, "Known ID not found, looking up by name");
            }
            Err(e) => return Err(e),
        }
    }

    let found = list_by_name(name.to_string()).await?;
    single_match(kind, name, found)
}
