#![allow(dead_code)]

use infraflow_cloud::{GatewaySpec, NetworkSpec, Providers, RetryConfig, RouterSpec, SubnetSpec};
use infraflow_cloud_iaas::{IaasError, InMemoryIaas};
use infraflow_cloud_openstack::{InMemoryOpenStack, OpenStackError};
use infraflow_reconciler::{
    ClusterInfo, FlowContext, FlowContextOptions, InfrastructureConfig, Settings,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const TECHNICAL_ID: &str = "shoot--dev--alpha";
pub const SSH_KEY: &str = "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIGxN3 ops@example";
pub const FLOATING_POOL: &str = "fip-1";

/// In-memory cloud of either backend
#[derive(Clone)]
pub enum FakeCloud {
    OpenStack(Arc<InMemoryOpenStack>),
    Iaas(Arc<InMemoryIaas>),
}

impl FakeCloud {
    pub fn openstack() -> Self {
        FakeCloud::OpenStack(Arc::new(InMemoryOpenStack::new()))
    }

    pub fn iaas() -> Self {
        FakeCloud::Iaas(Arc::new(InMemoryIaas::new()))
    }

    /// One fresh cloud per backend, each with the floating pool in place
    pub fn all() -> Vec<Self> {
        let clouds = vec![Self::openstack(), Self::iaas()];
        for cloud in &clouds {
            cloud.add_external_network(FLOATING_POOL);
        }
        clouds
    }

    pub fn name(&self) -> &'static str {
        match self {
            FakeCloud::OpenStack(_) => "openstack",
            FakeCloud::Iaas(_) => "iaas",
        }
    }

    pub fn providers(&self) -> Providers {
        match self {
            FakeCloud::OpenStack(api) => infraflow_cloud_openstack::providers(api.clone()),
            FakeCloud::Iaas(api) => infraflow_cloud_iaas::providers(api.clone()),
        }
    }

    pub fn add_external_network(&self, name: &str) -> String {
        match self {
            FakeCloud::OpenStack(api) => api.add_external_network(name, "203.0.113.0/24"),
            FakeCloud::Iaas(api) => api.add_external_network(name, "198.51.100.0/24"),
        }
    }

    /// First address handed out for router gateways and public IPs
    pub fn first_external_ip(&self) -> &'static str {
        match self {
            FakeCloud::OpenStack(_) => "203.0.113.10",
            FakeCloud::Iaas(_) => "198.51.100.10",
        }
    }

    pub fn add_server(&self, name: &str, network_id: &str) -> String {
        match self {
            FakeCloud::OpenStack(api) => api.add_server(name, network_id),
            FakeCloud::Iaas(api) => api.add_server(name, network_id),
        }
    }

    pub fn remove_server(&self, server_id: &str) {
        match self {
            FakeCloud::OpenStack(api) => api.remove_server(server_id),
            FakeCloud::Iaas(api) => api.remove_server(server_id),
        }
    }

    /// Make the next call of `op` fail with a non-retryable error
    pub fn fail_next(&self, op: &str) {
        match self {
            FakeCloud::OpenStack(api) => {
                api.fail_next(op, OpenStackError::bad_request("BadRequest", "quota exceeded"))
            }
            FakeCloud::Iaas(api) => {
                api.fail_next(op, IaasError::api(400, "quota.exceeded", "quota exceeded"))
            }
        }
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        match self {
            FakeCloud::OpenStack(api) => api.mutating_calls(),
            FakeCloud::Iaas(api) => api.mutating_calls(),
        }
    }

    pub fn clear_calls(&self) {
        match self {
            FakeCloud::OpenStack(api) => api.clear_calls(),
            FakeCloud::Iaas(api) => api.clear_calls(),
        }
    }

    /// Operation that detaches a router from a subnet
    pub fn detach_op(&self) -> &'static str {
        match self {
            FakeCloud::OpenStack(_) => "remove_router_interface",
            FakeCloud::Iaas(_) => "detach_subnet",
        }
    }
}

/// Index of the first call of `op`, panicking with the call log if absent
pub fn position(calls: &[String], op: &str) -> usize {
    calls
        .iter()
        .position(|c| c.split_whitespace().next() == Some(op))
        .unwrap_or_else(|| panic!("no {} call in {:#?}", op, calls))
}

pub fn count(calls: &[String], op: &str) -> usize {
    calls
        .iter()
        .filter(|c| c.split_whitespace().next() == Some(op))
        .count()
}

pub fn config(yaml: &str) -> InfrastructureConfig {
    InfrastructureConfig::from_yaml_str(yaml).unwrap()
}

pub fn default_config() -> InfrastructureConfig {
    config(
        r#"
floatingPoolName: fip-1
networks:
  workers: 10.250.0.0/16
"#,
    )
}

pub fn cluster() -> ClusterInfo {
    ClusterInfo::new(TECHNICAL_ID)
        .with_ssh_public_key(SSH_KEY)
        .with_pods_cidr("100.96.0.0/11")
        .with_default_dns_servers(["8.8.8.8"])
}

pub fn fast_settings() -> Settings {
    Settings::default()
        .with_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        })
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(10))
        .with_persist_interval(Duration::ZERO)
}

pub fn context(
    cloud: &FakeCloud,
    config: InfrastructureConfig,
    state: BTreeMap<String, String>,
) -> Arc<FlowContext> {
    context_with(cloud, config, cluster(), state)
}

pub fn context_with(
    cloud: &FakeCloud,
    config: InfrastructureConfig,
    cluster: ClusterInfo,
    state: BTreeMap<String, String>,
) -> Arc<FlowContext> {
    let options = FlowContextOptions::new(config, cluster, cloud.providers())
        .with_settings(fast_settings())
        .with_state(state);
    Arc::new(FlowContext::new(options).unwrap())
}

/// Network, subnet and router with an interface, created outside of any flow
pub struct Topology {
    pub network_id: String,
    pub subnet_id: String,
    pub router_id: String,
}

pub async fn create_topology(cloud: &FakeCloud, name: &str, cidr: &str) -> Topology {
    let providers = cloud.providers();
    let floating = providers
        .network
        .list_external_networks(FLOATING_POOL)
        .await
        .unwrap()
        .remove(0);
    let network = providers
        .network
        .create_network(&NetworkSpec {
            name: name.to_string(),
            admin_state_up: true,
        })
        .await
        .unwrap();
    let subnet = providers
        .network
        .create_subnet(&SubnetSpec {
            name: name.to_string(),
            network_id: network.id.clone(),
            cidr: cidr.to_string(),
            ip_version: 4,
            dns_nameservers: vec![],
        })
        .await
        .unwrap();
    let router = providers
        .router
        .create_router(&RouterSpec {
            name: name.to_string(),
            external_gateway: Some(GatewaySpec {
                network_id: floating.id,
                subnet_id: None,
                enable_snat: None,
            }),
        })
        .await
        .unwrap();
    providers
        .router
        .add_router_interface(&router.id, &subnet.id)
        .await
        .unwrap();

    Topology {
        network_id: network.id,
        subnet_id: subnet.id,
        router_id: router.id,
    }
}
