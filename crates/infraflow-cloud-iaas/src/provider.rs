//! Capability traits implemented on top of an [`IaasClient`]

use crate::client::IaasClient;
use crate::types::{
    IaasKeypair, IaasNetwork, IaasPublicIp, IaasRouter, IaasRule, IaasSecurityGroup, IaasSubnet,
    NAME_LABEL, NetworkCreate, NetworkPatch, PortRange, PublicIpCreate, RouterCreate, RouterPatch,
    RuleCreate, SecurityGroupCreate, StaticRoute, SubnetCreate, SubnetPatch, admin_state,
    name_labels,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infraflow_cloud::{
    CloudError, Direction, EtherType, ExternalGateway, FixedIp, Keypair, KeypairProvider, Network,
    NetworkProvider, NetworkSpec, Providers, PublicIp, PublicIpProvider, PublicIpSpec, Result,
    Route, Router, RouterInterface, RouterProvider, RouterSpec, SecurityGroup,
    SecurityGroupProvider, SecurityGroupRule, Server, ServerProvider, Subnet, SubnetFilter,
    SubnetSpec,
};
use std::sync::Arc;

pub const BACKEND_NAME: &str = "iaas";

/// Bundle the capabilities of the unified IaaS backend
pub fn providers(client: Arc<dyn IaasClient>) -> Providers {
    Providers::from_backend(BACKEND_NAME, Arc::new(IaasProvider::new(client)))
}

/// IaaS API backed implementation of every capability trait
pub struct IaasProvider {
    client: Arc<dyn IaasClient>,
}

impl IaasProvider {
    pub fn new(client: Arc<dyn IaasClient>) -> Self {
        Self { client }
    }

    /// All subnets, across every network
    async fn all_subnets(&self) -> Result<Vec<IaasSubnet>> {
        let mut subnets = Vec::new();
        for network in self.client.list_networks().await? {
            subnets.extend(self.client.list_subnets(&network.id).await?);
        }
        Ok(subnets)
    }
}

fn network_from_wire(n: IaasNetwork) -> Network {
    Network {
        admin_state_up: n.admin_state == "UP",
        id: n.id,
        name: n.name,
        external: n.external,
        mtu: n.mtu,
    }
}

fn subnet_from_wire(s: IaasSubnet) -> Subnet {
    let ip_version = if s.prefix.contains(':') { 6 } else { 4 };
    Subnet {
        id: s.id,
        name: s.name,
        network_id: s.network_id,
        cidr: s.prefix,
        ip_version,
        gateway_ip: s.gateway,
        dns_nameservers: s.nameservers,
    }
}

fn router_from_wire(r: IaasRouter) -> Router {
    let external_gateway = r.external_network_id.map(|network_id| ExternalGateway {
        network_id,
        enable_snat: Some(r.snat),
        external_fixed_ips: r
            .external_address
            .map(|ip_address| FixedIp {
                subnet_id: r.external_subnet_id.unwrap_or_default(),
                ip_address,
            })
            .into_iter()
            .collect(),
    });
    Router {
        id: r.id,
        name: r.name,
        external_gateway,
        routes: r
            .static_routes
            .into_iter()
            .map(|route| Route {
                destination: route.prefix,
                next_hop: route.nexthop,
            })
            .collect(),
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn rule_from_wire(r: IaasRule) -> Result<SecurityGroupRule> {
    let direction = match r.direction.as_str() {
        "ingress" => Direction::Ingress,
        "egress" => Direction::Egress,
        other => {
            return Err(CloudError::Transport(format!(
                "unexpected rule direction {:?} on rule {}",
                other, r.id
            )));
        }
    };
    let ether_type = match r.ethertype.as_str() {
        "IPv4" => EtherType::IPv4,
        "IPv6" => EtherType::IPv6,
        other => {
            return Err(CloudError::Transport(format!(
                "unexpected ethertype {:?} on rule {}",
                other, r.id
            )));
        }
    };
    Ok(SecurityGroupRule {
        created_at: parse_timestamp(r.created_at.as_deref()),
        updated_at: parse_timestamp(r.updated_at.as_deref()),
        id: r.id,
        security_group_id: r.security_group_id,
        description: r.description,
        direction,
        ether_type,
        protocol: r.protocol,
        port_range_min: r.port_range.map(|p| p.min),
        port_range_max: r.port_range.map(|p| p.max),
        remote_ip_prefix: r.ip_range,
        remote_group_id: r.remote_security_group_id,
    })
}

fn rule_to_wire(rule: &SecurityGroupRule) -> RuleCreate {
    let port_range = match (rule.port_range_min, rule.port_range_max) {
        (Some(min), Some(max)) => Some(PortRange { min, max }),
        (Some(port), None) | (None, Some(port)) => Some(PortRange {
            min: port,
            max: port,
        }),
        (None, None) => None,
    };
    RuleCreate {
        description: rule.description.clone(),
        direction: rule.direction.to_string(),
        ethertype: rule.ether_type.to_string(),
        protocol: rule.protocol.clone(),
        port_range,
        ip_range: rule.remote_ip_prefix.clone(),
        remote_security_group_id: rule.remote_group_id.clone(),
    }
}

fn group_from_wire(g: IaasSecurityGroup) -> Result<SecurityGroup> {
    Ok(SecurityGroup {
        rules: g
            .rules
            .into_iter()
            .map(rule_from_wire)
            .collect::<Result<_>>()?,
        id: g.id,
        name: g.name,
        description: g.description,
    })
}

fn keypair_from_wire(k: IaasKeypair) -> Keypair {
    Keypair {
        name: k.name,
        public_key: k.public_key,
        fingerprint: k.fingerprint,
    }
}

fn public_ip_from_wire(mut ip: IaasPublicIp) -> PublicIp {
    PublicIp {
        name: ip.labels.remove(NAME_LABEL).unwrap_or_default(),
        id: ip.id,
        ip_address: ip.ip,
        network_id: ip.network_id,
        port_id: ip.network_interface,
    }
}

fn router_patch(spec: &RouterSpec) -> RouterPatch {
    let gateway = spec.external_gateway.as_ref();
    RouterPatch {
        name: Some(spec.name.clone()),
        external_network_id: gateway.map(|gw| gw.network_id.clone()),
        external_subnet_id: gateway.and_then(|gw| gw.subnet_id.clone()),
        snat: gateway.and_then(|gw| gw.enable_snat),
        static_routes: None,
    }
}

#[async_trait]
impl NetworkProvider for IaasProvider {
    async fn get_network(&self, id: &str) -> Result<Network> {
        Ok(network_from_wire(self.client.get_network(id).await?))
    }

    async fn list_networks_by_name(&self, name: &str) -> Result<Vec<Network>> {
        let networks = self.client.list_networks().await?;
        Ok(networks
            .into_iter()
            .filter(|n| n.name == name)
            .map(network_from_wire)
            .collect())
    }

    async fn list_external_networks(&self, name: &str) -> Result<Vec<Network>> {
        let networks = self.client.list_networks().await?;
        Ok(networks
            .into_iter()
            .filter(|n| n.external && n.name == name)
            .map(network_from_wire)
            .collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<Network> {
        let req = NetworkCreate {
            name: spec.name.clone(),
            admin_state: admin_state(spec.admin_state_up),
            labels: name_labels(&spec.name),
        };
        Ok(network_from_wire(self.client.create_network(&req).await?))
    }

    async fn update_network(&self, id: &str, spec: &NetworkSpec) -> Result<Network> {
        let patch = NetworkPatch {
            name: Some(spec.name.clone()),
            admin_state: Some(admin_state(spec.admin_state_up)),
        };
        Ok(network_from_wire(self.client.patch_network(id, &patch).await?))
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_network(id).await?)
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet> {
        Ok(subnet_from_wire(self.client.get_subnet(id).await?))
    }

    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>> {
        let subnets = match &filter.network_id {
            Some(network_id) => self.client.list_subnets(network_id).await?,
            None => self.all_subnets().await?,
        };
        Ok(subnets
            .into_iter()
            .map(subnet_from_wire)
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<Subnet> {
        let req = SubnetCreate {
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            prefix: spec.cidr.clone(),
            nameservers: spec.dns_nameservers.clone(),
            labels: name_labels(&spec.name),
        };
        Ok(subnet_from_wire(self.client.create_subnet(&req).await?))
    }

    async fn update_subnet_dns(&self, id: &str, dns_nameservers: &[String]) -> Result<Subnet> {
        let patch = SubnetPatch {
            nameservers: Some(dns_nameservers.to_vec()),
        };
        Ok(subnet_from_wire(self.client.patch_subnet(id, &patch).await?))
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_subnet(id).await?)
    }
}

#[async_trait]
impl RouterProvider for IaasProvider {
    async fn get_router(&self, id: &str) -> Result<Router> {
        Ok(router_from_wire(self.client.get_router(id).await?))
    }

    async fn list_routers_by_name(&self, name: &str) -> Result<Vec<Router>> {
        let routers = self.client.list_routers().await?;
        Ok(routers
            .into_iter()
            .filter(|r| r.name == name)
            .map(router_from_wire)
            .collect())
    }

    async fn list_routers_attached_to_network(&self, network_id: &str) -> Result<Vec<Router>> {
        let subnet_ids: Vec<String> = self
            .client
            .list_subnets(network_id)
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let routers = self.client.list_routers().await?;
        Ok(routers
            .into_iter()
            .filter(|r| r.subnets.iter().any(|s| subnet_ids.contains(s)))
            .map(router_from_wire)
            .collect())
    }

    async fn create_router(&self, spec: &RouterSpec) -> Result<Router> {
        let gateway = spec.external_gateway.as_ref();
        let req = RouterCreate {
            name: spec.name.clone(),
            labels: name_labels(&spec.name),
            external_network_id: gateway.map(|gw| gw.network_id.clone()),
            external_subnet_id: gateway.and_then(|gw| gw.subnet_id.clone()),
            snat: gateway.and_then(|gw| gw.enable_snat).unwrap_or(true),
        };
        Ok(router_from_wire(self.client.create_router(&req).await?))
    }

    async fn update_router(&self, id: &str, spec: &RouterSpec) -> Result<Router> {
        Ok(router_from_wire(
            self.client.patch_router(id, &router_patch(spec)).await?,
        ))
    }

    async fn update_routes(&self, id: &str, routes: &[Route]) -> Result<Router> {
        let patch = RouterPatch {
            static_routes: Some(
                routes
                    .iter()
                    .map(|r| StaticRoute {
                        prefix: r.destination.clone(),
                        nexthop: r.next_hop.clone(),
                    })
                    .collect(),
            ),
            ..Default::default()
        };
        Ok(router_from_wire(self.client.patch_router(id, &patch).await?))
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_router(id).await?)
    }

    async fn find_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<Option<RouterInterface>> {
        let router = self.client.get_router(router_id).await?;
        Ok(router
            .subnets
            .iter()
            .any(|s| s == subnet_id)
            .then(|| RouterInterface {
                router_id: router_id.to_string(),
                subnet_id: subnet_id.to_string(),
                port_id: None,
            }))
    }

    async fn add_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<RouterInterface> {
        self.client.attach_subnet(router_id, subnet_id).await?;
        Ok(RouterInterface {
            router_id: router_id.to_string(),
            subnet_id: subnet_id.to_string(),
            port_id: None,
        })
    }

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        Ok(self.client.detach_subnet(router_id, subnet_id).await?)
    }
}

#[async_trait]
impl SecurityGroupProvider for IaasProvider {
    async fn get_security_group(&self, id: &str) -> Result<SecurityGroup> {
        group_from_wire(self.client.get_security_group(id).await?)
    }

    async fn list_security_groups_by_name(&self, name: &str) -> Result<Vec<SecurityGroup>> {
        self.client
            .list_security_groups()
            .await?
            .into_iter()
            .filter(|g| g.name == name)
            .map(group_from_wire)
            .collect()
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        let req = SecurityGroupCreate {
            name: name.to_string(),
            description: description.to_string(),
            labels: name_labels(name),
        };
        group_from_wire(self.client.create_security_group(&req).await?)
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_security_group(id).await?)
    }

    async fn create_rule(&self, rule: &SecurityGroupRule) -> Result<SecurityGroupRule> {
        rule_from_wire(
            self.client
                .create_rule(&rule.security_group_id, &rule_to_wire(rule))
                .await?,
        )
    }

    async fn delete_rule(&self, rule: &SecurityGroupRule) -> Result<()> {
        Ok(self
            .client
            .delete_rule(&rule.security_group_id, &rule.id)
            .await?)
    }
}

#[async_trait]
impl KeypairProvider for IaasProvider {
    async fn get_keypair(&self, name: &str) -> Result<Keypair> {
        Ok(keypair_from_wire(self.client.get_keypair(name).await?))
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<Keypair> {
        let req = IaasKeypair {
            name: name.to_string(),
            public_key: public_key.to_string(),
            fingerprint: None,
            labels: name_labels(name),
        };
        Ok(keypair_from_wire(self.client.create_keypair(&req).await?))
    }

    async fn delete_keypair(&self, name: &str) -> Result<()> {
        Ok(self.client.delete_keypair(name).await?)
    }
}

#[async_trait]
impl PublicIpProvider for IaasProvider {
    async fn get_public_ip(&self, id: &str) -> Result<PublicIp> {
        Ok(public_ip_from_wire(self.client.get_public_ip(id).await?))
    }

    async fn list_public_ips_by_name(&self, name: &str) -> Result<Vec<PublicIp>> {
        let ips = self.client.list_public_ips().await?;
        Ok(ips
            .into_iter()
            .filter(|ip| ip.labels.get(NAME_LABEL).is_some_and(|n| n == name))
            .map(public_ip_from_wire)
            .collect())
    }

    async fn create_public_ip(&self, spec: &PublicIpSpec) -> Result<PublicIp> {
        let req = PublicIpCreate {
            network_id: spec.network_id.clone(),
            subnet_id: spec.subnet_id.clone(),
            labels: name_labels(&spec.name),
        };
        Ok(public_ip_from_wire(self.client.create_public_ip(&req).await?))
    }

    async fn delete_public_ip(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_public_ip(id).await?)
    }
}

#[async_trait]
impl ServerProvider for IaasProvider {
    async fn list_servers_in_network(&self, network_id: &str) -> Result<Vec<Server>> {
        let servers = self.client.list_servers().await?;
        Ok(servers
            .into_iter()
            .filter(|s| s.nics.iter().any(|nic| nic.network_id == network_id))
            .map(|s| Server {
                network_ids: s.nics.into_iter().map(|nic| nic.network_id).collect(),
                id: s.id,
                name: s.name,
            })
            .collect())
    }
}
