//! Capability traits implemented on top of an [`OpenStackClient`]

use crate::client::OpenStackClient;
use crate::types::{
    COMPUTE_OWNER_PREFIX, ExternalFixedIp, ExternalGatewayInfo, FloatingIp, FloatingIpCreate,
    FloatingIpQuery, InterfaceInfo, KeypairCreate, NetworkCreate, NetworkQuery, NetworkUpdate,
    NeutronNetwork, NeutronRoute, NeutronRouter, NeutronSecurityGroup, NeutronSecurityGroupRule,
    NeutronSubnet, NovaKeypair, PortQuery, ROUTER_INTERFACE_OWNER, RouterCreate, RouterUpdate,
    SecurityGroupCreate, SecurityGroupRuleCreate, SubnetCreate, SubnetQuery, SubnetUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use infraflow_cloud::{
    CloudError, Direction, EtherType, ExternalGateway, FixedIp, GatewaySpec, Keypair,
    KeypairProvider, Network, NetworkProvider, NetworkSpec, Providers, PublicIp, PublicIpProvider,
    PublicIpSpec, Result, Route, Router, RouterInterface, RouterProvider, RouterSpec,
    SecurityGroup, SecurityGroupProvider, SecurityGroupRule, Server, ServerProvider, Subnet,
    SubnetFilter, SubnetSpec, ignore_not_found,
};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const BACKEND_NAME: &str = "openstack";

/// Bundle the capabilities of the legacy OpenStack backend
pub fn providers(client: Arc<dyn OpenStackClient>) -> Providers {
    Providers::from_backend(BACKEND_NAME, Arc::new(OpenStackProvider::new(client)))
}

/// Neutron/Nova backed implementation of every capability trait
pub struct OpenStackProvider {
    client: Arc<dyn OpenStackClient>,
}

impl OpenStackProvider {
    pub fn new(client: Arc<dyn OpenStackClient>) -> Self {
        Self { client }
    }

    /// Router IDs owning an interface port in the network
    async fn router_ids_in_network(&self, network_id: &str) -> Result<BTreeSet<String>> {
        let ports = self
            .client
            .list_ports(&PortQuery {
                network_id: Some(network_id.to_string()),
                device_id: None,
                device_owner: Some(ROUTER_INTERFACE_OWNER.to_string()),
            })
            .await?;
        Ok(ports.into_iter().map(|p| p.device_id).collect())
    }
}

fn network_from_wire(n: NeutronNetwork) -> Network {
    Network {
        id: n.id,
        name: n.name,
        admin_state_up: n.admin_state_up,
        external: n.external,
        mtu: n.mtu,
    }
}

fn subnet_from_wire(s: NeutronSubnet) -> Subnet {
    Subnet {
        id: s.id,
        name: s.name,
        network_id: s.network_id,
        cidr: s.cidr,
        ip_version: s.ip_version,
        gateway_ip: s.gateway_ip,
        dns_nameservers: s.dns_nameservers,
    }
}

fn router_from_wire(r: NeutronRouter) -> Router {
    Router {
        id: r.id,
        name: r.name,
        external_gateway: r.external_gateway_info.map(|gw| ExternalGateway {
            network_id: gw.network_id,
            enable_snat: gw.enable_snat,
            external_fixed_ips: gw
                .external_fixed_ips
                .into_iter()
                .map(|ip| FixedIp {
                    subnet_id: ip.subnet_id,
                    ip_address: ip.ip_address,
                })
                .collect(),
        }),
        routes: r
            .routes
            .into_iter()
            .map(|route| Route {
                destination: route.destination,
                next_hop: route.nexthop,
            })
            .collect(),
    }
}

fn gateway_to_wire(gw: &GatewaySpec) -> ExternalGatewayInfo {
    ExternalGatewayInfo {
        network_id: gw.network_id.clone(),
        enable_snat: gw.enable_snat,
        external_fixed_ips: gw
            .subnet_id
            .iter()
            .map(|subnet_id| ExternalFixedIp {
                subnet_id: subnet_id.clone(),
                ip_address: String::new(),
            })
            .collect(),
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn rule_from_wire(r: NeutronSecurityGroupRule) -> Result<SecurityGroupRule> {
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
        port_range_min: r.port_range_min,
        port_range_max: r.port_range_max,
        remote_ip_prefix: r.remote_ip_prefix,
        remote_group_id: r.remote_group_id,
    })
}

fn rule_to_wire(rule: &SecurityGroupRule) -> SecurityGroupRuleCreate {
    SecurityGroupRuleCreate {
        security_group_id: rule.security_group_id.clone(),
        description: rule.description.clone(),
        direction: rule.direction.to_string(),
        ethertype: rule.ether_type.to_string(),
        protocol: rule.protocol.clone(),
        port_range_min: rule.port_range_min,
        port_range_max: rule.port_range_max,
        remote_ip_prefix: rule.remote_ip_prefix.clone(),
        remote_group_id: rule.remote_group_id.clone(),
    }
}

fn group_from_wire(g: NeutronSecurityGroup) -> Result<SecurityGroup> {
    Ok(SecurityGroup {
        rules: g
            .security_group_rules
            .into_iter()
            .map(rule_from_wire)
            .collect::<Result<_>>()?,
        id: g.id,
        name: g.name,
        description: g.description,
    })
}

fn keypair_from_wire(k: NovaKeypair) -> Keypair {
    Keypair {
        name: k.name,
        public_key: k.public_key,
        fingerprint: k.fingerprint,
    }
}

fn public_ip_from_wire(f: FloatingIp) -> PublicIp {
    PublicIp {
        id: f.id,
        ip_address: f.floating_ip_address,
        network_id: f.floating_network_id,
        name: f.description,
        port_id: f.port_id,
    }
}

#[async_trait]
impl NetworkProvider for OpenStackProvider {
    async fn get_network(&self, id: &str) -> Result<Network> {
        Ok(network_from_wire(self.client.get_network(id).await?))
    }

    async fn list_networks_by_name(&self, name: &str) -> Result<Vec<Network>> {
        let query = NetworkQuery {
            name: Some(name.to_string()),
            external: None,
        };
        let networks = self.client.list_networks(&query).await?;
        Ok(networks.into_iter().map(network_from_wire).collect())
    }

    async fn list_external_networks(&self, name: &str) -> Result<Vec<Network>> {
        let query = NetworkQuery {
            name: Some(name.to_string()),
            external: Some(true),
        };
        let networks = self.client.list_networks(&query).await?;
        Ok(networks.into_iter().map(network_from_wire).collect())
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<Network> {
        let req = NetworkCreate {
            name: spec.name.clone(),
            admin_state_up: spec.admin_state_up,
        };
        Ok(network_from_wire(self.client.create_network(&req).await?))
    }

    async fn update_network(&self, id: &str, spec: &NetworkSpec) -> Result<Network> {
        let req = NetworkUpdate {
            name: Some(spec.name.clone()),
            admin_state_up: Some(spec.admin_state_up),
        };
        Ok(network_from_wire(self.client.update_network(id, &req).await?))
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_network(id).await?)
    }

    async fn get_subnet(&self, id: &str) -> Result<Subnet> {
        Ok(subnet_from_wire(self.client.get_subnet(id).await?))
    }

    async fn list_subnets(&self, filter: &SubnetFilter) -> Result<Vec<Subnet>> {
        let query = SubnetQuery {
            network_id: filter.network_id.clone(),
            name: filter.name.clone(),
        };
        let subnets = self.client.list_subnets(&query).await?;
        Ok(subnets.into_iter().map(subnet_from_wire).collect())
    }

    async fn create_subnet(&self, spec: &SubnetSpec) -> Result<Subnet> {
        let req = SubnetCreate {
            name: spec.name.clone(),
            network_id: spec.network_id.clone(),
            cidr: spec.cidr.clone(),
            ip_version: spec.ip_version,
            dns_nameservers: spec.dns_nameservers.clone(),
        };
        Ok(subnet_from_wire(self.client.create_subnet(&req).await?))
    }

    async fn update_subnet_dns(&self, id: &str, dns_nameservers: &[String]) -> Result<Subnet> {
        let req = SubnetUpdate {
            dns_nameservers: dns_nameservers.to_vec(),
        };
        Ok(subnet_from_wire(self.client.update_subnet(id, &req).await?))
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_subnet(id).await?)
    }
}

#[async_trait]
impl RouterProvider for OpenStackProvider {
    async fn get_router(&self, id: &str) -> Result<Router> {
        Ok(router_from_wire(self.client.get_router(id).await?))
    }

    async fn list_routers_by_name(&self, name: &str) -> Result<Vec<Router>> {
        let routers = self.client.list_routers(Some(name)).await?;
        Ok(routers.into_iter().map(router_from_wire).collect())
    }

    async fn list_routers_attached_to_network(&self, network_id: &str) -> Result<Vec<Router>> {
        let mut routers = Vec::new();
        for router_id in self.router_ids_in_network(network_id).await? {
            // The port can outlive its router briefly
            if let Some(router) = ignore_not_found(self.get_router(&router_id).await)? {
                routers.push(router);
            }
        }
        Ok(routers)
    }

    async fn create_router(&self, spec: &RouterSpec) -> Result<Router> {
        let req = RouterCreate {
            name: spec.name.clone(),
            external_gateway_info: spec.external_gateway.as_ref().map(gateway_to_wire),
        };
        Ok(router_from_wire(self.client.create_router(&req).await?))
    }

    async fn update_router(&self, id: &str, spec: &RouterSpec) -> Result<Router> {
        let req = RouterUpdate {
            name: Some(spec.name.clone()),
            external_gateway_info: spec.external_gateway.as_ref().map(gateway_to_wire),
            routes: None,
        };
        Ok(router_from_wire(self.client.update_router(id, &req).await?))
    }

    async fn update_routes(&self, id: &str, routes: &[Route]) -> Result<Router> {
        let req = RouterUpdate {
            name: None,
            external_gateway_info: None,
            routes: Some(
                routes
                    .iter()
                    .map(|r| NeutronRoute {
                        destination: r.destination.clone(),
                        nexthop: r.next_hop.clone(),
                    })
                    .collect(),
            ),
        };
        Ok(router_from_wire(self.client.update_router(id, &req).await?))
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_router(id).await?)
    }

    async fn find_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<Option<RouterInterface>> {
        let ports = self
            .client
            .list_ports(&PortQuery {
                network_id: None,
                device_id: Some(router_id.to_string()),
                device_owner: Some(ROUTER_INTERFACE_OWNER.to_string()),
            })
            .await?;

        Ok(ports
            .into_iter()
            .find(|port| port.fixed_ips.iter().any(|ip| ip.subnet_id == subnet_id))
            .map(|port| RouterInterface {
                router_id: router_id.to_string(),
                subnet_id: subnet_id.to_string(),
                port_id: Some(port.id),
            }))
    }

    async fn add_router_interface(
        &self,
        router_id: &str,
        subnet_id: &str,
    ) -> Result<RouterInterface> {
        let info = InterfaceInfo {
            subnet_id: Some(subnet_id.to_string()),
            port_id: None,
        };
        let attached = self.client.add_router_interface(router_id, &info).await?;
        Ok(RouterInterface {
            router_id: router_id.to_string(),
            subnet_id: subnet_id.to_string(),
            port_id: attached.port_id,
        })
    }

    async fn remove_router_interface(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        let info = InterfaceInfo {
            subnet_id: Some(subnet_id.to_string()),
            port_id: None,
        };
        Ok(self.client.remove_router_interface(router_id, &info).await?)
    }
}

#[async_trait]
impl SecurityGroupProvider for OpenStackProvider {
    async fn get_security_group(&self, id: &str) -> Result<SecurityGroup> {
        group_from_wire(self.client.get_security_group(id).await?)
    }

    async fn list_security_groups_by_name(&self, name: &str) -> Result<Vec<SecurityGroup>> {
        self.client
            .list_security_groups(Some(name))
            .await?
            .into_iter()
            .map(group_from_wire)
            .collect()
    }

    async fn create_security_group(&self, name: &str, description: &str) -> Result<SecurityGroup> {
        let req = SecurityGroupCreate {
            name: name.to_string(),
            description: description.to_string(),
        };
        group_from_wire(self.client.create_security_group(&req).await?)
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_security_group(id).await?)
    }

    async fn create_rule(&self, rule: &SecurityGroupRule) -> Result<SecurityGroupRule> {
        rule_from_wire(
            self.client
                .create_security_group_rule(&rule_to_wire(rule))
                .await?,
        )
    }

    async fn delete_rule(&self, rule: &SecurityGroupRule) -> Result<()> {
        Ok(self.client.delete_security_group_rule(&rule.id).await?)
    }
}

#[async_trait]
impl KeypairProvider for OpenStackProvider {
    async fn get_keypair(&self, name: &str) -> Result<Keypair> {
        Ok(keypair_from_wire(self.client.get_keypair(name).await?))
    }

    async fn create_keypair(&self, name: &str, public_key: &str) -> Result<Keypair> {
        let req = KeypairCreate {
            name: name.to_string(),
            public_key: public_key.to_string(),
        };
        Ok(keypair_from_wire(self.client.create_keypair(&req).await?))
    }

    async fn delete_keypair(&self, name: &str) -> Result<()> {
        Ok(self.client.delete_keypair(name).await?)
    }
}

#[async_trait]
impl PublicIpProvider for OpenStackProvider {
    async fn get_public_ip(&self, id: &str) -> Result<PublicIp> {
        Ok(public_ip_from_wire(self.client.get_floating_ip(id).await?))
    }

    async fn list_public_ips_by_name(&self, name: &str) -> Result<Vec<PublicIp>> {
        let query = FloatingIpQuery {
            description: Some(name.to_string()),
            floating_network_id: None,
        };
        let ips = self.client.list_floating_ips(&query).await?;
        Ok(ips.into_iter().map(public_ip_from_wire).collect())
    }

    async fn create_public_ip(&self, spec: &PublicIpSpec) -> Result<PublicIp> {
        let req = FloatingIpCreate {
            floating_network_id: spec.network_id.clone(),
            subnet_id: spec.subnet_id.clone(),
            description: spec.name.clone(),
        };
        Ok(public_ip_from_wire(self.client.create_floating_ip(&req).await?))
    }

    async fn delete_public_ip(&self, id: &str) -> Result<()> {
        Ok(self.client.delete_floating_ip(id).await?)
    }
}

#[async_trait]
impl ServerProvider for OpenStackProvider {
    async fn list_servers_in_network(&self, network_id: &str) -> Result<Vec<Server>> {
        let ports = self
            .client
            .list_ports(&PortQuery {
                network_id: Some(network_id.to_string()),
                device_id: None,
                device_owner: None,
            })
            .await?;

        let server_ids: BTreeSet<String> = ports
            .into_iter()
            .filter(|p| p.device_owner.starts_with(COMPUTE_OWNER_PREFIX))
            .map(|p| p.device_id)
            .collect();

        let mut servers = Vec::new();
        for id in server_ids {
            match self.client.get_server(&id).await {
                Ok(server) => servers.push(Server {
                    id: server.id,
                    name: server.name,
                    network_ids: vec![network_id.to_string()],
                }),
                Err(e) => {
                    let err = CloudError::from(e);
                    if !err.is_not_found() {
                        return Err(err);
                    }
                    // Deleted while its port is still being cleaned up
                    servers.push(Server {
                        id: id.clone(),
                        name: id,
                        network_ids: vec![network_id.to_string()],
                    });
                }
            }
        }
        Ok(servers)
    }
}
