//! Provider-neutral resource model
//!
//! Both backends translate their wire types into these structs, so the
//! convergence functions never see backend specifics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub admin_state_up: bool,
    /// Whether the network is an external (floating pool) network
    #[serde(default)]
    pub external: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// Desired attributes of an owned network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub admin_state_up: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    pub ip_version: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<String>,
    #[serde(default)]
    pub dns_nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetSpec {
    pub name: String,
    pub network_id: String,
    pub cidr: String,
    pub ip_version: u8,
    pub dns_nameservers: Vec<String>,
}

/// Lookup filter for subnets; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetFilter {
    pub network_id: Option<String>,
    pub name: Option<String>,
}

impl SubnetFilter {
    pub fn in_network(network_id: impl Into<String>) -> Self {
        Self {
            network_id: Some(network_id.into()),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, subnet: &Subnet) -> bool {
        self.network_id
            .as_deref()
            .is_none_or(|id| subnet.network_id == id)
            && self.name.as_deref().is_none_or(|name| subnet.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    #[serde(default)]
    pub subnet_id: String,
    pub ip_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalGateway {
    pub network_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_snat: Option<bool>,
    #[serde(default)]
    pub external_fixed_ips: Vec<FixedIp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub destination: String,
    pub next_hop: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_gateway: Option<ExternalGateway>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Router {
    /// Addresses the router uses on its external network
    pub fn external_ips(&self) -> Vec<&str> {
        self.external_gateway
            .as_ref()
            .map(|gw| {
                gw.external_fixed_ips
                    .iter()
                    .map(|ip| ip.ip_address.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn gateway_network_id(&self) -> Option<&str> {
        self.external_gateway.as_ref().map(|gw| gw.network_id.as_str())
    }

    /// Whether the gateway already places the router on the given network
    /// (and subnet, when one is requested)
    pub fn gateway_matches(&self, gateway: &GatewaySpec) -> bool {
        let Some(current) = &self.external_gateway else {
            return false;
        };
        if current.network_id != gateway.network_id {
            return false;
        }
        match &gateway.subnet_id {
            Some(subnet_id) => current
                .external_fixed_ips
                .iter()
                .any(|ip| &ip.subnet_id == subnet_id),
            None => true,
        }
    }
}

/// Desired external gateway of a router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySpec {
    pub network_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_snat: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSpec {
    pub name: String,
    pub external_gateway: Option<GatewaySpec>,
}

/// Attachment of a router to a subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterInterface {
    pub router_id: String,
    pub subnet_id: String,
    /// Backing port, for backends that model interfaces as ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ingress => write!(f, "ingress"),
            Direction::Egress => write!(f, "egress"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EtherType {
    IPv4,
    IPv6,
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::IPv4 => write!(f, "IPv4"),
            EtherType::IPv6 => write!(f, "IPv6"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    /// Empty until the rule exists on the provider
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub security_group_id: String,
    #[serde(default)]
    pub description: String,
    pub direction: Direction,
    pub ether_type: EtherType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_min: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range_max: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_ip_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SecurityGroupRule {
    pub fn new(direction: Direction, ether_type: EtherType) -> Self {
        Self {
            id: String::new(),
            security_group_id: String::new(),
            description: String::new(),
            direction,
            ether_type,
            protocol: None,
            port_range_min: None,
            port_range_max: None,
            remote_ip_prefix: None,
            remote_group_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    pub fn ports(mut self, min: u16, max: u16) -> Self {
        self.port_range_min = Some(min);
        self.port_range_max = Some(max);
        self
    }

    pub fn remote_ip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.remote_ip_prefix = Some(prefix.into());
        self
    }

    pub fn remote_group(mut self, group_id: impl Into<String>) -> Self {
        self.remote_group_id = Some(group_id.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Structural equality, ignoring id, owning group, description and
    /// timestamps
    pub fn matches(&self, other: &SecurityGroupRule) -> bool {
        fn norm(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(str::to_ascii_lowercase)
        }

        self.direction == other.direction
            && self.ether_type == other.ether_type
            && norm(&self.protocol) == norm(&other.protocol)
            && self.port_range_min == other.port_range_min
            && self.port_range_max == other.port_range_max
            && norm(&self.remote_ip_prefix) == norm(&other.remote_ip_prefix)
            && norm(&self.remote_group_id) == norm(&other.remote_group_id)
    }
}

impl fmt::Display for SecurityGroupRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.direction,
            self.ether_type,
            self.protocol.as_deref().unwrap_or("any")
        )?;
        if let (Some(min), Some(max)) = (self.port_range_min, self.port_range_max) {
            write!(f, " {}-{}", min, max)?;
        }
        if let Some(prefix) = &self.remote_ip_prefix {
            write!(f, " from {}", prefix)?;
        }
        if let Some(group) = &self.remote_group_id {
            write!(f, " from group {}", group)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rules: Vec<SecurityGroupRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    pub name: String,
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIp {
    pub id: String,
    pub ip_address: String,
    pub network_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicIpSpec {
    pub name: String,
    pub network_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub network_ids: Vec<String>,
}
