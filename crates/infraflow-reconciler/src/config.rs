//! Desired infrastructure configuration
//!
//! Deserialised from YAML or JSON with camelCase field names:
//!
//! ```yaml
//! floatingPoolName: public
//! floatingPoolSubnetName: public-v4
//! networks:
//!   workers: 10.250.0.0/16
//!   # id: <existing network>
//!   # subnetId: <existing subnet, requires id>
//!   # router:
//!   #   id: <existing router>
//! dnsServers: [10.0.0.53]
//! sharedNetworkArea: false
//! ```

use crate::error::ConfigError;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureConfig {
    /// Name of the external network routers and public IPs attach to
    pub floating_pool_name: String,

    /// Restrict external addresses to this subnet of the floating pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_pool_subnet_name: Option<String>,

    #[serde(default)]
    pub networks: NetworksConfig,

    /// Overrides the cluster's default DNS servers for the node subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_servers: Option<Vec<String>>,

    /// Use an existing, shared network/subnet/router and egress through a
    /// dedicated public IP
    #[serde(default)]
    pub shared_network_area: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworksConfig {
    /// Existing network to use instead of creating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Existing subnet to use; only valid together with `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<RouterRef>,

    /// CIDR of the node subnet
    #[serde(default)]
    pub workers: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterRef {
    pub id: String,
}

impl InfrastructureConfig {
    /// Load a configuration file. JSON is accepted as it is valid YAML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn pinned_network_id(&self) -> Option<&str> {
        non_empty(self.networks.id.as_deref())
    }

    pub fn pinned_subnet_id(&self) -> Option<&str> {
        non_empty(self.networks.subnet_id.as_deref())
    }

    pub fn pinned_router_id(&self) -> Option<&str> {
        non_empty(self.networks.router.as_ref().map(|r| r.id.as_str()))
    }

    pub fn floating_pool_subnet_name(&self) -> Option<&str> {
        non_empty(self.floating_pool_subnet_name.as_deref())
    }

    /// Whether the network is created and deleted by the flows
    pub fn owns_network(&self) -> bool {
        !self.shared_network_area && self.pinned_network_id().is_none()
    }

    pub fn owns_subnet(&self) -> bool {
        !self.shared_network_area && self.pinned_subnet_id().is_none()
    }

    pub fn owns_router(&self) -> bool {
        !self.shared_network_area && self.pinned_router_id().is_none()
    }

    /// Parsed workers CIDR
    pub fn workers_cidr(&self) -> Result<IpNet, ConfigError> {
        parse_cidr("networks.workers", &self.networks.workers)
    }

    /// Check the configuration against the cluster it is applied to
    pub fn validate(&self, cluster: &ClusterInfo) -> Result<(), ConfigError> {
        if self.floating_pool_name.trim().is_empty() {
            return Err(ConfigError::invalid("floatingPoolName", "must not be empty"));
        }

        let workers = self.workers_cidr()?;
        if !matches!(workers, IpNet::V4(_)) {
            return Err(ConfigError::invalid(
                "networks.workers",
                "must be an IPv4 CIDR",
            ));
        }

        if self.pinned_subnet_id().is_some() && self.pinned_network_id().is_none() {
            return Err(ConfigError::invalid(
                "networks.subnetId",
                "requires networks.id",
            ));
        }

        if self.shared_network_area {
            if self.pinned_network_id().is_none() {
                return Err(ConfigError::invalid(
                    "networks.id",
                    "is required in shared network area mode",
                ));
            }
            if self.pinned_router_id().is_some() {
                return Err(ConfigError::invalid(
                    "networks.router.id",
                    "cannot be set in shared network area mode",
                ));
            }
        }

        if let Some(servers) = &self.dns_servers {
            validate_addresses("dnsServers", servers)?;
        }

        cluster.validate()?;

        if let Some(pods) = cluster.pods_cidr()? {
            if pods.contains(&workers.network()) || workers.contains(&pods.network()) {
                return Err(ConfigError::invalid(
                    "networks.workers",
                    format!("overlaps with the pods CIDR {}", pods),
                ));
            }
        }

        Ok(())
    }

    /// DNS servers for the node subnet: the override, else the cluster defaults
    pub fn effective_dns_servers(&self, cluster: &ClusterInfo) -> Vec<String> {
        match &self.dns_servers {
            Some(servers) if !servers.is_empty() => servers.clone(),
            _ => cluster.default_dns_servers.clone(),
        }
    }
}

/// Cluster the infrastructure belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    /// Source of every resource name
    pub technical_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods_cidr: Option<String>,

    #[serde(default)]
    pub default_dns_servers: Vec<String>,
}

impl ClusterInfo {
    pub fn new(technical_id: impl Into<String>) -> Self {
        Self {
            technical_id: technical_id.into().trim().to_string(),
            ..Default::default()
        }
    }

    /// Same cluster with surrounding whitespace removed from the technical ID
    pub fn normalized(mut self) -> Self {
        let trimmed = self.technical_id.trim();
        if trimmed.len() != self.technical_id.len() {
            self.technical_id = trimmed.to_string();
        }
        self
    }

    pub fn with_ssh_public_key(mut self, key: impl Into<String>) -> Self {
        self.ssh_public_key = Some(key.into());
        self
    }

    pub fn with_pods_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.pods_cidr = Some(cidr.into());
        self
    }

    pub fn with_default_dns_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_dns_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn ssh_public_key(&self) -> Option<&str> {
        self.ssh_public_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn pods_cidr(&self) -> Result<Option<IpNet>, ConfigError> {
        non_empty(self.pods_cidr.as_deref())
            .map(|cidr| parse_cidr("podsCidr", cidr))
            .transpose()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let id = self.technical_id.trim();
        if id.is_empty() {
            return Err(ConfigError::invalid("technicalId", "must not be empty"));
        }
        if id.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "technicalId",
                "must not contain whitespace",
            ));
        }
        self.pods_cidr()?;
        validate_addresses("defaultDnsServers", &self.default_dns_servers)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_cidr(field: &str, value: &str) -> Result<IpNet, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    value
        .trim()
        .parse::<IpNet>()
        .map_err(|e| ConfigError::invalid(field, format!("invalid CIDR {:?}: {}", value, e)))
}

fn validate_addresses(field: &str, values: &[String]) -> Result<(), ConfigError> {
    for value in values {
        value.parse::<IpAddr>().map_err(|_| {
            ConfigError::invalid(field, format!("invalid IP address {:?}", value))
        })?;
    }
    Ok(())
}
