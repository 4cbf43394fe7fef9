//! In-memory [`OpenStackClient`] for tests
//!
//! Keeps Neutron/Nova objects in maps, enforces the referential conflicts
//! the real API reports (network in use, subnet in use, router in use),
//! records every call and can inject one-shot failures per operation.

use crate::client::OpenStackClient;
use crate::error::{OpenStackError, Result};
use crate::types::{
    COMPUTE_OWNER_PREFIX, ExternalFixedIp, ExternalGatewayInfo, FloatingIp, FloatingIpCreate,
    FloatingIpQuery, InterfaceInfo, KeypairCreate, NetworkCreate, NetworkQuery, NetworkUpdate,
    NeutronNetwork, NeutronRouter, NeutronSecurityGroup, NeutronSecurityGroupRule, NeutronSubnet,
    NovaKeypair, NovaServer, Port, PortFixedIp, PortQuery, ROUTER_INTERFACE_OWNER, RouterCreate,
    RouterUpdate, SecurityGroupCreate, SecurityGroupRuleCreate, SubnetCreate, SubnetQuery,
    SubnetUpdate,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Store {
    networks: BTreeMap<String, NeutronNetwork>,
    subnets: BTreeMap<String, NeutronSubnet>,
    routers: BTreeMap<String, NeutronRouter>,
    ports: BTreeMap<String, Port>,
    security_groups: BTreeMap<String, NeutronSecurityGroup>,
    keypairs: BTreeMap<String, NovaKeypair>,
    floating_ips: BTreeMap<String, FloatingIp>,
    servers: BTreeMap<String, NovaServer>,
    next_external_ip: u32,
}

impl Store {
    fn allocate_external_ip(&mut self) -> String {
        self.next_external_ip += 1;
        format!("203.0.113.{}", 9 + self.next_external_ip)
    }

    /// External fixed IP for a router or floating IP on `network_id`
    fn external_address(
        &mut self,
        network_id: &str,
        subnet_id: Option<&str>,
    ) -> Result<ExternalFixedIp> {
        let network = self
            .networks
            .get(network_id)
            .ok_or_else(|| OpenStackError::not_found("network", network_id))?;
        if !network.external {
            return Err(OpenStackError::bad_request(
                "BadRequest",
                format!("network {} is not external", network_id),
            ));
        }
        let subnet_id = match subnet_id {
            Some(id) => {
                if !network.subnets.iter().any(|s| s == id) {
                    return Err(OpenStackError::bad_request(
                        "BadRequest",
                        format!("subnet {} is not part of network {}", id, network_id),
                    ));
                }
                id.to_string()
            }
            None => network.subnets.first().cloned().unwrap_or_default(),
        };
        Ok(ExternalFixedIp {
            subnet_id,
            ip_address: self.allocate_external_ip(),
        })
    }

    fn resolve_gateway(&mut self, gw: &ExternalGatewayInfo) -> Result<ExternalGatewayInfo> {
        let requested = gw.external_fixed_ips.first().map(|ip| ip.subnet_id.as_str());
        let address = self.external_address(&gw.network_id, requested)?;
        Ok(ExternalGatewayInfo {
            network_id: gw.network_id.clone(),
            enable_snat: gw.enable_snat.or(Some(true)),
            external_fixed_ips: vec![address],
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// In-memory OpenStack
#[derive(Default)]
pub struct InMemoryOpenStack {
    store: Mutex<Store>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<OpenStackError>>>,
}

impl InMemoryOpenStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Log the call and return an injected failure, if one is queued
    fn record(&self, op: &str, detail: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{} {}", op, detail));

        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        match failures.get_mut(op).and_then(|queue| queue.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Make the next call of `op` fail with `err`. Calls queue up.
    pub fn fail_next(&self, op: &str, err: OpenStackError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Every call so far, as `"<operation> <argument>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Calls whose operation is not a read (`get_`/`list_`)
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get_") && !c.starts_with("list_"))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Add an external network with one subnet and return the network ID
    pub fn add_external_network(&self, name: &str, cidr: &str) -> String {
        let mut store = self.store();
        let network_id = new_id();
        let subnet_id = new_id();
        store.subnets.insert(
            subnet_id.clone(),
            NeutronSubnet {
                id: subnet_id.clone(),
                name: format!("{}-subnet", name),
                network_id: network_id.clone(),
                cidr: cidr.to_string(),
                ip_version: 4,
                gateway_ip: None,
                dns_nameservers: vec![],
            },
        );
        store.networks.insert(
            network_id.clone(),
            NeutronNetwork {
                id: network_id.clone(),
                name: name.to_string(),
                admin_state_up: true,
                external: true,
                subnets: vec![subnet_id],
                mtu: Some(1500),
            },
        );
        network_id
    }

    /// Add a server with a port in the network and return its ID
    pub fn add_server(&self, name: &str, network_id: &str) -> String {
        let mut store = self.store();
        let server_id = new_id();
        let subnet_id = store
            .networks
            .get(network_id)
            .and_then(|n| n.subnets.first().cloned())
            .unwrap_or_default();
        let port_id = new_id();
        store.ports.insert(
            port_id.clone(),
            Port {
                id: port_id,
                network_id: network_id.to_string(),
                device_id: server_id.clone(),
                device_owner: format!("{}nova", COMPUTE_OWNER_PREFIX),
                fixed_ips: vec![PortFixedIp {
                    subnet_id,
                    ip_address: String::new(),
                }],
            },
        );
        store.servers.insert(
            server_id.clone(),
            NovaServer {
                id: server_id.clone(),
                name: name.to_string(),
                addresses: BTreeMap::new(),
            },
        );
        server_id
    }

    /// Remove a server together with its ports
    pub fn remove_server(&self, server_id: &str) {
        let mut store = self.store();
        store.servers.remove(server_id);
        store.ports.retain(|_, p| p.device_id != server_id);
    }

    pub fn networks(&self) -> Vec<NeutronNetwork> {
        self.store().networks.values().cloned().collect()
    }

    pub fn subnets(&self) -> Vec<NeutronSubnet> {
        self.store().subnets.values().cloned().collect()
    }

    pub fn routers(&self) -> Vec<NeutronRouter> {
        self.store().routers.values().cloned().collect()
    }

    pub fn ports(&self) -> Vec<Port> {
        self.store().ports.values().cloned().collect()
    }

    pub fn security_groups(&self) -> Vec<NeutronSecurityGroup> {
        self.store().security_groups.values().cloned().collect()
    }

    pub fn keypairs(&self) -> Vec<NovaKeypair> {
        self.store().keypairs.values().cloned().collect()
    }

    pub fn floating_ips(&self) -> Vec<FloatingIp> {
        self.store().floating_ips.values().cloned().collect()
    }
}

#[async_trait]
impl OpenStackClient for InMemoryOpenStack {
    async fn list_networks(&self, query: &NetworkQuery) -> Result<Vec<NeutronNetwork>> {
        self.record("list_networks", query.name.as_deref().unwrap_or("*"))?;
        Ok(self
            .store()
            .networks
            .values()
            .filter(|n| query.name.as_deref().is_none_or(|name| n.name == name))
            .filter(|n| query.external.is_none_or(|ext| n.external == ext))
            .cloned()
            .collect())
    }

    async fn get_network(&self, id: &str) -> Result<NeutronNetwork> {
        self.record("get_network", id)?;
        self.store()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("network", id))
    }

    async fn create_network(&self, req: &NetworkCreate) -> Result<NeutronNetwork> {
        self.record("create_network", &req.name)?;
        let network = NeutronNetwork {
            id: new_id(),
            name: req.name.clone(),
            admin_state_up: req.admin_state_up,
            external: false,
            subnets: vec![],
            mtu: Some(1450),
        };
        self.store()
            .networks
            .insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn update_network(&self, id: &str, req: &NetworkUpdate) -> Result<NeutronNetwork> {
        self.record("update_network", id)?;
        let mut store = self.store();
        let network = store
            .networks
            .get_mut(id)
            .ok_or_else(|| OpenStackError::not_found("network", id))?;
        if let Some(name) = &req.name {
            network.name = name.clone();
        }
        if let Some(up) = req.admin_state_up {
            network.admin_state_up = up;
        }
        Ok(network.clone())
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.record("delete_network", id)?;
        let mut store = self.store();
        let network = store
            .networks
            .get(id)
            .ok_or_else(|| OpenStackError::not_found("network", id))?;
        if !network.subnets.is_empty() || store.ports.values().any(|p| p.network_id == id) {
            return Err(OpenStackError::conflict(
                "NetworkInUse",
                format!("Unable to complete operation on network {}", id),
            ));
        }
        store.networks.remove(id);
        Ok(())
    }

    async fn list_subnets(&self, query: &SubnetQuery) -> Result<Vec<NeutronSubnet>> {
        self.record(
            "list_subnets",
            query
                .name
                .as_deref()
                .or(query.network_id.as_deref())
                .unwrap_or("*"),
        )?;
        Ok(self
            .store()
            .subnets
            .values()
            .filter(|s| {
                query
                    .network_id
                    .as_deref()
                    .is_none_or(|id| s.network_id == id)
            })
            .filter(|s| query.name.as_deref().is_none_or(|name| s.name == name))
            .cloned()
            .collect())
    }

    async fn get_subnet(&self, id: &str) -> Result<NeutronSubnet> {
        self.record("get_subnet", id)?;
        self.store()
            .subnets
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("subnet", id))
    }

    async fn create_subnet(&self, req: &SubnetCreate) -> Result<NeutronSubnet> {
        self.record("create_subnet", &req.name)?;
        let mut store = self.store();
        let network = store
            .networks
            .get_mut(&req.network_id)
            .ok_or_else(|| OpenStackError::not_found("network", &req.network_id))?;
        let subnet = NeutronSubnet {
            id: new_id(),
            name: req.name.clone(),
            network_id: req.network_id.clone(),
            cidr: req.cidr.clone(),
            ip_version: req.ip_version,
            gateway_ip: None,
            dns_nameservers: req.dns_nameservers.clone(),
        };
        network.subnets.push(subnet.id.clone());
        store.subnets.insert(subnet.id.clone(), subnet.clone());
        Ok(subnet)
    }

    async fn update_subnet(&self, id: &str, req: &SubnetUpdate) -> Result<NeutronSubnet> {
        self.record("update_subnet", id)?;
        let mut store = self.store();
        let subnet = store
            .subnets
            .get_mut(id)
            .ok_or_else(|| OpenStackError::not_found("subnet", id))?;
        subnet.dns_nameservers = req.dns_nameservers.clone();
        Ok(subnet.clone())
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.record("delete_subnet", id)?;
        let mut store = self.store();
        let subnet = store
            .subnets
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("subnet", id))?;
        let in_use = store
            .ports
            .values()
            .any(|p| p.fixed_ips.iter().any(|ip| ip.subnet_id == id));
        if in_use {
            return Err(OpenStackError::conflict(
                "SubnetInUse",
                format!("Unable to complete operation on subnet {}", id),
            ));
        }
        store.subnets.remove(id);
        if let Some(network) = store.networks.get_mut(&subnet.network_id) {
            network.subnets.retain(|s| s != id);
        }
        Ok(())
    }

    async fn list_routers(&self, name: Option<&str>) -> Result<Vec<NeutronRouter>> {
        self.record("list_routers", name.unwrap_or("*"))?;
        Ok(self
            .store()
            .routers
            .values()
            .filter(|r| name.is_none_or(|name| r.name == name))
            .cloned()
            .collect())
    }

    async fn get_router(&self, id: &str) -> Result<NeutronRouter> {
        self.record("get_router", id)?;
        self.store()
            .routers
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("router", id))
    }

    async fn create_router(&self, req: &RouterCreate) -> Result<NeutronRouter> {
        self.record("create_router", &req.name)?;
        let mut store = self.store();
        let external_gateway_info = match &req.external_gateway_info {
            Some(gw) => Some(store.resolve_gateway(gw)?),
            None => None,
        };
        let router = NeutronRouter {
            id: new_id(),
            name: req.name.clone(),
            external_gateway_info,
            routes: vec![],
        };
        store.routers.insert(router.id.clone(), router.clone());
        Ok(router)
    }

    async fn update_router(&self, id: &str, req: &RouterUpdate) -> Result<NeutronRouter> {
        self.record("update_router", id)?;
        let mut store = self.store();
        if !store.routers.contains_key(id) {
            return Err(OpenStackError::not_found("router", id));
        }
        let gateway = match &req.external_gateway_info {
            Some(gw) => Some(store.resolve_gateway(gw)?),
            None => None,
        };
        let router = store
            .routers
            .get_mut(id)
            .ok_or_else(|| OpenStackError::not_found("router", id))?;
        if let Some(name) = &req.name {
            router.name = name.clone();
        }
        if gateway.is_some() {
            router.external_gateway_info = gateway;
        }
        if let Some(routes) = &req.routes {
            router.routes = routes.clone();
        }
        Ok(router.clone())
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        self.record("delete_router", id)?;
        let mut store = self.store();
        if !store.routers.contains_key(id) {
            return Err(OpenStackError::not_found("router", id));
        }
        if store.ports.values().any(|p| p.device_id == id) {
            return Err(OpenStackError::conflict(
                "RouterInUse",
                format!("Router {} still has ports", id),
            ));
        }
        store.routers.remove(id);
        Ok(())
    }

    async fn add_router_interface(
        &self,
        router_id: &str,
        info: &InterfaceInfo,
    ) -> Result<InterfaceInfo> {
        let subnet_id = info.subnet_id.clone().unwrap_or_default();
        self.record("add_router_interface", &format!("{} {}", router_id, subnet_id))?;
        let mut store = self.store();
        if !store.routers.contains_key(router_id) {
            return Err(OpenStackError::not_found("router", router_id));
        }
        let subnet = store
            .subnets
            .get(&subnet_id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("subnet", &subnet_id))?;
        let already = store.ports.values().any(|p| {
            p.device_id == router_id && p.fixed_ips.iter().any(|ip| ip.subnet_id == subnet_id)
        });
        if already {
            return Err(OpenStackError::bad_request(
                "BadRequest",
                format!("Router {} already has a port on subnet {}", router_id, subnet_id),
            ));
        }
        let port = Port {
            id: new_id(),
            network_id: subnet.network_id.clone(),
            device_id: router_id.to_string(),
            device_owner: ROUTER_INTERFACE_OWNER.to_string(),
            fixed_ips: vec![PortFixedIp {
                subnet_id: subnet_id.clone(),
                ip_address: subnet.gateway_ip.clone().unwrap_or_default(),
            }],
        };
        let port_id = port.id.clone();
        store.ports.insert(port_id.clone(), port);
        Ok(InterfaceInfo {
            subnet_id: Some(subnet_id),
            port_id: Some(port_id),
        })
    }

    async fn remove_router_interface(&self, router_id: &str, info: &InterfaceInfo) -> Result<()> {
        let subnet_id = info.subnet_id.clone().unwrap_or_default();
        self.record(
            "remove_router_interface",
            &format!("{} {}", router_id, subnet_id),
        )?;
        let mut store = self.store();
        if !store.routers.contains_key(router_id) {
            return Err(OpenStackError::not_found("router", router_id));
        }
        let port_id = store
            .ports
            .values()
            .find(|p| {
                p.device_id == router_id
                    && p.device_owner == ROUTER_INTERFACE_OWNER
                    && p.fixed_ips.iter().any(|ip| ip.subnet_id == subnet_id)
            })
            .map(|p| p.id.clone())
            .ok_or_else(|| OpenStackError::not_found("port", &subnet_id))?;
        store.ports.remove(&port_id);
        Ok(())
    }

    async fn list_ports(&self, query: &PortQuery) -> Result<Vec<Port>> {
        self.record(
            "list_ports",
            query
                .device_id
                .as_deref()
                .or(query.network_id.as_deref())
                .unwrap_or("*"),
        )?;
        Ok(self
            .store()
            .ports
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    async fn list_security_groups(&self, name: Option<&str>) -> Result<Vec<NeutronSecurityGroup>> {
        self.record("list_security_groups", name.unwrap_or("*"))?;
        Ok(self
            .store()
            .security_groups
            .values()
            .filter(|g| name.is_none_or(|name| g.name == name))
            .cloned()
            .collect())
    }

    async fn get_security_group(&self, id: &str) -> Result<NeutronSecurityGroup> {
        self.record("get_security_group", id)?;
        self.store()
            .security_groups
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("security_group", id))
    }

    async fn create_security_group(
        &self,
        req: &SecurityGroupCreate,
    ) -> Result<NeutronSecurityGroup> {
        self.record("create_security_group", &req.name)?;
        let id = new_id();
        let now = chrono::Utc::now().to_rfc3339();
        // Neutron adds the default egress rules to every new group
        let security_group_rules = ["IPv4", "IPv6"]
            .into_iter()
            .map(|ethertype| NeutronSecurityGroupRule {
                id: new_id(),
                security_group_id: id.clone(),
                description: String::new(),
                direction: "egress".to_string(),
                ethertype: ethertype.to_string(),
                protocol: None,
                port_range_min: None,
                port_range_max: None,
                remote_ip_prefix: None,
                remote_group_id: None,
                created_at: Some(now.clone()),
                updated_at: Some(now.clone()),
            })
            .collect();
        let group = NeutronSecurityGroup {
            id,
            name: req.name.clone(),
            description: req.description.clone(),
            security_group_rules,
        };
        self.store()
            .security_groups
            .insert(group.id.clone(), group.clone());
        Ok(group)
    }

    async fn delete_security_group(&self, id: &str) -> Result<()> {
        self.record("delete_security_group", id)?;
        self.store()
            .security_groups
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::not_found("security_group", id))
    }

    async fn create_security_group_rule(
        &self,
        req: &SecurityGroupRuleCreate,
    ) -> Result<NeutronSecurityGroupRule> {
        self.record("create_security_group_rule", &req.security_group_id)?;
        let mut store = self.store();
        let group = store
            .security_groups
            .get_mut(&req.security_group_id)
            .ok_or_else(|| OpenStackError::not_found("security_group", &req.security_group_id))?;

        let duplicate = group.security_group_rules.iter().any(|r| {
            r.direction == req.direction
                && r.ethertype == req.ethertype
                && r.protocol == req.protocol
                && r.port_range_min == req.port_range_min
                && r.port_range_max == req.port_range_max
                && r.remote_ip_prefix == req.remote_ip_prefix
                && r.remote_group_id == req.remote_group_id
        });
        if duplicate {
            return Err(OpenStackError::conflict(
                "SecurityGroupRuleExists",
                "Security group rule already exists",
            ));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let rule = NeutronSecurityGroupRule {
            id: new_id(),
            security_group_id: req.security_group_id.clone(),
            description: req.description.clone(),
            direction: req.direction.clone(),
            ethertype: req.ethertype.clone(),
            protocol: req.protocol.clone(),
            port_range_min: req.port_range_min,
            port_range_max: req.port_range_max,
            remote_ip_prefix: req.remote_ip_prefix.clone(),
            remote_group_id: req.remote_group_id.clone(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        group.security_group_rules.push(rule.clone());
        Ok(rule)
    }

    async fn delete_security_group_rule(&self, id: &str) -> Result<()> {
        self.record("delete_security_group_rule", id)?;
        let mut store = self.store();
        for group in store.security_groups.values_mut() {
            let before = group.security_group_rules.len();
            group.security_group_rules.retain(|r| r.id != id);
            if group.security_group_rules.len() != before {
                return Ok(());
            }
        }
        Err(OpenStackError::not_found("security_group_rule", id))
    }

    async fn get_keypair(&self, name: &str) -> Result<NovaKeypair> {
        self.record("get_keypair", name)?;
        self.store()
            .keypairs
            .get(name)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("keypair", name))
    }

    async fn create_keypair(&self, req: &KeypairCreate) -> Result<NovaKeypair> {
        self.record("create_keypair", &req.name)?;
        let mut store = self.store();
        if store.keypairs.contains_key(&req.name) {
            return Err(OpenStackError::conflict(
                "KeyPairExists",
                format!("Key pair '{}' already exists", req.name),
            ));
        }
        let keypair = NovaKeypair {
            name: req.name.clone(),
            public_key: req.public_key.clone(),
            fingerprint: None,
        };
        store.keypairs.insert(req.name.clone(), keypair.clone());
        Ok(keypair)
    }

    async fn delete_keypair(&self, name: &str) -> Result<()> {
        self.record("delete_keypair", name)?;
        self.store()
            .keypairs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::not_found("keypair", name))
    }

    async fn list_floating_ips(&self, query: &FloatingIpQuery) -> Result<Vec<FloatingIp>> {
        self.record(
            "list_floating_ips",
            query.description.as_deref().unwrap_or("*"),
        )?;
        Ok(self
            .store()
            .floating_ips
            .values()
            .filter(|f| {
                query
                    .description
                    .as_deref()
                    .is_none_or(|d| f.description == d)
            })
            .filter(|f| {
                query
                    .floating_network_id
                    .as_deref()
                    .is_none_or(|n| f.floating_network_id == n)
            })
            .cloned()
            .collect())
    }

    async fn get_floating_ip(&self, id: &str) -> Result<FloatingIp> {
        self.record("get_floating_ip", id)?;
        self.store()
            .floating_ips
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("floatingip", id))
    }

    async fn create_floating_ip(&self, req: &FloatingIpCreate) -> Result<FloatingIp> {
        self.record("create_floating_ip", &req.description)?;
        let mut store = self.store();
        let address = store.external_address(&req.floating_network_id, req.subnet_id.as_deref())?;
        let ip = FloatingIp {
            id: new_id(),
            floating_ip_address: address.ip_address,
            floating_network_id: req.floating_network_id.clone(),
            description: req.description.clone(),
            port_id: None,
        };
        store.floating_ips.insert(ip.id.clone(), ip.clone());
        Ok(ip)
    }

    async fn delete_floating_ip(&self, id: &str) -> Result<()> {
        self.record("delete_floating_ip", id)?;
        self.store()
            .floating_ips
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| OpenStackError::not_found("floatingip", id))
    }

    async fn get_server(&self, id: &str) -> Result<NovaServer> {
        self.record("get_server", id)?;
        self.store()
            .servers
            .get(id)
            .cloned()
            .ok_or_else(|| OpenStackError::not_found("server", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_in_use_conflict() {
        let os = InMemoryOpenStack::new();
        let network = os
            .create_network(&NetworkCreate {
                name: "n".to_string(),
                admin_state_up: true,
            })
            .await
            .unwrap();
        let subnet = os
            .create_subnet(&SubnetCreate {
                name: "s".to_string(),
                network_id: network.id.clone(),
                cidr: "10.250.0.0/16".to_string(),
                ip_version: 4,
                dns_nameservers: vec![],
            })
            .await
            .unwrap();

        let err = os.delete_network(&network.id).await.unwrap_err();
        assert!(matches!(err, OpenStackError::Http { status: 409, .. }));

        os.delete_subnet(&subnet.id).await.unwrap();
        os.delete_network(&network.id).await.unwrap();
        assert!(os.networks().is_empty());
    }

    #[tokio::test]
    async fn test_router_gateway_gets_external_ip() {
        let os = InMemoryOpenStack::new();
        let ext = os.add_external_network("ext", "203.0.113.0/24");
        let router = os
            .create_router(&RouterCreate {
                name: "r".to_string(),
                external_gateway_info: Some(ExternalGatewayInfo {
                    network_id: ext,
                    enable_snat: None,
                    external_fixed_ips: vec![],
                }),
            })
            .await
            .unwrap();

        let gw = router.external_gateway_info.unwrap();
        assert_eq!(gw.external_fixed_ips.len(), 1);
        assert_eq!(gw.external_fixed_ips[0].ip_address, "203.0.113.10");
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let os = InMemoryOpenStack::new();
        os.fail_next("get_keypair", OpenStackError::Transport("reset".to_string()));

        assert!(matches!(
            os.get_keypair("k").await,
            Err(OpenStackError::Transport(_))
        ));
        assert!(matches!(
            os.get_keypair("k").await,
            Err(OpenStackError::NotFound { .. })
        ));
        assert_eq!(os.calls(), vec!["get_keypair k", "get_keypair k"]);
    }
}
