//! In-memory [`IaasClient`] for tests
//!
//! Mirrors the conflicts of the real API (network, subnet and router still
//! in use), records every call and can inject one-shot failures per
//! operation.

use crate::client::IaasClient;
use crate::error::{IaasError, Result};
use crate::types::{
    IaasKeypair, IaasNetwork, IaasPublicIp, IaasRouter, IaasRule, IaasSecurityGroup, IaasServer,
    IaasSubnet, Labels, NetworkCreate, NetworkPatch, Nic, PublicIpCreate, RouterCreate,
    RouterPatch, RuleCreate, SecurityGroupCreate, SubnetCreate, SubnetPatch,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Store {
    networks: BTreeMap<String, IaasNetwork>,
    subnets: BTreeMap<String, IaasSubnet>,
    routers: BTreeMap<String, IaasRouter>,
    security_groups: BTreeMap<String, IaasSecurityGroup>,
    keypairs: BTreeMap<String, IaasKeypair>,
    public_ips: BTreeMap<String, IaasPublicIp>,
    servers: BTreeMap<String, IaasServer>,
    next_address: u32,
}

impl Store {
    /// Address on an external network, checking the network and subnet
    fn external_address(&mut self, network_id: &str, subnet_id: Option<&str>) -> Result<String> {
        let network = self
            .networks
            .get(network_id)
            .ok_or_else(|| IaasError::not_found("network", network_id))?;
        if !network.external {
            return Err(IaasError::api(
                400,
                "network.not-external",
                format!("network {} is not external", network_id),
            ));
        }
        if let Some(subnet_id) = subnet_id {
            let in_network = self
                .subnets
                .get(subnet_id)
                .is_some_and(|s| s.network_id == network_id);
            if !in_network {
                return Err(IaasError::api(
                    400,
                    "subnet.invalid",
                    format!("subnet {} is not part of network {}", subnet_id, network_id),
                ));
            }
        }
        self.next_address += 1;
        Ok(format!("198.51.100.{}", 9 + self.next_address))
    }

    fn first_subnet_of(&self, network_id: &str) -> Option<String> {
        self.subnets
            .values()
            .find(|s| s.network_id == network_id)
            .map(|s| s.id.clone())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// In-memory IaaS API
#[derive(Default)]
pub struct InMemoryIaas {
    store: Mutex<Store>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, VecDeque<IaasError>>>,
}

impl InMemoryIaas {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

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
    pub fn fail_next(&self, op: &str, err: IaasError) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

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
    pub fn add_external_network(&self, name: &str, prefix: &str) -> String {
        let mut store = self.store();
        let network_id = new_id();
        store.networks.insert(
            network_id.clone(),
            IaasNetwork {
                id: network_id.clone(),
                name: name.to_string(),
                labels: Labels::new(),
                admin_state: "UP".to_string(),
                external: true,
                mtu: Some(1500),
            },
        );
        let subnet_id = new_id();
        store.subnets.insert(
            subnet_id.clone(),
            IaasSubnet {
                id: subnet_id,
                name: format!("{}-subnet", name),
                network_id: network_id.clone(),
                prefix: prefix.to_string(),
                nameservers: vec![],
                gateway: None,
                labels: Labels::new(),
            },
        );
        network_id
    }

    /// Add a server with a NIC in the network and return its ID
    pub fn add_server(&self, name: &str, network_id: &str) -> String {
        let id = new_id();
        self.store().servers.insert(
            id.clone(),
            IaasServer {
                id: id.clone(),
                name: name.to_string(),
                nics: vec![Nic {
                    network_id: network_id.to_string(),
                    ipv4: None,
                }],
            },
        );
        id
    }

    pub fn remove_server(&self, server_id: &str) {
        self.store().servers.remove(server_id);
    }

    pub fn networks(&self) -> Vec<IaasNetwork> {
        self.store().networks.values().cloned().collect()
    }

    pub fn subnets(&self) -> Vec<IaasSubnet> {
        self.store().subnets.values().cloned().collect()
    }

    pub fn routers(&self) -> Vec<IaasRouter> {
        self.store().routers.values().cloned().collect()
    }

    pub fn security_groups(&self) -> Vec<IaasSecurityGroup> {
        self.store().security_groups.values().cloned().collect()
    }

    pub fn keypairs(&self) -> Vec<IaasKeypair> {
        self.store().keypairs.values().cloned().collect()
    }

    pub fn public_ips(&self) -> Vec<IaasPublicIp> {
        self.store().public_ips.values().cloned().collect()
    }
}

#[async_trait]
impl IaasClient for InMemoryIaas {
    async fn list_networks(&self) -> Result<Vec<IaasNetwork>> {
        self.record("list_networks", "*")?;
        Ok(self.store().networks.values().cloned().collect())
    }

    async fn get_network(&self, id: &str) -> Result<IaasNetwork> {
        self.record("get_network", id)?;
        self.store()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("network", id))
    }

    async fn create_network(&self, req: &NetworkCreate) -> Result<IaasNetwork> {
        self.record("create_network", &req.name)?;
        let network = IaasNetwork {
            id: new_id(),
            name: req.name.clone(),
            labels: req.labels.clone(),
            admin_state: req.admin_state.clone(),
            external: false,
            mtu: Some(1450),
        };
        self.store()
            .networks
            .insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn patch_network(&self, id: &str, patch: &NetworkPatch) -> Result<IaasNetwork> {
        self.record("patch_network", id)?;
        let mut store = self.store();
        let network = store
            .networks
            .get_mut(id)
            .ok_or_else(|| IaasError::not_found("network", id))?;
        if let Some(name) = &patch.name {
            network.name = name.clone();
        }
        if let Some(state) = &patch.admin_state {
            network.admin_state = state.clone();
        }
        Ok(network.clone())
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.record("delete_network", id)?;
        let mut store = self.store();
        if !store.networks.contains_key(id) {
            return Err(IaasError::not_found("network", id));
        }
        let in_use = store.subnets.values().any(|s| s.network_id == id)
            || store
                .servers
                .values()
                .any(|s| s.nics.iter().any(|n| n.network_id == id));
        if in_use {
            return Err(IaasError::conflict(
                "network.in-use",
                format!("network {} still has subnets or servers", id),
            ));
        }
        store.networks.remove(id);
        Ok(())
    }

    async fn list_subnets(&self, network_id: &str) -> Result<Vec<IaasSubnet>> {
        self.record("list_subnets", network_id)?;
        let store = self.store();
        if !store.networks.contains_key(network_id) {
            return Err(IaasError::not_found("network", network_id));
        }
        Ok(store
            .subnets
            .values()
            .filter(|s| s.network_id == network_id)
            .cloned()
            .collect())
    }

    async fn get_subnet(&self, id: &str) -> Result<IaasSubnet> {
        self.record("get_subnet", id)?;
        self.store()
            .subnets
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("subnet", id))
    }

    async fn create_subnet(&self, req: &SubnetCreate) -> Result<IaasSubnet> {
        self.record("create_subnet", &req.name)?;
        let mut store = self.store();
        if !store.networks.contains_key(&req.network_id) {
            return Err(IaasError::not_found("network", &req.network_id));
        }
        let subnet = IaasSubnet {
            id: new_id(),
            name: req.name.clone(),
            network_id: req.network_id.clone(),
            prefix: req.prefix.clone(),
            nameservers: req.nameservers.clone(),
            gateway: None,
            labels: req.labels.clone(),
        };
        store.subnets.insert(subnet.id.clone(), subnet.clone());
        Ok(subnet)
    }

    async fn patch_subnet(&self, id: &str, patch: &SubnetPatch) -> Result<IaasSubnet> {
        self.record("patch_subnet", id)?;
        let mut store = self.store();
        let subnet = store
            .subnets
            .get_mut(id)
            .ok_or_else(|| IaasError::not_found("subnet", id))?;
        if let Some(nameservers) = &patch.nameservers {
            subnet.nameservers = nameservers.clone();
        }
        Ok(subnet.clone())
    }

    async fn delete_subnet(&self, id: &str) -> Result<()> {
        self.record("delete_subnet", id)?;
        let mut store = self.store();
        if !store.subnets.contains_key(id) {
            return Err(IaasError::not_found("subnet", id));
        }
        if store.routers.values().any(|r| r.subnets.iter().any(|s| s == id)) {
            return Err(IaasError::conflict(
                "subnet.in-use",
                format!("subnet {} is attached to a router", id),
            ));
        }
        store.subnets.remove(id);
        Ok(())
    }

    async fn list_routers(&self) -> Result<Vec<IaasRouter>> {
        self.record("list_routers", "*")?;
        Ok(self.store().routers.values().cloned().collect())
    }

    async fn get_router(&self, id: &str) -> Result<IaasRouter> {
        self.record("get_router", id)?;
        self.store()
            .routers
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("router", id))
    }

    async fn create_router(&self, req: &RouterCreate) -> Result<IaasRouter> {
        self.record("create_router", &req.name)?;
        let mut store = self.store();
        let (external_subnet_id, external_address) = match &req.external_network_id {
            Some(network_id) => {
                let address =
                    store.external_address(network_id, req.external_subnet_id.as_deref())?;
                let subnet = req
                    .external_subnet_id
                    .clone()
                    .or_else(|| store.first_subnet_of(network_id));
                (subnet, Some(address))
            }
            None => (None, None),
        };
        let router = IaasRouter {
            id: new_id(),
            name: req.name.clone(),
            labels: req.labels.clone(),
            external_network_id: req.external_network_id.clone(),
            external_subnet_id,
            external_address,
            snat: req.snat,
            subnets: vec![],
            static_routes: vec![],
        };
        store.routers.insert(router.id.clone(), router.clone());
        Ok(router)
    }

    async fn patch_router(&self, id: &str, patch: &RouterPatch) -> Result<IaasRouter> {
        self.record("patch_router", id)?;
        let mut store = self.store();
        let current = store
            .routers
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("router", id))?;

        let mut updated = current;
        if let Some(name) = &patch.name {
            updated.name = name.clone();
        }
        if let Some(network_id) = &patch.external_network_id {
            let gateway_changed = updated.external_network_id.as_ref() != Some(network_id)
                || (patch.external_subnet_id.is_some()
                    && patch.external_subnet_id != updated.external_subnet_id);
            if gateway_changed {
                let address =
                    store.external_address(network_id, patch.external_subnet_id.as_deref())?;
                updated.external_subnet_id = patch
                    .external_subnet_id
                    .clone()
                    .or_else(|| store.first_subnet_of(network_id));
                updated.external_network_id = Some(network_id.clone());
                updated.external_address = Some(address);
            }
        }
        if let Some(snat) = patch.snat {
            updated.snat = snat;
        }
        if let Some(routes) = &patch.static_routes {
            updated.static_routes = routes.clone();
        }
        store.routers.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete_router(&self, id: &str) -> Result<()> {
        self.record("delete_router", id)?;
        let mut store = self.store();
        let router = store
            .routers
            .get(id)
            .ok_or_else(|| IaasError::not_found("router", id))?;
        if !router.subnets.is_empty() {
            return Err(IaasError::conflict(
                "router.in-use",
                format!("router {} still has attached subnets", id),
            ));
        }
        store.routers.remove(id);
        Ok(())
    }

    async fn attach_subnet(&self, router_id: &str, subnet_id: &str) -> Result<IaasRouter> {
        self.record("attach_subnet", &format!("{} {}", router_id, subnet_id))?;
        let mut store = self.store();
        if !store.subnets.contains_key(subnet_id) {
            return Err(IaasError::not_found("subnet", subnet_id));
        }
        let router = store
            .routers
            .get_mut(router_id)
            .ok_or_else(|| IaasError::not_found("router", router_id))?;
        if router.subnets.iter().any(|s| s == subnet_id) {
            return Err(IaasError::conflict(
                "router.subnet-already-attached",
                format!("subnet {} is already attached", subnet_id),
            ));
        }
        router.subnets.push(subnet_id.to_string());
        Ok(router.clone())
    }

    async fn detach_subnet(&self, router_id: &str, subnet_id: &str) -> Result<()> {
        self.record("detach_subnet", &format!("{} {}", router_id, subnet_id))?;
        let mut store = self.store();
        let router = store
            .routers
            .get_mut(router_id)
            .ok_or_else(|| IaasError::not_found("router", router_id))?;
        let before = router.subnets.len();
        router.subnets.retain(|s| s != subnet_id);
        if router.subnets.len() == before {
            return Err(IaasError::not_found("router attachment", subnet_id));
        }
        Ok(())
    }

    async fn list_security_groups(&self) -> Result<Vec<IaasSecurityGroup>> {
        self.record("list_security_groups", "*")?;
        Ok(self.store().security_groups.values().cloned().collect())
    }

    async fn get_security_group(&self, id: &str) -> Result<IaasSecurityGroup> {
        self.record("get_security_group", id)?;
        self.store()
            .security_groups
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("security group", id))
    }

    async fn create_security_group(
        &self,
        req: &SecurityGroupCreate,
    ) -> Result<IaasSecurityGroup> {
        self.record("create_security_group", &req.name)?;
        let group = IaasSecurityGroup {
            id: new_id(),
            name: req.name.clone(),
            description: req.description.clone(),
            labels: req.labels.clone(),
            rules: vec![],
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
            .ok_or_else(|| IaasError::not_found("security group", id))
    }

    async fn create_rule(&self, security_group_id: &str, req: &RuleCreate) -> Result<IaasRule> {
        self.record("create_rule", security_group_id)?;
        let mut store = self.store();
        let group = store
            .security_groups
            .get_mut(security_group_id)
            .ok_or_else(|| IaasError::not_found("security group", security_group_id))?;

        let duplicate = group.rules.iter().any(|r| {
            r.direction == req.direction
                && r.ethertype == req.ethertype
                && r.protocol == req.protocol
                && r.port_range == req.port_range
                && r.ip_range == req.ip_range
                && r.remote_security_group_id == req.remote_security_group_id
        });
        if duplicate {
            return Err(IaasError::conflict("rule.duplicate", "rule already exists"));
        }

        let now = chrono::Utc::now().to_rfc3339();
        let rule = IaasRule {
            id: new_id(),
            security_group_id: security_group_id.to_string(),
            description: req.description.clone(),
            direction: req.direction.clone(),
            ethertype: req.ethertype.clone(),
            protocol: req.protocol.clone(),
            port_range: req.port_range,
            ip_range: req.ip_range.clone(),
            remote_security_group_id: req.remote_security_group_id.clone(),
            created_at: Some(now.clone()),
            updated_at: Some(now),
        };
        group.rules.push(rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, security_group_id: &str, rule_id: &str) -> Result<()> {
        self.record("delete_rule", rule_id)?;
        let mut store = self.store();
        let group = store
            .security_groups
            .get_mut(security_group_id)
            .ok_or_else(|| IaasError::not_found("security group", security_group_id))?;
        let before = group.rules.len();
        group.rules.retain(|r| r.id != rule_id);
        if group.rules.len() == before {
            return Err(IaasError::not_found("rule", rule_id));
        }
        Ok(())
    }

    async fn get_keypair(&self, name: &str) -> Result<IaasKeypair> {
        self.record("get_keypair", name)?;
        self.store()
            .keypairs
            .get(name)
            .cloned()
            .ok_or_else(|| IaasError::not_found("keypair", name))
    }

    async fn create_keypair(&self, req: &IaasKeypair) -> Result<IaasKeypair> {
        self.record("create_keypair", &req.name)?;
        let mut store = self.store();
        if store.keypairs.contains_key(&req.name) {
            return Err(IaasError::conflict(
                "keypair.exists",
                format!("keypair {} already exists", req.name),
            ));
        }
        store.keypairs.insert(req.name.clone(), req.clone());
        Ok(req.clone())
    }

    async fn delete_keypair(&self, name: &str) -> Result<()> {
        self.record("delete_keypair", name)?;
        self.store()
            .keypairs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IaasError::not_found("keypair", name))
    }

    async fn list_public_ips(&self) -> Result<Vec<IaasPublicIp>> {
        self.record("list_public_ips", "*")?;
        Ok(self.store().public_ips.values().cloned().collect())
    }

    async fn get_public_ip(&self, id: &str) -> Result<IaasPublicIp> {
        self.record("get_public_ip", id)?;
        self.store()
            .public_ips
            .get(id)
            .cloned()
            .ok_or_else(|| IaasError::not_found("public ip", id))
    }

    async fn create_public_ip(&self, req: &PublicIpCreate) -> Result<IaasPublicIp> {
        self.record("create_public_ip", &req.network_id)?;
        let mut store = self.store();
        let ip = store.external_address(&req.network_id, req.subnet_id.as_deref())?;
        let public_ip = IaasPublicIp {
            id: new_id(),
            ip,
            network_id: req.network_id.clone(),
            labels: req.labels.clone(),
            network_interface: None,
        };
        store
            .public_ips
            .insert(public_ip.id.clone(), public_ip.clone());
        Ok(public_ip)
    }

    async fn delete_public_ip(&self, id: &str) -> Result<()> {
        self.record("delete_public_ip", id)?;
        self.store()
            .public_ips
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| IaasError::not_found("public ip", id))
    }

    async fn list_servers(&self) -> Result<Vec<IaasServer>> {
        self.record("list_servers", "*")?;
        Ok(self.store().servers.values().cloned().collect())
    }
}
