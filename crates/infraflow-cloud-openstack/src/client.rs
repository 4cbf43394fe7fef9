//! OpenStack API client abstraction
//!
//! The HTTP layer (authentication, endpoint catalog, pagination) lives
//! behind this trait. One method per Neutron/Nova call used by the
//! capability implementations.

use crate::error::Result;
use crate::types::{
    FloatingIp, FloatingIpCreate, FloatingIpQuery, InterfaceInfo, KeypairCreate, NetworkCreate,
    NetworkQuery, NetworkUpdate, NeutronNetwork, NeutronRouter, NeutronSecurityGroup,
    NeutronSecurityGroupRule, NeutronSubnet, NovaKeypair, NovaServer, Port, PortQuery,
    RouterCreate, RouterUpdate, SecurityGroupCreate, SecurityGroupRuleCreate, SubnetCreate,
    SubnetQuery, SubnetUpdate,
};
use async_trait::async_trait;

#[async_trait]
pub trait OpenStackClient: Send + Sync {
    // networking/v2.0/networks
    async fn list_networks(&self, query: &NetworkQuery) -> Result<Vec<NeutronNetwork>>;
    async fn get_network(&self, id: &str) -> Result<NeutronNetwork>;
    async fn create_network(&self, req: &NetworkCreate) -> Result<NeutronNetwork>;
    async fn update_network(&self, id: &str, req: &NetworkUpdate) -> Result<NeutronNetwork>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    // networking/v2.0/subnets
    async fn list_subnets(&self, query: &SubnetQuery) -> Result<Vec<NeutronSubnet>>;
    async fn get_subnet(&self, id: &str) -> Result<NeutronSubnet>;
    async fn create_subnet(&self, req: &SubnetCreate) -> Result<NeutronSubnet>;
    async fn update_subnet(&self, id: &str, req: &SubnetUpdate) -> Result<NeutronSubnet>;
    async fn delete_subnet(&self, id: &str) -> Result<()>;

    // networking/v2.0/routers
    async fn list_routers(&self, name: Option<&str>) -> Result<Vec<NeutronRouter>>;
    async fn get_router(&self, id: &str) -> Result<NeutronRouter>;
    async fn create_router(&self, req: &RouterCreate) -> Result<NeutronRouter>;
    async fn update_router(&self, id: &str, req: &RouterUpdate) -> Result<NeutronRouter>;
    async fn delete_router(&self, id: &str) -> Result<()>;
    async fn add_router_interface(
        &self,
        router_id: &str,
        info: &InterfaceInfo,
    ) -> Result<InterfaceInfo>;
    async fn remove_router_interface(&self, router_id: &str, info: &InterfaceInfo) -> Result<()>;

    // networking/v2.0/ports
    async fn list_ports(&self, query: &PortQuery) -> Result<Vec<Port>>;

    // networking/v2.0/security-groups
    async fn list_security_groups(&self, name: Option<&str>) -> Result<Vec<NeutronSecurityGroup>>;
    async fn get_security_group(&self, id: &str) -> Result<NeutronSecurityGroup>;
    async fn create_security_group(
        &self,
        req: &SecurityGroupCreate,
    ) -> Result<NeutronSecurityGroup>;
    async fn delete_security_group(&self, id: &str) -> Result<()>;
    async fn create_security_group_rule(
        &self,
        req: &SecurityGroupRuleCreate,
    ) -> Result<NeutronSecurityGroupRule>;
    async fn delete_security_group_rule(&self, id: &str) -> Result<()>;

    // compute/v2.1/os-keypairs
    async fn get_keypair(&self, name: &str) -> Result<NovaKeypair>;
    async fn create_keypair(&self, req: &KeypairCreate) -> Result<NovaKeypair>;
    async fn delete_keypair(&self, name: &str) -> Result<()>;

    // networking/v2.0/floatingips
    async fn list_floating_ips(&self, query: &FloatingIpQuery) -> Result<Vec<FloatingIp>>;
    async fn get_floating_ip(&self, id: &str) -> Result<FloatingIp>;
    async fn create_floating_ip(&self, req: &FloatingIpCreate) -> Result<FloatingIp>;
    async fn delete_floating_ip(&self, id: &str) -> Result<()>;

    // compute/v2.1/servers
    async fn get_server(&self, id: &str) -> Result<NovaServer>;
}
