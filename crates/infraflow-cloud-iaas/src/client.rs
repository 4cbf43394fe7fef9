//! Unified IaaS API client abstraction
//!
//! List endpoints take no filters; callers filter client-side. Updates are
//! PATCH requests.

use crate::error::Result;
use crate::types::{
    IaasKeypair, IaasNetwork, IaasPublicIp, IaasRouter, IaasRule, IaasSecurityGroup, IaasServer,
    IaasSubnet, NetworkCreate, NetworkPatch, PublicIpCreate, RouterCreate, RouterPatch,
    RuleCreate, SecurityGroupCreate, SubnetCreate, SubnetPatch,
};
use async_trait::async_trait;

#[async_trait]
pub trait IaasClient: Send + Sync {
    async fn list_networks(&self) -> Result<Vec<IaasNetwork>>;
    async fn get_network(&self, id: &str) -> Result<IaasNetwork>;
    async fn create_network(&self, req: &NetworkCreate) -> Result<IaasNetwork>;
    async fn patch_network(&self, id: &str, patch: &NetworkPatch) -> Result<IaasNetwork>;
    async fn delete_network(&self, id: &str) -> Result<()>;

    async fn list_subnets(&self, network_id: &str) -> Result<Vec<IaasSubnet>>;
    async fn get_subnet(&self, id: &str) -> Result<IaasSubnet>;
    async fn create_subnet(&self, req: &SubnetCreate) -> Result<IaasSubnet>;
    async fn patch_subnet(&self, id: &str, patch: &SubnetPatch) -> Result<IaasSubnet>;
    async fn delete_subnet(&self, id: &str) -> Result<()>;

    async fn list_routers(&self) -> Result<Vec<IaasRouter>>;
    async fn get_router(&self, id: &str) -> Result<IaasRouter>;
    async fn create_router(&self, req: &RouterCreate) -> Result<IaasRouter>;
    async fn patch_router(&self, id: &str, patch: &RouterPatch) -> Result<IaasRouter>;
    async fn delete_router(&self, id: &str) -> Result<()>;
    async fn attach_subnet(&self, router_id: &str, subnet_id: &str) -> Result<IaasRouter>;
    async fn detach_subnet(&self, router_id: &str, subnet_id: &str) -> Result<()>;

    async fn list_security_groups(&self) -> Result<Vec<IaasSecurityGroup>>;
    async fn get_security_group(&self, id: &str) -> Result<IaasSecurityGroup>;
    async fn create_security_group(&self, req: &SecurityGroupCreate)
    -> Result<IaasSecurityGroup>;
    async fn delete_security_group(&self, id: &str) -> Result<()>;
    async fn create_rule(&self, security_group_id: &str, req: &RuleCreate) -> Result<IaasRule>;
    async fn delete_rule(&self, security_group_id: &str, rule_id: &str) -> Result<()>;

    async fn get_keypair(&self, name: &str) -> Result<IaasKeypair>;
    async fn create_keypair(&self, req: &IaasKeypair) -> Result<IaasKeypair>;
    async fn delete_keypair(&self, name: &str) -> Result<()>;

    async fn list_public_ips(&self) -> Result<Vec<IaasPublicIp>>;
    async fn get_public_ip(&self, id: &str) -> Result<IaasPublicIp>;
    async fn create_public_ip(&self, req: &PublicIpCreate) -> Result<IaasPublicIp>;
    async fn delete_public_ip(&self, id: &str) -> Result<()>;

    async fn list_servers(&self) -> Result<Vec<IaasServer>>;
}
