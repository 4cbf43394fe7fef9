//! Reconcile graph
//!
//! ```text
//! ensure external network ──┬──> ensure router ──────────┬──> ensure router interface
//!                           │                            │
//! ensure network ──> ensure subnet ──────────────────────┘
//!
//! discover shared network area ──┐
//! ensure router ─────────────────┼──> ensure security group ──> ensure security group rules
//!                                └──> ensure ssh key pair
//! ensure external network ───────┬──> ensure egress public ip
//! discover shared network area ──┘
//! ```
//!
//! Router, network, subnet and interface tasks only run for clusters with
//! their own network; the discovery and public IP tasks only in a shared
//! network area.

use crate::context::FlowContext;
use crate::converge::{keypair, network, public_ip, router, rules, secgroup, sna, subnet};
use crate::keys;
use anyhow::Context as _;
use infraflow_cloud::{
    CloudError, GatewaySpec, NetworkSpec, PublicIpSpec, RouterSpec, SecurityGroup, SubnetSpec,
};
use infraflow_flow::{Graph, dependencies, do_if, timeout};
use std::sync::Arc;

pub const ENSURE_EXTERNAL_NETWORK: &str = "ensure external network";
pub const DISCOVER_SHARED_NETWORK_AREA: &str = "discover shared network area";
pub const ENSURE_ROUTER: &str = "ensure router";
pub const ENSURE_NETWORK: &str = "ensure network";
pub const ENSURE_SUBNET: &str = "ensure subnet";
pub const ENSURE_ROUTER_INTERFACE: &str = "ensure router interface";
pub const ENSURE_SECURITY_GROUP: &str = "ensure security group";
pub const ENSURE_SECURITY_GROUP_RULES: &str = "ensure security group rules";
pub const ENSURE_SSH_KEY_PAIR: &str = "ensure ssh key pair";
pub const ENSURE_EGRESS_PUBLIC_IP: &str = "ensure egress public ip";

const SECURITY_GROUP_DESCRIPTION: &str = "Cluster nodes";

impl FlowContext {
    pub(crate) fn reconcile_graph(&self) -> Graph<FlowContext> {
        let sna = self.config.shared_network_area;
        let short = self.settings.task_timeout;
        let long = self.settings.long_task_timeout;

        let mut g = Graph::new("reconcile");

        let external_network = g.add_task(
            ENSURE_EXTERNAL_NETWORK,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_external_network().await },
            [timeout(short)],
        );
        let discover = g.add_task(
            DISCOVER_SHARED_NETWORK_AREA,
            |ctx: Arc<FlowContext>| async move { ctx.discover_shared_network_area().await },
            [timeout(short), do_if(sna)],
        );
        let router = g.add_task(
            ENSURE_ROUTER,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_router().await },
            [
                timeout(long),
                do_if(!sna),
                dependencies([external_network]),
            ],
        );
        let network = g.add_task(
            ENSURE_NETWORK,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_network().await },
            [timeout(short), do_if(!sna)],
        );
        let subnet = g.add_task(
            ENSURE_SUBNET,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_subnet().await },
            [timeout(short), do_if(!sna), dependencies([network])],
        );
        g.add_task(
            ENSURE_ROUTER_INTERFACE,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_router_interface().await },
            [timeout(long), do_if(!sna), dependencies([router, subnet])],
        );
        let security_group = g.add_task(
            ENSURE_SECURITY_GROUP,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_security_group().await },
            [timeout(short), dependencies([discover, router])],
        );
        g.add_task(
            ENSURE_SECURITY_GROUP_RULES,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_security_group_rules().await },
            [timeout(short), dependencies([security_group])],
        );
        g.add_task(
            ENSURE_SSH_KEY_PAIR,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_ssh_key_pair().await },
            [timeout(short), dependencies([discover, router])],
        );
        g.add_task(
            ENSURE_EGRESS_PUBLIC_IP,
            |ctx: Arc<FlowContext>| async move { ctx.ensure_egress_public_ip().await },
            [
                timeout(long),
                do_if(sna),
                dependencies([external_network, discover]),
            ],
        );

        g
    }

    /// Whiteboard value a task cannot do without
    pub(crate) fn required(&self, key: &str) -> anyhow::Result<String> {
        self.board
            .get_non_empty(key)
            .with_context(|| format!("{} is not known yet", key))
    }

    fn known(&self, key: &str) -> Option<String> {
        self.board.get_non_empty(key)
    }

    async fn ensure_external_network(&self) -> anyhow::Result<()> {
        let provider = self.providers.network.as_ref();
        let floating =
            network::find_floating_network(provider, &self.config.floating_pool_name).await?;
        self.board.set(keys::FLOATING_NETWORK, &floating.id);
        self.board.set(keys::FLOATING_NETWORK_NAME, &floating.name);

        match self.config.floating_pool_subnet_name() {
            Some(name) => {
                let pool_subnet =
                    network::find_floating_pool_subnet(provider, &floating.id, name).await?;
                self.board.set(keys::FLOATING_POOL_SUBNET, pool_subnet.id);
            }
            None => {
                self.board.delete(keys::FLOATING_POOL_SUBNET);
            }
        }
        Ok(())
    }

    async fn discover_shared_network_area(&self) -> anyhow::Result<()> {
        let network_id = self.config.pinned_network_id().ok_or_else(|| {
            CloudError::InvalidConfig("networks.id is required in a shared network area".into())
        })?;
        let area = sna::discover(
            self.providers.network.as_ref(),
            self.providers.router.as_ref(),
            network_id,
            self.config.pinned_subnet_id(),
        )
        .await?;

        self.board.set(keys::NETWORK, &area.network.id);
        self.board.set(keys::NETWORK_NAME, &area.network.name);
        self.board.set(keys::SUBNET, &area.subnet.id);
        self.board.set(keys::SUBNET_CIDR, &area.subnet.cidr);
        self.board
            .set_list(keys::DNS_NAMESERVERS, &area.subnet.dns_nameservers);
        self.board.set(keys::ROUTER, &area.router.id);
        self.board.set(keys::ROUTER_NAME, &area.router.name);
        match area.router.external_ips().first() {
            Some(ip) => self.board.set(keys::ROUTER_IP, *ip),
            None => {
                self.board.delete(keys::ROUTER_IP);
            }
        }
        Ok(())
    }

    async fn ensure_router(&self) -> anyhow::Result<()> {
        let provider = self.providers.router.as_ref();
        let router = match self.config.pinned_router_id() {
            Some(id) => router::get_pinned_router(provider, id).await?,
            None => {
                let spec = RouterSpec {
                    name: self.cluster.technical_id.clone(),
                    external_gateway: Some(GatewaySpec {
                        network_id: self.required(keys::FLOATING_NETWORK)?,
                        subnet_id: self.known(keys::FLOATING_POOL_SUBNET),
                        enable_snat: None,
                    }),
                };
                let known_id = self.known(keys::ROUTER);
                router::ensure_router(provider, known_id.as_deref(), &spec, &self.settings.retry)
                    .await?
            }
        };
        self.board.set(keys::ROUTER, &router.id);
        self.board.set(keys::ROUTER_NAME, &router.name);

        let egress = router::egress_cidrs(&router)?;
        if let Some(ip) = router.external_ips().first() {
            self.board.set(keys::ROUTER_IP, *ip);
        }
        self.board.set_list(keys::EGRESS_CIDRS, egress);
        Ok(())
    }

    async fn ensure_network(&self) -> anyhow::Result<()> {
        let provider = self.providers.network.as_ref();
        let network = match self.config.pinned_network_id() {
            Some(id) => network::get_pinned_network(provider, id).await?,
            None => {
                let spec = NetworkSpec {
                    name: self.cluster.technical_id.clone(),
                    admin_state_up: true,
                };
                let known_id = self.known(keys::NETWORK);
                network::ensure_network(provider, known_id.as_deref(), &spec).await?
            }
        };
        self.board.set(keys::NETWORK, &network.id);
        self.board.set(keys::NETWORK_NAME, &network.name);
        Ok(())
    }

    async fn ensure_subnet(&self) -> anyhow::Result<()> {
        let provider = self.providers.network.as_ref();
        let network_id = self.required(keys::NETWORK)?;
        let subnet = match self.config.pinned_subnet_id() {
            Some(id) => subnet::get_pinned_subnet(provider, id, &network_id).await?,
            None => {
                let spec = SubnetSpec {
                    name: self.cluster.technical_id.clone(),
                    network_id,
                    cidr: self.workers.trunc().to_string(),
                    ip_version: 4,
                    dns_nameservers: self.config.effective_dns_servers(&self.cluster),
                };
                let known_id = self.known(keys::SUBNET);
                subnet::ensure_subnet(provider, known_id.as_deref(), &spec).await?
            }
        };
        self.board.set(keys::SUBNET, &subnet.id);
        self.board.set(keys::SUBNET_CIDR, &subnet.cidr);
        self.board
            .set_list(keys::DNS_NAMESERVERS, &subnet.dns_nameservers);
        Ok(())
    }

    async fn ensure_router_interface(&self) -> anyhow::Result<()> {
        let router_id = self.required(keys::ROUTER)?;
        let subnet_id = self.required(keys::SUBNET)?;
        router::ensure_router_interface(
            self.providers.router.as_ref(),
            &router_id,
            &subnet_id,
            &self.settings.retry,
        )
        .await?;
        Ok(())
    }

    async fn ensure_security_group(&self) -> anyhow::Result<()> {
        let known_id = self.known(keys::SECURITY_GROUP);
        let group = secgroup::ensure_security_group(
            self.providers.security_group.as_ref(),
            known_id.as_deref(),
            &self.cluster.technical_id,
            SECURITY_GROUP_DESCRIPTION,
        )
        .await?;
        self.board.set(keys::SECURITY_GROUP, &group.id);
        self.board.set(keys::SECURITY_GROUP_NAME, &group.name);
        self.board.set_object(keys::SECURITY_GROUP_OBJECT, group);
        Ok(())
    }

    async fn ensure_security_group_rules(&self) -> anyhow::Result<()> {
        let provider = self.providers.security_group.as_ref();
        let group = match self.board.get_object::<SecurityGroup>(keys::SECURITY_GROUP_OBJECT) {
            Some(group) => group,
            None => Arc::new(
                provider
                    .get_security_group(&self.required(keys::SECURITY_GROUP)?)
                    .await?,
            ),
        };

        let pods = self.pods.map(|cidr| cidr.trunc().to_string());
        let mut desired =
            rules::desired_rules(&group.id, &self.workers.trunc().to_string(), pods.as_deref());
        let modified =
            rules::reconcile_rules(provider, &group, &mut desired, rules::keep_unwanted).await?;

        if modified {
            tracing::info!("Updated rules of security group {}", group.id);
            let refreshed = provider.get_security_group(&group.id).await?;
            self.board.set_object(keys::SECURITY_GROUP_OBJECT, refreshed);
        } else {
            tracing::debug!("Rules of security group {} are up to date", group.id);
        }
        Ok(())
    }

    async fn ensure_ssh_key_pair(&self) -> anyhow::Result<()> {
        let keypair = keypair::ensure_keypair(
            self.providers.keypair.as_ref(),
            &self.cluster.technical_id,
            self.cluster.ssh_public_key(),
        )
        .await?;
        match keypair {
            Some(keypair) => self.board.set(keys::KEY_PAIR, keypair.name),
            None => {
                self.board.delete(keys::KEY_PAIR);
            }
        }
        Ok(())
    }

    async fn ensure_egress_public_ip(&self) -> anyhow::Result<()> {
        let spec = PublicIpSpec {
            name: self.egress_public_ip_name(),
            network_id: self.required(keys::FLOATING_NETWORK)?,
            subnet_id: self.known(keys::FLOATING_POOL_SUBNET),
        };
        let known_id = self.known(keys::EGRESS_PUBLIC_IP);
        let ip = public_ip::ensure_public_ip(
            self.providers.public_ip.as_ref(),
            known_id.as_deref(),
            &spec,
            &self.settings.retry,
        )
        .await?;
        self.board.set(keys::EGRESS_PUBLIC_IP, &ip.id);

        let cidr = crate::converge::host_cidr(&ip.ip_address).ok_or_else(|| {
            CloudError::InvalidConfig(format!(
                "public IP {} has no valid address: {:?}",
                ip.id, ip.ip_address
            ))
        })?;
        self.board.set_list(keys::EGRESS_CIDRS, [cidr]);
        Ok(())
    }

    pub(crate) fn egress_public_ip_name(&self) -> String {
        format!("{}-egress", self.cluster.technical_id)
    }
}
