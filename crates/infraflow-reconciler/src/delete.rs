//! Delete graph
//!
//! The recover tasks first rebuild the IDs a previous run may not have
//! persisted, by name. Deletions then run in reverse creation order. Every
//! deleted resource leaves a deletion marker, so a teardown interrupted
//! halfway does not look up what it already removed. The final cleanup task
//! only runs when every deletion succeeded and removes all state.
//!
//! Configured (pinned) resources are never deleted, and an interface between
//! a configured router and a configured subnet is left attached.

use crate::context::FlowContext;
use crate::converge::{keypair, network, public_ip, router, secgroup, subnet};
use crate::keys;
use infraflow_cloud::CloudError;
use infraflow_flow::{Graph, dependencies, do_if, timeout};
use std::sync::Arc;

pub const RECOVER_ROUTER_ID: &str = "recover router ID";
pub const RECOVER_NETWORK_ID: &str = "recover network ID";
pub const RECOVER_SUBNET_ID: &str = "recover subnet ID";
pub const RECOVER_SECURITY_GROUP: &str = "recover security group";
pub const RECOVER_EGRESS_PUBLIC_IP: &str = "recover egress public ip";
pub const DELETE_SSH_KEY_PAIR: &str = "delete ssh key pair";
pub const DELETE_KUBERNETES_ROUTES: &str = "delete kubernetes routes";
pub const DELETE_ROUTER_INTERFACE: &str = "delete router interface";
pub const CHECK_REMAINING_SERVERS: &str = "check remaining servers";
pub const DELETE_ROUTER: &str = "delete router";
pub const DELETE_SUBNET: &str = "delete subnet";
pub const DELETE_NETWORK: &str = "delete network";
pub const DELETE_SECURITY_GROUP: &str = "delete security group";
pub const DELETE_EGRESS_PUBLIC_IP: &str = "delete egress public ip";
pub const CLEANUP_MARKER: &str = "cleanup marker";

impl FlowContext {
    pub(crate) fn delete_graph(&self) -> Graph<FlowContext> {
        let sna = self.config.shared_network_area;
        let owns_router = self.config.owns_router();
        let owns_network = self.config.owns_network();
        let owns_subnet = self.config.owns_subnet();
        let short = self.settings.task_timeout;
        let long = self.settings.long_task_timeout;

        let mut g = Graph::new("delete");

        let recover_router = g.add_task(
            RECOVER_ROUTER_ID,
            |ctx: Arc<FlowContext>| async move { ctx.recover_router_id().await },
            [timeout(short)],
        );
        let recover_network = g.add_task(
            RECOVER_NETWORK_ID,
            |ctx: Arc<FlowContext>| async move { ctx.recover_network_id().await },
            [timeout(short)],
        );
        let recover_subnet = g.add_task(
            RECOVER_SUBNET_ID,
            |ctx: Arc<FlowContext>| async move { ctx.recover_subnet_id().await },
            [timeout(short), dependencies([recover_network])],
        );
        let recover_security_group = g.add_task(
            RECOVER_SECURITY_GROUP,
            |ctx: Arc<FlowContext>| async move { ctx.recover_security_group().await },
            [timeout(short)],
        );
        let recover_public_ip = g.add_task(
            RECOVER_EGRESS_PUBLIC_IP,
            |ctx: Arc<FlowContext>| async move { ctx.recover_egress_public_ip().await },
            [timeout(short)],
        );

        let delete_keypair = g.add_task(
            DELETE_SSH_KEY_PAIR,
            |ctx: Arc<FlowContext>| async move { ctx.delete_ssh_key_pair().await },
            [timeout(short)],
        );
        let delete_routes = g.add_task(
            DELETE_KUBERNETES_ROUTES,
            |ctx: Arc<FlowContext>| async move { ctx.delete_kubernetes_routes().await },
            [timeout(short), do_if(!sna), dependencies([recover_router])],
        );
        let delete_interface = g.add_task(
            DELETE_ROUTER_INTERFACE,
            |ctx: Arc<FlowContext>| async move { ctx.delete_router_interface().await },
            [
                timeout(long),
                do_if(!sna && (owns_router || owns_subnet)),
                dependencies([recover_router, recover_subnet, delete_routes]),
            ],
        );
        let check_servers = g.add_task(
            CHECK_REMAINING_SERVERS,
            |ctx: Arc<FlowContext>| async move { ctx.check_remaining_servers().await },
            [
                timeout(short),
                do_if(owns_subnet),
                dependencies([recover_network]),
            ],
        );
        let delete_router = g.add_task(
            DELETE_ROUTER,
            |ctx: Arc<FlowContext>| async move { ctx.delete_router().await },
            [
                timeout(long),
                do_if(owns_router),
                dependencies([delete_interface]),
            ],
        );
        let delete_subnet = g.add_task(
            DELETE_SUBNET,
            |ctx: Arc<FlowContext>| async move { ctx.delete_subnet().await },
            [
                timeout(short),
                do_if(owns_subnet),
                dependencies([delete_interface, check_servers]),
            ],
        );
        let delete_network = g.add_task(
            DELETE_NETWORK,
            |ctx: Arc<FlowContext>| async move { ctx.delete_network().await },
            [
                timeout(short),
                do_if(owns_network),
                dependencies([delete_subnet]),
            ],
        );
        let delete_security_group = g.add_task(
            DELETE_SECURITY_GROUP,
            |ctx: Arc<FlowContext>| async move { ctx.delete_security_group().await },
            [
                timeout(short),
                dependencies([recover_security_group, check_servers]),
            ],
        );
        let delete_public_ip = g.add_task(
            DELETE_EGRESS_PUBLIC_IP,
            |ctx: Arc<FlowContext>| async move { ctx.delete_egress_public_ip().await },
            [timeout(long), dependencies([recover_public_ip])],
        );

        g.add_task(
            CLEANUP_MARKER,
            |ctx: Arc<FlowContext>| async move { ctx.cleanup_marker() },
            [dependencies([
                delete_keypair,
                delete_routes,
                delete_interface,
                delete_router,
                delete_subnet,
                delete_network,
                delete_security_group,
                delete_public_ip,
            ])],
        );

        g
    }

    async fn recover_router_id(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::ROUTER) {
            return Ok(());
        }
        if let Some(id) = self.config.pinned_router_id() {
            self.board.set(keys::ROUTER, id);
            return Ok(());
        }
        if self.config.shared_network_area || self.board.get_non_empty(keys::ROUTER).is_some() {
            return Ok(());
        }

        let name = &self.cluster.technical_id;
        if let Some(found) = router::find_router(self.providers.router.as_ref(), None, name).await? {
            tracing::info!("Recovered router ID: {} ({})", found.id, name);
            self.board.set(keys::ROUTER, found.id);
        }
        Ok(())
    }

    async fn recover_network_id(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::NETWORK) {
            return Ok(());
        }
        if let Some(id) = self.config.pinned_network_id() {
            self.board.set(keys::NETWORK, id);
            return Ok(());
        }
        if self.board.get_non_empty(keys::NETWORK).is_some() {
            return Ok(());
        }

        let name = &self.cluster.technical_id;
        if let Some(found) =
            network::find_network(self.providers.network.as_ref(), None, name).await?
        {
            tracing::info!("Recovered network ID: {} ({})", found.id, name);
            self.board.set(keys::NETWORK, found.id);
        }
        Ok(())
    }

    async fn recover_subnet_id(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::SUBNET) {
            return Ok(());
        }
        if let Some(id) = self.config.pinned_subnet_id() {
            self.board.set(keys::SUBNET, id);
            return Ok(());
        }
        if self.board.get_non_empty(keys::SUBNET).is_some() {
            return Ok(());
        }
        let Some(network_id) = self.board.get_non_empty(keys::NETWORK) else {
            return Ok(());
        };

        let name = &self.cluster.technical_id;
        if let Some(found) =
            subnet::find_subnet(self.providers.network.as_ref(), None, &network_id, name).await?
        {
            tracing::info!("Recovered subnet ID: {} ({})", found.id, name);
            self.board.set(keys::SUBNET, found.id);
        }
        Ok(())
    }

    async fn recover_security_group(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::SECURITY_GROUP)
            || self.board.get_non_empty(keys::SECURITY_GROUP).is_some()
        {
            return Ok(());
        }

        let name = &self.cluster.technical_id;
        if let Some(found) =
            secgroup::find_security_group(self.providers.security_group.as_ref(), None, name)
                .await?
        {
            tracing::info!("Recovered security group ID: {} ({})", found.id, name);
            self.board.set(keys::SECURITY_GROUP, found.id);
        }
        Ok(())
    }

    async fn recover_egress_public_ip(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::EGRESS_PUBLIC_IP)
            || self.board.get_non_empty(keys::EGRESS_PUBLIC_IP).is_some()
        {
            return Ok(());
        }

        let name = self.egress_public_ip_name();
        if let Some(found) =
            public_ip::find_public_ip(self.providers.public_ip.as_ref(), None, &name).await?
        {
            tracing::info!("Recovered egress public IP ID: {} ({})", found.id, name);
            self.board.set(keys::EGRESS_PUBLIC_IP, found.id);
        }
        Ok(())
    }

    async fn delete_ssh_key_pair(&self) -> anyhow::Result<()> {
        if self.board.is_already_deleted(keys::KEY_PAIR) {
            return Ok(());
        }
        keypair::delete_keypair(self.providers.keypair.as_ref(), &self.cluster.technical_id)
            .await?;
        self.board.set_as_deleted(keys::KEY_PAIR);
        Ok(())
    }

    async fn delete_kubernetes_routes(&self) -> anyhow::Result<()> {
        let Some(router_id) = self.board.get_non_empty(keys::ROUTER) else {
            return Ok(());
        };
        let removed = router::remove_routes_via(
            self.providers.router.as_ref(),
            &router_id,
            &self.workers,
            &self.settings.retry,
        )
        .await?;
        if removed == 0 {
            tracing::debug!("No routes via {} on router {}", self.workers, router_id);
        }
        Ok(())
    }

    async fn delete_router_interface(&self) -> anyhow::Result<()> {
        let (Some(router_id), Some(subnet_id)) = (
            self.board.get_non_empty(keys::ROUTER),
            self.board.get_non_empty(keys::SUBNET),
        ) else {
            tracing::debug!("Router or subnet unknown, no interface to delete");
            return Ok(());
        };
        router::delete_router_interface(self.providers.router.as_ref(), &router_id, &subnet_id)
            .await?;
        Ok(())
    }

    async fn check_remaining_servers(&self) -> anyhow::Result<()> {
        let Some(network_id) = self.board.get_non_empty(keys::NETWORK) else {
            return Ok(());
        };
        let servers = self
            .providers
            .server
            .list_servers_in_network(&network_id)
            .await?;
        if servers.is_empty() {
            return Ok(());
        }

        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        Err(CloudError::Dependency(format!(
            "{} server(s) still attached to network {}: {}",
            servers.len(),
            network_id,
            names.join(", ")
        ))
        .into())
    }

    async fn delete_router(&self) -> anyhow::Result<()> {
        if let Some(id) = self.board.get_non_empty(keys::ROUTER) {
            router::delete_router(self.providers.router.as_ref(), &id).await?;
            self.board.set_as_deleted(keys::ROUTER);
            self.board.delete(keys::ROUTER_NAME);
            self.board.delete(keys::ROUTER_IP);
            self.board.delete(keys::EGRESS_CIDRS);
        }
        Ok(())
    }

    async fn delete_subnet(&self) -> anyhow::Result<()> {
        if let Some(id) = self.board.get_non_empty(keys::SUBNET) {
            subnet::delete_subnet(self.providers.network.as_ref(), &id).await?;
            self.board.set_as_deleted(keys::SUBNET);
            self.board.delete(keys::SUBNET_CIDR);
            self.board.delete(keys::DNS_NAMESERVERS);
        }
        Ok(())
    }

    async fn delete_network(&self) -> anyhow::Result<()> {
        if let Some(id) = self.board.get_non_empty(keys::NETWORK) {
            network::delete_network(self.providers.network.as_ref(), &id).await?;
            self.board.set_as_deleted(keys::NETWORK);
            self.board.delete(keys::NETWORK_NAME);
        }
        Ok(())
    }

    async fn delete_security_group(&self) -> anyhow::Result<()> {
        if let Some(id) = self.board.get_non_empty(keys::SECURITY_GROUP) {
            secgroup::delete_security_group(self.providers.security_group.as_ref(), &id).await?;
            self.board.set_as_deleted(keys::SECURITY_GROUP);
            self.board.delete(keys::SECURITY_GROUP_NAME);
            self.board.delete_object(keys::SECURITY_GROUP_OBJECT);
        }
        Ok(())
    }

    async fn delete_egress_public_ip(&self) -> anyhow::Result<()> {
        if let Some(id) = self.board.get_non_empty(keys::EGRESS_PUBLIC_IP) {
            public_ip::delete_public_ip(self.providers.public_ip.as_ref(), &id).await?;
            self.board.set_as_deleted(keys::EGRESS_PUBLIC_IP);
            if self.config.shared_network_area {
                self.board.delete(keys::EGRESS_CIDRS);
            }
        }
        Ok(())
    }

    fn cleanup_marker(&self) -> anyhow::Result<()> {
        for key in keys::ALL {
            self.board.delete(key);
        }
        self.board.delete_object(keys::SECURITY_GROUP_OBJECT);
        let markers = self.board.clear_deleted_markers();
        tracing::debug!(
            "Cleared infrastructure state of {} ({} deletion markers)",
            self.cluster.technical_id,
            markers
        );
        Ok(())
    }
}
