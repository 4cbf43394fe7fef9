//! Shared network area discovery
//!
//! In a shared network area the network, its subnet and the router already
//! exist and are used by several clusters. They are looked up, never
//! changed or deleted.

use super::network::get_pinned_network;
use super::subnet::get_pinned_subnet;
use infraflow_cloud::{
    CloudError, Network, NetworkProvider, Result, Router, RouterProvider, Subnet, SubnetFilter,
};

#[derive(Debug, Clone)]
pub struct SharedNetworkArea {
    pub network: Network,
    pub subnet: Subnet,
    pub router: Router,
}

/// Discover the topology around the configured network.
///
/// The subnet is the configured one, else the only subnet of the network.
/// Exactly one router must be attached to the network.
pub async fn discover(
    networks: &dyn NetworkProvider,
    routers: &dyn RouterProvider,
    network_id: &str,
    subnet_id: Option<&str>,
) -> Result<SharedNetworkArea> {
    let network = get_pinned_network(networks, network_id).await?;

    let subnet = match subnet_id {
        Some(id) => get_pinned_subnet(networks, id, network_id).await?,
        None => {
            let mut subnets = networks
                .list_subnets(&SubnetFilter::in_network(network_id))
                .await?;
            if subnets.len() != 1 {
                return Err(CloudError::InvalidConfig(format!(
                    "shared network {} has {} subnets, configure networks.subnetId",
                    network_id,
                    subnets.len()
                )));
            }
            subnets.remove(0)
        }
    };

    let mut attached = routers.list_routers_attached_to_network(network_id).await?;
    if attached.len() != 1 {
        return Err(CloudError::InvalidConfig(format!(
            "expected exactly one router attached to shared network {}, found {}",
            network_id,
            attached.len()
        )));
    }
    let router = attached.remove(0);

    tracing::debug!(
        "Discovered shared network area: network {}, subnet {}, router {}",
        network.id,
        subnet.id,
        router.id
    );
    Ok(SharedNetworkArea {
        network,
        subnet,
        router,
    })
}
