//! Networks, including the external floating pool network

use super::require_pinned;
use infraflow_cloud::{
    CloudError, Network, NetworkProvider, NetworkSpec, ResourceKind, Result, Subnet, SubnetFilter,
    find_existing, ignore_not_found, single_match,
};

/// Look up the floating pool among the external networks
pub async fn find_floating_network(
    provider: &dyn NetworkProvider,
    pool_name: &str,
) -> Result<Network> {
    let found = provider.list_external_networks(pool_name).await?;
    single_match(ResourceKind::Network, pool_name, found)?.ok_or_else(|| {
        CloudError::InvalidConfig(format!("floating pool {:?} not found", pool_name))
    })
}

/// Look up the subnet of the floating pool external addresses come from
pub async fn find_floating_pool_subnet(
    provider: &dyn NetworkProvider,
    network_id: &str,
    subnet_name: &str,
) -> Result<Subnet> {
    let filter = SubnetFilter::in_network(network_id).named(subnet_name);
    let found = provider.list_subnets(&filter).await?;
    single_match(ResourceKind::Subnet, subnet_name, found)?.ok_or_else(|| {
        CloudError::InvalidConfig(format!(
            "floating pool subnet {:?} not found in network {}",
            subnet_name, network_id
        ))
    })
}

pub async fn get_pinned_network(provider: &dyn NetworkProvider, id: &str) -> Result<Network> {
    require_pinned(ResourceKind::Network, id, provider.get_network(id).await)
}

pub async fn find_network(
    provider: &dyn NetworkProvider,
    known_id: Option<&str>,
    name: &str,
) -> Result<Option<Network>> {
    find_existing(
        ResourceKind::Network,
        known_id,
        name,
        |id| async move { provider.get_network(&id).await },
        |name| async move { provider.list_networks_by_name(&name).await },
    )
    .await
}

/// Find, update or create the owned network
pub async fn ensure_network(
    provider: &dyn NetworkProvider,
    known_id: Option<&str>,
    spec: &NetworkSpec,
) -> Result<Network> {
    match find_network(provider, known_id, &spec.name).await? {
        Some(network) if network.admin_state_up == spec.admin_state_up => {
            tracing::debug!("Network is up to date: {} ({})", network.name, network.id);
            Ok(network)
        }
        Some(network) => {
            tracing::info!(
                "Updating network {}: admin_state_up {} -> {}",
                network.id,
                network.admin_state_up,
                spec.admin_state_up
            );
            provider.update_network(&network.id, spec).await
        }
        None => {
            tracing::info!("Creating network: {}", spec.name);
            provider.create_network(spec).await
        }
    }
}

/// Delete a network; returns false when it was already gone
pub async fn delete_network(provider: &dyn NetworkProvider, id: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_network(id).await)? {
        Some(()) => {
            tracing::info!("Deleted network: {}", id);
            Ok(true)
        }
        None => {
            tracing::debug!("Network not found, nothing to delete: {}", id);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud_openstack::{InMemoryOpenStack, OpenStackProvider};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryOpenStack>, OpenStackProvider) {
        let api = Arc::new(InMemoryOpenStack::new());
        let provider = OpenStackProvider::new(api.clone());
        (api, provider)
    }

    fn spec(name: &str) -> NetworkSpec {
        NetworkSpec {
            name: name.to_string(),
            admin_state_up: true,
        }
    }

    #[tokio::test]
    async fn test_floating_network_lookup() {
        let (api, provider) = setup();
        let id = api.add_external_network("public", "203.0.113.0/24");

        let network = find_floating_network(&provider, "public").await.unwrap();
        assert_eq!(network.id, id);

        let err = find_floating_network(&provider, "missing").await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));

        api.add_external_network("public", "198.51.100.0/24");
        let err = find_floating_network(&provider, "public").await.unwrap_err();
        assert!(matches!(err, CloudError::MultipleMatches { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_floating_pool_subnet_lookup() {
        let (api, provider) = setup();
        let id = api.add_external_network("public", "203.0.113.0/24");

        let subnet = find_floating_pool_subnet(&provider, &id, "public-subnet")
            .await
            .unwrap();
        assert_eq!(subnet.network_id, id);

        let err = find_floating_pool_subnet(&provider, &id, "other")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_ensure_network_is_idempotent() {
        let (api, provider) = setup();

        let created = ensure_network(&provider, None, &spec("shoot")).await.unwrap();
        api.clear_calls();

        let again = ensure_network(&provider, Some(&created.id), &spec("shoot"))
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
        assert!(api.mutating_calls().is_empty());

        // unknown ID falls back to the name
        let by_name = ensure_network(&provider, Some("stale-id"), &spec("shoot"))
            .await
            .unwrap();
        assert_eq!(by_name.id, created.id);
        assert_eq!(api.networks().len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_network_updates_admin_state() {
        let (api, provider) = setup();
        let created = ensure_network(
            &provider,
            None,
            &NetworkSpec {
                name: "shoot".to_string(),
                admin_state_up: false,
            },
        )
        .await
        .unwrap();
        assert!(!created.admin_state_up);

        let updated = ensure_network(&provider, Some(&created.id), &spec("shoot"))
            .await
            .unwrap();
        assert!(updated.admin_state_up);
        assert!(api.mutating_calls().iter().any(|c| c.starts_with("update_network")));
    }

    #[tokio::test]
    async fn test_pinned_network_must_exist() {
        let (_api, provider) = setup();
        let err = get_pinned_network(&provider, "net-404").await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_delete_network_tolerates_absence() {
        let (_api, provider) = setup();
        let created = ensure_network(&provider, None, &spec("shoot")).await.unwrap();
        assert!(delete_network(&provider, &created.id).await.unwrap());
        assert!(!delete_network(&provider, &created.id).await.unwrap());
    }
}
