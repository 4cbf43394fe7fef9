//! Node subnet

use super::require_pinned;
use infraflow_cloud::{
    CloudError, NetworkProvider, ResourceKind, Result, Subnet, SubnetFilter, SubnetSpec,
    find_existing, ignore_not_found,
};
use ipnet::IpNet;

/// Fetch a configured subnet and check it belongs to the network
pub async fn get_pinned_subnet(
    provider: &dyn NetworkProvider,
    id: &str,
    network_id: &str,
) -> Result<Subnet> {
    let subnet = require_pinned(ResourceKind::Subnet, id, provider.get_subnet(id).await)?;
    if subnet.network_id != network_id {
        return Err(CloudError::InvalidConfig(format!(
            "configured subnet {} belongs to network {}, not {}",
            id, subnet.network_id, network_id
        )));
    }
    Ok(subnet)
}

pub async fn find_subnet(
    provider: &dyn NetworkProvider,
    known_id: Option<&str>,
    network_id: &str,
    name: &str,
) -> Result<Option<Subnet>> {
    find_existing(
        ResourceKind::Subnet,
        known_id,
        name,
        |id| async move { provider.get_subnet(&id).await },
        |name| async move {
            let filter = SubnetFilter::in_network(network_id).named(name);
            provider.list_subnets(&filter).await
        },
    )
    .await
}

/// Find, update or create the owned subnet.
///
/// The CIDR of an existing subnet cannot change; a mismatch is reported as a
/// configuration error. DNS nameservers are updated in place.
pub async fn ensure_subnet(
    provider: &dyn NetworkProvider,
    known_id: Option<&str>,
    spec: &SubnetSpec,
) -> Result<Subnet> {
    let Some(subnet) = find_subnet(provider, known_id, &spec.network_id, &spec.name).await? else {
        tracing::info!("Creating subnet: {} ({})", spec.name, spec.cidr);
        return provider.create_subnet(spec).await;
    };

    if subnet.network_id != spec.network_id {
        return Err(CloudError::InvalidConfig(format!(
            "subnet {} belongs to network {}, expected {}",
            subnet.id, subnet.network_id, spec.network_id
        )));
    }
    if !same_cidr(&subnet.cidr, &spec.cidr) {
        return Err(CloudError::InvalidConfig(format!(
            "subnet {} has CIDR {} but {} is configured; the CIDR of an existing subnet cannot be changed",
            subnet.id, subnet.cidr, spec.cidr
        )));
    }
    if subnet.dns_nameservers != spec.dns_nameservers {
        tracing::info!(
            "Updating DNS nameservers of subnet {}: {:?} -> {:?}",
            subnet.id,
            subnet.dns_nameservers,
            spec.dns_nameservers
        );
        return provider
            .update_subnet_dns(&subnet.id, &spec.dns_nameservers)
            .await;
    }

    tracing::debug!("Subnet is up to date: {} ({})", subnet.name, subnet.id);
    Ok(subnet)
}

/// Delete a subnet; returns false when it was already gone
pub async fn delete_subnet(provider: &dyn NetworkProvider, id: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_subnet(id).await)? {
        Some(()) => {
            tracing::info!("Deleted subnet: {}", id);
            Ok(true)
        }
        None => {
            tracing::debug!("Subnet not found, nothing to delete: {}", id);
            Ok(false)
        }
    }
}

fn same_cidr(live: &str, desired: &str) -> bool {
    match (live.parse::<IpNet>(), desired.parse::<IpNet>()) {
        (Ok(live), Ok(desired)) => live.trunc() == desired.trunc(),
        _ => live == desired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infraflow_cloud::NetworkSpec;
    use infraflow_cloud_openstack::{InMemoryOpenStack, OpenStackProvider};
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryOpenStack>, OpenStackProvider, String) {
        let api = Arc::new(InMemoryOpenStack::new());
        let provider = OpenStackProvider::new(api.clone());
        let network = provider
            .create_network(&NetworkSpec {
                name: "shoot".to_string(),
                admin_state_up: true,
            })
            .await
            .unwrap();
        (api, provider, network.id)
    }

    fn spec(network_id: &str, cidr: &str, dns: &[&str]) -> SubnetSpec {
        SubnetSpec {
            name: "shoot".to_string(),
            network_id: network_id.to_string(),
            cidr: cidr.to_string(),
            ip_version: 4,
            dns_nameservers: dns.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_ensure_subnet_create_then_noop() {
        let (api, provider, network_id) = setup().await;
        let desired = spec(&network_id, "10.250.0.0/16", &["8.8.8.8"]);

        let created = ensure_subnet(&provider, None, &desired).await.unwrap();
        assert_eq!(created.cidr, "10.250.0.0/16");
        api.clear_calls();

        let again = ensure_subnet(&provider, Some(&created.id), &desired)
            .await
            .unwrap();
        assert_eq!(again.id, created.id);
        assert!(api.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_subnet_updates_dns() {
        let (_api, provider, network_id) = setup().await;
        let created = ensure_subnet(&provider, None, &spec(&network_id, "10.250.0.0/16", &[]))
            .await
            .unwrap();

        let updated = ensure_subnet(
            &provider,
            Some(&created.id),
            &spec(&network_id, "10.250.0.0/16", &["1.1.1.1", "8.8.8.8"]),
        )
        .await
        .unwrap();
        assert_eq!(updated.dns_nameservers, vec!["1.1.1.1", "8.8.8.8"]);
    }

    #[tokio::test]
    async fn test_ensure_subnet_rejects_cidr_change() {
        let (_api, provider, network_id) = setup().await;
        let created = ensure_subnet(&provider, None, &spec(&network_id, "10.250.0.0/16", &[]))
            .await
            .unwrap();

        let err = ensure_subnet(
            &provider,
            Some(&created.id),
            &spec(&network_id, "10.251.0.0/16", &[]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_pinned_subnet_must_be_in_network() {
        let (_api, provider, network_id) = setup().await;
        let created = ensure_subnet(&provider, None, &spec(&network_id, "10.250.0.0/16", &[]))
            .await
            .unwrap();

        get_pinned_subnet(&provider, &created.id, &network_id)
            .await
            .unwrap();
        let err = get_pinned_subnet(&provider, &created.id, "other-network")
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[test]
    fn test_same_cidr() {
        assert!(same_cidr("10.250.0.0/16", "10.250.0.0/16"));
        assert!(same_cidr("10.250.1.0/16", "10.250.0.0/16"));
        assert!(!same_cidr("10.250.0.0/16", "10.250.0.0/17"));
    }
}
