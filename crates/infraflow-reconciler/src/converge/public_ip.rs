//! Egress public IP of shared network area clusters

use infraflow_cloud::{
    PublicIp, PublicIpProvider, PublicIpSpec, ResourceKind, Result, RetryConfig, find_existing,
    ignore_not_found, retry_on_transient,
};

pub async fn find_public_ip(
    provider: &dyn PublicIpProvider,
    known_id: Option<&str>,
    name: &str,
) -> Result<Option<PublicIp>> {
    find_existing(
        ResourceKind::PublicIp,
        known_id,
        name,
        |id| async move { provider.get_public_ip(&id).await },
        |name| async move { provider.list_public_ips_by_name(&name).await },
    )
    .await
}

/// Find or allocate the public IP
pub async fn ensure_public_ip(
    provider: &dyn PublicIpProvider,
    known_id: Option<&str>,
    spec: &PublicIpSpec,
    retry: &RetryConfig,
) -> Result<PublicIp> {
    if let Some(ip) = find_public_ip(provider, known_id, &spec.name).await? {
        if ip.network_id != spec.network_id {
            tracing::warn!(
                "Public IP {} ({}) is on network {}, floating pool is {}",
                ip.id,
                ip.ip_address,
                ip.network_id,
                spec.network_id
            );
        }
        tracing::debug!("Public IP exists: {} ({})", spec.name, ip.ip_address);
        return Ok(ip);
    }

    tracing::info!("Allocating public IP: {}", spec.name);
    retry_on_transient(retry, "create public ip", || provider.create_public_ip(spec)).await
}

/// Release a public IP; returns false when it was already gone
pub async fn delete_public_ip(provider: &dyn PublicIpProvider, id: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_public_ip(id).await)? {
        Some(()) => {
            tracing::info!("Released public IP: {}", id);
            Ok(true)
        }
        None => {
            tracing::debug!("Public IP not found, nothing to release: {}", id);
            Ok(false)
        }
    }
}
