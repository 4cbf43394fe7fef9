//! Cluster security group

use infraflow_cloud::{
    ResourceKind, Result, SecurityGroup, SecurityGroupProvider, find_existing, ignore_not_found,
};

pub async fn find_security_group(
    provider: &dyn SecurityGroupProvider,
    known_id: Option<&str>,
    name: &str,
) -> Result<Option<SecurityGroup>> {
    find_existing(
        ResourceKind::SecurityGroup,
        known_id,
        name,
        |id| async move { provider.get_security_group(&id).await },
        |name| async move { provider.list_security_groups_by_name(&name).await },
    )
    .await
}

/// Find or create the security group; rules are reconciled separately
pub async fn ensure_security_group(
    provider: &dyn SecurityGroupProvider,
    known_id: Option<&str>,
    name: &str,
    description: &str,
) -> Result<SecurityGroup> {
    if let Some(group) = find_security_group(provider, known_id, name).await? {
        tracing::debug!("Security group exists: {} ({})", group.name, group.id);
        return Ok(group);
    }

    tracing::info!("Creating security group: {}", name);
    provider.create_security_group(name, description).await
}

/// Delete a security group; returns false when it was already gone
pub async fn delete_security_group(provider: &dyn SecurityGroupProvider, id: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_security_group(id).await)? {
        Some(()) => {
            tracing::info!("Deleted security group: {}", id);
            Ok(true)
        }
        None => {
            tracing::debug!("Security group not found, nothing to delete: {}", id);
            Ok(false)
        }
    }
}
