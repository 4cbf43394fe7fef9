//! Router, router interface and routes

use super::{host_cidr, require_pinned};
use infraflow_cloud::{
    CloudError, ResourceKind, Result, RetryConfig, Route, Router, RouterInterface, RouterProvider,
    RouterSpec, find_existing, ignore_not_found, retry_on_transient,
};
use ipnet::IpNet;
use std::net::IpAddr;

pub async fn get_pinned_router(provider: &dyn RouterProvider, id: &str) -> Result<Router> {
    require_pinned(ResourceKind::Router, id, provider.get_router(id).await)
}

pub async fn find_router(
    provider: &dyn RouterProvider,
    known_id: Option<&str>,
    name: &str,
) -> Result<Option<Router>> {
    find_existing(
        ResourceKind::Router,
        known_id,
        name,
        |id| async move { provider.get_router(&id).await },
        |name| async move { provider.list_routers_by_name(&name).await },
    )
    .await
}

/// Find, update or create the owned router.
///
/// The router is updated when its external gateway is missing or sits on a
/// different network or subnet than requested.
pub async fn ensure_router(
    provider: &dyn RouterProvider,
    known_id: Option<&str>,
    spec: &RouterSpec,
    retry: &RetryConfig,
) -> Result<Router> {
    let Some(router) = find_router(provider, known_id, &spec.name).await? else {
        tracing::info!("Creating router: {}", spec.name);
        return retry_on_transient(retry, "create router", || provider.create_router(spec)).await;
    };

    match &spec.external_gateway {
        Some(gateway) if !router.gateway_matches(gateway) => {
            tracing::info!(
                "Updating external gateway of router {}: {:?} -> {}",
                router.id,
                router.gateway_network_id(),
                gateway.network_id
            );
            retry_on_transient(retry, "update router", || {
                provider.update_router(&router.id, spec)
            })
            .await
        }
        _ => {
            tracing::debug!("Router is up to date: {} ({})", router.name, router.id);
            Ok(router)
        }
    }
}

/// External addresses of the router as host CIDRs (`/32`, `/128`).
///
/// A router without external address cannot provide egress for the cluster
/// and is reported as a configuration error.
pub fn egress_cidrs(router: &Router) -> Result<Vec<String>> {
    let cidrs: Vec<String> = router
        .external_ips()
        .into_iter()
        .filter_map(|ip| {
            let cidr = host_cidr(ip);
            if cidr.is_none() {
                tracing::warn!("Ignoring invalid external IP {:?} of router {}", ip, router.id);
            }
            cidr
        })
        .collect();

    if cidrs.is_empty() {
        return Err(CloudError::InvalidConfig(format!(
            "router {} has no external IP; check the floating pool",
            router.id
        )));
    }
    Ok(cidrs)
}

/// Attach the router to the subnet unless it already is
pub async fn ensure_router_interface(
    provider: &dyn RouterProvider,
    router_id: &str,
    subnet_id: &str,
    retry: &RetryConfig,
) -> Result<RouterInterface> {
    if let Some(interface) = provider.find_router_interface(router_id, subnet_id).await? {
        tracing::debug!("Router {} already attached to subnet {}", router_id, subnet_id);
        return Ok(interface);
    }

    tracing::info!("Attaching router {} to subnet {}", router_id, subnet_id);
    retry_on_transient(retry, "add router interface", || {
        provider.add_router_interface(router_id, subnet_id)
    })
    .await
}

/// Detach the router from the subnet; returns false when it was not attached
pub async fn delete_router_interface(
    provider: &dyn RouterProvider,
    router_id: &str,
    subnet_id: &str,
) -> Result<bool> {
    let existing = ignore_not_found(provider.find_router_interface(router_id, subnet_id).await)?;
    if existing.flatten().is_none() {
        tracing::debug!("Router {} not attached to subnet {}", router_id, subnet_id);
        return Ok(false);
    }

    match ignore_not_found(provider.remove_router_interface(router_id, subnet_id).await)? {
        Some(()) => {
            tracing::info!("Detached router {} from subnet {}", router_id, subnet_id);
            Ok(true)
        }
        None => {
            tracing::debug!("Router {} already detached from subnet {}", router_id, subnet_id);
            Ok(false)
        }
    }
}

/// Remove static routes whose next hop lies in `cidr`; returns how many
pub async fn remove_routes_via(
    provider: &dyn RouterProvider,
    router_id: &str,
    cidr: &IpNet,
    retry: &RetryConfig,
) -> Result<usize> {
    let Some(router) = ignore_not_found(provider.get_router(router_id).await)? else {
        return Ok(0);
    };

    let (removed, kept): (Vec<Route>, Vec<Route>) = router.routes.into_iter().partition(|route| {
        route
            .next_hop
            .parse::<IpAddr>()
            .is_ok_and(|hop| cidr.contains(&hop))
    });
    if removed.is_empty() {
        return Ok(0);
    }

    tracing::info!(
        "Removing {} route(s) via {} from router {}",
        removed.len(),
        cidr,
        router_id
    );
    retry_on_transient(retry, "update routes", || {
        provider.update_routes(router_id, &kept)
    })
    .await?;
    Ok(removed.len())
}

/// Delete a router; returns false when it was already gone
pub async fn delete_router(provider: &dyn RouterProvider, id: &str) -> Result<bool> {
    match ignore_not_found(provider.delete_router(id).await)? {
        Some(()) => {
            tracing::info!("Deleted router: {}", id);
            Ok(true)
        }
        None => {
            tracing::debug!("Router not found, nothing to delete: {}", id);
            Ok(false)
        }
    }
}
