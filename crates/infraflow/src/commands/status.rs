use anyhow::Context;
use colored::Colorize;
use infraflow_cloud::{ClusterState, FileStateStore};
use infraflow_reconciler::InfrastructureStatus;
use std::path::Path;

pub async fn handle(
    state_file: Option<&Path>,
    cluster: &str,
    root: &Path,
    json: bool,
) -> anyhow::Result<()> {
    let state = match state_file {
        Some(path) => read_state_file(path, cluster)?,
        None => FileStateStore::new(root, cluster).load().await?,
    };
    let status = InfrastructureStatus::from_flat_state(&state.flat_state);

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} {}", "Cluster:".bold(), state.cluster.cyan());
    if status.is_empty() {
        println!("  {}", "no infrastructure recorded".dimmed());
        return Ok(());
    }
    println!(
        "  {} {}",
        "updated:".dimmed(),
        state.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if let Some(pool) = &status.floating_pool {
        println!("  floating pool: {} ({})", pool.name.cyan(), pool.id);
        if let Some(subnet) = &pool.subnet_id {
            println!("    subnet: {}", subnet);
        }
    }
    if let Some(network) = &status.network {
        println!("  network: {} ({})", network.name.cyan(), network.id);
    }
    if let Some(subnet) = &status.subnet {
        println!("  subnet: {} ({})", subnet.cidr.cyan(), subnet.id);
        if !subnet.dns_nameservers.is_empty() {
            println!("    dns: {}", subnet.dns_nameservers.join(", "));
        }
    }
    if let Some(router) = &status.router {
        let ip = router.external_ip.as_deref().unwrap_or("-");
        println!("  router: {} (external IP {})", router.id, ip.cyan());
    }
    if let Some(group) = &status.security_group {
        println!("  security group: {} ({})", group.name.cyan(), group.id);
    }
    if let Some(key) = &status.key_name {
        println!("  key pair: {}", key.cyan());
    }
    if let Some(ip) = &status.egress_public_ip_id {
        println!("  egress public IP: {}", ip);
    }
    if !status.egress_cidrs.is_empty() {
        println!("  egress: {}", status.egress_cidrs.join(", ").green());
    }

    Ok(())
}

fn read_state_file(path: &Path, cluster: &str) -> anyhow::Result<ClusterState> {
    tracing::debug!("Reading state file: {}", path.display());
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state: ClusterState = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    if state.cluster != cluster {
        anyhow::bail!(
            "{} holds the state of cluster {:?}, not {:?}",
            path.display(),
            state.cluster,
            cluster
        );
    }
    Ok(state)
}
