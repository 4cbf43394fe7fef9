use colored::Colorize;
use infraflow_reconciler::{ClusterInfo, InfrastructureConfig, Settings};
use std::path::Path;

pub fn handle(
    path: &Path,
    cluster: &str,
    pods_cidr: Option<String>,
    dns: Vec<String>,
) -> anyhow::Result<()> {
    println!("{}", "Validating configuration...".blue());

    let mut info = ClusterInfo::new(cluster).with_default_dns_servers(dns);
    if let Some(pods) = pods_cidr {
        info = info.with_pods_cidr(pods);
    }

    let loaded = InfrastructureConfig::load(path).and_then(|c| {
        c.validate(&info)?;
        Ok((c, Settings::from_env()?))
    });
    let (config, settings) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid configuration".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Configuration is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  floating pool: {}", config.floating_pool_name.cyan());
    if let Some(subnet) = config.floating_pool_subnet_name() {
        println!("  floating pool subnet: {}", subnet.cyan());
    }
    println!("  workers: {}", config.networks.workers.cyan());
    if config.shared_network_area {
        println!("  mode: {}", "shared network area".yellow());
    }
    print_resource("network", config.pinned_network_id());
    print_resource("subnet", config.pinned_subnet_id());
    print_resource("router", config.pinned_router_id());

    let dns = config.effective_dns_servers(&info);
    if dns.is_empty() {
        println!("  dns: {}", "(provider default)".dimmed());
    } else {
        println!("  dns: {}", dns.join(", "));
    }

    println!();
    println!("Settings:");
    println!(
        "  task timeout: {}s (long: {}s)",
        settings.task_timeout.as_secs(),
        settings.long_task_timeout.as_secs()
    );
    println!(
        "  retries: {} attempts, {}ms to {}ms",
        settings.retry.max_attempts,
        settings.retry.initial_delay.as_millis(),
        settings.retry.max_delay.as_millis()
    );
    println!("  persist interval: {}s", settings.persist_interval.as_secs());

    Ok(())
}

fn print_resource(kind: &str, pinned: Option<&str>) {
    match pinned {
        Some(id) => println!("  {}: {} (configured)", kind, id.cyan()),
        None => println!("  {}: {}", kind, "managed".dimmed()),
    }
}
