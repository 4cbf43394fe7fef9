use colored::Colorize;
use infraflow_cloud::FileStateStore;
use std::io::Write;
use std::path::Path;

pub async fn show(cluster: &str, root: &Path) -> anyhow::Result<()> {
    let store = FileStateStore::new(root, cluster);
    let state = store.load().await?;

    println!(
        "{} {}",
        "State file:".bold(),
        store.state_path().display().to_string().cyan()
    );
    if state.flat_state.is_empty() {
        println!("  {}", "(empty)".dimmed());
        return Ok(());
    }

    let width = state.flat_state.keys().map(String::len).max().unwrap_or(0);
    for (key, value) in &state.flat_state {
        println!("  {:width$}  {}", key, value, width = width);
    }
    Ok(())
}

pub async fn clear(cluster: &str, root: &Path, yes: bool) -> anyhow::Result<()> {
    let store = FileStateStore::new(root, cluster);

    if !yes {
        print!(
            "Remove the persisted state of {}? Resources stay in the cloud. [y/N]: ",
            cluster.cyan()
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    let lock = store.acquire_lock().await?;
    let existed = store.clear().await?;
    lock.release().await?;
    tracing::debug!(cluster, existed, "State cleared");

    if existed {
        println!("{}", format!("✓ Cleared state of {}", cluster).green());
    } else {
        println!("{}", format!("No state recorded for {}", cluster).dimmed());
    }
    Ok(())
}
