mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "infraflow")]
#[command(about = "Cluster network infrastructure, reconciled.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an infrastructure configuration
    Validate {
        /// Configuration file (YAML or JSON)
        config: PathBuf,
        /// Technical ID of the cluster
        #[arg(short, long, env = "INFRAFLOW_CLUSTER", default_value = "cluster")]
        cluster: String,
        /// Pod network of the cluster, checked for overlap with the workers network
        #[arg(long)]
        pods_cidr: Option<String>,
        /// Default DNS servers of the cluster
        #[arg(long, value_delimiter = ',')]
        dns: Vec<String>,
    },
    /// Show the infrastructure status derived from persisted state
    Status {
        /// State file to read (defaults to the cluster's file under --root)
        state_file: Option<PathBuf>,
        /// Technical ID of the cluster
        #[arg(short, long, env = "INFRAFLOW_CLUSTER")]
        cluster: String,
        /// Directory containing .infraflow/
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Inspect or remove persisted state
    #[command(subcommand)]
    State(StateCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum StateCommands {
    /// Print the persisted key/value state
    Show {
        /// Technical ID of the cluster
        #[arg(short, long, env = "INFRAFLOW_CLUSTER")]
        cluster: String,
        /// Directory containing .infraflow/
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },
    /// Remove the persisted state; the next reconcile starts from names only
    Clear {
        /// Technical ID of the cluster
        #[arg(short, long, env = "INFRAFLOW_CLUSTER")]
        cluster: String,
        /// Directory containing .infraflow/
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Validate {
            config,
            cluster,
            pods_cidr,
            dns,
        } => commands::validate::handle(&config, &cluster, pods_cidr, dns),
        Commands::Status {
            state_file,
            cluster,
            root,
            json,
        } => commands::status::handle(state_file.as_deref(), &cluster, &root, json).await,
        Commands::State(StateCommands::Show { cluster, root }) => {
            commands::state::show(&cluster, &root).await
        }
        Commands::State(StateCommands::Clear { cluster, root, yes }) => {
            commands::state::clear(&cluster, &root, yes).await
        }
        Commands::Version => {
            println!("infraflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
