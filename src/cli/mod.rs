//! # kfgctl
//!
//! Command-line interface for the konfigure operator.
//!
//! ## Usage
//!
//! ```bash
//! # List ManagementClusterConfiguration resources in all namespaces
//! kfgctl list
//!
//! # Show status of a ManagementClusterConfiguration
//! kfgctl status gauss -n flux-giantswarm
//!
//! # Trigger reconciliation
//! kfgctl reconcile gauss -n flux-giantswarm
//!
//! # Suspend / resume reconciliation
//! kfgctl suspend gauss -n flux-giantswarm
//! kfgctl resume gauss -n flux-giantswarm
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::Client;

mod list;
mod reconcile;
mod status;
mod suspend;

/// Namespace used when `-n/--namespace` is not given
const DEFAULT_NAMESPACE: &str = "default";

/// konfigure operator CLI
#[derive(Parser)]
#[command(name = "kfgctl")]
#[command(
    about = "konfigure operator CLI",
    long_about = None,
    after_help = "\
Resource: ManagementClusterConfiguration (short name 'mcc')

Examples:
  kfgctl list
  kfgctl reconcile gauss -n flux-giantswarm
  kfgctl status gauss --namespace flux-giantswarm
"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (list defaults to all namespaces, other commands to 'default')
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List ManagementClusterConfiguration resources
    List,
    /// Show status of a ManagementClusterConfiguration resource
    Status {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Trigger reconciliation of a ManagementClusterConfiguration resource
    Reconcile {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Suspend reconciliation of a ManagementClusterConfiguration resource
    Suspend {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Resume reconciliation of a ManagementClusterConfiguration resource
    Resume {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_provider| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kfgctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    let namespace = || {
        cli.namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    };

    match &cli.command {
        Commands::List => list::list_command(client, cli.namespace.clone()).await,
        Commands::Status { name } => status::status_command(client, name, &namespace()).await,
        Commands::Reconcile { name } => {
            reconcile::reconcile_command(client, name, &namespace()).await
        }
        Commands::Suspend { name } => {
            suspend::set_suspend_command(client, name, &namespace(), true).await
        }
        Commands::Resume { name } => {
            suspend::set_suspend_command(client, name, &namespace(), false).await
        }
    }
}
