//! mvirt-cloud: converges cluster networking on a cloud provider.
//!
//! Reads a cluster declaration and reconciles the cluster's public route
//! tables:
//! - `apply` creates whatever is missing or differs
//! - `destroy` tears the route tables down in reverse order
//! - `plan` reports what `apply` would do without changing anything
//!
//! The provider backend is an inventory file driven through the in-memory
//! EC2 implementation. The internet gateway tagged with the cluster name must
//! already be present in that inventory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mvirt_cloud::config;
use mvirt_cloud::{MemoryEc2, PlanAction, Reconciler};

/// mvirt Cloud Reconciler
#[derive(Parser, Debug)]
#[command(name = "mvirt-cloud", version, about)]
struct Args {
    /// Cluster declaration (JSON)
    #[arg(long)]
    cluster: PathBuf,

    /// Provider inventory file, created if missing
    #[arg(long, default_value = "mvirt-cloud-state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Converge the provider toward the declaration
    Apply,
    /// Remove the cluster's route tables
    Destroy,
    /// Show which route tables would change
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mvirt_cloud=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let cluster = config::load_cluster(&args.cluster)
        .with_context(|| format!("Failed to load cluster from {}", args.cluster.display()))?;
    info!("Loaded cluster {}", cluster.name);

    let ec2 = Arc::new(
        MemoryEc2::load(&args.state)
            .await
            .context("Failed to load provider inventory")?,
    );
    let reconciler = Reconciler::new(ec2.clone());

    match args.command {
        Command::Apply => {
            let result = reconciler.apply_cluster(cluster).await;
            // Persist whatever was created, even on a partial failure.
            ec2.save(&args.state)
                .await
                .context("Failed to save provider inventory")?;
            let (_, applied) = result.context("Apply failed")?;
            for rt in &applied {
                info!("Public Route Table {} -> {}", rt.shared.name, rt.shared.identifier);
            }
            info!("Applied {} public route tables", applied.len());
        }
        Command::Destroy => {
            let result = reconciler.destroy_cluster(cluster).await;
            ec2.save(&args.state)
                .await
                .context("Failed to save provider inventory")?;
            let (_, destroyed) = result.context("Destroy failed")?;
            info!("Processed {} public route tables", destroyed.len());
        }
        Command::Plan => {
            let plan = reconciler.plan_cluster(&cluster).await.context("Plan failed")?;
            for (name, action) in plan {
                match action {
                    PlanAction::Noop => info!("{}: up to date", name),
                    PlanAction::Apply => info!("{}: will be applied", name),
                }
            }
        }
    }

    Ok(())
}
