//! Faultline operator - sidecar fault injection lifecycle management

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use faultline::controller::{error_policy, reconcile, Context};
use faultline::crd::{EnvoyFilter, FaultInjection};

/// Faultline - Kubernetes operator for sidecar fault injection
#[derive(Parser, Debug)]
#[command(name = "faultline", version, about, long_about = None)]
struct Cli {
    /// Generate the FaultInjection CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    ///
    /// Watches FaultInjection intents and keeps one EnvoyFilter alive per
    /// intent. Changes to owned filters re-trigger reconciliation.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&FaultInjection::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Ensure the FaultInjection CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply so
/// the schema always matches the operator version. The EnvoyFilter CRD is
/// owned by Istio and is never installed here.
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(faultline::FIELD_MANAGER).force();

    tracing::info!("Installing FaultInjection CRD...");
    crds.patch(
        "faultinjections.faultline.dev",
        &params,
        &Patch::Apply(&FaultInjection::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install FaultInjection CRD: {}", e))?;

    tracing::info!("FaultInjection CRD installed/updated");
    Ok(())
}

/// Run in controller mode - manages fault injection intents
async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("Faultline controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crd_installed(&client).await?;

    let intents: Api<FaultInjection> = Api::all(client.clone());
    let filters: Api<EnvoyFilter> = Api::all(client.clone());

    let ctx = Arc::new(Context::from_client(client));

    tracing::info!("Starting FaultInjection controller");

    Controller::new(intents, WatcherConfig::default())
        .owns(filters, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(outcome) => {
                    tracing::debug!(?outcome, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    tracing::info!("Faultline controller shutting down");
    Ok(())
}
