//! KServe RawDeployment controller - turns InferenceServices into Deployments,
//! Services, autoscalers and routes

mod controller_runner;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};

use kserve_common::crd::{InferenceService, ServingRuntime};
use kserve_common::telemetry::{init_telemetry, TelemetryConfig};
use kserve_common::{system_namespace, FIELD_MANAGER};
use kserve_rawdeploy::controller::DiscoveredCrds;

/// KServe controller for RawDeployment-mode InferenceServices
#[derive(Parser, Debug)]
#[command(name = "kserve-controller", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let isvc = serde_yaml::to_string(&InferenceService::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize InferenceService CRD: {}", e))?;
        let runtime = serde_yaml::to_string(&ServingRuntime::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize ServingRuntime CRD: {}", e))?;
        println!("{isvc}---\n{runtime}");
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller().await,
    }
}

/// Ensure the KServe CRDs are installed
///
/// The controller installs its own CRDs on startup using server-side apply,
/// so the CRD schema always matches the controller version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing InferenceService CRD...");
    crds.patch(
        "inferenceservices.serving.kserve.io",
        &params,
        &Patch::Apply(&InferenceService::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install InferenceService CRD: {}", e))?;

    tracing::info!("Installing ServingRuntime CRD...");
    crds.patch(
        "servingruntimes.serving.kserve.io",
        &params,
        &Patch::Apply(&ServingRuntime::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install ServingRuntime CRD: {}", e))?;

    tracing::info!("All KServe CRDs installed/updated");
    Ok(())
}

async fn run_controller() -> anyhow::Result<()> {
    tracing::info!("KServe controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    let crds = Arc::new(DiscoveredCrds::discover(&client).await);
    let namespace = system_namespace();
    tracing::info!(
        namespace = %namespace,
        http_route = crds.http_route.is_some(),
        scaled_object = crds.scaled_object.is_some(),
        otel_collector = crds.otel_collector.is_some(),
        "Starting controllers"
    );

    let controllers =
        controller_runner::build_inference_service_controllers(client, crds, &namespace);
    futures::future::join_all(controllers).await;

    tracing::info!("KServe controller shutting down");
    Ok(())
}
