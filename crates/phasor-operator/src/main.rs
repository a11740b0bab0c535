//! Phasor Operator - lifecycle phase orchestration for cluster services

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::{Client, CustomResourceExt};

use phasor_common::crd::{
    DeletePhase, OperationalPhase, PlanningPhase, TrafficRolloutPhase, UpgradePhase,
};
use phasor_common::telemetry::{init_telemetry, TelemetryConfig};
use phasor_common::DEFAULT_RECONCILE_PERIOD_SECS;
use phasor_operator::config::OperatorConfig;
use phasor_operator::controllers::build_all_controllers;

/// Phasor - CRD-driven operator for service lifecycle phases
#[derive(Parser, Debug)]
#[command(name = "phasor", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Base directory for phase manifest sources with relative paths
    #[arg(long, default_value = "/etc/phasor/manifests")]
    manifest_dir: PathBuf,

    /// Seconds between steady-state reconcile passes
    #[arg(long, default_value_t = DEFAULT_RECONCILE_PERIOD_SECS)]
    reconcile_period_secs: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches all five phase CRDs and reconciles them through the shared
    /// engine. CRDs are installed/updated on startup so their versions
    /// always match the operator version.
    Controller,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print_crds()?;
        return Ok(());
    }

    init_telemetry(TelemetryConfig {
        service_name: "phasor-operator".to_string(),
        ..Default::default()
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let config = OperatorConfig {
        reconcile_period: Duration::from_secs(cli.reconcile_period_secs),
        manifest_dir: cli.manifest_dir,
    };

    match cli.command {
        Some(Commands::Controller) | None => run_controller(config).await,
    }
}

/// Emit the CRD manifests for all five phase kinds as a YAML stream
fn print_crds() -> anyhow::Result<()> {
    let crds = [
        serde_yaml::to_string(&PlanningPhase::crd())?,
        serde_yaml::to_string(&OperationalPhase::crd())?,
        serde_yaml::to_string(&TrafficRolloutPhase::crd())?,
        serde_yaml::to_string(&UpgradePhase::crd())?,
        serde_yaml::to_string(&DeletePhase::crd())?,
    ];
    println!("{}", crds.join("---\n"));
    Ok(())
}

/// Ensure all Phasor CRDs are installed
///
/// The operator installs its own CRDs on startup using server-side apply,
/// so the stored CRD versions always match the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Api, Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(phasor_common::FIELD_MANAGER).force();

    let manifests = [
        ("planningphases.phasor.dev", PlanningPhase::crd()),
        ("operationalphases.phasor.dev", OperationalPhase::crd()),
        ("trafficrolloutphases.phasor.dev", TrafficRolloutPhase::crd()),
        ("upgradephases.phasor.dev", UpgradePhase::crd()),
        ("deletephases.phasor.dev", DeletePhase::crd()),
    ];

    for (name, crd) in manifests {
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to install CRD {}: {}", name, e))?;
    }

    tracing::info!("All Phasor CRDs installed/updated");
    Ok(())
}

/// Run in controller mode - drives the five phase kinds
async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!("Phasor controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    ensure_crds_installed(&client).await?;

    tracing::info!(
        manifest_dir = %config.manifest_dir.display(),
        reconcile_period_secs = config.reconcile_period.as_secs(),
        "Starting Phasor controllers..."
    );

    let controllers = build_all_controllers(client, &config);
    futures::future::join_all(controllers).await;

    tracing::info!("Phasor controller shutting down");
    Ok(())
}
