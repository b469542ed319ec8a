//! Main entry point for the provisioner binary
//!
//! Wires the real service implementations into the provisioning coordinator
//! and runs an attempt under the lifecycle guard.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use provisioner::lifecycle;
use provisioner::services::{
    DockerEngine, LocalBlockchainProvider, LocalControlPlaneProvider, LocalNodeGroupProvider,
};
use provisioner::telemetry::{HttpTracker, NoOpTracker};
use provisioner::traits::{ContainerEngine, Tracker};
use provisioner::{
    LifecycleGuard, ProvisionContext, Provisioner, ProvisionerResult, ProvisioningRequest,
    SettingsArtifact, TopologyMode, RESOURCE_LABEL,
};

/// Provision ephemeral multi-node oracle test environments
#[derive(Parser)]
#[command(name = "provisioner")]
#[command(about = "Provisions an ephemeral multi-node oracle test environment")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bring up a fresh environment
    Start {
        /// Topology shape: simplified (one combined group) or full (three
        /// role-split groups)
        #[arg(long, default_value = "simplified")]
        topology: String,

        /// Path to the provisioning configuration file
        #[arg(long, default_value = "provisioner.toml")]
        config: String,

        /// Shared image carrying all capability binaries; overrides per-node
        /// build directives
        #[arg(long)]
        with_plugins_image: Option<String>,

        /// Extra allowed egress port for the gateway connector (repeatable)
        #[arg(long = "extra-gateway-port")]
        extra_gateway_ports: Vec<u16>,

        /// Seconds to wait before cleanup after a failed attempt
        #[arg(long = "cleanup-wait", default_value = "15")]
        cleanup_wait_secs: u64,

        /// Endpoint to post startup telemetry events to
        #[arg(long)]
        telemetry_endpoint: Option<String>,
    },
    /// Tear down every resource a previous run left behind
    Stop,
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let outcome = match cli.command {
        Command::Start {
            topology,
            config,
            with_plugins_image,
            extra_gateway_ports,
            cleanup_wait_secs,
            telemetry_endpoint,
        } => {
            start(
                &topology,
                &config,
                with_plugins_image,
                extra_gateway_ports,
                cleanup_wait_secs,
                telemetry_endpoint,
            )
            .await
        }
        Command::Stop => stop().await,
    };

    if let Err(err) = outcome {
        error!("{}", err.chain());
        std::process::exit(1);
    }
}

async fn start(
    topology: &str,
    config_path: &str,
    with_plugins_image: Option<String>,
    extra_gateway_ports: Vec<u16>,
    cleanup_wait_secs: u64,
    telemetry_endpoint: Option<String>,
) -> ProvisionerResult<()> {
    let mode = TopologyMode::from_str(topology)?;
    info!("provisioning a {mode} DON environment from {config_path}");

    if std::env::var("PRIVATE_KEY").map_or(true, |v| v.is_empty()) {
        warn!("PRIVATE_KEY not set, using the well-known test-only deployer key");
        std::env::set_var("PRIVATE_KEY", provisioner::config::DEFAULT_DEPLOYER_PRIVATE_KEY);
    }

    let mut request = ProvisioningRequest::from_toml_file(Path::new(config_path))?;
    if with_plugins_image.is_some() {
        request.plugins_image = with_plugins_image;
    }
    request.extra_gateway_ports.extend(extra_gateway_ports);

    let tracker: Arc<dyn Tracker> = match telemetry_endpoint {
        Some(endpoint) => Arc::new(HttpTracker::new(endpoint)),
        None => Arc::new(NoOpTracker),
    };

    let ctx = ProvisionContext::new(
        request.infra.kind(),
        Duration::from_secs(cleanup_wait_secs),
        tracker,
    );
    let engine = DockerEngine::new();

    // Start from a clean slate; leftovers from an aborted run would collide
    // on names and ports.
    if let Err(err) = engine.remove_labeled(RESOURCE_LABEL).await {
        warn!("pre-start cleanup failed: {}", err.chain());
    }

    let has_built_image = request.has_built_image();
    let guard = LifecycleGuard::new(engine, ctx);
    let coordinator = Provisioner::new(
        LocalBlockchainProvider::new(),
        LocalNodeGroupProvider::new(),
        LocalControlPlaneProvider::new(),
    );

    let started = std::time::Instant::now();
    let result = guard
        .run(has_built_image, coordinator.provision(mode, request))
        .await?;

    if let Some(key) = &result.generated_csa_key {
        info!("generated CSA encryption key: {key}");
        info!("persist it in your configuration to reuse this environment's keystore");
    }

    let artifact = SettingsArtifact::derive(&result);
    match artifact.write() {
        Ok(path) => info!("environment settings written to {}", path.display()),
        Err(write_err) => {
            // The environment itself is up; the artifact can be recreated.
            error!(
                "failed to write settings file: {}. Create it manually with \
                 home_chain_selector={}, workflow_don_id={}",
                write_err.chain(),
                artifact.home_chain_selector,
                artifact.workflow_don_id,
            );
        }
    }

    info!(
        "environment ready in {:.1}s ({} chain(s), {} node group(s))",
        started.elapsed().as_secs_f64(),
        result.chains.len(),
        result.topology.group_handles.len(),
    );
    info!("control plane: {}", result.control_plane.external_url);
    if let Some(gateway) = &result.topology.gateway_url {
        info!("gateway connector: {gateway}");
    }
    Ok(())
}

async fn stop() -> ProvisionerResult<()> {
    let engine = DockerEngine::new();
    lifecycle::teardown(&engine).await?;
    info!("all provisioned resources removed");
    Ok(())
}
