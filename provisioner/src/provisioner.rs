//! Provisioning coordinator
//!
//! Brings up the control-plane service and every node group in parallel,
//! fails the whole attempt on the first error from either path, and returns
//! the connection info the caller needs. Collaborators are injected through
//! the trait seams in `traits`, so the full flow is testable with mocks.

use std::time::Duration;

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use tracing::{debug, info};

use crate::capabilities::{CapabilityConfig, CapabilityRegistry};
use crate::config::{ControlPlaneConfig, ProvisioningRequest};
use crate::error::{ProvisionerError, ProvisionerResult};
use crate::jobs::{JobSpec, JobSpecAssembler, JobSpecContext, JobSpecFactoryFn};
use crate::topology::{self, NodeGroupDescriptor, TopologyMode};
use crate::traits::{
    BlockchainProvider, ChainHandle, ControlPlaneHandle, ControlPlaneProvider, NodeGroupHandle,
    NodeGroupProvider,
};

/// Bound on the whole bring-up attempt. Exceeding it cancels in-flight work.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(600);

/// The resolved topology of a provisioned environment.
#[derive(Debug, Clone)]
pub struct DonTopologyInfo {
    pub workflow_don_id: u32,
    /// External gateway connector endpoint, when a gateway node exists.
    pub gateway_url: Option<String>,
    pub node_groups: Vec<NodeGroupDescriptor>,
    pub group_handles: Vec<NodeGroupHandle>,
    pub capability_configs: Vec<CapabilityConfig>,
}

/// Everything the caller gets back from a successful provisioning attempt.
/// Exclusively owned by the caller; the orchestrator retains no reference.
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    pub chains: Vec<ChainHandle>,
    pub topology: DonTopologyInfo,
    pub control_plane: ControlPlaneHandle,
    /// Echo of a freshly generated CSA encryption key, for audit output.
    /// None when the caller supplied one.
    pub generated_csa_key: Option<String>,
    pub job_specs: Vec<JobSpec>,
}

impl ProvisioningResult {
    pub fn home_chain(&self) -> &ChainHandle {
        &self.chains[0]
    }
}

/// Coordinates one provisioning attempt over injected providers.
pub struct Provisioner<B, N, C>
where
    B: BlockchainProvider,
    N: NodeGroupProvider,
    C: ControlPlaneProvider,
{
    blockchains: B,
    node_groups: N,
    control_plane: C,
    extra_job_factories: Vec<(String, JobSpecFactoryFn)>,
}

impl<B, N, C> Provisioner<B, N, C>
where
    B: BlockchainProvider,
    N: NodeGroupProvider,
    C: ControlPlaneProvider,
{
    pub fn new(blockchains: B, node_groups: N, control_plane: C) -> Self {
        Provisioner {
            blockchains,
            node_groups,
            control_plane,
            extra_job_factories: Vec::new(),
        }
    }

    /// Caller-extension job-spec factories, appended after the built-in set.
    pub fn with_extra_job_factories(
        mut self,
        factories: Vec<(String, JobSpecFactoryFn)>,
    ) -> Self {
        self.extra_job_factories = factories;
        self
    }

    /// Provision the environment described by the request.
    ///
    /// Validation, planning, and key generation happen before any side
    /// effect; everything with side effects, from the first chain through
    /// job-spec distribution, then runs under [`STARTUP_TIMEOUT`]. Within
    /// that, the control-plane service and the node groups are started
    /// concurrently, first error wins. Rollback on failure is the lifecycle
    /// guard's job, not ours.
    pub async fn provision(
        &self,
        mode: TopologyMode,
        mut request: ProvisioningRequest,
    ) -> ProvisionerResult<ProvisioningResult> {
        request.validate()?;

        let mut plan = topology::plan(mode, &request)?;
        topology::log_topology(&plan);

        let registry = CapabilityRegistry::build(&mut plan, &request)
            .map_err(|e| e.with_context("failed to build capability registry"))?;

        // Key generation happens strictly before the fork/join so both forked
        // paths observe a stable, fully populated request.
        let generated_csa_key = ensure_csa_key(&mut request.control_plane)?;
        if generated_csa_key.is_some() {
            info!("generated new CSA encryption key for the control-plane service");
        }

        let assembler = JobSpecAssembler::built_in(&registry, &request)
            .with_extensions(self.extra_job_factories.clone());

        let groups = &plan.groups;
        let attempt = async {
            let mut chains = Vec::with_capacity(request.chains.len());
            for chain in &request.chains {
                let handle = self
                    .blockchains
                    .start_chain(chain)
                    .await
                    .map_err(|e| {
                        e.with_context(format!("failed to start chain {}", chain.chain_id))
                    })?;
                info!(
                    "chain {} up: selector {} rpc {}",
                    handle.chain_id, handle.selector, handle.http_url
                );
                chains.push(handle);
            }
            let home_chain = chains[0].clone();

            let control_plane_task = async {
                let started = std::time::Instant::now();
                info!("starting control-plane service");
                let handle = self
                    .control_plane
                    .start(&request.control_plane)
                    .await
                    .map_err(enrich_control_plane_error)?;
                info!(
                    "control-plane service started in {:.2} seconds",
                    started.elapsed().as_secs_f64()
                );
                Ok::<_, ProvisionerError>(handle)
            };

            // Node groups start sequentially inside their task; the typical
            // deployment has one group, so cross-group parallelism is
            // deferred.
            let node_groups_task = async {
                let started = std::time::Instant::now();
                info!("starting {} node group(s)", groups.len());
                let mut handles = Vec::with_capacity(groups.len());
                for descriptor in groups {
                    let handle = self
                        .node_groups
                        .start_group(descriptor, &home_chain)
                        .await
                        .map_err(|e| {
                            e.with_context(format!(
                                "failed to start node group '{}'",
                                descriptor.name
                            ))
                        })?;
                    handles.push(handle);
                }
                info!(
                    "node groups started in {:.2} seconds",
                    started.elapsed().as_secs_f64()
                );
                Ok::<_, ProvisionerError>(handles)
            };

            let (control_plane_handle, group_handles) =
                tokio::try_join!(control_plane_task, node_groups_task)?;

            let ctx = JobSpecContext {
                home_chain_id: home_chain.chain_id,
                groups,
            };
            let job_specs = assembler.assemble(&ctx)?;
            debug!("assembled {} job specs", job_specs.len());
            self.control_plane
                .distribute_job_specs(&control_plane_handle, &job_specs)
                .await
                .map_err(|e| e.with_context("failed to distribute job specs"))?;

            Ok::<_, ProvisionerError>((chains, control_plane_handle, group_handles, job_specs))
        };

        let (chains, control_plane_handle, group_handles, job_specs) =
            tokio::time::timeout(STARTUP_TIMEOUT, attempt)
                .await
                .map_err(|_| ProvisionerError::ProvisioningTimeout {
                    seconds: STARTUP_TIMEOUT.as_secs(),
                })??;

        let gateway_url = group_handles.iter().find_map(|g| g.gateway_url.clone());
        Ok(ProvisioningResult {
            topology: DonTopologyInfo {
                workflow_don_id: plan.workflow_don_id(),
                gateway_url,
                node_groups: plan.groups,
                group_handles,
                capability_configs: registry.contract_configs(),
            },
            chains,
            control_plane: control_plane_handle,
            generated_csa_key,
            job_specs,
        })
    }
}

/// Generate a fresh CSA encryption key when none was supplied: a secp256k1
/// keypair, private key truncated to 32 bytes and hex-encoded. The
/// substitution is visible to the caller and echoed in the result.
fn ensure_csa_key(config: &mut ControlPlaneConfig) -> ProvisionerResult<Option<String>> {
    if !config.csa_encryption_key.is_empty() {
        return Ok(None);
    }
    let key = SigningKey::random(&mut OsRng);
    let encoded = hex::encode(&key.to_bytes()[..32]);
    config.csa_encryption_key = encoded.clone();
    Ok(Some(encoded))
}

/// Attach actionable remediation text to control-plane image pull failures.
fn enrich_control_plane_error(err: ProvisionerError) -> ProvisionerError {
    let message = err.chain();
    if message.contains("pull access denied") || message.contains("may require 'docker login'") {
        return err.with_context(
            "ensure the control-plane image is built locally or you are logged into a registry that can read it",
        );
    }
    err.with_context("failed to start control-plane service")
}
