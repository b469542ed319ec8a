//! Collaborator trait definitions with mockall annotations
//!
//! The orchestration core consumes its external collaborators (container
//! engine, chain/node-group/control-plane providers, telemetry tracker)
//! through these narrow interfaces only. Mock generation enables testing the
//! full provisioning flow without containers.

use std::collections::HashMap;

use crate::config::{ChainInput, ControlPlaneConfig};
use crate::error::ProvisionerResult;
use crate::jobs::JobSpec;
use crate::topology::NodeGroupDescriptor;

/// Connection info for one provisioned chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHandle {
    pub chain_id: u64,
    pub selector: u64,
    pub http_url: String,
    /// Address of the signer funded to deploy contracts.
    pub deployer_address: String,
}

/// A running node group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeGroupHandle {
    pub name: String,
    /// External API endpoint per node, in group order.
    pub node_urls: Vec<String>,
    /// External gateway connector endpoint, when the group hosts a gateway
    /// node.
    pub gateway_url: Option<String>,
}

/// A running control-plane (job distribution) service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPlaneHandle {
    pub external_url: String,
    pub internal_url: String,
}

/// Blockchain provider: brings up one chain and exposes its connection info.
#[mockall::automock]
#[async_trait::async_trait]
pub trait BlockchainProvider: Send + Sync {
    async fn start_chain(&self, chain: &ChainInput) -> ProvisionerResult<ChainHandle>;
}

/// Node-group provider: given a descriptor and the registry chain, returns a
/// running node-group handle. May be backed by a local container engine or a
/// remote cluster deployer.
#[mockall::automock]
#[async_trait::async_trait]
pub trait NodeGroupProvider: Send + Sync {
    async fn start_group(
        &self,
        descriptor: &NodeGroupDescriptor,
        registry_chain: &ChainHandle,
    ) -> ProvisionerResult<NodeGroupHandle>;
}

/// Control-plane service provider.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ControlPlaneProvider: Send + Sync {
    async fn start(&self, config: &ControlPlaneConfig) -> ProvisionerResult<ControlPlaneHandle>;

    /// Hand the assembled job specs to the running service for distribution
    /// to the nodes.
    async fn distribute_job_specs(
        &self,
        service: &ControlPlaneHandle,
        specs: &[JobSpec],
    ) -> ProvisionerResult<()>;
}

/// Container engine client, used only for discovery and best-effort teardown
/// of resources tagged as belonging to this tool.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn list_labeled(&self, label: &str) -> ProvisionerResult<Vec<String>>;

    async fn remove_labeled(&self, label: &str) -> ProvisionerResult<()>;
}

/// Pluggable telemetry tracker. Strictly best-effort: failures are logged by
/// callers but never escalate into provisioning failures.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Tracker: Send + Sync {
    async fn track(
        &self,
        event: &str,
        properties: HashMap<String, serde_json::Value>,
    ) -> ProvisionerResult<()>;
}
