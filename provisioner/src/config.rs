//! Declarative provisioning configuration
//!
//! The full request is loaded from a TOML file and validated once; after
//! validation it is treated as immutable, with the single documented exception
//! of CSA encryption key substitution when none was supplied.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{ProvisionerError, ProvisionerResult};

/// Well-known test-only deployer key (account 0 of the standard local devnet
/// mnemonic). Substituted when the caller configures no private key.
pub const DEFAULT_DEPLOYER_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// A target chain the environment should bring up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInput {
    pub chain_id: u64,
    /// Read-only chains never get a write capability registered.
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub image: Option<String>,
}

/// Per-node build/image directives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub docker_context: Option<String>,
    #[serde(default)]
    pub docker_file: Option<String>,
}

/// Caller-supplied node group input, before topology planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroupInput {
    pub name: String,
    pub node_specs: Vec<NodeSpec>,
}

/// Control-plane (job distribution) service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    pub image: String,
    /// Hex-encoded 32-byte CSA encryption key. Generated fresh when empty.
    #[serde(default)]
    pub csa_encryption_key: String,
}

/// Infrastructure target for the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InfraTarget {
    /// Local container engine.
    Local,
    /// Remote cluster deployer.
    Remote { namespace: String },
}

impl Default for InfraTarget {
    fn default() -> Self {
        InfraTarget::Local
    }
}

impl InfraTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            InfraTarget::Local => "local",
            InfraTarget::Remote { .. } => "remote",
        }
    }
}

/// Host paths of the optional capability binaries. A capability is opt-in by
/// configuration presence: no path and no shared plugins image means the
/// capability is omitted from the topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtraCapabilities {
    #[serde(default)]
    pub cron_binary_path: Option<PathBuf>,
    #[serde(default)]
    pub log_event_trigger_binary_path: Option<PathBuf>,
    #[serde(default)]
    pub read_contract_binary_path: Option<PathBuf>,
}

impl ExtraCapabilities {
    /// A path counts as configured only when non-empty.
    pub fn path_of(&self, capability: &str) -> Option<&Path> {
        let path = match capability {
            crate::capabilities::CRON => self.cron_binary_path.as_deref(),
            crate::capabilities::LOG_EVENT_TRIGGER => self.log_event_trigger_binary_path.as_deref(),
            crate::capabilities::READ_CONTRACT => self.read_contract_binary_path.as_deref(),
            _ => None,
        };
        path.filter(|p| !p.as_os_str().is_empty())
    }
}

/// The full declarative input for one provisioning attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub chains: Vec<ChainInput>,
    pub node_groups: Vec<NodeGroupInput>,
    pub control_plane: ControlPlaneConfig,
    #[serde(default)]
    pub infra: InfraTarget,
    #[serde(default)]
    pub extra_capabilities: ExtraCapabilities,
    /// Extra allowed egress ports for the gateway connector.
    #[serde(default)]
    pub extra_gateway_ports: Vec<u16>,
    /// Externally supplied capability binaries keyed by capability name.
    #[serde(default)]
    pub extra_binaries: HashMap<String, PathBuf>,
    /// Pre-built image with all capability binaries included. Overrides every
    /// node spec's build directives when set.
    #[serde(default)]
    pub plugins_image: Option<String>,
}

impl ProvisioningRequest {
    /// Load and parse a request from a TOML file.
    pub fn from_toml_file(path: &Path) -> ProvisionerResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(ProvisionerError::Io)
            .map_err(|e| e.with_context(format!("failed to read config file {}", path.display())))?;
        let request: ProvisioningRequest = toml::from_str(&raw)?;
        Ok(request)
    }

    /// Static validation; detects configuration errors before any side effect.
    pub fn validate(&self) -> ProvisionerResult<()> {
        if self.chains.is_empty() {
            return Err(ProvisionerError::InvalidRequest {
                message: "at least one chain must be configured".to_string(),
            });
        }
        if self.node_groups.is_empty() {
            return Err(ProvisionerError::InvalidRequest {
                message: "at least one node group must be configured".to_string(),
            });
        }
        for group in &self.node_groups {
            if group.node_specs.is_empty() {
                return Err(ProvisionerError::InvalidRequest {
                    message: format!("node group '{}' has no node specs", group.name),
                });
            }
        }
        if self.control_plane.image.is_empty() {
            return Err(ProvisionerError::MissingCredential {
                field: "control_plane.image".to_string(),
            });
        }
        Ok(())
    }

    /// The registry (home) chain is always the first configured chain.
    pub fn home_chain(&self) -> &ChainInput {
        &self.chains[0]
    }

    /// True when at least one node is built from source rather than pulled,
    /// and no shared plugins image overrides the build.
    pub fn has_built_image(&self) -> bool {
        if self.plugins_image.is_some() {
            return false;
        }
        self.node_groups.iter().any(|group| {
            group
                .node_specs
                .iter()
                .any(|spec| spec.docker_file.as_deref().is_some_and(|f| !f.is_empty()))
        })
    }
}

/// Fixed chain-ID-to-selector table for the chains this tool provisions.
pub fn chain_selector(chain_id: u64) -> ProvisionerResult<u64> {
    let selector = match chain_id {
        1 => 5009297550715157269,
        1337 => 3379446385462418246,
        2337 => 12922642891491394802,
        31337 => 13264668187771770619,
        11155111 => 16015286601757825753,
        _ => return Err(ProvisionerError::ChainSelectorResolution { chain_id }),
    };
    Ok(selector)
}
