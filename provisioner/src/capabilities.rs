//! Capability registry
//!
//! Resolves capability names into on-chain contract/config entries and binary
//! staging information, per requested chain. The registry is an explicit,
//! declaratively constructed ordered list so completeness is checkable at
//! construction time.

use std::collections::HashMap;
use std::path::Path;

use crate::config::{InfraTarget, ProvisioningRequest};
use crate::error::{ProvisionerError, ProvisionerResult};
use crate::topology::{StagedBinary, TopologyPlan};

pub const CONSENSUS: &str = "consensus";
pub const CUSTOM_COMPUTE: &str = "custom-compute";
pub const WRITE_EVM: &str = "write-evm";
pub const WEB_API_TRIGGER: &str = "web-api-trigger";
pub const WEB_API_TARGET: &str = "web-api-target";
pub const CRON: &str = "cron";
pub const LOG_EVENT_TRIGGER: &str = "log-event-trigger";
pub const READ_CONTRACT: &str = "read-contract";

const EVM_FAMILY: &str = "evm";

/// Fixed directory the capability binaries are staged at inside each node
/// container, per infrastructure target.
pub fn container_directory(infra: &InfraTarget) -> &'static str {
    match infra {
        InfraTarget::Local => "/home/capabilities",
        InfraTarget::Remote { .. } => "/app/capabilities",
    }
}

/// Well-known binary name inside a shared plugins image. Extras keep their
/// capability name.
fn plugin_binary_name(capability: &str) -> &str {
    match capability {
        CRON => "cron",
        LOG_EVENT_TRIGGER => "log-event-trigger",
        READ_CONTRACT => "readcontract",
        other => other,
    }
}

/// Capabilities that need a binary staged into the node containers.
fn needs_binary(capability: &str) -> bool {
    !matches!(
        capability,
        CONSENSUS | CUSTOM_COMPUTE | WRITE_EVM | WEB_API_TRIGGER | WEB_API_TARGET
    )
}

/// One on-chain capability registration entry produced by a contract/config
/// factory. Chain-scoped entries carry the chain they were created for;
/// factory identity is chain-specific, never shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfig {
    pub capability: String,
    pub version: String,
    pub chain_id: Option<u64>,
    pub family: Option<String>,
}

impl CapabilityConfig {
    fn global(capability: &str) -> Self {
        CapabilityConfig {
            capability: capability.to_string(),
            version: "1.0.0".to_string(),
            chain_id: None,
            family: None,
        }
    }

    fn chain_scoped(capability: &str, chain_id: u64) -> Self {
        CapabilityConfig {
            capability: capability.to_string(),
            version: "1.0.0".to_string(),
            chain_id: Some(chain_id),
            family: Some(EVM_FAMILY.to_string()),
        }
    }
}

/// A resolved capability: its contract registration entry plus the binary the
/// nodes need for it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityBinding {
    pub capability: String,
    pub contract: CapabilityConfig,
    pub binary: Option<StagedBinary>,
}

/// Ordered, declaratively constructed capability registry.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    bindings: Vec<CapabilityBinding>,
    binary_names: HashMap<String, String>,
    container_dir: &'static str,
}

impl CapabilityRegistry {
    /// Build the registry from a topology plan and the request.
    ///
    /// Fails before any container is started when a requested capability has
    /// no binary path and no shared plugins image is supplied. Also writes the
    /// resolved staging info back into the plan's descriptors; they are
    /// read-only afterwards.
    pub fn build(
        plan: &mut TopologyPlan,
        request: &ProvisioningRequest,
    ) -> ProvisionerResult<Self> {
        let container_dir = container_directory(&request.infra);
        let shared_image = request.plugins_image.is_some();

        let mut binary_names = HashMap::new();
        for capability in plan.requested_capabilities() {
            if !needs_binary(capability) {
                continue;
            }
            let host_path = plan.binary_paths.get(capability);
            let name = resolve_binary_name(capability, host_path.map(|p| p.as_path()), shared_image)?;
            binary_names.insert(capability.to_string(), name);
        }

        let mut bindings = Vec::new();
        for capability in plan.requested_capabilities() {
            // Chain-scoped capabilities are registered below, once per chain.
            if matches!(capability, WRITE_EVM | READ_CONTRACT | LOG_EVENT_TRIGGER) {
                continue;
            }
            bindings.push(CapabilityBinding {
                capability: capability.to_string(),
                contract: CapabilityConfig::global(capability),
                binary: staged_binary(capability, plan, &binary_names, container_dir),
            });
        }

        for chain in &request.chains {
            // A write capability is registered only for writable chains.
            if !chain.read_only {
                bindings.push(CapabilityBinding {
                    capability: WRITE_EVM.to_string(),
                    contract: CapabilityConfig::chain_scoped(WRITE_EVM, chain.chain_id),
                    binary: None,
                });
            }
            bindings.push(CapabilityBinding {
                capability: READ_CONTRACT.to_string(),
                contract: CapabilityConfig::chain_scoped(READ_CONTRACT, chain.chain_id),
                binary: staged_binary(READ_CONTRACT, plan, &binary_names, container_dir),
            });
            bindings.push(CapabilityBinding {
                capability: LOG_EVENT_TRIGGER.to_string(),
                contract: CapabilityConfig::chain_scoped(LOG_EVENT_TRIGGER, chain.chain_id),
                binary: staged_binary(LOG_EVENT_TRIGGER, plan, &binary_names, container_dir),
            });
        }

        let registry = CapabilityRegistry {
            bindings,
            binary_names,
            container_dir,
        };
        registry.stage_into(plan);
        Ok(registry)
    }

    pub fn bindings(&self) -> &[CapabilityBinding] {
        &self.bindings
    }

    /// All contract/config registration entries, in registry order.
    pub fn contract_configs(&self) -> Vec<CapabilityConfig> {
        self.bindings.iter().map(|b| b.contract.clone()).collect()
    }

    /// Resolved binary name for a requested binary-backed capability.
    pub fn binary_name(&self, capability: &str) -> Option<&str> {
        self.binary_names.get(capability).map(String::as_str)
    }

    /// In-container path of a capability binary.
    pub fn container_binary_path(&self, capability: &str) -> Option<String> {
        self.binary_name(capability)
            .map(|name| format!("{}/{}", self.container_dir, name))
    }

    pub fn container_dir(&self) -> &'static str {
        self.container_dir
    }

    /// True when a chain-scoped registration exists for the capability/chain
    /// pair.
    pub fn has_chain_scoped(&self, capability: &str, chain_id: u64) -> bool {
        self.bindings
            .iter()
            .any(|b| b.capability == capability && b.contract.chain_id == Some(chain_id))
    }

    /// Write resolved staging info into each descriptor that requests a
    /// binary-backed capability.
    fn stage_into(&self, plan: &mut TopologyPlan) {
        for group in &mut plan.groups {
            group.staged_binaries = group
                .capabilities
                .iter()
                .filter_map(|capability| {
                    let name = self.binary_names.get(capability)?;
                    Some(StagedBinary {
                        capability: capability.clone(),
                        host_path: plan.binary_paths.get(capability).cloned(),
                        binary_name: name.clone(),
                        container_path: format!("{}/{}", self.container_dir, name),
                    })
                })
                .collect();
        }
    }
}

/// Resolve the name a capability binary will have inside the container: the
/// well-known name when a shared plugins image is used, otherwise the file
/// name of the caller-supplied host path. A missing path with no shared image
/// is a hard precondition failure.
pub fn resolve_binary_name(
    capability: &str,
    host_path: Option<&Path>,
    shared_image: bool,
) -> ProvisionerResult<String> {
    if shared_image {
        return Ok(plugin_binary_name(capability).to_string());
    }
    let path = host_path.ok_or_else(|| ProvisionerError::MissingCapabilityBinary {
        capability: capability.to_string(),
    })?;
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| ProvisionerError::BinaryResolution {
            capability: capability.to_string(),
        })
}

fn staged_binary(
    capability: &str,
    plan: &TopologyPlan,
    binary_names: &HashMap<String, String>,
    container_dir: &str,
) -> Option<StagedBinary> {
    let name = binary_names.get(capability)?;
    Some(StagedBinary {
        capability: capability.to_string(),
        host_path: plan.binary_paths.get(capability).cloned(),
        binary_name: name.clone(),
        container_path: format!("{container_dir}/{name}"),
    })
}
