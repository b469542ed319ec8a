//! Topology planning
//!
//! Derives the node-group descriptors for a topology mode: how many groups,
//! which DON roles they carry, and which capabilities land on which group.
//! Capability placement is fixed by design, not caller-configurable.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::info;

use crate::capabilities::{
    CONSENSUS, CRON, CUSTOM_COMPUTE, LOG_EVENT_TRIGGER, READ_CONTRACT, WEB_API_TARGET,
    WEB_API_TRIGGER, WRITE_EVM,
};
use crate::config::{NodeSpec, ProvisioningRequest};
use crate::error::{ProvisionerError, ProvisionerResult};

/// Shape of the environment: one combined group, or three role-split groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyMode {
    Simplified,
    Full,
}

impl TopologyMode {
    pub fn expected_group_count(&self) -> usize {
        match self {
            TopologyMode::Simplified => 1,
            TopologyMode::Full => 3,
        }
    }
}

impl std::str::FromStr for TopologyMode {
    type Err = ProvisionerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simplified" => Ok(TopologyMode::Simplified),
            "full" => Ok(TopologyMode::Full),
            other => Err(ProvisionerError::InvalidRequest {
                message: format!("invalid topology '{other}'. Valid topologies are: simplified, full"),
            }),
        }
    }
}

impl std::fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyMode::Simplified => write!(f, "simplified"),
            TopologyMode::Full => write!(f, "full"),
        }
    }
}

/// DON role tags carried by a node group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DonRole {
    Workflow,
    Capabilities,
    Gateway,
}

impl std::fmt::Display for DonRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DonRole::Workflow => write!(f, "workflow"),
            DonRole::Capabilities => write!(f, "capabilities"),
            DonRole::Gateway => write!(f, "gateway"),
        }
    }
}

/// A capability binary staged into each node container of a group.
///
/// Resolved by the capability registry after planning; descriptors are
/// read-only from then on.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedBinary {
    pub capability: String,
    /// Host path. None when the binary ships inside a shared plugins image.
    pub host_path: Option<PathBuf>,
    pub binary_name: String,
    /// Fixed container-relative location the binary is staged at.
    pub container_path: String,
}

/// One node group of the planned topology.
#[derive(Debug, Clone)]
pub struct NodeGroupDescriptor {
    pub name: String,
    /// Ordered capability names assigned to this group.
    pub capabilities: Vec<String>,
    pub roles: Vec<DonRole>,
    /// Index of the bootstrap node, -1 when the group has none.
    pub bootstrap_index: i32,
    pub gateway_index: Option<usize>,
    pub node_specs: Vec<NodeSpec>,
    /// Filled in by the capability registry once binary paths are resolved.
    pub staged_binaries: Vec<StagedBinary>,
}

impl NodeGroupDescriptor {
    pub fn has_role(&self, role: DonRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

pub type BinaryPathMap = HashMap<String, PathBuf>;

/// Output of topology planning.
#[derive(Debug, Clone)]
pub struct TopologyPlan {
    pub mode: TopologyMode,
    pub groups: Vec<NodeGroupDescriptor>,
    /// Host binary paths keyed by capability, for later staging.
    pub binary_paths: BinaryPathMap,
}

impl TopologyPlan {
    /// All capabilities requested anywhere in the topology.
    pub fn requested_capabilities(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for group in &self.groups {
            for capability in &group.capabilities {
                if !seen.contains(&capability.as_str()) {
                    seen.push(capability.as_str());
                }
            }
        }
        seen
    }

    pub fn workflow_don_id(&self) -> u32 {
        self.groups
            .iter()
            .position(|g| g.has_role(DonRole::Workflow))
            .map(|idx| idx as u32 + 1)
            .unwrap_or(1)
    }
}

/// Plan the topology for the requested mode.
///
/// Fails with `TopologyMismatch` before any side effect when the caller
/// supplied the wrong number of node groups for the mode.
pub fn plan(mode: TopologyMode, request: &ProvisioningRequest) -> ProvisionerResult<TopologyPlan> {
    let expected = mode.expected_group_count();
    if request.node_groups.len() != expected {
        return Err(ProvisionerError::TopologyMismatch {
            expected,
            actual: request.node_groups.len(),
        });
    }

    let mut binary_paths = BinaryPathMap::new();
    let groups = match mode {
        TopologyMode::Simplified => plan_simplified(request, &mut binary_paths),
        TopologyMode::Full => plan_full(request, &mut binary_paths),
    };

    let plan = TopologyPlan {
        mode,
        groups,
        binary_paths,
    };
    debug_assert!(plan
        .groups
        .iter()
        .all(|g| g.has_role(DonRole::Workflow) == (g.bootstrap_index >= 0)));
    Ok(plan)
}

fn plan_simplified(
    request: &ProvisioningRequest,
    binary_paths: &mut BinaryPathMap,
) -> Vec<NodeGroupDescriptor> {
    let mut capabilities = vec![
        CONSENSUS.to_string(),
        CUSTOM_COMPUTE.to_string(),
        WRITE_EVM.to_string(),
        WEB_API_TRIGGER.to_string(),
        WEB_API_TARGET.to_string(),
    ];

    for optional in [CRON, LOG_EVENT_TRIGGER, READ_CONTRACT] {
        gate_optional(request, optional, &mut capabilities, binary_paths);
    }
    gate_extras(request, &mut capabilities, binary_paths);

    vec![NodeGroupDescriptor {
        name: request.node_groups[0].name.clone(),
        capabilities,
        roles: vec![DonRole::Workflow, DonRole::Gateway],
        bootstrap_index: 0,
        gateway_index: Some(0),
        node_specs: node_specs_for(request, 0),
        staged_binaries: Vec::new(),
    }]
}

fn plan_full(
    request: &ProvisioningRequest,
    binary_paths: &mut BinaryPathMap,
) -> Vec<NodeGroupDescriptor> {
    // Trigger capabilities land on the workflow group, read-contract on the
    // capabilities group. This split is fixed by design.
    let mut workflow_capabilities = vec![
        CONSENSUS.to_string(),
        CUSTOM_COMPUTE.to_string(),
        WEB_API_TRIGGER.to_string(),
    ];
    for optional in [CRON, LOG_EVENT_TRIGGER] {
        gate_optional(request, optional, &mut workflow_capabilities, binary_paths);
    }
    gate_extras(request, &mut workflow_capabilities, binary_paths);

    let mut capabilities_group = vec![WRITE_EVM.to_string(), WEB_API_TARGET.to_string()];
    gate_optional(request, READ_CONTRACT, &mut capabilities_group, binary_paths);

    vec![
        NodeGroupDescriptor {
            name: request.node_groups[0].name.clone(),
            capabilities: workflow_capabilities,
            roles: vec![DonRole::Workflow],
            bootstrap_index: 0,
            gateway_index: None,
            node_specs: node_specs_for(request, 0),
            staged_binaries: Vec::new(),
        },
        NodeGroupDescriptor {
            name: request.node_groups[1].name.clone(),
            capabilities: capabilities_group,
            roles: vec![DonRole::Capabilities],
            // no bootstrap node in this group
            bootstrap_index: -1,
            gateway_index: None,
            node_specs: node_specs_for(request, 1),
            staged_binaries: Vec::new(),
        },
        NodeGroupDescriptor {
            name: request.node_groups[2].name.clone(),
            capabilities: Vec::new(),
            roles: vec![DonRole::Gateway],
            bootstrap_index: -1,
            gateway_index: Some(0),
            node_specs: node_specs_for(request, 2),
            staged_binaries: Vec::new(),
        },
    ]
}

/// Append an optional capability only when its binary path is configured or a
/// shared plugins image is supplied; otherwise silently omit it.
fn gate_optional(
    request: &ProvisioningRequest,
    capability: &str,
    capabilities: &mut Vec<String>,
    binary_paths: &mut BinaryPathMap,
) {
    let path = request.extra_capabilities.path_of(capability);
    if path.is_none() && request.plugins_image.is_none() {
        return;
    }
    capabilities.push(capability.to_string());
    if let Some(path) = path {
        binary_paths.insert(capability.to_string(), path.to_path_buf());
    }
}

/// Same gating for externally supplied capability binaries. Sorted for a
/// deterministic capability order.
fn gate_extras(
    request: &ProvisioningRequest,
    capabilities: &mut Vec<String>,
    binary_paths: &mut BinaryPathMap,
) {
    let mut extras: Vec<_> = request.extra_binaries.iter().collect();
    extras.sort_by(|a, b| a.0.cmp(b.0));
    for (capability, path) in extras {
        let path_set = !path.as_os_str().is_empty();
        if !path_set && request.plugins_image.is_none() {
            continue;
        }
        capabilities.push(capability.clone());
        if path_set {
            binary_paths.insert(capability.clone(), path.clone());
        }
    }
}

/// Clone the caller's node specs, replacing individual build directives with
/// the shared plugins image when one is supplied. This is an override, not a
/// merge.
fn node_specs_for(request: &ProvisioningRequest, group_index: usize) -> Vec<NodeSpec> {
    let mut specs = request.node_groups[group_index].node_specs.clone();
    if let Some(image) = &request.plugins_image {
        for spec in &mut specs {
            spec.image = Some(image.clone());
            spec.docker_context = None;
            spec.docker_file = None;
        }
    }
    specs
}

/// Log the planned topology, one block per group.
pub fn log_topology(plan: &TopologyPlan) {
    info!("DON topology ({} mode):", plan.mode);
    for group in &plan.groups {
        let capabilities = if group.capabilities.is_empty() {
            "none".to_string()
        } else {
            group.capabilities.join(", ")
        };
        let roles = group
            .roles
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "  {} | nodes: {} | capabilities: {} | roles: {}",
            group.name.to_uppercase(),
            group.node_specs.len(),
            capabilities,
            roles
        );
    }
}
