//! Job-spec assembly
//!
//! Composes the ordered list of job-spec factories to run against the
//! provisioned nodes. Order matters only in that later factories may depend on
//! artifacts produced earlier in the same pass; the assembler never reorders.
//! Caller extensions are appended strictly after the built-in set.

use std::sync::Arc;

use crate::capabilities::{
    CapabilityRegistry, CONSENSUS, CRON, CUSTOM_COMPUTE, LOG_EVENT_TRIGGER, READ_CONTRACT,
    WEB_API_TARGET, WEB_API_TRIGGER,
};
use crate::config::ProvisioningRequest;
use crate::error::ProvisionerResult;
use crate::topology::{DonRole, NodeGroupDescriptor};

/// A declarative configuration document telling a node which capability to
/// run and how.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub job_name: String,
    pub capability: String,
    /// Role of the node group the spec targets.
    pub role: DonRole,
    pub toml: String,
}

/// Inputs available to every factory during assembly.
pub struct JobSpecContext<'a> {
    pub home_chain_id: u64,
    pub groups: &'a [NodeGroupDescriptor],
}

pub type JobSpecFactoryFn =
    Arc<dyn Fn(&JobSpecContext) -> ProvisionerResult<Vec<JobSpec>> + Send + Sync>;

/// Ordered list of tagged job-spec factories.
pub struct JobSpecAssembler {
    factories: Vec<(String, JobSpecFactoryFn)>,
}

impl JobSpecAssembler {
    /// Construct the built-in factory set for the request, in dependency
    /// order.
    pub fn built_in(registry: &CapabilityRegistry, request: &ProvisioningRequest) -> Self {
        let home_chain_id = request.home_chain().chain_id;
        let mut factories: Vec<(String, JobSpecFactoryFn)> = vec![
            (WEB_API_TRIGGER.to_string(), web_api_trigger_factory()),
            (WEB_API_TARGET.to_string(), web_api_target_factory()),
            (CONSENSUS.to_string(), consensus_factory(home_chain_id)),
        ];

        if let Some(binary_path) = registry.container_binary_path(CRON) {
            factories.push((CRON.to_string(), cron_factory(binary_path)));
        }

        factories.push((
            "gateway".to_string(),
            gateway_factory(request.extra_gateway_ports.clone()),
        ));
        factories.push((CUSTOM_COMPUTE.to_string(), compute_factory()));

        for chain in &request.chains {
            if let Some(binary_path) = registry.container_binary_path(LOG_EVENT_TRIGGER) {
                factories.push((
                    format!("{LOG_EVENT_TRIGGER}-{}", chain.chain_id),
                    log_event_trigger_factory(chain.chain_id, binary_path),
                ));
            }
            if let Some(binary_path) = registry.container_binary_path(READ_CONTRACT) {
                factories.push((
                    format!("{READ_CONTRACT}-{}", chain.chain_id),
                    read_contract_factory(chain.chain_id, binary_path),
                ));
            }
        }

        JobSpecAssembler { factories }
    }

    /// Append caller-extension factories after the built-in set. Extensions
    /// can only add behavior, never override it.
    pub fn with_extensions(mut self, extensions: Vec<(String, JobSpecFactoryFn)>) -> Self {
        self.factories.extend(extensions);
        self
    }

    /// Run every factory in order and collect the produced specs.
    pub fn assemble(&self, ctx: &JobSpecContext<'_>) -> ProvisionerResult<Vec<JobSpec>> {
        let mut specs = Vec::new();
        for (name, factory) in &self.factories {
            let mut produced = factory(ctx)
                .map_err(|e| e.with_context(format!("job spec factory '{name}' failed")))?;
            specs.append(&mut produced);
        }
        Ok(specs)
    }

    pub fn factory_names(&self) -> Vec<&str> {
        self.factories.iter().map(|(name, _)| name.as_str()).collect()
    }
}

fn standard_capability_toml(name: &str, command: &str) -> String {
    format!(
        "type = \"standardcapabilities\"\nschemaVersion = 1\nname = \"{name}\"\ncommand = \"{command}\"\n"
    )
}

fn web_api_trigger_factory() -> JobSpecFactoryFn {
    Arc::new(|_ctx| {
        Ok(vec![JobSpec {
            job_name: WEB_API_TRIGGER.to_string(),
            capability: WEB_API_TRIGGER.to_string(),
            role: DonRole::Workflow,
            toml: standard_capability_toml(WEB_API_TRIGGER, "__builtin_web-api-trigger"),
        }])
    })
}

/// Role of the group a capability was placed on: the combined group in
/// simplified mode, one of the split groups in full mode. Falls back to the
/// given role when no group carries the capability.
fn hosting_role(ctx: &JobSpecContext<'_>, capability: &str, fallback: DonRole) -> DonRole {
    ctx.groups
        .iter()
        .find(|g| g.has_capability(capability))
        .map(|g| g.roles[0])
        .unwrap_or(fallback)
}

fn web_api_target_factory() -> JobSpecFactoryFn {
    Arc::new(|ctx| {
        let role = hosting_role(ctx, WEB_API_TARGET, DonRole::Capabilities);
        Ok(vec![JobSpec {
            job_name: WEB_API_TARGET.to_string(),
            capability: WEB_API_TARGET.to_string(),
            role,
            toml: standard_capability_toml(WEB_API_TARGET, "__builtin_web-api-target"),
        }])
    })
}

fn consensus_factory(home_chain_id: u64) -> JobSpecFactoryFn {
    Arc::new(move |_ctx| {
        Ok(vec![JobSpec {
            job_name: CONSENSUS.to_string(),
            capability: CONSENSUS.to_string(),
            role: DonRole::Workflow,
            toml: format!(
                "type = \"offchainreporting2\"\nschemaVersion = 1\nname = \"{CONSENSUS}\"\npluginType = \"plugin\"\nchainID = {home_chain_id}\n"
            ),
        }])
    })
}

fn cron_factory(binary_path: String) -> JobSpecFactoryFn {
    Arc::new(move |_ctx| {
        Ok(vec![JobSpec {
            job_name: CRON.to_string(),
            capability: CRON.to_string(),
            role: DonRole::Workflow,
            toml: standard_capability_toml(CRON, &binary_path),
        }])
    })
}

fn gateway_factory(extra_allowed_ports: Vec<u16>) -> JobSpecFactoryFn {
    Arc::new(move |_ctx| {
        let mut allowed_ports = vec![80, 443];
        allowed_ports.extend(extra_allowed_ports.iter().copied());
        let ports = allowed_ports
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(vec![JobSpec {
            job_name: "gateway".to_string(),
            capability: "gateway".to_string(),
            role: DonRole::Gateway,
            toml: format!(
                "type = \"gateway\"\nschemaVersion = 1\nname = \"gateway\"\nallowedPorts = [{ports}]\nallowedIps = [\"0.0.0.0/0\"]\n"
            ),
        }])
    })
}

fn compute_factory() -> JobSpecFactoryFn {
    Arc::new(|_ctx| {
        Ok(vec![JobSpec {
            job_name: CUSTOM_COMPUTE.to_string(),
            capability: CUSTOM_COMPUTE.to_string(),
            role: DonRole::Workflow,
            toml: standard_capability_toml(CUSTOM_COMPUTE, "__builtin_custom-compute-action"),
        }])
    })
}

fn log_event_trigger_factory(chain_id: u64, binary_path: String) -> JobSpecFactoryFn {
    Arc::new(move |ctx| {
        Ok(vec![JobSpec {
            job_name: format!("{LOG_EVENT_TRIGGER}-{chain_id}"),
            capability: LOG_EVENT_TRIGGER.to_string(),
            role: hosting_role(ctx, LOG_EVENT_TRIGGER, DonRole::Workflow),
            toml: format!(
                "type = \"standardcapabilities\"\nschemaVersion = 1\nname = \"{LOG_EVENT_TRIGGER}-{chain_id}\"\ncommand = \"{binary_path}\"\nchainID = {chain_id}\nnetwork = \"evm\"\n"
            ),
        }])
    })
}

fn read_contract_factory(chain_id: u64, binary_path: String) -> JobSpecFactoryFn {
    Arc::new(move |ctx| {
        Ok(vec![JobSpec {
            job_name: format!("{READ_CONTRACT}-{chain_id}"),
            capability: READ_CONTRACT.to_string(),
            role: hosting_role(ctx, READ_CONTRACT, DonRole::Capabilities),
            toml: format!(
                "type = \"standardcapabilities\"\nschemaVersion = 1\nname = \"{READ_CONTRACT}-{chain_id}\"\ncommand = \"{binary_path}\"\nchainID = {chain_id}\nnetwork = \"evm\"\n"
            ),
        }])
    })
}
