//! Test fixtures and data for provisioning tests

use std::path::PathBuf;

use provisioner::config::{
    ChainInput, ControlPlaneConfig, ExtraCapabilities, InfraTarget, NodeGroupInput, NodeSpec,
    ProvisioningRequest,
};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const HOME_CHAIN_ID: u64 = 1337;
    pub const SECOND_CHAIN_ID: u64 = 2337;
    pub const NODE_IMAGE: &'static str = "oracle-node:test";
    pub const CONTROL_PLANE_IMAGE: &'static str = "job-distributor:test";
    pub const PLUGINS_IMAGE: &'static str = "capability-plugins:test";
    pub const CSA_KEY: &'static str =
        "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    pub fn node_spec() -> NodeSpec {
        NodeSpec {
            image: Some(Self::NODE_IMAGE.to_string()),
            docker_context: None,
            docker_file: None,
        }
    }

    pub fn group(name: &str, nodes: usize) -> NodeGroupInput {
        NodeGroupInput {
            name: name.to_string(),
            node_specs: vec![Self::node_spec(); nodes],
        }
    }

    /// One combined node group, one chain, supplied CSA key.
    pub fn simplified_request() -> ProvisioningRequest {
        ProvisioningRequest {
            chains: vec![ChainInput {
                chain_id: Self::HOME_CHAIN_ID,
                read_only: false,
                image: None,
            }],
            node_groups: vec![Self::group("combined", 4)],
            control_plane: ControlPlaneConfig {
                image: Self::CONTROL_PLANE_IMAGE.to_string(),
                csa_encryption_key: Self::CSA_KEY.to_string(),
            },
            infra: InfraTarget::Local,
            extra_capabilities: ExtraCapabilities::default(),
            extra_gateway_ports: vec![],
            extra_binaries: Default::default(),
            plugins_image: None,
        }
    }

    /// Three role-split node groups.
    pub fn full_request() -> ProvisioningRequest {
        let mut request = Self::simplified_request();
        request.node_groups = vec![
            Self::group("workflow", 4),
            Self::group("capability-hosts", 4),
            Self::group("gateway", 1),
        ];
        request
    }

    /// Simplified request with a second, read-only chain.
    pub fn two_chain_request() -> ProvisioningRequest {
        let mut request = Self::simplified_request();
        request.chains.push(ChainInput {
            chain_id: Self::SECOND_CHAIN_ID,
            read_only: true,
            image: None,
        });
        request
    }

    /// Simplified request with the cron capability enabled via a host binary.
    pub fn request_with_cron() -> ProvisioningRequest {
        let mut request = Self::simplified_request();
        request.extra_capabilities.cron_binary_path = Some(PathBuf::from("/tmp/cron-binary"));
        request
    }
}
