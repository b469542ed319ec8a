//! Test helpers and builder patterns for provisioning tests
//!
//! Wires mockall-generated providers with happy-path defaults so individual
//! tests only override the behavior they are about.

use provisioner::config::chain_selector;
use provisioner::jobs::JobSpecFactoryFn;
use provisioner::traits::{
    ChainHandle, ControlPlaneHandle, MockBlockchainProvider, MockControlPlaneProvider,
    MockNodeGroupProvider, NodeGroupHandle,
};
use provisioner::{Provisioner, ProvisionerError};

pub const TEST_DEPLOYER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
pub const TEST_GATEWAY_URL: &str = "http://127.0.0.1:5002";

/// Builder for a fully mocked provisioning coordinator with happy-path
/// defaults.
pub struct ProvisionerBuilder {
    blockchains: MockBlockchainProvider,
    node_groups: MockNodeGroupProvider,
    control_plane: MockControlPlaneProvider,
    extra_factories: Vec<(String, JobSpecFactoryFn)>,
}

impl Default for ProvisionerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Blockchain provider mock answering every chain with a local handle.
pub fn default_blockchains() -> MockBlockchainProvider {
    let mut blockchains = MockBlockchainProvider::new();
    blockchains
        .expect_start_chain()
        .returning(|chain| {
            Ok(ChainHandle {
                chain_id: chain.chain_id,
                selector: chain_selector(chain.chain_id)?,
                http_url: format!("http://127.0.0.1:{}", 8545 + chain.chain_id % 100),
                deployer_address: TEST_DEPLOYER.to_string(),
            })
        })
        .times(0..);
    blockchains
}

/// Node-group provider mock echoing the descriptor back as a running group.
pub fn default_node_groups() -> MockNodeGroupProvider {
    let mut node_groups = MockNodeGroupProvider::new();
    node_groups
        .expect_start_group()
        .returning(|descriptor, _chain| {
            Ok(NodeGroupHandle {
                name: descriptor.name.clone(),
                node_urls: (0..descriptor.node_specs.len())
                    .map(|i| format!("http://127.0.0.1:1010{i}"))
                    .collect(),
                gateway_url: descriptor.gateway_index.map(|_| TEST_GATEWAY_URL.to_string()),
            })
        })
        .times(0..);
    node_groups
}

/// Control-plane provider mock that starts and distributes successfully.
pub fn default_control_plane() -> MockControlPlaneProvider {
    let mut control_plane = MockControlPlaneProvider::new();
    control_plane
        .expect_start()
        .returning(|_| {
            Ok(ControlPlaneHandle {
                external_url: "http://127.0.0.1:42242".to_string(),
                internal_url: "http://job-distributor:42242".to_string(),
            })
        })
        .times(0..);
    control_plane
        .expect_distribute_job_specs()
        .returning(|_, _| Ok(()))
        .times(0..);
    control_plane
}

impl ProvisionerBuilder {
    pub fn new() -> Self {
        Self {
            blockchains: default_blockchains(),
            node_groups: default_node_groups(),
            control_plane: default_control_plane(),
            extra_factories: Vec::new(),
        }
    }

    /// Replace the control-plane start behavior with a failure.
    pub fn with_failing_control_plane(mut self, message: &str) -> Self {
        let message = message.to_string();
        let mut control_plane = MockControlPlaneProvider::new();
        control_plane.expect_start().returning(move |_| {
            Err(ProvisionerError::ControlPlane {
                message: message.clone(),
            })
        });
        control_plane
            .expect_distribute_job_specs()
            .returning(|_, _| Ok(()))
            .times(0..);
        self.control_plane = control_plane;
        self
    }

    /// Replace node-group startup with a failure for the named group.
    pub fn with_failing_node_group(mut self, failing_group: &str) -> Self {
        let failing_group = failing_group.to_string();
        let mut node_groups = MockNodeGroupProvider::new();
        node_groups
            .expect_start_group()
            .returning(move |descriptor, _chain| {
                if descriptor.name == failing_group {
                    return Err(ProvisionerError::NodeGroup {
                        group: descriptor.name.clone(),
                        message: "container exited during startup".to_string(),
                    });
                }
                Ok(NodeGroupHandle {
                    name: descriptor.name.clone(),
                    node_urls: vec![],
                    gateway_url: None,
                })
            });
        self.node_groups = node_groups;
        self
    }

    pub fn with_blockchains(mut self, blockchains: MockBlockchainProvider) -> Self {
        self.blockchains = blockchains;
        self
    }

    pub fn with_control_plane(mut self, control_plane: MockControlPlaneProvider) -> Self {
        self.control_plane = control_plane;
        self
    }

    pub fn with_extra_factory(mut self, name: &str, factory: JobSpecFactoryFn) -> Self {
        self.extra_factories.push((name.to_string(), factory));
        self
    }

    pub fn build(
        self,
    ) -> Provisioner<MockBlockchainProvider, MockNodeGroupProvider, MockControlPlaneProvider> {
        Provisioner::new(self.blockchains, self.node_groups, self.control_plane)
            .with_extra_job_factories(self.extra_factories)
    }
}
