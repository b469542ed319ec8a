//! End-to-end provisioning tests over mocked providers
//!
//! These tests run the full coordinator flow (validation, planning,
//! capability resolution, concurrent bring-up, job-spec assembly and
//! distribution) against mockall-generated providers.

use std::sync::Arc;

use provisioner::capabilities::{
    CONSENSUS, CRON, CUSTOM_COMPUTE, LOG_EVENT_TRIGGER, READ_CONTRACT, WEB_API_TARGET,
    WEB_API_TRIGGER, WRITE_EVM,
};
use provisioner::config::{ChainInput, ControlPlaneConfig};
use provisioner::jobs::JobSpec;
use provisioner::topology::DonRole;
use provisioner::traits::{
    BlockchainProvider, ChainHandle, ControlPlaneHandle, ControlPlaneProvider,
    MockBlockchainProvider,
};
use provisioner::{Provisioner, ProvisionerError, ProvisionerResult, TopologyMode};

mod common;
use common::helpers::{
    default_blockchains, default_control_plane, default_node_groups, TEST_GATEWAY_URL,
};
use common::{ProvisionerBuilder, TestFixtures};

/// Simplified topology: one combined group carrying every mandatory
/// capability, identified as workflow DON 1.
#[tokio::test]
async fn simplified_topology_provisions_one_combined_group() {
    let coordinator = ProvisionerBuilder::new().build();

    let result = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap();

    assert_eq!(result.topology.node_groups.len(), 1);
    let group = &result.topology.node_groups[0];
    for capability in [CONSENSUS, CUSTOM_COMPUTE, WRITE_EVM, WEB_API_TRIGGER, WEB_API_TARGET] {
        assert!(group.has_capability(capability), "missing {capability}");
    }
    assert!(group.has_role(DonRole::Workflow));
    assert!(group.has_role(DonRole::Gateway));
    assert_eq!(result.topology.workflow_don_id, 1);
    assert_eq!(result.topology.gateway_url.as_deref(), Some(TEST_GATEWAY_URL));
    assert_eq!(result.home_chain().chain_id, TestFixtures::HOME_CHAIN_ID);
}

/// Full topology: roles split across the three groups, workflow group first.
#[tokio::test]
async fn full_topology_splits_roles_across_groups() {
    let coordinator = ProvisionerBuilder::new().build();

    let result = coordinator
        .provision(TopologyMode::Full, TestFixtures::full_request())
        .await
        .unwrap();

    let groups = &result.topology.node_groups;
    assert_eq!(groups.len(), 3);

    let workflow = &groups[0];
    assert!(workflow.has_role(DonRole::Workflow));
    assert!(workflow.has_capability(CONSENSUS));
    assert!(workflow.has_capability(CUSTOM_COMPUTE));
    assert!(workflow.has_capability(WEB_API_TRIGGER));
    assert!(!workflow.has_capability(WRITE_EVM));

    let capability_hosts = &groups[1];
    assert!(capability_hosts.has_role(DonRole::Capabilities));
    assert!(capability_hosts.has_capability(WRITE_EVM));
    assert!(capability_hosts.has_capability(WEB_API_TARGET));
    assert_eq!(capability_hosts.bootstrap_index, -1);

    let gateway = &groups[2];
    assert!(gateway.has_role(DonRole::Gateway));
    assert!(gateway.capabilities.is_empty());

    assert_eq!(result.topology.workflow_don_id, 1);
}

/// A topology mode that disagrees with the configured group count fails
/// before any provider is touched.
#[tokio::test]
async fn topology_mode_and_group_count_must_match() {
    let mut untouched = MockBlockchainProvider::new();
    untouched.expect_start_chain().times(0);
    let coordinator = ProvisionerBuilder::new().with_blockchains(untouched).build();

    let err = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::full_request())
        .await
        .unwrap_err();

    match err.root_cause() {
        ProvisionerError::TopologyMismatch { expected, actual } => {
            assert_eq!(*expected, 1);
            assert_eq!(*actual, 3);
        }
        other => panic!("expected TopologyMismatch, got {other:?}"),
    }
}

/// A shared plugins image enables every optional capability without host
/// binaries.
#[tokio::test]
async fn plugins_image_enables_optional_capabilities() {
    let mut request = TestFixtures::simplified_request();
    request.plugins_image = Some(TestFixtures::PLUGINS_IMAGE.to_string());
    let coordinator = ProvisionerBuilder::new().build();

    let result = coordinator
        .provision(TopologyMode::Simplified, request)
        .await
        .unwrap();

    let group = &result.topology.node_groups[0];
    for capability in [CRON, LOG_EVENT_TRIGGER, READ_CONTRACT] {
        assert!(group.has_capability(capability), "missing {capability}");
    }
    // Binaries ship inside the image, nothing is staged from the host.
    assert!(group.staged_binaries.iter().all(|b| b.host_path.is_none()));
    let read_contract = group
        .staged_binaries
        .iter()
        .find(|b| b.capability == READ_CONTRACT)
        .unwrap();
    assert_eq!(read_contract.binary_name, "readcontract");
}

/// A host binary path opts the capability in and stages the binary.
#[tokio::test]
async fn host_binary_path_enables_and_stages_capability() {
    let coordinator = ProvisionerBuilder::new().build();

    let result = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::request_with_cron())
        .await
        .unwrap();

    let group = &result.topology.node_groups[0];
    assert!(group.has_capability(CRON));
    assert!(!group.has_capability(LOG_EVENT_TRIGGER));
    let staged = group
        .staged_binaries
        .iter()
        .find(|b| b.capability == CRON)
        .unwrap();
    assert!(staged.host_path.is_some());
    assert_eq!(staged.binary_name, "cron-binary");
    assert!(staged.container_path.starts_with("/home/capabilities"));
}

/// Read-only chains get read/log registrations but never a write capability,
/// in full topology as well.
#[tokio::test]
async fn read_only_chains_get_no_write_capability() {
    let coordinator = ProvisionerBuilder::new().build();
    let mut request = TestFixtures::full_request();
    request.chains = TestFixtures::two_chain_request().chains;

    let result = coordinator
        .provision(TopologyMode::Full, request)
        .await
        .unwrap();

    let configs = &result.topology.capability_configs;
    let has = |capability: &str, chain_id: u64| {
        configs
            .iter()
            .any(|c| c.capability == capability && c.chain_id == Some(chain_id))
    };
    assert!(has(WRITE_EVM, TestFixtures::HOME_CHAIN_ID));
    assert!(!has(WRITE_EVM, TestFixtures::SECOND_CHAIN_ID));
    assert!(has(READ_CONTRACT, TestFixtures::HOME_CHAIN_ID));
    assert!(has(READ_CONTRACT, TestFixtures::SECOND_CHAIN_ID));
    assert!(has(LOG_EVENT_TRIGGER, TestFixtures::SECOND_CHAIN_ID));
}

/// Control-plane startup failure fails the whole attempt, with pull-denied
/// remediation attached.
#[tokio::test]
async fn control_plane_failure_fails_the_attempt() {
    let coordinator = ProvisionerBuilder::new()
        .with_failing_control_plane("pull access denied for registry/job-distributor")
        .build();

    let err = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), ProvisionerError::ControlPlane { .. }));
    assert!(err.chain().contains("logged into a registry"));
}

/// Node-group startup failure fails the whole attempt with the group named
/// in the context chain.
#[tokio::test]
async fn node_group_failure_fails_the_attempt() {
    let coordinator = ProvisionerBuilder::new()
        .with_failing_node_group("combined")
        .build();

    let err = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap_err();

    assert!(matches!(err.root_cause(), ProvisionerError::NodeGroup { .. }));
    assert!(err.chain().contains("failed to start node group 'combined'"));
}

/// An empty CSA encryption key is replaced with a freshly generated one; a
/// supplied key passes through untouched.
#[tokio::test]
async fn csa_key_generated_only_when_missing() {
    let mut request = TestFixtures::simplified_request();
    request.control_plane.csa_encryption_key = String::new();
    let coordinator = ProvisionerBuilder::new().build();

    let result = coordinator
        .provision(TopologyMode::Simplified, request)
        .await
        .unwrap();
    let generated = result.generated_csa_key.unwrap();
    assert_eq!(generated.len(), 64);
    assert!(hex::decode(&generated).is_ok());

    let coordinator = ProvisionerBuilder::new().build();
    let result = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap();
    assert!(result.generated_csa_key.is_none());
}

/// Built-in job specs come first and in their fixed order; extension
/// factories are strictly appended.
#[tokio::test]
async fn extension_factories_append_after_built_ins() {
    let coordinator = ProvisionerBuilder::new()
        .with_extra_factory(
            "billing",
            Arc::new(|_ctx| {
                Ok(vec![JobSpec {
                    job_name: "billing".to_string(),
                    capability: "billing".to_string(),
                    role: DonRole::Workflow,
                    toml: "type = \"billing\"\n".to_string(),
                }])
            }),
        )
        .build();

    let result = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap();

    let names: Vec<&str> = result.job_specs.iter().map(|s| s.job_name.as_str()).collect();
    assert_eq!(names.first().copied(), Some(WEB_API_TRIGGER));
    assert_eq!(names.last().copied(), Some("billing"));
    let consensus_pos = names.iter().position(|n| *n == CONSENSUS).unwrap();
    let target_pos = names.iter().position(|n| *n == WEB_API_TARGET).unwrap();
    assert!(target_pos < consensus_pos);
}

/// Every assembled job spec reaches the control plane exactly once.
#[tokio::test]
async fn job_specs_are_distributed_once() {
    let mut control_plane = provisioner::traits::MockControlPlaneProvider::new();
    control_plane.expect_start().times(1).returning(|_| {
        Ok(ControlPlaneHandle {
            external_url: "http://127.0.0.1:42242".to_string(),
            internal_url: "http://job-distributor:42242".to_string(),
        })
    });
    control_plane
        .expect_distribute_job_specs()
        .withf(|_, specs| !specs.is_empty())
        .times(1)
        .returning(|_, _| Ok(()));
    let coordinator = ProvisionerBuilder::new()
        .with_control_plane(control_plane)
        .build();

    coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap();
}

/// A node-group failure during a guarded attempt emits failure telemetry and
/// removes labeled resources exactly once, even though the control plane came
/// up fine.
#[tokio::test]
async fn guarded_failure_emits_telemetry_and_cleans_up() {
    use provisioner::lifecycle::RESOURCE_LABEL;
    use provisioner::telemetry::STARTUP_RESULT_EVENT;
    use provisioner::traits::{MockContainerEngine, MockTracker};
    use provisioner::{LifecycleGuard, ProvisionContext};
    use serde_json::json;

    let mut tracker = MockTracker::new();
    tracker
        .expect_track()
        .withf(|event, properties| {
            event == STARTUP_RESULT_EVENT
                && properties["success"] == json!(false)
                && properties["panicked"] == json!(false)
        })
        .times(1)
        .returning(|_, _| Ok(()));

    let mut engine = MockContainerEngine::new();
    engine
        .expect_remove_labeled()
        .withf(|label| label == RESOURCE_LABEL)
        .times(1)
        .returning(|_| Ok(()));

    let ctx = ProvisionContext::new(
        "local",
        std::time::Duration::from_millis(5),
        Arc::new(tracker),
    );
    let guard = LifecycleGuard::new(engine, ctx);
    let coordinator = ProvisionerBuilder::new()
        .with_failing_node_group("combined")
        .build();

    let result = guard
        .run(
            false,
            coordinator.provision(TopologyMode::Simplified, TestFixtures::simplified_request()),
        )
        .await;
    assert!(result.is_err());
}

/// A provider that never finishes is cut off by the startup deadline.
#[tokio::test(start_paused = true)]
async fn startup_timeout_bounds_the_attempt() {
    struct StalledControlPlane;

    #[async_trait::async_trait]
    impl ControlPlaneProvider for StalledControlPlane {
        async fn start(
            &self,
            _config: &ControlPlaneConfig,
        ) -> ProvisionerResult<ControlPlaneHandle> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Err(ProvisionerError::ControlPlane {
                message: "never reached".to_string(),
            })
        }

        async fn distribute_job_specs(
            &self,
            _service: &ControlPlaneHandle,
            _specs: &[JobSpec],
        ) -> ProvisionerResult<()> {
            Ok(())
        }
    }

    let coordinator = Provisioner::new(
        default_blockchains(),
        default_node_groups(),
        StalledControlPlane,
    );

    let err = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ProvisionerError::ProvisioningTimeout { seconds: 600 }
    ));
}

/// The deadline spans the whole attempt: a chain that never comes up is cut
/// off by the same timeout as a stalled fork/join.
#[tokio::test(start_paused = true)]
async fn startup_timeout_covers_chain_startup() {
    struct StalledBlockchains;

    #[async_trait::async_trait]
    impl BlockchainProvider for StalledBlockchains {
        async fn start_chain(&self, chain: &ChainInput) -> ProvisionerResult<ChainHandle> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Err(ProvisionerError::Blockchain {
                chain_id: chain.chain_id,
                message: "never reached".to_string(),
            })
        }
    }

    let coordinator = Provisioner::new(
        StalledBlockchains,
        default_node_groups(),
        default_control_plane(),
    );

    let err = coordinator
        .provision(TopologyMode::Simplified, TestFixtures::simplified_request())
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        ProvisionerError::ProvisioningTimeout { seconds: 600 }
    ));
}
