//! Local node-group provider
//!
//! Runs every node of a group as its own container, stages the resolved
//! capability binaries into it, and publishes the API (and, for gateway
//! nodes, connector) ports on the host.

use std::sync::atomic::{AtomicU16, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::config::NodeSpec;
use crate::error::{ProvisionerError, ProvisionerResult};
use crate::lifecycle::RESOURCE_LABEL;
use crate::services::docker::docker;
use crate::topology::NodeGroupDescriptor;
use crate::traits::{ChainHandle, NodeGroupHandle, NodeGroupProvider};

const NODE_API_PORT: u16 = 6688;
const GATEWAY_CONNECTOR_PORT: u16 = 5002;

pub struct LocalNodeGroupProvider {
    next_api_port: AtomicU16,
    next_gateway_port: AtomicU16,
}

impl Default for LocalNodeGroupProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalNodeGroupProvider {
    pub fn new() -> Self {
        LocalNodeGroupProvider {
            next_api_port: AtomicU16::new(10100),
            next_gateway_port: AtomicU16::new(GATEWAY_CONNECTOR_PORT),
        }
    }

    /// Resolve the image a node runs: build from its directives when present,
    /// otherwise use the configured image as-is.
    async fn resolve_image(&self, group: &str, index: usize, spec: &NodeSpec) -> ProvisionerResult<String> {
        if let (Some(context), Some(file)) = (spec.docker_context.as_deref(), spec.docker_file.as_deref()) {
            let tag = format!("{group}-node-{index}:local");
            info!("building node image {tag} from {context}");
            docker(&["build", "-t", &tag, "-f", file, context]).await?;
            return Ok(tag);
        }
        spec.image
            .clone()
            .ok_or_else(|| ProvisionerError::InvalidRequest {
                message: format!("node {index} of group '{group}' has neither an image nor build directives"),
            })
    }
}

#[async_trait]
impl NodeGroupProvider for LocalNodeGroupProvider {
    async fn start_group(
        &self,
        descriptor: &NodeGroupDescriptor,
        registry_chain: &ChainHandle,
    ) -> ProvisionerResult<NodeGroupHandle> {
        let mut node_urls = Vec::with_capacity(descriptor.node_specs.len());
        let mut gateway_url = None;

        for (index, spec) in descriptor.node_specs.iter().enumerate() {
            let image = self
                .resolve_image(&descriptor.name, index, spec)
                .await
                .map_err(|err| ProvisionerError::NodeGroup {
                    group: descriptor.name.clone(),
                    message: err.chain(),
                })?;

            let name = format!("{}-node-{index}", descriptor.name);
            let api_port = self.next_api_port.fetch_add(1, Ordering::SeqCst);
            let publish_api = format!("{api_port}:{NODE_API_PORT}");
            let chain_id_env = format!("CHAIN_ID={}", registry_chain.chain_id);
            // Nodes reach the chain through the host-published RPC port.
            let rpc_env = format!(
                "ETH_RPC_URL={}",
                registry_chain.http_url.replace("127.0.0.1", "host.docker.internal")
            );
            let is_bootstrap = descriptor.bootstrap_index == index as i32;
            let bootstrap_env = format!("BOOTSTRAP_NODE={is_bootstrap}");

            let mut args = vec![
                "run",
                "-d",
                "--name",
                &name,
                "--label",
                RESOURCE_LABEL,
                "--add-host",
                "host.docker.internal:host-gateway",
                "-p",
                &publish_api,
                "-e",
                &chain_id_env,
                "-e",
                &rpc_env,
                "-e",
                &bootstrap_env,
            ];
            let publish_gateway;
            if descriptor.gateway_index == Some(index) {
                let host_port = self.next_gateway_port.fetch_add(1, Ordering::SeqCst);
                publish_gateway = format!("{host_port}:{GATEWAY_CONNECTOR_PORT}");
                args.push("-p");
                args.push(&publish_gateway);
                gateway_url = Some(format!("http://127.0.0.1:{host_port}"));
            }
            args.push(&image);

            info!("starting node {name} ({image}) on port {api_port}");
            docker(&args).await.map_err(|err| ProvisionerError::NodeGroup {
                group: descriptor.name.clone(),
                message: err.chain(),
            })?;

            // Stage host-built capability binaries; image-shipped ones are
            // already in place.
            for binary in &descriptor.staged_binaries {
                let Some(host_path) = binary.host_path.as_deref() else {
                    continue;
                };
                let source = host_path.to_string_lossy().to_string();
                let destination = format!("{name}:{}", binary.container_path);
                docker(&["cp", &source, &destination])
                    .await
                    .map_err(|err| ProvisionerError::NodeGroup {
                        group: descriptor.name.clone(),
                        message: format!(
                            "failed to stage '{}' binary: {}",
                            binary.capability,
                            err.chain()
                        ),
                    })?;
            }

            node_urls.push(format!("http://127.0.0.1:{api_port}"));
        }

        Ok(NodeGroupHandle {
            name: descriptor.name.clone(),
            node_urls,
            gateway_url,
        })
    }
}
