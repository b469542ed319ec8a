//! Local chain provider
//!
//! Brings up one dev chain per request entry in its own container and waits
//! until the JSON-RPC endpoint answers before handing back the connection
//! info.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::{chain_selector, ChainInput};
use crate::error::{ProvisionerError, ProvisionerResult};
use crate::lifecycle::RESOURCE_LABEL;
use crate::services::docker::docker;
use crate::traits::{BlockchainProvider, ChainHandle};

const DEFAULT_CHAIN_IMAGE: &str = "ghcr.io/foundry-rs/foundry:stable";

/// Account 0 of the standard local devnet mnemonic, pre-funded by the dev
/// chain and matching the default deployer private key.
const DEPLOYER_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

const RPC_READY_ATTEMPTS: u32 = 60;
const RPC_READY_INTERVAL: Duration = Duration::from_millis(500);

pub struct LocalBlockchainProvider {
    next_port: AtomicU16,
    http: reqwest::Client,
}

impl Default for LocalBlockchainProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBlockchainProvider {
    pub fn new() -> Self {
        LocalBlockchainProvider {
            next_port: AtomicU16::new(8545),
            http: reqwest::Client::new(),
        }
    }

    async fn wait_for_rpc(&self, chain_id: u64, url: &str) -> ProvisionerResult<()> {
        let probe = json!({
            "jsonrpc": "2.0",
            "method": "eth_blockNumber",
            "params": [],
            "id": 1,
        });
        for _ in 0..RPC_READY_ATTEMPTS {
            let response = self.http.post(url).json(&probe).send().await;
            if matches!(response, Ok(ref r) if r.status().is_success()) {
                return Ok(());
            }
            tokio::time::sleep(RPC_READY_INTERVAL).await;
        }
        Err(ProvisionerError::Blockchain {
            chain_id,
            message: format!("RPC endpoint {url} did not become ready"),
        })
    }
}

#[async_trait]
impl BlockchainProvider for LocalBlockchainProvider {
    async fn start_chain(&self, chain: &ChainInput) -> ProvisionerResult<ChainHandle> {
        // Resolve the selector first so unsupported chains fail before any
        // container exists.
        let selector = chain_selector(chain.chain_id)?;

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        let image = chain.image.as_deref().unwrap_or(DEFAULT_CHAIN_IMAGE);
        let name = format!("chain-{}", chain.chain_id);
        let chain_id_arg = chain.chain_id.to_string();
        let publish = format!("{port}:8545");

        info!("starting chain {} on port {port}", chain.chain_id);
        docker(&[
            "run",
            "-d",
            "--name",
            &name,
            "--label",
            RESOURCE_LABEL,
            "-p",
            &publish,
            "--entrypoint",
            "anvil",
            image,
            "--host",
            "0.0.0.0",
            "--chain-id",
            &chain_id_arg,
        ])
        .await
        .map_err(|err| ProvisionerError::Blockchain {
            chain_id: chain.chain_id,
            message: err.chain(),
        })?;

        let http_url = format!("http://127.0.0.1:{port}");
        self.wait_for_rpc(chain.chain_id, &http_url).await?;

        Ok(ChainHandle {
            chain_id: chain.chain_id,
            selector,
            http_url,
            deployer_address: DEPLOYER_ADDRESS.to_string(),
        })
    }
}
