//! Settings artifact writer
//!
//! After a successful bring-up, the connection details downstream tooling
//! needs are projected into a small TOML file in the working directory. The
//! file is a derived artifact: it can always be regenerated and is
//! overwritten on every run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ProvisionerResult;
use crate::provisioner::ProvisioningResult;

pub const SETTINGS_FILE_NAME: &str = "environment.toml";

/// Connection settings for the provisioned environment, as consumed by
/// workflow tooling pointed at it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsArtifact {
    /// Selector of the home (registry) chain.
    pub home_chain_selector: u64,
    pub workflow_don_id: u32,
    /// Funded deployer address on the home chain.
    pub deployer_address: String,
    /// RPC endpoint per chain, keyed by decimal chain selector. BTreeMap
    /// keeps the rendered file stable across runs.
    pub rpcs: BTreeMap<String, String>,
}

impl SettingsArtifact {
    pub fn derive(result: &ProvisioningResult) -> Self {
        let home = result.home_chain();
        let rpcs = result
            .chains
            .iter()
            .map(|chain| (chain.selector.to_string(), chain.http_url.clone()))
            .collect();

        SettingsArtifact {
            home_chain_selector: home.selector,
            workflow_don_id: result.topology.workflow_don_id,
            deployer_address: home.deployer_address.clone(),
            rpcs,
        }
    }

    /// Write the artifact into `dir`, replacing any previous file.
    pub fn write_to(&self, dir: &Path) -> ProvisionerResult<PathBuf> {
        let path = dir.join(SETTINGS_FILE_NAME);
        let rendered = toml::to_string_pretty(self)?;
        std::fs::write(&path, rendered)?;
        info!("wrote environment settings to {}", path.display());
        Ok(path)
    }

    /// Write into the current working directory.
    pub fn write(&self) -> ProvisionerResult<PathBuf> {
        self.write_to(Path::new("."))
    }
}
