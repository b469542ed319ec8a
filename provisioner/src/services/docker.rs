//! Docker CLI client
//!
//! Thin wrapper around the `docker` binary. All containers created by this
//! tool carry the shared resource label, so discovery and teardown operate on
//! the label alone and stay idempotent.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{ProvisionerError, ProvisionerResult};
use crate::traits::ContainerEngine;

/// Run a docker subcommand and return its trimmed stdout. Stderr is folded
/// into the error on a non-zero exit.
pub(crate) async fn docker(args: &[&str]) -> ProvisionerResult<String> {
    debug!("docker {}", args.join(" "));
    let output = Command::new("docker").args(args).output().await?;
    if !output.status.success() {
        return Err(ProvisionerError::ContainerEngine {
            message: format!(
                "docker {} exited with {}: {}",
                args.first().copied().unwrap_or_default(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Container engine backed by the local docker daemon.
#[derive(Debug, Default, Clone)]
pub struct DockerEngine;

impl DockerEngine {
    pub fn new() -> Self {
        DockerEngine
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn list_labeled(&self, label: &str) -> ProvisionerResult<Vec<String>> {
        let stdout = docker(&["ps", "-aq", "--filter", &format!("label={label}")]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn remove_labeled(&self, label: &str) -> ProvisionerResult<()> {
        let ids = self.list_labeled(label).await?;
        if ids.is_empty() {
            debug!("no containers with label {label}, nothing to remove");
            return Ok(());
        }

        info!("removing {} labeled container(s)", ids.len());
        let mut args = vec!["rm", "-f", "-v"];
        args.extend(ids.iter().map(String::as_str));
        docker(&args).await?;
        Ok(())
    }
}
