//! Local control-plane (job distribution) provider

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::config::ControlPlaneConfig;
use crate::error::{ProvisionerError, ProvisionerResult};
use crate::jobs::JobSpec;
use crate::lifecycle::RESOURCE_LABEL;
use crate::services::docker::docker;
use crate::traits::{ControlPlaneHandle, ControlPlaneProvider};

const CONTAINER_NAME: &str = "job-distributor";
const SERVICE_PORT: u16 = 42242;

const READY_ATTEMPTS: u32 = 60;
const READY_INTERVAL: Duration = Duration::from_millis(500);

pub struct LocalControlPlaneProvider {
    http: reqwest::Client,
}

impl Default for LocalControlPlaneProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalControlPlaneProvider {
    pub fn new() -> Self {
        LocalControlPlaneProvider {
            http: reqwest::Client::new(),
        }
    }

    async fn wait_for_service(&self, url: &str) -> ProvisionerResult<()> {
        let health = format!("{url}/health");
        for _ in 0..READY_ATTEMPTS {
            if matches!(self.http.get(&health).send().await, Ok(ref r) if r.status().is_success()) {
                return Ok(());
            }
            tokio::time::sleep(READY_INTERVAL).await;
        }
        Err(ProvisionerError::ControlPlane {
            message: format!("service at {url} did not become ready"),
        })
    }
}

#[async_trait]
impl ControlPlaneProvider for LocalControlPlaneProvider {
    async fn start(&self, config: &ControlPlaneConfig) -> ProvisionerResult<ControlPlaneHandle> {
        let publish = format!("{SERVICE_PORT}:{SERVICE_PORT}");
        let csa_env = format!("CSA_ENCRYPTION_KEY={}", config.csa_encryption_key);

        info!("starting job distribution service ({})", config.image);
        docker(&[
            "run",
            "-d",
            "--name",
            CONTAINER_NAME,
            "--label",
            RESOURCE_LABEL,
            "-p",
            &publish,
            "-e",
            &csa_env,
            &config.image,
        ])
        .await
        .map_err(|err| ProvisionerError::ControlPlane {
            message: err.chain(),
        })?;

        let external_url = format!("http://127.0.0.1:{SERVICE_PORT}");
        self.wait_for_service(&external_url).await?;

        Ok(ControlPlaneHandle {
            external_url,
            internal_url: format!("http://{CONTAINER_NAME}:{SERVICE_PORT}"),
        })
    }

    async fn distribute_job_specs(
        &self,
        service: &ControlPlaneHandle,
        specs: &[JobSpec],
    ) -> ProvisionerResult<()> {
        let payload: Vec<_> = specs
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.job_name,
                    "capability": spec.capability,
                    "role": spec.role.to_string(),
                    "toml": spec.toml,
                })
            })
            .collect();

        info!("distributing {} job spec(s)", specs.len());
        let response = self
            .http
            .post(format!("{}/v1/jobs", service.external_url))
            .json(&payload)
            .send()
            .await
            .map_err(|err| ProvisionerError::ControlPlane {
                message: format!("job spec distribution request failed: {err}"),
            })?;

        if !response.status().is_success() {
            return Err(ProvisionerError::ControlPlane {
                message: format!("job spec distribution rejected with {}", response.status()),
            });
        }
        Ok(())
    }
}
