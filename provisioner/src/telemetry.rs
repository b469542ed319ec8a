//! Telemetry trackers
//!
//! Startup analytics for provisioning attempts. Emission is fire-and-forget:
//! a failing tracker is logged and otherwise ignored.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{ProvisionerError, ProvisionerResult};
use crate::traits::Tracker;

pub const STARTUP_RESULT_EVENT: &str = "startup.result";
pub const STARTUP_TIME_EVENT: &str = "startup.time";

/// Ephemeral per-attempt outcome record. Emitted once, never persisted.
#[derive(Debug, Clone)]
pub struct StartupOutcome {
    pub success: bool,
    pub elapsed: Duration,
    pub infra_type: String,
    pub error_message: Option<String>,
    pub panicked: bool,
    pub has_built_image: bool,
}

impl StartupOutcome {
    pub fn result_properties(&self) -> HashMap<String, Value> {
        let mut properties = HashMap::from([
            ("success".to_string(), json!(self.success)),
            ("infra".to_string(), json!(self.infra_type)),
        ]);
        if let Some(error) = &self.error_message {
            // first line only; the full chain goes to the log
            let first_line = error.lines().next().unwrap_or_default();
            properties.insert("error".to_string(), json!(first_line));
        }
        if !self.success {
            properties.insert("panicked".to_string(), json!(self.panicked));
        }
        properties
    }

    pub fn time_properties(&self) -> HashMap<String, Value> {
        HashMap::from([
            (
                "duration_seconds".to_string(),
                json!(self.elapsed.as_secs_f64()),
            ),
            ("has_built_image".to_string(), json!(self.has_built_image)),
        ])
    }
}

/// Tracker that drops every event.
pub struct NoOpTracker;

#[async_trait::async_trait]
impl Tracker for NoOpTracker {
    async fn track(
        &self,
        _event: &str,
        _properties: HashMap<String, Value>,
    ) -> ProvisionerResult<()> {
        Ok(())
    }
}

/// Tracker that posts events as JSON to an HTTP collector endpoint.
pub struct HttpTracker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTracker {
    pub fn new(endpoint: String) -> Self {
        HttpTracker {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl Tracker for HttpTracker {
    async fn track(
        &self,
        event: &str,
        properties: HashMap<String, Value>,
    ) -> ProvisionerResult<()> {
        let payload = json!({
            "event": event,
            "properties": properties,
            "timestamp": chrono::Utc::now(),
        });
        self.client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProvisionerError::Telemetry {
                message: format!("failed to post '{event}' to {}: {e}", self.endpoint),
            })?
            .error_for_status()
            .map_err(|e| ProvisionerError::Telemetry {
                message: format!("collector rejected '{event}': {e}"),
            })?;
        Ok(())
    }
}
