//! Provisioner-specific error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("topology mismatch: expected {expected} node groups, got {actual}")]
    TopologyMismatch { expected: usize, actual: usize },

    #[error("capability '{capability}' has no binary path and no shared plugins image is configured")]
    MissingCapabilityBinary { capability: String },

    #[error("missing required credential: {field}")]
    MissingCredential { field: String },

    #[error("invalid provisioning request: {message}")]
    InvalidRequest { message: String },

    #[error("cannot resolve chain ID {chain_id} to a selector")]
    ChainSelectorResolution { chain_id: u64 },

    #[error("cannot resolve binary name for capability '{capability}'")]
    BinaryResolution { capability: String },

    #[error("blockchain startup failed for chain {chain_id}: {message}")]
    Blockchain { chain_id: u64, message: String },

    #[error("control-plane service startup failed: {message}")]
    ControlPlane { message: String },

    #[error("node group '{group}' startup failed: {message}")]
    NodeGroup { group: String, message: String },

    #[error("provisioning timed out after {seconds} seconds")]
    ProvisioningTimeout { seconds: u64 },

    #[error("provisioning interrupted by termination signal")]
    Interrupted,

    #[error("provisioning panicked: {message}")]
    Panicked { message: String },

    #[error("key generation failed: {message}")]
    KeyGeneration { message: String },

    #[error("container engine error: {message}")]
    ContainerEngine { message: String },

    #[error("telemetry tracker error: {message}")]
    Telemetry { message: String },

    #[error("job spec assembly failed: {message}")]
    JobSpec { message: String },

    #[error("{context}")]
    Context {
        context: String,
        #[source]
        source: Box<ProvisionerError>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionerError {
    /// Wrap an error with a one-line contextual message as it crosses a
    /// component boundary, preserving the causal chain.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProvisionerError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Walk the context chain down to the originating error.
    pub fn root_cause(&self) -> &ProvisionerError {
        match self {
            ProvisionerError::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Render the full causal chain as a single line.
    pub fn chain(&self) -> String {
        match self {
            ProvisionerError::Context { context, source } => {
                format!("{}: {}", context, source.chain())
            }
            other => other.to_string(),
        }
    }
}

pub type ProvisionerResult<T> = Result<T, ProvisionerError>;
