//! Provisioning library for ephemeral multi-node oracle test environments
//!
//! Plans a topology from declarative configuration, assigns capabilities to
//! node groups, brings up chains, node groups, and the control-plane service
//! concurrently, assembles job specs, and guards the whole attempt with
//! signal handling, panic recovery, and best-effort cleanup.

pub mod capabilities;
pub mod config;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod provisioner;
pub mod services;
pub mod settings;
pub mod telemetry;
pub mod topology;
pub mod traits;

// Re-export commonly used types
pub use config::ProvisioningRequest;
pub use error::{ProvisionerError, ProvisionerResult};
pub use lifecycle::{LifecycleGuard, ProvisionContext, RESOURCE_LABEL};
pub use provisioner::{Provisioner, ProvisioningResult};
pub use settings::SettingsArtifact;
pub use topology::TopologyMode;
pub use traits::{BlockchainProvider, ContainerEngine, ControlPlaneProvider, NodeGroupProvider, Tracker};
