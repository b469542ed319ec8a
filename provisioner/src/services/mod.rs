//! Concrete service implementations backing the collaborator traits

pub mod blockchain;
pub mod control_plane;
pub mod docker;
pub mod node_group;

pub use blockchain::LocalBlockchainProvider;
pub use control_plane::LocalControlPlaneProvider;
pub use docker::DockerEngine;
pub use node_group::LocalNodeGroupProvider;
