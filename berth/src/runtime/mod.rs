//! Container runtime collaborator
//!
//! The reconciler talks to the local container host only through
//! [`ContainerRuntime`]. Implementations report "already exists" style
//! failures as [`RuntimeError::Conflict`] and connection-level failures as
//! [`RuntimeError::Unavailable`]; everything else is fatal.

pub mod docker;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::RuntimeError;

pub use docker::DockerRuntime;
pub use memory::MemoryRuntime;

/// Summary of a container found by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// A host port published for a container port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_ip: String,
    pub host_port: u16,
}

/// Desired configuration for a new container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub ports: Vec<PortMapping>,
    /// `source:target` bind entries
    pub binds: Vec<String>,
    /// Network attached at creation time
    pub network: Option<String>,
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check that the runtime answers
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Create a network. Fails with `Conflict` when the name is taken.
    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Create a volume. Fails with `Conflict` when the name is taken.
    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError>;

    /// All containers (running or not) whose name is exactly `name`
    async fn list_containers_named(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Remove a container, killing it first if needed
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Names of the networks a container is attached to
    async fn container_networks(&self, id: &str) -> Result<Vec<String>, RuntimeError>;

    /// Attach a container to a network. Fails with `Conflict` when already attached.
    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError>;

    /// Pull an image reference from its registry
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Tag `source` as `repo:tag`
    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> Result<(), RuntimeError>;
}
