//! In-memory container runtime
//!
//! Mirrors the Docker daemon's observable rules (unique names, conflicts on
//! duplicate networks and volumes, image must exist before create) without
//! touching a real host. Used for dry runs and tests. Failures can be
//! injected per operation.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::errors::RuntimeError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerSummary};
use crate::utils::generate_uuid;

/// Operations that accept injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeOp {
    CreateNetwork,
    CreateVolume,
    ListContainers,
    StopContainer,
    RemoveContainer,
    CreateContainer,
    StartContainer,
    ConnectNetwork,
    PullImage,
}

/// A container held by the in-memory runtime
#[derive(Debug, Clone)]
pub struct MemoryContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub running: bool,
    pub networks: BTreeSet<String>,
}

#[derive(Default)]
struct State {
    networks: HashSet<String>,
    volumes: HashSet<String>,
    images: HashSet<String>,
    containers: HashMap<String, MemoryContainer>,
    failures: HashMap<RuntimeOp, VecDeque<RuntimeError>>,
    lost_replies: HashMap<RuntimeOp, VecDeque<RuntimeError>>,
    calls: HashMap<RuntimeOp, u32>,
}

#[derive(Default)]
pub struct MemoryRuntime {
    state: RwLock<State>,
}

fn normalize_image(image: &str) -> String {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    if image.contains('@') || image[name_start..].contains(':') {
        image.to_string()
    } else {
        format!("{}:latest", image)
    }
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image as present on the host
    pub fn add_image(&self, image: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.images.insert(normalize_image(image));
    }

    pub fn has_image(&self, image: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.images.contains(&normalize_image(image))
    }

    /// Queue an error for the next call of `op`
    pub fn inject_failure(&self, op: RuntimeOp, error: RuntimeError) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failures.entry(op).or_default().push_back(error);
    }

    /// Let the next `op` take effect but report `error` to the caller,
    /// like a daemon that acted before the client timed out
    pub fn lose_reply(&self, op: RuntimeOp, error: RuntimeError) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.lost_replies.entry(op).or_default().push_back(error);
    }

    /// Number of calls made to `op`, including failed ones
    pub fn calls(&self, op: RuntimeOp) -> u32 {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.calls.get(&op).copied().unwrap_or(0)
    }

    pub fn network_exists(&self, name: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.networks.contains(name)
    }

    pub fn network_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.networks.len()
    }

    pub fn volume_exists(&self, name: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.volumes.contains(name)
    }

    pub fn volume_count(&self) -> usize {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.volumes.len()
    }

    /// Containers with the given name, running or not
    pub fn containers_named(&self, name: &str) -> Vec<MemoryContainer> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .containers
            .values()
            .filter(|c| c.spec.name == name)
            .cloned()
            .collect()
    }

    /// Record a call and pop an injected failure, if any
    fn enter(&self, state: &mut State, op: RuntimeOp) -> Result<(), RuntimeError> {
        *state.calls.entry(op).or_insert(0) += 1;
        match state.failures.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn container_mut<'a>(
        state: &'a mut State,
        id: &str,
    ) -> Result<&'a mut MemoryContainer, RuntimeError> {
        state
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::Fatal(format!("No such container: {}", id)))
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::CreateNetwork)?;
        if !state.networks.insert(name.to_string()) {
            return Err(RuntimeError::Conflict(format!(
                "network with name {} already exists",
                name
            )));
        }
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::CreateVolume)?;
        if !state.volumes.insert(name.to_string()) {
            return Err(RuntimeError::Conflict(format!(
                "volume {} already exists",
                name
            )));
        }
        Ok(())
    }

    async fn list_containers_named(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::ListContainers)?;
        Ok(state
            .containers
            .values()
            .filter(|c| c.spec.name == name)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.spec.name.clone(),
                running: c.running,
            })
            .collect())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::StopContainer)?;
        let container = Self::container_mut(&mut state, id)?;
        if !container.running {
            return Err(RuntimeError::Fatal(format!(
                "container {} is not running",
                id
            )));
        }
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::RemoveContainer)?;
        state
            .containers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::Fatal(format!("No such container: {}", id)))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::CreateContainer)?;

        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(RuntimeError::Conflict(format!(
                "container name \"/{}\" is already in use",
                spec.name
            )));
        }
        if !state.images.contains(&normalize_image(&spec.image)) {
            return Err(RuntimeError::Fatal(format!("No such image: {}", spec.image)));
        }

        let mut networks = BTreeSet::new();
        if let Some(network) = &spec.network {
            if !state.networks.contains(network) {
                return Err(RuntimeError::Fatal(format!("network {} not found", network)));
            }
            networks.insert(network.clone());
        }

        let id = generate_uuid();
        state.containers.insert(
            id.clone(),
            MemoryContainer {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
                networks,
            },
        );
        if let Some(err) = state
            .lost_replies
            .get_mut(&RuntimeOp::CreateContainer)
            .and_then(|q| q.pop_front())
        {
            return Err(err);
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::StartContainer)?;
        Self::container_mut(&mut state, id)?.running = true;
        Ok(())
    }

    async fn container_networks(&self, id: &str) -> Result<Vec<String>, RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let container = Self::container_mut(&mut state, id)?;
        Ok(container.networks.iter().cloned().collect())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::ConnectNetwork)?;
        if !state.networks.contains(network) {
            return Err(RuntimeError::Fatal(format!("network {} not found", network)));
        }
        let container = Self::container_mut(&mut state, container_id)?;
        if !container.networks.insert(network.to_string()) {
            return Err(RuntimeError::Conflict(format!(
                "endpoint with name {} already exists in network {}",
                container.spec.name, network
            )));
        }
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        self.enter(&mut state, RuntimeOp::PullImage)?;
        state.images.insert(normalize_image(image));
        Ok(())
    }

    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.images.contains(&normalize_image(source)) {
            return Err(RuntimeError::Fatal(format!("No such image: {}", source)));
        }
        state.images.insert(format!("{}:{}", repo, tag));
        Ok(())
    }
}
