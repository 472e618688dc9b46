//! Docker Engine runtime

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::{CreateImageOptions, TagImageOptions};
use bollard::models::{EndpointSettings, HostConfig, PortBinding};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions};
use bollard::volume::CreateVolumeOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info};

use crate::errors::RuntimeError;
use crate::runtime::{ContainerRuntime, ContainerSpec, ContainerSummary};

/// Seconds the daemon waits for a graceful stop before killing
const STOP_GRACE_SECS: i64 = 10;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon (custom socket or auto-detect)
    pub fn connect(socket_path: Option<&str>, timeout_secs: u64) -> Result<Self, RuntimeError> {
        let docker = match socket_path {
            Some(path) => {
                Docker::connect_with_unix(path, timeout_secs, bollard::API_DEFAULT_VERSION)
                    .map_err(|e| {
                        RuntimeError::Fatal(format!(
                            "Failed to connect to Docker at {}: {}",
                            path, e
                        ))
                    })?
            }
            None => Docker::connect_with_local_defaults().map_err(|e| {
                RuntimeError::Fatal(format!(
                    "Failed to connect to Docker: {}. Ensure the daemon is running and the \
                     socket is accessible",
                    e
                ))
            })?,
        };

        Ok(Self { docker })
    }
}

/// Map a Docker API error onto the runtime error taxonomy
fn classify(err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 409,
            message,
        } => RuntimeError::Conflict(message),
        // Connecting an attached container is reported as 403 by older daemons
        DockerError::DockerResponseServerError {
            status_code: 403,
            message,
        } if message.contains("already exists") => RuntimeError::Conflict(message),
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Fatal(format!("{} (status {})", message, status_code)),
        DockerError::RequestTimeoutError => {
            RuntimeError::Unavailable("request to Docker timed out".to_string())
        }
        err @ (DockerError::IOError { .. }
        | DockerError::HyperResponseError { .. }
        | DockerError::HyperLegacyError { .. }) => RuntimeError::Unavailable(err.to_string()),
        other => RuntimeError::Fatal(other.to_string()),
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Split an image reference into repository and tag, defaulting to `latest`
pub fn split_image_reference(image: &str) -> (String, String) {
    if image.contains('@') {
        return (image.to_string(), String::new());
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (image[..split].to_string(), image[split + 1..].to_string())
        }
        None => (image.to_string(), "latest".to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await.map_err(classify)?;
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            check_duplicate: true,
            ..Default::default()
        };
        self.docker.create_network(options).await.map_err(classify)?;
        info!("Created Docker network {}", name);
        Ok(())
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        // The volume endpoint returns the existing volume instead of a conflict
        match self.docker.inspect_volume(name).await {
            Ok(_) => {
                return Err(RuntimeError::Conflict(format!(
                    "volume {} already exists",
                    name
                )))
            }
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(classify(e)),
        }

        let options = CreateVolumeOptions {
            name: name.to_string(),
            ..Default::default()
        };
        self.docker.create_volume(options).await.map_err(classify)?;
        info!("Created Docker volume {}", name);
        Ok(())
    }

    async fn list_containers_named(&self, name: &str) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![format!("^/{}$", name)]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(classify)?;

        let expected = format!("/{}", name);
        Ok(containers
            .into_iter()
            .filter(|c| {
                c.names
                    .as_ref()
                    .map(|names| names.iter().any(|n| *n == expected))
                    .unwrap_or(false)
            })
            .filter_map(|c| {
                let id = c.id?;
                Some(ContainerSummary {
                    id,
                    name: name.to_string(),
                    running: c.state.as_deref() == Some("running"),
                })
            })
            .collect())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(classify)
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(classify)
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
            .ports
            .iter()
            .map(|p| (format!("{}/tcp", p.container_port), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .ports
            .iter()
            .map(|p| {
                (
                    format!("{}/tcp", p.container_port),
                    Some(vec![PortBinding {
                        host_ip: Some(p.host_ip.clone()),
                        host_port: Some(p.host_port.to_string()),
                    }]),
                )
            })
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(spec.binds.clone()),
            ..Default::default()
        };

        let networking_config = spec.network.as_ref().map(|network| NetworkingConfig {
            endpoints_config: HashMap::from([(network.clone(), EndpointSettings::default())]),
        });

        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(classify)?;
        debug!("Created container {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn container_networks(&self, id: &str) -> Result<Vec<String>, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(classify)?;

        Ok(inspect
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), RuntimeError> {
        let options = ConnectNetworkOptions {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        self.docker
            .connect_network(network, options)
            .await
            .map_err(classify)
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let (repo, tag) = split_image_reference(image);
        let options = CreateImageOptions {
            from_image: repo,
            tag,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(classify)?;
            if let Some(status) = progress.status {
                debug!("pull {}: {}", image, status);
            }
        }
        info!("Pulled image {}", image);
        Ok(())
    }

    async fn tag_image(&self, source: &str, repo: &str, tag: &str) -> Result<(), RuntimeError> {
        let options = TagImageOptions {
            repo: repo.to_string(),
            tag: tag.to_string(),
        };
        self.docker
            .tag_image(source, Some(options))
            .await
            .map_err(classify)
    }
}
