//! Container runtime reconciliation
//!
//! Brings the runtime to the state an application needs: its project network,
//! its data volume and one freshly created container named after the
//! application. Every step tolerates leftovers from earlier partial runs.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::deploy::broadcaster::DeploymentLog;
use crate::errors::{BerthError, RuntimeError};
use crate::models::application::Application;
use crate::runtime::{ContainerRuntime, ContainerSpec, PortMapping};
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Mount point of the application volume inside the container
pub const DATA_MOUNT: &str = "/app/data";

pub const LABEL_APPLICATION: &str = "berth.application";
pub const LABEL_PROJECT: &str = "berth.project";

/// Whether a resource was made by this call or already existed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    Adopted,
}

/// Timeouts and retry policy for runtime calls
#[derive(Debug, Clone)]
pub struct ReconcilerOptions {
    pub call_timeout: Duration,
    pub pull_timeout: Duration,
    /// Total attempts per call, including the first
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            pull_timeout: Duration::from_secs(600),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

pub struct Reconciler {
    runtime: Arc<dyn ContainerRuntime>,
    options: ReconcilerOptions,
}

impl Reconciler {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: ReconcilerOptions) -> Self {
        Self { runtime, options }
    }

    /// Run a runtime call under the timeout, retrying transient failures
    async fn call<T, F, Fut>(&self, what: &str, timeout: Duration, mut op: F) -> Result<T, RuntimeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RuntimeError>>,
    {
        let cooldown = CooldownOptions::with_base_delay(self.options.retry_base_delay);
        let attempts = self.options.retry_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(RuntimeError::Timeout(timeout)),
            };

            match result {
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = calc_exp_backoff(&cooldown, attempt);
                    warn!(
                        "{} failed ({}), retrying in {:?} ({}/{})",
                        what,
                        e,
                        delay,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Create the network, adopting it if it already exists
    pub async fn ensure_network(&self, name: &str, log: &DeploymentLog) -> Result<Ensured, BerthError> {
        log.line(format!("Ensuring network {}", name)).await;
        let timeout = self.options.call_timeout;
        match self
            .call("create network", timeout, || self.runtime.create_network(name))
            .await
        {
            Ok(()) => {
                log.line(format!("Created network {} ✅", name)).await;
                Ok(Ensured::Created)
            }
            Err(e) if e.is_conflict() => {
                log.line(format!("Network {} already exists, reusing it ✅", name))
                    .await;
                Ok(Ensured::Adopted)
            }
            Err(e) => {
                log.line(format!("Error creating network {}: {} ❌", name, e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Create the volume, adopting it if it already exists
    pub async fn ensure_volume(&self, name: &str, log: &DeploymentLog) -> Result<Ensured, BerthError> {
        log.line(format!("Ensuring volume {}", name)).await;
        let timeout = self.options.call_timeout;
        match self
            .call("create volume", timeout, || self.runtime.create_volume(name))
            .await
        {
            Ok(()) => {
                log.line(format!("Created volume {} ✅", name)).await;
                Ok(Ensured::Created)
            }
            Err(e) if e.is_conflict() => {
                log.line(format!("Volume {} already exists, reusing it ✅", name))
                    .await;
                Ok(Ensured::Adopted)
            }
            Err(e) => {
                log.line(format!("Error creating volume {}: {} ❌", name, e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Container configuration for an application
    pub fn container_spec(
        app: &Application,
        network: &str,
        volume: &str,
        env: &[String],
    ) -> ContainerSpec {
        ContainerSpec {
            name: app.container_name().to_string(),
            image: app.image_tag(),
            env: env.to_vec(),
            ports: vec![PortMapping {
                container_port: app.target_port,
                host_ip: "0.0.0.0".to_string(),
                host_port: app.published_port,
            }],
            binds: vec![format!("{}:{}", volume, DATA_MOUNT)],
            network: Some(network.to_string()),
            labels: [
                (LABEL_APPLICATION.to_string(), app.id.clone()),
                (LABEL_PROJECT.to_string(), app.project_id.clone()),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Remove every container carrying the application's name and create a new one.
    ///
    /// Returns the id of the new (not yet started) container.
    pub async fn find_or_replace_container(
        &self,
        app: &Application,
        network: &str,
        volume: &str,
        env: &[String],
        log: &DeploymentLog,
    ) -> Result<String, BerthError> {
        let name = app.container_name();
        let timeout = self.options.call_timeout;

        let existing = match self
            .call("list containers", timeout, || self.runtime.list_containers_named(name))
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                log.line(format!("Error listing containers named {}: {} ❌", name, e))
                    .await;
                return Err(e.into());
            }
        };

        for container in existing {
            log.line(format!("Replacing existing container {} ({})", name, container.id))
                .await;
            if let Err(e) = self
                .call("stop container", timeout, || self.runtime.stop_container(&container.id))
                .await
            {
                debug!("Ignoring stop failure for {}: {}", container.id, e);
            }
            if let Err(e) = self
                .call("remove container", timeout, || {
                    self.runtime.remove_container(&container.id)
                })
                .await
            {
                log.line(format!("Error removing container {}: {} ❌", container.id, e))
                    .await;
                return Err(e.into());
            }
            log.line(format!("Removed container {} ✅", container.id)).await;
        }

        let spec = Self::container_spec(app, network, volume, env);
        log.line(format!("Creating container {} from {}", name, spec.image))
            .await;
        let mut attempts = 0;
        let created = self
            .call("create container", timeout, || {
                attempts += 1;
                self.runtime.create_container(&spec)
            })
            .await;

        let created = match created {
            // Every old container was removed above, so after a retried create
            // the name can only be held by the attempt whose reply was lost
            Err(e) if e.is_conflict() && attempts > 1 => {
                self.adopt_created(name, timeout).await.map_err(|_| e)
            }
            other => other,
        };

        match created {
            Ok(id) => {
                log.line(format!("Created container {} ({}) ✅", name, id)).await;
                Ok(id)
            }
            Err(e) => {
                log.line(format!("Error creating container {}: {} ❌", name, e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Id of the single container named `name`
    async fn adopt_created(&self, name: &str, timeout: Duration) -> Result<String, RuntimeError> {
        let mut found = self
            .call("list containers", timeout, || self.runtime.list_containers_named(name))
            .await?;
        match (found.pop(), found.is_empty()) {
            (Some(container), true) => {
                debug!("Adopting container {} from a retried create", container.id);
                Ok(container.id)
            }
            _ => Err(RuntimeError::Fatal(format!(
                "cannot tell which container named {} was created",
                name
            ))),
        }
    }

    pub async fn start(&self, container_id: &str, log: &DeploymentLog) -> Result<(), BerthError> {
        log.line(format!("Starting container {}", container_id)).await;
        let timeout = self.options.call_timeout;
        match self
            .call("start container", timeout, || self.runtime.start_container(container_id))
            .await
        {
            Ok(()) => {
                log.line(format!("Container {} started ✅", container_id)).await;
                Ok(())
            }
            Err(e) => {
                log.line(format!("Error starting container {}: {} ❌", container_id, e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Attach the container to the network unless it already is
    pub async fn connect_to_network(
        &self,
        container_id: &str,
        network: &str,
        log: &DeploymentLog,
    ) -> Result<Ensured, BerthError> {
        let timeout = self.options.call_timeout;
        let memberships = self
            .call("inspect container", timeout, || {
                self.runtime.container_networks(container_id)
            })
            .await
            .map_err(BerthError::from)?;

        if memberships.iter().any(|n| n == network) {
            log.line(format!("Container already connected to {} ✅", network))
                .await;
            return Ok(Ensured::Adopted);
        }

        match self
            .call("connect network", timeout, || {
                self.runtime.connect_network(network, container_id)
            })
            .await
        {
            Ok(()) => {
                log.line(format!("Connected container to {} ✅", network)).await;
                Ok(Ensured::Created)
            }
            Err(e) if e.is_conflict() => {
                log.line(format!("Container already connected to {} ✅", network))
                    .await;
                Ok(Ensured::Adopted)
            }
            Err(e) => {
                log.line(format!("Error connecting container to {}: {} ❌", network, e))
                    .await;
                Err(e.into())
            }
        }
    }

    /// Pull a registry image and tag it as the application's image
    pub async fn prepare_image(&self, app: &Application, log: &DeploymentLog) -> Result<(), BerthError> {
        let image = app
            .image
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .ok_or_else(|| {
                BerthError::ValidationError(format!(
                    "application {} has no image reference",
                    app.name
                ))
            })?;

        log.line(format!("Pulling image {}", image)).await;
        let pull_timeout = self.options.pull_timeout;
        if let Err(e) = self
            .call("pull image", pull_timeout, || self.runtime.pull_image(image))
            .await
        {
            log.line(format!("Error pulling image {}: {} ❌", image, e)).await;
            return Err(e.into());
        }
        log.line(format!("Pulled image {} ✅", image)).await;

        let timeout = self.options.call_timeout;
        if let Err(e) = self
            .call("tag image", timeout, || {
                self.runtime.tag_image(image, &app.name, "latest")
            })
            .await
        {
            log.line(format!("Error tagging {} as {}: {} ❌", image, app.image_tag(), e))
                .await;
            return Err(e.into());
        }
        log.line(format!("Tagged {} as {} ✅", image, app.image_tag()))
            .await;
        Ok(())
    }

    /// Network, volume, container, start, attach. Returns the container id.
    pub async fn reconcile(
        &self,
        app: &Application,
        env: &[String],
        log: &DeploymentLog,
    ) -> Result<String, BerthError> {
        let network = app.network_name();
        let volume = app.volume_name();

        self.ensure_network(&network, log).await?;
        self.ensure_volume(&volume, log).await?;
        let container_id = self
            .find_or_replace_container(app, &network, &volume, env, log)
            .await?;
        self.start(&container_id, log).await?;
        self.connect_to_network(&container_id, &network, log).await?;

        info!(
            application = %app.name,
            container_id = %container_id,
            "Application container is running"
        );
        Ok(container_id)
    }
}
