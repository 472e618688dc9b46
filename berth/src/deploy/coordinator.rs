//! Deployment coordinator
//!
//! Entry point for triggering and inspecting deployments. Triggering creates
//! the deployment record and hands the run to the worker pool; it never waits
//! for the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::deploy::broadcaster::{DeploymentLog, LogHub};
use crate::deploy::queue::{JobQueue, PipelineJob};
use crate::errors::BerthError;
use crate::models::deployment::{Deployment, DeploymentWithLogs, NewDeployment, PipelineOutcome};
use crate::store::Store;

/// Filename-safe UTC timestamp used in log file names
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

pub const DEFAULT_TITLE: &str = "Manual deployment";

/// `logs_dir/<app>/<app>-<timestamp>.log`
pub fn log_path_for(logs_dir: &Path, app_name: &str, at: DateTime<Utc>) -> PathBuf {
    logs_dir.join(app_name).join(format!(
        "{}-{}.log",
        app_name,
        at.format(LOG_TIMESTAMP_FORMAT)
    ))
}

pub struct Coordinator {
    store: Arc<dyn Store>,
    hub: Arc<LogHub>,
    queue: JobQueue,
    logs_dir: PathBuf,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, hub: Arc<LogHub>, queue: JobQueue, logs_dir: PathBuf) -> Self {
        Self {
            store,
            hub,
            queue,
            logs_dir,
        }
    }

    /// Create a RUNNING deployment and queue its pipeline
    pub async fn trigger_deploy(
        &self,
        application_id: &str,
        title: Option<String>,
        description: Option<String>,
    ) -> Result<Deployment, BerthError> {
        let application = self.store.get_application(application_id).await?;

        let log_path = log_path_for(&self.logs_dir, &application.name, Utc::now());
        if let Some(dir) = log_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        let deployment = self
            .store
            .create_deployment(NewDeployment {
                application_id: application.id.clone(),
                title,
                description,
                log_path,
            })
            .await?;
        self.hub.open(&deployment.id);

        info!(
            application = %application.name,
            deployment_id = %deployment.id,
            log_path = %deployment.log_path.display(),
            "Deployment created"
        );

        let job = PipelineJob {
            application,
            deployment: deployment.clone(),
        };
        if let Err(e) = self.queue.submit(job) {
            self.reject(&deployment, &e).await;
            return Err(e);
        }

        Ok(deployment)
    }

    /// Mark a deployment that never reached a worker as failed
    async fn reject(&self, deployment: &Deployment, reason: &BerthError) {
        warn!(deployment_id = %deployment.id, "Deployment not queued: {}", reason);
        let log = DeploymentLog::new(&deployment.id, &deployment.log_path, self.hub.clone());
        log.line(format!("Deployment could not be queued: {} ❌", reason))
            .await;

        let outcome = PipelineOutcome::Failed(reason.to_string());
        if let Err(e) = self
            .store
            .record_outcome(&deployment.application_id, &deployment.id, &outcome)
            .await
        {
            error!(deployment_id = %deployment.id, "Failed to update deployment status: {}", e);
        }
        log.close().await;
    }

    /// Deployments of an application, newest first, with their log text
    pub async fn list_deployments_for_application(
        &self,
        application_id: &str,
    ) -> Result<Vec<DeploymentWithLogs>, BerthError> {
        self.store.get_application(application_id).await?;
        let deployments = self.store.list_deployments(application_id).await?;

        let mut listed = Vec::with_capacity(deployments.len());
        for deployment in deployments {
            let log_data = read_log(&deployment).await;
            listed.push(DeploymentWithLogs {
                deployment,
                log_data,
            });
        }
        Ok(listed)
    }

    pub async fn get_deployment(&self, deployment_id: &str) -> Result<Deployment, BerthError> {
        Ok(self.store.get_deployment(deployment_id).await?)
    }

    /// Live log stream of a deployment, `None` once it has finished
    pub fn subscribe(&self, deployment_id: &str) -> Option<broadcast::Receiver<String>> {
        self.hub.subscribe(deployment_id)
    }
}

/// Full log text of a deployment; empty when the file is missing or unreadable
pub async fn read_log(deployment: &Deployment) -> String {
    match tokio::fs::read_to_string(&deployment.log_path).await {
        Ok(text) => text,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    deployment_id = %deployment.id,
                    "Failed to read log file {}: {}",
                    deployment.log_path.display(),
                    e
                );
            }
            String::new()
        }
    }
}
