//! Deployment pipeline
//!
//! A pipeline run owns one deployment from the moment a worker picks it up:
//! fetch and build (or pull) the image, reconcile the runtime, record the
//! outcome and release the log.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::deploy::broadcaster::{DeploymentLog, LogHub};
use crate::deploy::builder::{BuildRequest, ImageBuilder};
use crate::deploy::env::prepare_environment_variables;
use crate::deploy::git::SourceFetcher;
use crate::deploy::queue::{ApplicationLocks, PipelineJob};
use crate::deploy::reconciler::Reconciler;
use crate::deploy::status::StatusSynchronizer;
use crate::errors::BerthError;
use crate::models::application::{Application, SourceType};
use crate::models::deployment::PipelineOutcome;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Root of the per-application working trees
    pub applications_dir: PathBuf,

    /// Abort the run when the source cannot be fetched
    pub fetch_failure_blocking: bool,
}

pub struct Pipeline {
    hub: Arc<LogHub>,
    fetcher: Arc<dyn SourceFetcher>,
    builder: Arc<dyn ImageBuilder>,
    reconciler: Reconciler,
    status: StatusSynchronizer,
    locks: ApplicationLocks,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        hub: Arc<LogHub>,
        fetcher: Arc<dyn SourceFetcher>,
        builder: Arc<dyn ImageBuilder>,
        reconciler: Reconciler,
        status: StatusSynchronizer,
        options: PipelineOptions,
    ) -> Self {
        Self {
            hub,
            fetcher,
            builder,
            reconciler,
            status,
            locks: ApplicationLocks::new(),
            options,
        }
    }

    /// Run a job to completion and return its outcome
    pub async fn run(&self, job: PipelineJob) -> PipelineOutcome {
        let PipelineJob {
            application,
            deployment,
        } = job;

        let _guard = self.locks.acquire(&application.id).await;
        info!(
            application = %application.name,
            deployment_id = %deployment.id,
            "Starting deployment pipeline"
        );

        let log = DeploymentLog::new(&deployment.id, &deployment.log_path, self.hub.clone());
        log.line(format!(
            "Deployment \"{}\" started for {}",
            deployment.title, application.name
        ))
        .await;

        let outcome = match self.run_stages(&application, &log).await {
            Ok(container_id) => {
                log.line(format!(
                    "Deployment finished, container {} is running ✅",
                    container_id
                ))
                .await;
                PipelineOutcome::Succeeded
            }
            Err(e) => {
                warn!(deployment_id = %deployment.id, "Deployment failed: {}", e);
                log.line(format!("Deployment failed: {} ❌", e)).await;
                PipelineOutcome::Failed(e.to_string())
            }
        };

        // Already logged on failure
        let _ = self
            .status
            .finish(&application.id, &deployment.id, &outcome, &log)
            .await;

        log.close().await;
        outcome
    }

    /// Fail a job that never ran, e.g. one still queued at shutdown
    pub async fn abandon(&self, job: PipelineJob, reason: &str) -> PipelineOutcome {
        let PipelineJob {
            application,
            deployment,
        } = job;
        warn!(deployment_id = %deployment.id, "Abandoning deployment: {}", reason);

        let log = DeploymentLog::new(&deployment.id, &deployment.log_path, self.hub.clone());
        log.line(format!("Deployment cancelled: {} ❌", reason)).await;

        let outcome = PipelineOutcome::Failed(reason.to_string());
        let _ = self
            .status
            .finish(&application.id, &deployment.id, &outcome, &log)
            .await;
        log.close().await;
        outcome
    }

    async fn run_stages(&self, app: &Application, log: &DeploymentLog) -> Result<String, BerthError> {
        let env = prepare_environment_variables(app.env.as_deref());

        match app.source_type {
            SourceType::Git => {
                self.fetch(app, log).await?;
                self.build(app, &env, log).await?;
            }
            SourceType::Image => {
                self.reconciler.prepare_image(app, log).await?;
            }
        }

        self.reconciler.reconcile(app, &env, log).await
    }

    async fn fetch(&self, app: &Application, log: &DeploymentLog) -> Result<(), BerthError> {
        let url = app
            .repository_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                BerthError::ValidationError(format!(
                    "application {} has no repository url",
                    app.name
                ))
            })?;

        let dest = self.options.applications_dir.join(&app.name);
        match self.fetcher.fetch(url, &app.branch, &dest, log).await {
            Ok(()) => Ok(()),
            Err(e) if !self.options.fetch_failure_blocking => {
                warn!(application = %app.name, "Continuing after fetch failure: {}", e);
                log.line(format!(
                    "Continuing with the existing working tree after fetch failure: {}",
                    e
                ))
                .await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn build(&self, app: &Application, env: &[String], log: &DeploymentLog) -> Result<(), BerthError> {
        let request = BuildRequest::for_application(app, &self.options.applications_dir, env.to_vec());
        log.line(format!(
            "Build started: {:?} image {} from {}",
            request.build_type,
            request.image_tag(),
            request.context_dir.display()
        ))
        .await;

        match self.builder.build(&request, log).await {
            Ok(()) => {
                log.line(format!("Build finished: {} ✅", request.image_tag()))
                    .await;
                Ok(())
            }
            Err(e) => {
                log.line(format!("Build failed: {} ❌", e)).await;
                Err(e)
            }
        }
    }
}
