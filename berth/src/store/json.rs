//! JSON-file store
//!
//! Keeps records in a [`MemoryStore`] and rewrites the state file after every
//! mutation. Writes go through a temporary file and a rename, so a crash
//! leaves either the old or the new snapshot on disk.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::deploy::fsm::DeploymentState;
use crate::errors::{BerthError, StoreError};
use crate::filesys::file::File;
use crate::models::application::Application;
use crate::models::deployment::{Deployment, NewDeployment, PipelineOutcome};
use crate::store::memory::{MemoryStore, Snapshot};
use crate::store::Store;

const INTERRUPTED_REASON: &str = "interrupted by daemon restart";

pub struct JsonStore {
    inner: MemoryStore,
    file: File,
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open the store, loading the existing snapshot if present
    pub async fn open(file: File) -> Result<Self, BerthError> {
        let snapshot = if file.exists().await {
            let snapshot: Snapshot = file.read_json().await?;
            info!(
                "Loaded {} applications and {} deployments from {}",
                snapshot.applications.len(),
                snapshot.deployments.len(),
                file.path().display()
            );
            snapshot
        } else {
            Snapshot::default()
        };

        let store = Self {
            inner: MemoryStore::from_snapshot(snapshot),
            file,
            write_lock: Mutex::new(()),
        };
        store.fail_interrupted().await?;
        Ok(store)
    }

    /// Deployments left RUNNING by a previous process never finish; mark them failed
    async fn fail_interrupted(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot();
        let interrupted: Vec<(String, String)> = before
            .deployments
            .values()
            .filter(|d| d.status == DeploymentState::Running)
            .map(|d| (d.application_id.clone(), d.id.clone()))
            .collect();
        if interrupted.is_empty() {
            return Ok(());
        }

        let outcome = PipelineOutcome::Failed(INTERRUPTED_REASON.to_string());
        for (application_id, deployment_id) in &interrupted {
            if let Err(e) = self
                .inner
                .record_outcome(application_id, deployment_id, &outcome)
                .await
            {
                warn!(deployment_id = %deployment_id, "Cannot fail interrupted deployment: {}", e);
            }
        }
        info!("Marked {} interrupted deployments as failed", interrupted.len());
        self.persist(before).await
    }

    /// Write the current records, restoring `before` in memory if that fails.
    /// Callers hold the write lock.
    async fn persist(&self, before: Snapshot) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot();
        if let Err(e) = self.file.write_json(&snapshot).await {
            warn!("Failed to write {}: {}", self.file.path().display(), e);
            self.inner.restore(before);
            return Err(StoreError::Io(e.to_string()));
        }
        debug!("Flushed store snapshot to {}", self.file.path().display());
        Ok(())
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn get_application(&self, id: &str) -> Result<Application, StoreError> {
        self.inner.get_application(id).await
    }

    async fn put_application(&self, application: Application) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot();
        self.inner.put_application(application).await?;
        self.persist(before).await
    }

    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot();
        let deployment = self.inner.create_deployment(new).await?;
        self.persist(before).await?;
        Ok(deployment)
    }

    async fn get_deployment(&self, id: &str) -> Result<Deployment, StoreError> {
        self.inner.get_deployment(id).await
    }

    async fn list_deployments(&self, application_id: &str) -> Result<Vec<Deployment>, StoreError> {
        self.inner.list_deployments(application_id).await
    }

    async fn record_outcome(
        &self,
        application_id: &str,
        deployment_id: &str,
        outcome: &PipelineOutcome,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let before = self.inner.snapshot();
        self.inner
            .record_outcome(application_id, deployment_id, outcome)
            .await?;
        self.persist(before).await
    }
}
