//! In-memory store

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::{application_status_for, DeploymentState};
use crate::errors::StoreError;
use crate::models::application::Application;
use crate::models::deployment::{Deployment, NewDeployment, PipelineOutcome};
use crate::store::Store;
use crate::utils::generate_uuid;

/// Serializable contents of a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub applications: HashMap<String, Application>,

    #[serde(default)]
    pub deployments: HashMap<String, Deployment>,
}

/// Store holding every record behind one lock
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Snapshot>,
    failing_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            records: RwLock::new(snapshot),
            failing_writes: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.records.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace every record with `snapshot`
    pub fn restore(&self, snapshot: Snapshot) {
        *self.records.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    /// Make the next `count` outcome writes fail with a transient error
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        let previous = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match previous {
            Ok(_) => Err(StoreError::Unavailable("injected failure".to_string())),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_application(&self, id: &str) -> Result<Application, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .applications
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "application",
                id: id.to_string(),
            })
    }

    async fn put_application(&self, application: Application) -> Result<(), StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.applications.insert(application.id.clone(), application);
        Ok(())
    }

    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, StoreError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if !records.applications.contains_key(&new.application_id) {
            return Err(StoreError::NotFound {
                kind: "application",
                id: new.application_id,
            });
        }

        let deployment = Deployment {
            id: generate_uuid(),
            application_id: new.application_id,
            title: new.title,
            description: new.description,
            log_path: new.log_path,
            status: DeploymentState::Running,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        };
        records
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn get_deployment(&self, id: &str) -> Result<Deployment, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .deployments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: id.to_string(),
            })
    }

    async fn list_deployments(&self, application_id: &str) -> Result<Vec<Deployment>, StoreError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut deployments: Vec<Deployment> = records
            .deployments
            .values()
            .filter(|d| d.application_id == application_id)
            .cloned()
            .collect();
        deployments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.log_path.cmp(&a.log_path))
        });
        Ok(deployments)
    }

    async fn record_outcome(
        &self,
        application_id: &str,
        deployment_id: &str,
        outcome: &PipelineOutcome,
    ) -> Result<(), StoreError> {
        self.take_injected_failure()?;

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());

        if !records.applications.contains_key(application_id) {
            return Err(StoreError::NotFound {
                kind: "application",
                id: application_id.to_string(),
            });
        }
        let deployment = records
            .deployments
            .get_mut(deployment_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "deployment",
                id: deployment_id.to_string(),
            })?;

        let next = deployment
            .status
            .process(outcome)
            .map_err(StoreError::InvalidTransition)?;
        if deployment.status == next {
            // Already applied
            return Ok(());
        }

        deployment.status = next;
        deployment.finished_at = Some(Utc::now());
        if let PipelineOutcome::Failed(reason) = outcome {
            deployment.error = Some(reason.clone());
        }

        if let Some(application) = records.applications.get_mut(application_id) {
            application.status = application_status_for(outcome);
        }
        Ok(())
    }
}
