//! Persistence collaborator
//!
//! The pipeline only needs a narrow slice of the record store: reading
//! applications, creating and listing deployments, and writing the final
//! outcome. `record_outcome` updates the deployment and its application in a
//! single atomic step.

pub mod json;
pub mod memory;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::application::Application;
use crate::models::deployment::{Deployment, NewDeployment, PipelineOutcome};

pub use json::JsonStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_application(&self, id: &str) -> Result<Application, StoreError>;

    /// Insert or replace an application definition
    async fn put_application(&self, application: Application) -> Result<(), StoreError>;

    /// Create a deployment in the `RUNNING` state
    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, StoreError>;

    async fn get_deployment(&self, id: &str) -> Result<Deployment, StoreError>;

    /// Deployments of one application, newest first
    async fn list_deployments(&self, application_id: &str) -> Result<Vec<Deployment>, StoreError>;

    /// Apply a pipeline outcome to the deployment and its application.
    ///
    /// Idempotent: applying the same outcome twice leaves the records as
    /// after the first call.
    async fn record_outcome(
        &self,
        application_id: &str,
        deployment_id: &str,
        outcome: &PipelineOutcome,
    ) -> Result<(), StoreError>;
}
