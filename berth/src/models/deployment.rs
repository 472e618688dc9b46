//! Deployment models

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentState;

/// One run of the deployment pipeline for an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Unique deployment ID
    pub id: String,

    /// Application this deployment belongs to
    pub application_id: String,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Append-only pipeline log, fixed at creation
    pub log_path: PathBuf,

    pub status: DeploymentState,

    /// Failure reason for deployments that ended in `ERROR`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Fields the coordinator supplies when creating a deployment
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub application_id: String,
    pub title: String,
    pub description: Option<String>,
    pub log_path: PathBuf,
}

/// A deployment with its log text attached for listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentWithLogs {
    #[serde(flatten)]
    pub deployment: Deployment,

    pub log_data: String,
}

/// Final result of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Failed(String),
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded)
    }
}
