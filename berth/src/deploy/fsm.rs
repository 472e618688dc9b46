//! Finite state machine for deployment status

use serde::{Deserialize, Serialize};

use crate::models::application::ApplicationStatus;
use crate::models::deployment::PipelineOutcome;

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// Pipeline queued or in progress (initial state)
    Running,

    /// Pipeline finished and the container was started
    Done,

    /// Pipeline aborted
    Error,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentState::Running)
    }

    /// Process a pipeline outcome and return the next state.
    ///
    /// Re-applying the outcome that produced the current terminal state is
    /// accepted so the status write can be retried safely.
    pub fn process(&self, outcome: &PipelineOutcome) -> Result<DeploymentState, String> {
        match (self, outcome) {
            (DeploymentState::Running, PipelineOutcome::Succeeded) => Ok(DeploymentState::Done),
            (DeploymentState::Running, PipelineOutcome::Failed(_)) => Ok(DeploymentState::Error),

            (DeploymentState::Done, PipelineOutcome::Succeeded) => Ok(DeploymentState::Done),
            (DeploymentState::Error, PipelineOutcome::Failed(_)) => Ok(DeploymentState::Error),

            (state, outcome) => Err(format!("Invalid transition: {:?} -> {:?}", state, outcome)),
        }
    }
}

/// Application status that mirrors a pipeline outcome
pub fn application_status_for(outcome: &PipelineOutcome) -> ApplicationStatus {
    match outcome {
        PipelineOutcome::Succeeded => ApplicationStatus::Running,
        PipelineOutcome::Failed(_) => ApplicationStatus::Error,
    }
}
