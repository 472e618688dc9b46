//! Terminal status recording

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::deploy::broadcaster::DeploymentLog;
use crate::errors::StoreError;
use crate::models::deployment::PipelineOutcome;
use crate::store::Store;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Writes a pipeline outcome to the deployment and its application
pub struct StatusSynchronizer {
    store: Arc<dyn Store>,
    attempts: u32,
    cooldown: CooldownOptions,
}

impl StatusSynchronizer {
    pub fn new(store: Arc<dyn Store>, attempts: u32, base_delay: Duration) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
            cooldown: CooldownOptions::with_base_delay(base_delay),
        }
    }

    /// Record the outcome, retrying transient store failures.
    ///
    /// A write that still fails is logged and returned; callers do not retry.
    pub async fn finish(
        &self,
        application_id: &str,
        deployment_id: &str,
        outcome: &PipelineOutcome,
        log: &DeploymentLog,
    ) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match self
                .store
                .record_outcome(application_id, deployment_id, outcome)
                .await
            {
                Ok(()) => {
                    info!(
                        application_id,
                        deployment_id,
                        success = outcome.is_success(),
                        "Recorded deployment outcome"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt + 1 < self.attempts => {
                    let delay = calc_exp_backoff(&self.cooldown, attempt);
                    warn!(
                        deployment_id,
                        "Status update failed ({}), retrying in {:?}", e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(deployment_id, "Failed to update deployment status: {}", e);
                    log.line(format!("Failed to update deployment status: {} ❌", e))
                        .await;
                    return Err(e);
                }
            }
        }
    }
}
