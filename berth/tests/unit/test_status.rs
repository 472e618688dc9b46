//! Status synchronizer retries

use std::time::Duration;

use berth::deploy::fsm::DeploymentState;
use berth::models::application::ApplicationStatus;
use berth::store::Store;

use crate::common::Harness;

#[tokio::test]
async fn test_transient_status_failures_are_retried() {
    let mut harness = Harness::new().await;
    harness.store.fail_next_writes(2);
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(finished.status, DeploymentState::Done);
    let app = harness.store.get_application("app-demo").await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Running);

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_exhausted_status_retries_are_logged() {
    let mut harness = Harness::build(
        |options| options.pipeline.status_retry_attempts = 2,
        Duration::from_millis(0),
    )
    .await;
    harness.store.fail_next_writes(2);
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    // The container is up but the record could not be written
    assert_eq!(finished.status, DeploymentState::Running);
    assert_eq!(harness.runtime.containers_named("demo").len(), 1);
    let log = harness.log_text(&finished).await;
    assert!(log.contains("Failed to update deployment status"));

    harness.stop_workers().await;
}
