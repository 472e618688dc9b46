//! End-to-end pipeline scenarios against in-memory collaborators

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use berth::deploy::fsm::DeploymentState;
use berth::errors::BerthError;
use berth::models::application::ApplicationStatus;
use berth::runtime::memory::RuntimeOp;
use berth::store::Store;

use crate::common::{demo_app, Harness};

#[tokio::test]
async fn test_demo_app_deploys() {
    let mut harness = Harness::new().await;
    harness.start_workers(2);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", Some("first".to_string()), None)
        .await
        .unwrap();
    assert_eq!(deployment.status, DeploymentState::Running);
    assert!(deployment
        .log_path
        .starts_with(harness.dir.path().join("logs").join("demo")));
    let file_name = deployment.log_path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("demo-"));
    assert!(file_name.ends_with(".log"));

    let finished = harness.wait_for(&deployment.id).await;
    assert_eq!(finished.status, DeploymentState::Done);
    assert!(finished.finished_at.is_some());
    assert_eq!(finished.log_path, deployment.log_path);

    let app = harness.store.get_application("app-demo").await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Running);

    let containers = harness.runtime.containers_named("demo");
    assert_eq!(containers.len(), 1);
    let container = &containers[0];
    assert!(container.running);
    assert!(container.networks.contains("proj-network"));
    assert_eq!(container.spec.env, vec!["PORT=8080", "MODE=production"]);
    assert!(harness.runtime.volume_exists("demo-data"));

    let log = harness.log_text(&finished).await;
    assert!(log.contains("Build started"));
    assert!(log.contains("#1 building demo:latest"));
    assert!(log.contains("Build finished: demo:latest ✅"));
    assert!(log.contains(&format!("Container {} started ✅", container.id)));

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_unreachable_repository_with_non_blocking_fetch() {
    let mut harness = Harness::build(
        |options| options.pipeline.fetch_failure_blocking = false,
        Duration::from_millis(0),
    )
    .await;
    harness.fetcher.fail.store(true, Ordering::SeqCst);
    harness.builder.produce_image.store(false, Ordering::SeqCst);
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(harness.builder.builds.load(Ordering::SeqCst), 1);
    assert_eq!(finished.status, DeploymentState::Error);
    assert!(finished
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("No such image: demo:latest"));
    let app = harness.store.get_application("app-demo").await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Error);

    let log = harness.log_text(&finished).await;
    assert!(log.contains("repository not found ❌"));
    assert!(log.contains("Continuing with the existing working tree"));

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_unreachable_repository_blocks_by_default() {
    let mut harness = Harness::new().await;
    harness.fetcher.fail.store(true, Ordering::SeqCst);
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(harness.builder.builds.load(Ordering::SeqCst), 0);
    assert_eq!(finished.status, DeploymentState::Error);
    let app = harness.store.get_application("app-demo").await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Error);
    assert!(harness.runtime.containers_named("demo").is_empty());

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_build_failure_aborts_before_runtime() {
    let mut harness = Harness::new().await;
    harness.builder.fail.store(true, Ordering::SeqCst);
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(finished.status, DeploymentState::Error);
    assert_eq!(harness.runtime.calls(RuntimeOp::CreateNetwork), 0);
    let log = harness.log_text(&finished).await;
    assert!(log.contains("Build failed"));
    assert!(log.trim_end().ends_with('❌'));

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_sequential_deploys_leave_one_container() {
    let mut harness = Harness::new().await;
    harness.start_workers(2);

    let first = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    assert_eq!(harness.wait_for(&first.id).await.status, DeploymentState::Done);
    let first_container = harness.runtime.containers_named("demo")[0].id.clone();

    let second = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    assert_eq!(harness.wait_for(&second.id).await.status, DeploymentState::Done);

    let containers = harness.runtime.containers_named("demo");
    assert_eq!(containers.len(), 1);
    assert_ne!(containers[0].id, first_container);
    assert!(containers[0].running);
    assert_eq!(harness.runtime.network_count(), 1);
    assert_eq!(harness.runtime.volume_count(), 1);

    let listed = harness
        .state
        .coordinator
        .list_deployments_for_application("app-demo")
        .await
        .unwrap();
    let ids: Vec<&str> = listed.iter().map(|d| d.deployment.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
    assert!(listed[0].log_data.contains("Deployment finished"));

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_overlapping_triggers_run_one_after_the_other() {
    let mut harness = Harness::build(|_| {}, Duration::from_millis(100)).await;
    harness.start_workers(2);

    let first = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let second = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();

    let first = harness.wait_for(&first.id).await;
    let second = harness.wait_for(&second.id).await;
    assert_eq!(first.status, DeploymentState::Done);
    assert_eq!(second.status, DeploymentState::Done);

    assert_eq!(harness.builder.builds.load(Ordering::SeqCst), 2);
    assert_eq!(harness.builder.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(harness.runtime.containers_named("demo").len(), 1);

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_image_source_pulls_and_tags() {
    let mut harness = Harness::new().await;
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-web", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(finished.status, DeploymentState::Done);
    assert_eq!(harness.fetcher.calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.builder.builds.load(Ordering::SeqCst), 0);
    assert!(harness.runtime.has_image("nginx:1.27"));
    assert!(harness.runtime.has_image("web:latest"));

    let containers = harness.runtime.containers_named("web");
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].spec.image, "web:latest");

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_image_source_without_reference_fails() {
    let mut harness = Harness::new().await;
    let mut app = demo_app();
    app.id = "app-broken".to_string();
    app.name = "broken".to_string();
    app.source_type = berth::models::application::SourceType::Image;
    app.image = None;
    harness.store.put_application(app).await.unwrap();
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-broken", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(finished.status, DeploymentState::Error);
    assert!(finished
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("has no image reference"));

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_transient_runtime_errors_are_retried() {
    let mut harness = Harness::new().await;
    harness.runtime.inject_failure(
        RuntimeOp::CreateContainer,
        berth::errors::RuntimeError::Unavailable("connection reset".to_string()),
    );
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let finished = harness.wait_for(&deployment.id).await;

    assert_eq!(finished.status, DeploymentState::Done);
    assert_eq!(harness.runtime.calls(RuntimeOp::CreateContainer), 2);

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_unknown_application_is_not_found() {
    let harness = Harness::new().await;
    let err = assert_err!(
        harness
            .state
            .coordinator
            .trigger_deploy("missing", None, None)
            .await
    );
    assert!(matches!(err, BerthError::Persistence(_)));
}

#[tokio::test]
async fn test_full_queue_rejects_and_marks_error() {
    let harness = Harness::build(
        |options| options.pipeline.queue_capacity = 1,
        Duration::from_millis(0),
    )
    .await;

    let queued = assert_ok!(
        harness
            .state
            .coordinator
            .trigger_deploy("app-demo", None, None)
            .await
    );
    let err = assert_err!(
        harness
            .state
            .coordinator
            .trigger_deploy("app-demo", None, None)
            .await
    );
    assert!(matches!(err, BerthError::QueueFull));

    let listed = harness.store.list_deployments("app-demo").await.unwrap();
    assert_eq!(listed.len(), 2);
    let rejected = listed.iter().find(|d| d.id != queued.id).unwrap();
    assert_eq!(rejected.status, DeploymentState::Error);
    assert!(!harness.state.hub.is_live(&rejected.id));
    assert!(harness.state.hub.is_live(&queued.id));
}

#[tokio::test]
async fn test_shutdown_finishes_job_in_hand() {
    let mut harness = Harness::build(|_| {}, Duration::from_millis(150)).await;
    harness.start_workers(1);

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    // Let the worker pick it up
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.stop_workers().await;

    let finished = harness.store.get_deployment(&deployment.id).await.unwrap();
    assert_eq!(finished.status, DeploymentState::Done);
}

#[tokio::test]
async fn test_shutdown_fails_queued_jobs() {
    let mut harness = Harness::build(|_| {}, Duration::from_millis(150)).await;
    harness.start_workers(1);

    let first = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let second = harness
        .state
        .coordinator
        .trigger_deploy("app-web", None, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.stop_workers().await;

    let first = harness.store.get_deployment(&first.id).await.unwrap();
    assert_eq!(first.status, DeploymentState::Done);

    let second = harness.store.get_deployment(&second.id).await.unwrap();
    assert_eq!(second.status, DeploymentState::Error);
    assert!(second
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("shutting down"));
    assert!(!harness.state.hub.is_live(&second.id));
    let app = harness.store.get_application("app-web").await.unwrap();
    assert_eq!(app.status, ApplicationStatus::Error);
    assert!(harness.runtime.containers_named("web").is_empty());

    let log = harness.log_text(&second).await;
    assert!(log.contains("Deployment cancelled: daemon shutting down ❌"));

    let err = assert_err!(
        harness
            .state
            .coordinator
            .trigger_deploy("app-demo", None, None)
            .await
    );
    assert!(matches!(err, BerthError::ShutdownError(_)));
}
