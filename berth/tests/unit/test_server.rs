//! HTTP surface over a wired deployment core

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use berth::server::serve::router;
use berth::server::state::ServerState;

use crate::common::Harness;

fn app(harness: &Harness) -> Router {
    router(Arc::new(ServerState::new(
        harness.state.coordinator.clone(),
        "0.1.0-test".to_string(),
    )))
}

async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new().await;
    let (status, body) = send(app(&harness), "GET", "/health", "").await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], "0.1.0-test");
}

#[tokio::test]
async fn test_trigger_returns_running_deployment() {
    let mut harness = Harness::new().await;
    harness.start_workers(1);

    let (status, body) = send(
        app(&harness),
        "POST",
        "/applications/app-demo/deployments",
        r#"{"title": "from api"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "RUNNING");
    assert_eq!(json["title"], "from api");
    assert_eq!(json["applicationId"], "app-demo");

    let id = json["id"].as_str().unwrap().to_string();
    harness.wait_for(&id).await;
    harness.stop_workers().await;
}

#[tokio::test]
async fn test_trigger_with_empty_body_uses_defaults() {
    let harness = Harness::new().await;
    let (status, body) = send(
        app(&harness),
        "POST",
        "/applications/app-demo/deployments",
        "",
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["title"], "Manual deployment");
}

#[tokio::test]
async fn test_trigger_unknown_application() {
    let harness = Harness::new().await;
    let (status, body) = send(
        app(&harness),
        "POST",
        "/applications/missing/deployments",
        "{}",
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_trigger_rejects_malformed_body() {
    let harness = Harness::new().await;
    let (status, _) = send(
        app(&harness),
        "POST",
        "/applications/app-demo/deployments",
        "{not json",
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = send(app(&harness), "GET", "/applications/app-demo/deployments", "").await;
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn test_list_and_get_deployments() {
    let mut harness = Harness::new().await;
    harness.start_workers(1);
    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    harness.wait_for(&deployment.id).await;
    harness.stop_workers().await;

    let (status, body) = send(
        app(&harness),
        "GET",
        "/applications/app-demo/deployments",
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    let listed = json.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["status"], "DONE");
    assert!(listed[0]["logData"]
        .as_str()
        .unwrap()
        .contains("Deployment finished"));

    let uri = format!("/deployments/{}", deployment.id);
    let (status, body) = send(app(&harness), "GET", &uri, "").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["id"], deployment.id.as_str());

    let (status, _) = send(app(&harness), "GET", "/deployments/nope", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_finished_deployment_logs_are_replayed() {
    let mut harness = Harness::new().await;
    harness.start_workers(1);
    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    harness.wait_for(&deployment.id).await;
    harness.stop_workers().await;

    let uri = format!("/deployments/{}/logs", deployment.id);
    let (status, body) = send(app(&harness), "GET", &uri, "").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data: Build started"));
    assert!(body.contains("data: Deployment finished"));
}
