//! Live log fan-out through a pipeline run

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;

use crate::common::Harness;

#[tokio::test]
async fn test_subscriber_sees_every_line_in_file_order() {
    let mut harness = Harness::new().await;

    let deployment = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let mut receiver = harness.state.coordinator.subscribe(&deployment.id).unwrap();
    harness.start_workers(1);

    let mut received = Vec::new();
    let collect = async {
        loop {
            match receiver.recv().await {
                Ok(line) => received.push(line),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), collect)
        .await
        .expect("topic was never closed");

    let finished = harness.wait_for(&deployment.id).await;
    let file = harness.log_text(&finished).await;
    let written: Vec<&str> = file.lines().collect();
    assert_eq!(received, written);
    assert!(harness.state.coordinator.subscribe(&deployment.id).is_none());

    harness.stop_workers().await;
}

#[tokio::test]
async fn test_topics_do_not_leak_between_deployments() {
    let mut harness = Harness::new().await;

    let demo = harness
        .state
        .coordinator
        .trigger_deploy("app-demo", None, None)
        .await
        .unwrap();
    let web = harness
        .state
        .coordinator
        .trigger_deploy("app-web", None, None)
        .await
        .unwrap();
    let mut demo_rx = harness.state.coordinator.subscribe(&demo.id).unwrap();
    harness.start_workers(2);

    let mut lines = Vec::new();
    while let Ok(line) = demo_rx.recv().await {
        lines.push(line);
    }
    harness.wait_for(&web.id).await;

    assert!(!lines.is_empty());
    assert!(lines.iter().all(|line| !line.contains("nginx")));

    harness.stop_workers().await;
}
