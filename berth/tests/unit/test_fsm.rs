//! Deployment state machine tests

use berth::deploy::fsm::DeploymentState;
use berth::models::deployment::PipelineOutcome;

#[test]
fn test_running_is_the_only_open_state() {
    assert!(!DeploymentState::Running.is_terminal());
    assert!(DeploymentState::Done.is_terminal());
    assert!(DeploymentState::Error.is_terminal());
}

#[test]
fn test_running_moves_to_exactly_one_terminal_state() {
    let running = DeploymentState::Running;
    assert_eq!(
        running.process(&PipelineOutcome::Succeeded).unwrap(),
        DeploymentState::Done
    );
    assert_eq!(
        running
            .process(&PipelineOutcome::Failed("build failed".to_string()))
            .unwrap(),
        DeploymentState::Error
    );
}

#[test]
fn test_terminal_states_never_go_back() {
    let done = DeploymentState::Done;
    assert_eq!(done.process(&PipelineOutcome::Succeeded).unwrap(), DeploymentState::Done);
    assert!(done.process(&PipelineOutcome::Failed("late".to_string())).is_err());

    let failed = DeploymentState::Error;
    assert_eq!(
        failed.process(&PipelineOutcome::Failed("again".to_string())).unwrap(),
        DeploymentState::Error
    );
    assert!(failed.process(&PipelineOutcome::Succeeded).is_err());
}

#[test]
fn test_wire_names() {
    assert_eq!(serde_json::to_string(&DeploymentState::Running).unwrap(), "\"RUNNING\"");
    let state: DeploymentState = serde_json::from_str("\"ERROR\"").unwrap();
    assert_eq!(state, DeploymentState::Error);
}
