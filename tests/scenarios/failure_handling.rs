//! Test: failing steps and services stop the build but still notify

use crate::helpers::*;
use drover::core::{BuildContext, ExecutionStatus, StepState};

#[tokio::test]
async fn test_end_to_end_failure_on_master_blocks_deploy() {
    let runtime = MockRuntime::new().with_exit_code("end-to-end-tests", 1);
    let (build, status) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

    assert_eq!(status, ExecutionStatus::Failure);
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Failure);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);

    assert_step_status(&build, "test", "client-unit-tests", ExecutionStatus::Success);
    assert_step_status(&build, "test", "backend-unit-tests", ExecutionStatus::Success);
    assert_step_status(&build, "test", "end-to-end-tests", ExecutionStatus::Failure);
    assert_step_status(&build, "test", "notify", ExecutionStatus::Success);

    // Deploy never started
    assert!(!runtime.steps_run().contains(&"deploy".to_string()));
    assert_eq!(runtime.teardowns().len(), 1);

    let notifications = build.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("failed"));
    assert!(!notifications[0].message.contains("succeeded"));
}

#[tokio::test]
async fn test_failure_records_exit_code() {
    let runtime = MockRuntime::new()
        .with_exit_code("end-to-end-tests", 2)
        .with_output("end-to-end-tests", "cypress: 3 failing");
    let (build, _) = run_game(runtime, BuildContext::new("master", "push")).await;

    match step_state(&build, "test", "end-to-end-tests") {
        StepState::Failed {
            exit_code, output, ..
        } => {
            assert_eq!(*exit_code, Some(2));
            assert_eq!(output, "cypress: 3 failing");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_step_skips_the_rest_except_notify() {
    let runtime = MockRuntime::new().with_exit_code("backend-unit-tests", 1);
    let (build, _) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

    assert_eq!(
        runtime.steps_run(),
        vec!["client-unit-tests", "backend-unit-tests", "notify"]
    );
    assert_step_status(&build, "test", "end-to-end-tests", ExecutionStatus::Skipped);

    let test = build.pipeline("test").unwrap();
    assert_eq!(test.state.completed_steps, 2);
    assert_eq!(test.state.failed_steps, 1);
    assert_eq!(test.state.skipped_steps, 1);
}

#[tokio::test]
async fn test_service_failure_fails_pipeline_but_notifies() {
    let runtime = MockRuntime::new().with_failing_service("database");
    let (build, status) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

    assert_eq!(status, ExecutionStatus::Failure);
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Failure);
    assert_eq!(runtime.steps_run(), vec!["notify"]);

    let test = build.pipeline("test").unwrap();
    assert!(test
        .state
        .reason
        .as_deref()
        .is_some_and(|reason| reason.contains("database")));

    // Resources are released even though the pipeline broke early
    assert_eq!(runtime.teardowns().len(), 1);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);
}

#[tokio::test]
async fn test_setup_failure_fails_pipeline_but_notifies() {
    let runtime = MockRuntime::new().with_failing_setup();
    let (build, status) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

    assert_eq!(status, ExecutionStatus::Failure);
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Failure);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);
    assert!(runtime.services_started().is_empty());
    assert_eq!(runtime.steps_run(), vec!["notify"]);
    assert_eq!(runtime.teardowns().len(), 1);

    let notifications = build.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("failed"));
}

#[tokio::test]
async fn test_failing_notification_still_counts_as_sent() {
    let runtime = MockRuntime::new().with_exit_code("notify", 1);
    let (build, status) = run_game(runtime, BuildContext::new("feature/x", "push")).await;

    assert_eq!(status, ExecutionStatus::Failure);
    assert_eq!(build.notifications().len(), 1);
}
