//! Test: trigger filters and dependencies decide which pipelines run

use crate::helpers::*;
use drover::core::{BuildContext, ExecutionStatus};
use drover::execution::{ExecutionScheduler, Gate, PlannedPipeline};

fn plan(branch: &str, event: &str) -> Vec<PlannedPipeline> {
    ExecutionScheduler::new().plan(&game_build(BuildContext::new(branch, event)))
}

fn gate<'a>(plan: &'a [PlannedPipeline], pipeline: &str) -> &'a Gate {
    &plan
        .iter()
        .find(|p| p.name == pipeline)
        .unwrap_or_else(|| panic!("pipeline '{}' not planned", pipeline))
        .gate
}

#[test]
fn test_deploy_runs_only_for_push_to_master() {
    let cases = [
        ("master", "push", true, true),
        ("master", "pull_request", true, false),
        ("develop", "push", true, false),
        ("feature/hud", "pull_request", true, false),
        ("master", "tag", false, false),
        ("master", "cron", false, false),
    ];

    for (branch, event, test_runs, deploy_runs) in cases {
        let planned = plan(branch, event);
        assert_eq!(
            *gate(&planned, "test") == Gate::Run,
            test_runs,
            "test pipeline on {} {}",
            event,
            branch
        );
        assert_eq!(
            *gate(&planned, "deploy") == Gate::Run,
            deploy_runs,
            "deploy pipeline on {} {}",
            event,
            branch
        );
    }
}

#[test]
fn test_skip_reasons_name_the_filter() {
    let develop = plan("develop", "push");
    match gate(&develop, "deploy") {
        Gate::Skip(reason) => {
            assert!(reason.starts_with("trigger"), "{}", reason);
            assert!(reason.contains("branch"), "{}", reason);
        }
        Gate::Run => panic!("deploy should not run on develop"),
    }

    let tag = plan("master", "tag");
    match gate(&tag, "deploy") {
        Gate::Skip(reason) => assert!(reason.contains("dependency 'test'"), "{}", reason),
        Gate::Run => panic!("deploy should not run when test was skipped"),
    }
}

#[tokio::test]
async fn test_tag_event_runs_nothing() {
    let runtime = MockRuntime::new();
    let (build, status) = run_game(runtime.clone(), BuildContext::new("master", "tag")).await;

    assert!(runtime.steps_run().is_empty());
    assert!(runtime.teardowns().is_empty());
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Skipped);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);
    assert_ne!(status, ExecutionStatus::Failure);
    assert!(build.notifications().is_empty());
}

#[tokio::test]
async fn test_pull_request_to_master_tests_without_deploying() {
    let runtime = MockRuntime::new();
    let (build, status) =
        run_game(runtime.clone(), BuildContext::new("master", "pull_request")).await;

    assert_eq!(status, ExecutionStatus::Success);
    assert_eq!(runtime.steps_run().len(), 4);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);
}

#[tokio::test]
async fn test_failed_tests_never_start_deploy() {
    for step in ["client-unit-tests", "backend-unit-tests", "end-to-end-tests"] {
        let runtime = MockRuntime::new().with_exit_code(step, 1);
        let (build, _) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

        assert!(
            !runtime.steps_run().contains(&"deploy".to_string()),
            "deploy ran after {} failed",
            step
        );
        let deploy = build.pipeline("deploy").unwrap();
        assert_eq!(deploy.status(), ExecutionStatus::Skipped);
        assert!(deploy.state.started_at.is_none());
    }
}
