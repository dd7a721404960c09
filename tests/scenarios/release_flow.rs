//! Test: a green build deploys only from a push to the release branch

use crate::helpers::*;
use drover::core::{BuildContext, ExecutionStatus};
use drover::execution::{ExecutionEvent, ExecutionScheduler, Gate};

const TEST_STEPS: [&str; 4] = [
    "client-unit-tests",
    "backend-unit-tests",
    "end-to-end-tests",
    "notify",
];

#[tokio::test]
async fn test_push_to_master_runs_tests_then_deploys() {
    let runtime = MockRuntime::new();
    let (build, status) = run_game(runtime.clone(), BuildContext::new("master", "push")).await;

    assert_eq!(status, ExecutionStatus::Success);
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Success);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Success);

    let mut expected: Vec<&str> = TEST_STEPS.to_vec();
    expected.push("deploy");
    assert_eq!(runtime.steps_run(), expected);
    assert_eq!(runtime.services_started(), vec!["database"]);
}

#[tokio::test]
async fn test_feature_branch_push_passes_without_deploying() {
    let runtime = MockRuntime::new();
    let (build, status) =
        run_game(runtime.clone(), BuildContext::new("feature/leaderboard", "push")).await;

    assert_eq!(status, ExecutionStatus::Success);
    assert_eq!(pipeline_status(&build, "test"), ExecutionStatus::Success);
    assert_eq!(pipeline_status(&build, "deploy"), ExecutionStatus::Skipped);

    assert_eq!(runtime.steps_run(), TEST_STEPS.to_vec());
    assert!(!runtime.steps_run().contains(&"deploy".to_string()));
    assert_step_status(&build, "deploy", "deploy", ExecutionStatus::Skipped);

    // Only the test pipeline acquired resources
    assert_eq!(runtime.teardowns().len(), 1);
    assert!(runtime.teardowns()[0].ends_with("_test"));
}

#[tokio::test]
async fn test_deploy_starts_after_test_completes() {
    let (_, events) = run_game_with_events(MockRuntime::new(), BuildContext::new("master", "push")).await;

    let position = |wanted: &dyn Fn(&ExecutionEvent) -> bool| {
        events
            .iter()
            .position(|event| wanted(event))
            .expect("event emitted")
    };

    let test_completed = position(&|e| {
        matches!(e, ExecutionEvent::PipelineCompleted { pipeline, .. } if pipeline == "test")
    });
    let deploy_started = position(&|e| {
        matches!(e, ExecutionEvent::PipelineStarted { pipeline } if pipeline == "deploy")
    });
    assert!(test_completed < deploy_started);

    assert!(matches!(events.first(), Some(ExecutionEvent::BuildStarted { pipelines: 2, .. })));
    assert!(matches!(
        events.last(),
        Some(ExecutionEvent::BuildCompleted {
            status: ExecutionStatus::Success,
            ..
        })
    ));
}

#[tokio::test]
async fn test_plan_agrees_with_execution() {
    let scheduler = ExecutionScheduler::new();

    for branch in ["master", "feature/leaderboard"] {
        let context = BuildContext::new(branch, "push");
        let plan = scheduler.plan(&game_build(context.clone()));

        let runtime = MockRuntime::new();
        let (_, _) = run_game(runtime.clone(), context).await;

        let planned: Vec<String> = plan
            .iter()
            .filter(|p| p.gate == Gate::Run)
            .flat_map(|p| p.steps.iter().filter(|s| s.runs).map(|s| s.name.clone()))
            .collect();
        assert_eq!(planned, runtime.steps_run(), "branch {}", branch);
    }
}

#[tokio::test]
async fn test_history_summaries_for_release() {
    use drover::persistence::{create_summaries, InMemoryPersistence, PersistenceBackend};

    let (build, _) = run_game(MockRuntime::new(), BuildContext::new("master", "push")).await;
    let store = InMemoryPersistence::new();
    for summary in create_summaries(&build) {
        store.save_execution(&summary).await.unwrap();
    }

    let runs = store.load_execution(build.execution_id()).await.unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.status == ExecutionStatus::Success));

    let test = store.latest_execution("test").await.unwrap().unwrap();
    assert_eq!(test.completed_steps, 4);
    assert_eq!(test.total_steps, 4);
    assert_eq!(store.list_pipelines().await.unwrap(), vec!["deploy", "test"]);
}
