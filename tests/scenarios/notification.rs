//! Test: the notification step renders one message per outcome

use crate::helpers::*;
use drover::core::{BuildContext, ExecutionStatus};

fn context(branch: &str) -> BuildContext {
    BuildContext::new(branch, "push")
        .with_repo("acme/space-game")
        .with_number(42)
        .with_link("https://ci.example.com/acme/space-game/42")
}

#[tokio::test]
async fn test_success_message_uses_success_branch() {
    let runtime = MockRuntime::new();
    let (build, _) = run_game(runtime.clone(), context("master")).await;

    let notifications = build.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].pipeline, "test");
    assert_eq!(notifications[0].step, "notify");

    let message = &notifications[0].message;
    assert!(message.contains("Build 42 of space-game succeeded on master."));
    assert!(!message.contains("failed"));
    assert!(!message.contains("{{"));
}

#[tokio::test]
async fn test_failure_message_uses_failure_branch() {
    let runtime = MockRuntime::new().with_exit_code("client-unit-tests", 1);
    let (build, _) = run_game(runtime, context("feature/hud")).await;

    let notifications = build.notifications();
    assert_eq!(notifications.len(), 1);

    let message = &notifications[0].message;
    assert!(message.contains("Build 42 of space-game failed on feature/hud"));
    assert!(message.contains("https://ci.example.com/acme/space-game/42"));
    assert!(!message.contains("succeeded"));
}

#[tokio::test]
async fn test_exactly_one_notification_per_outcome() {
    for failing in [None, Some("client-unit-tests"), Some("end-to-end-tests")] {
        let mut runtime = MockRuntime::new();
        if let Some(step) = failing {
            runtime = runtime.with_exit_code(step, 1);
        }
        let (build, status) = run_game(runtime, context("master")).await;

        assert_eq!(build.notifications().len(), 1, "failing step {:?}", failing);
        let expected = if failing.is_some() {
            ExecutionStatus::Failure
        } else {
            ExecutionStatus::Success
        };
        assert_eq!(status, expected);
    }
}

#[tokio::test]
async fn test_plugin_receives_settings_as_environment() {
    let runtime = MockRuntime::new().with_exit_code("end-to-end-tests", 1);
    let (build, _) = run_game(runtime.clone(), context("master")).await;

    let spec = runtime.step_spec("notify").expect("notify ran");
    assert_eq!(spec.image, "appleboy/drone-telegram");
    assert!(spec.script.is_none());

    let env = &spec.environment;
    assert_eq!(env["PLUGIN_TOKEN"], TELEGRAM_TOKEN);
    assert_eq!(env["PLUGIN_TO"], "-100200300");
    assert_eq!(env["PLUGIN_MESSAGE"], build.notifications()[0].message);
    assert_eq!(env["DRONE_BUILD_STATUS"], "failure");
    assert_eq!(env["DRONE_STEP_NAME"], "notify");
}
