//! Main execution engine - orchestrates a whole build

use crate::{
    core::{
        secret::SecretStore, Build, BuildContext, ExecutionStatus, Notification, Pipeline,
        StepState,
    },
    execution::{ExecutionResult, ExecutionScheduler, Gate, StepExecutor},
    runtime::{ContainerRuntime, NetworkSpec, RuntimeConfig},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a build
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    BuildStarted {
        execution_id: Uuid,
        pipelines: usize,
    },
    PipelineStarted {
        pipeline: String,
    },
    PipelineSkipped {
        pipeline: String,
        reason: String,
    },
    StepStarted {
        pipeline: String,
        step: String,
    },
    StepOutput {
        pipeline: String,
        step: String,
        output: String,
    },
    StepCompleted {
        pipeline: String,
        step: String,
    },
    StepFailed {
        pipeline: String,
        step: String,
        error: String,
        ignored: bool,
    },
    StepSkipped {
        pipeline: String,
        step: String,
        reason: String,
    },
    PipelineCompleted {
        pipeline: String,
        status: ExecutionStatus,
    },
    BuildCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Build execution engine
pub struct ExecutionEngine<R> {
    scheduler: ExecutionScheduler,
    executor: StepExecutor<R>,
    event_handlers: Vec<EventHandler>,
}

impl<R: ContainerRuntime> ExecutionEngine<R> {
    pub fn new(runtime: R, secrets: Arc<dyn SecretStore>, config: RuntimeConfig) -> Self {
        Self {
            scheduler: ExecutionScheduler::new(),
            executor: StepExecutor::new(runtime, secrets, config),
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    pub fn runtime(&self) -> &R {
        self.executor.runtime()
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute every pipeline of the build; returns the build status
    pub async fn execute(&self, build: &mut Build) -> ExecutionStatus {
        let execution_id = build.execution_id();
        info!(
            "Starting build {} for {} on {} ({})",
            execution_id, build.context.repo, build.context.branch, build.context.event
        );

        build.state.start();
        self.emit_event(ExecutionEvent::BuildStarted {
            execution_id,
            pipelines: build.pipelines.len(),
        });

        for index in self.scheduler.order(&build.pipelines) {
            let gate = self.scheduler.gate(&build.pipelines[index], build);

            match gate {
                Gate::Skip(reason) => self.skip_pipeline(&mut build.pipelines[index], reason),
                Gate::Run => {
                    let context = build.context.clone();
                    let notifications = self
                        .run_pipeline(execution_id, &context, &mut build.pipelines[index])
                        .await;
                    build.notifications.extend(notifications);
                }
            }
        }

        let status = build.overall_status();
        build.state.finish(status);

        info!("Build {} finished: {}", execution_id, status);
        self.emit_event(ExecutionEvent::BuildCompleted {
            execution_id,
            status,
        });

        status
    }

    fn skip_pipeline(&self, pipeline: &mut Pipeline, reason: String) {
        info!("Skipping pipeline {}: {}", pipeline.name, reason);

        for step in &mut pipeline.steps {
            step.state = StepState::Skipped {
                reason: "pipeline skipped".to_string(),
            };
        }
        pipeline.state.skip(reason.clone());
        pipeline.update_state_counts();

        self.emit_event(ExecutionEvent::PipelineSkipped {
            pipeline: pipeline.name.clone(),
            reason,
        });
    }

    /// Run one pipeline: setup, services, steps in order, teardown
    async fn run_pipeline(
        &self,
        execution_id: Uuid,
        context: &BuildContext,
        pipeline: &mut Pipeline,
    ) -> Vec<Notification> {
        let name = pipeline.name.clone();
        info!("Starting pipeline: {}", name);

        pipeline.state.start(pipeline.steps.len());
        self.emit_event(ExecutionEvent::PipelineStarted {
            pipeline: name.clone(),
        });

        let network = self.executor.network(execution_id, pipeline);
        let mut notifications = Vec::new();

        // Steps are still visited after a setup or service failure
        match self.executor.runtime().setup(&network).await {
            Ok(()) => self.start_services(&network, pipeline).await,
            Err(e) => {
                error!("Setup failed for pipeline {}: {}", name, e);
                pipeline.state.reason = Some(format!("setup failed: {}", e));
                pipeline.state.fail();
            }
        }
        self.run_steps(&network, context, pipeline, &mut notifications)
            .await;

        if let Err(e) = self.executor.runtime().teardown(&network).await {
            warn!("Teardown failed for pipeline {}: {}", name, e);
        }

        pipeline.update_state_counts();
        pipeline.state.finish();

        let status = pipeline.status();
        info!("Pipeline execution finished: {} - {}", name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            pipeline: name,
            status,
        });

        notifications
    }

    /// Start services; the first failure fails the pipeline
    async fn start_services(&self, network: &NetworkSpec, pipeline: &mut Pipeline) {
        for service in &pipeline.services {
            let started = match self.executor.service_spec(network, pipeline, service) {
                Ok(spec) => self
                    .executor
                    .runtime()
                    .start_service(&spec)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            if let Err(e) = started {
                error!("Service {} failed to start: {}", service.name, e);
                pipeline.state.reason = Some(format!("service '{}' failed to start: {}", service.name, e));
                pipeline.state.fail();
                return;
            }
        }
    }

    async fn run_steps(
        &self,
        network: &NetworkSpec,
        context: &BuildContext,
        pipeline: &mut Pipeline,
        notifications: &mut Vec<Notification>,
    ) {
        let pipeline_name = pipeline.name.clone();

        for index in 0..pipeline.steps.len() {
            let status = pipeline.current_status();
            let step = &pipeline.steps[index];
            let step_name = step.name.clone();

            if !step.should_run(context, status) {
                let reason = match step.when.mismatch(context, status) {
                    Some(reason) => format!("when: {}", reason),
                    None => "when".to_string(),
                };
                info!("Skipping step {}: {}", step_name, reason);
                pipeline.steps[index].state = StepState::Skipped {
                    reason: reason.clone(),
                };
                self.emit_event(ExecutionEvent::StepSkipped {
                    pipeline: pipeline_name.clone(),
                    step: step_name,
                    reason,
                });
                pipeline.update_state_counts();
                continue;
            }

            let started_at = Utc::now();
            self.emit_event(ExecutionEvent::StepStarted {
                pipeline: pipeline_name.clone(),
                step: step_name.clone(),
            });

            let prepared = self
                .executor
                .prepare(network, context, pipeline, step, status);
            let ignore_failure = step.ignore_failure;
            let is_notification = step.is_notification();

            pipeline.steps[index].state = StepState::Running { started_at };

            let result = match prepared {
                Ok(prepared) => {
                    let result = self.executor.execute(&prepared).await;
                    if let (Some(message), true) = (prepared.message, is_notification) {
                        notifications.push(Notification {
                            pipeline: pipeline_name.clone(),
                            step: step_name.clone(),
                            message,
                        });
                    }
                    result
                }
                Err(e) => {
                    error!("Failed to prepare step {}: {}", step_name, e);
                    ExecutionResult::Failed {
                        error: e.to_string(),
                        exit_code: None,
                        output: String::new(),
                    }
                }
            };

            match result {
                ExecutionResult::Success { output } => {
                    self.emit_output(&pipeline_name, &step_name, &output);
                    pipeline.steps[index].state = StepState::Completed {
                        output,
                        exit_code: 0,
                        started_at,
                        completed_at: Utc::now(),
                    };
                    self.emit_event(ExecutionEvent::StepCompleted {
                        pipeline: pipeline_name.clone(),
                        step: step_name,
                    });
                }
                ExecutionResult::Failed {
                    error,
                    exit_code,
                    output,
                } => {
                    self.emit_output(&pipeline_name, &step_name, &output);
                    if ignore_failure {
                        warn!("Step {} failed ({}), failure ignored", step_name, error);
                    } else {
                        error!("Step {} failed: {}", step_name, error);
                        pipeline.state.fail();
                    }
                    pipeline.steps[index].state = StepState::Failed {
                        error: error.clone(),
                        exit_code,
                        output,
                        started_at,
                        failed_at: Utc::now(),
                    };
                    self.emit_event(ExecutionEvent::StepFailed {
                        pipeline: pipeline_name.clone(),
                        step: step_name,
                        error,
                        ignored: ignore_failure,
                    });
                }
            }

            pipeline.update_state_counts();
        }
    }

    fn emit_output(&self, pipeline: &str, step: &str, output: &str) {
        if output.is_empty() {
            return;
        }
        self.emit_event(ExecutionEvent::StepOutput {
            pipeline: pipeline.to_string(),
            step: step.to_string(),
            output: output.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::DocumentConfig, secret::StaticSecrets};
    use crate::runtime::{ContainerOutput, ContainerSpec, RuntimeError};
    use std::sync::Mutex;

    /// Runtime that fails the steps it is told to and records the rest
    #[derive(Clone, Default)]
    struct ScriptedRuntime {
        failing: Vec<String>,
        broken_setup: bool,
        broken_services: bool,
        ran: Arc<Mutex<Vec<String>>>,
        torn_down: Arc<Mutex<usize>>,
    }

    #[async_trait::async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        async fn setup(&self, _network: &NetworkSpec) -> Result<(), RuntimeError> {
            if self.broken_setup {
                return Err(RuntimeError::Command {
                    code: 1,
                    stderr: "network already exists".to_string(),
                });
            }
            Ok(())
        }

        async fn start_service(&self, _spec: &ContainerSpec) -> Result<(), RuntimeError> {
            if self.broken_services {
                return Err(RuntimeError::Command {
                    code: 125,
                    stderr: "image not found".to_string(),
                });
            }
            Ok(())
        }

        async fn run_step(&self, spec: &ContainerSpec) -> Result<ContainerOutput, RuntimeError> {
            self.ran.lock().unwrap().push(spec.alias.clone());
            let code = if self.failing.contains(&spec.alias) { 1 } else { 0 };
            Ok(ContainerOutput::new(code, format!("ran {}", spec.alias)))
        }

        async fn teardown(&self, _network: &NetworkSpec) -> Result<(), RuntimeError> {
            *self.torn_down.lock().unwrap() += 1;
            Ok(())
        }
    }

    const YAML: &str = r#"
kind: pipeline
name: test
steps:
  - name: lint
    image: node
    failure: ignore
    commands: [npm run lint]
  - name: unit
    image: node
    commands: [npm test]
  - name: report
    image: alpine
    commands: [echo report]
  - name: notify
    image: alpine
    commands: [echo notify]
    when:
      status: [success, failure]
services:
  - name: database
    image: postgres:12
"#;

    fn engine(runtime: ScriptedRuntime) -> ExecutionEngine<ScriptedRuntime> {
        ExecutionEngine::new(runtime, Arc::new(StaticSecrets::new()), RuntimeConfig::default())
    }

    fn build() -> Build {
        DocumentConfig::from_yaml(YAML)
            .unwrap()
            .to_build(BuildContext::new("master", "push"))
    }

    #[tokio::test]
    async fn test_execute_successful_pipeline() {
        let runtime = ScriptedRuntime::default();
        let engine = engine(runtime.clone());
        let mut build = build();

        let status = engine.execute(&mut build).await;

        assert_eq!(status, ExecutionStatus::Success);
        assert_eq!(*runtime.ran.lock().unwrap(), vec!["lint", "unit", "report", "notify"]);
        assert_eq!(*runtime.torn_down.lock().unwrap(), 1);
        assert!(build.pipeline("test").unwrap().is_complete());
    }

    #[tokio::test]
    async fn test_ignored_failure_keeps_going() {
        let runtime = ScriptedRuntime {
            failing: vec!["lint".to_string()],
            ..Default::default()
        };
        let mut build = build();

        let status = engine(runtime.clone()).execute(&mut build).await;

        assert_eq!(status, ExecutionStatus::Success);
        let pipeline = build.pipeline("test").unwrap();
        assert!(matches!(pipeline.step("lint").unwrap().state, StepState::Failed { .. }));
        assert!(matches!(pipeline.step("report").unwrap().state, StepState::Completed { .. }));
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        let runtime = ScriptedRuntime {
            failing: vec!["unit".to_string()],
            ..Default::default()
        };
        let mut build = build();

        let status = engine(runtime.clone()).execute(&mut build).await;

        assert_eq!(status, ExecutionStatus::Failure);
        assert_eq!(*runtime.ran.lock().unwrap(), vec!["lint", "unit", "notify"]);
        let pipeline = build.pipeline("test").unwrap();
        assert!(matches!(pipeline.step("report").unwrap().state, StepState::Skipped { .. }));
        assert_eq!(pipeline.state.failed_steps, 1);
        assert_eq!(pipeline.state.skipped_steps, 1);
        assert_eq!(*runtime.torn_down.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_service_failure_fails_pipeline() {
        let runtime = ScriptedRuntime {
            broken_services: true,
            ..Default::default()
        };
        let mut build = build();

        let status = engine(runtime.clone()).execute(&mut build).await;

        assert_eq!(status, ExecutionStatus::Failure);
        assert_eq!(*runtime.ran.lock().unwrap(), vec!["notify"]);
        let reason = build.pipeline("test").unwrap().state.reason.clone().unwrap();
        assert!(reason.contains("service 'database'"), "{}", reason);
    }

    #[tokio::test]
    async fn test_setup_failure_still_runs_failure_steps() {
        let runtime = ScriptedRuntime {
            broken_setup: true,
            ..Default::default()
        };
        let mut build = build();

        let status = engine(runtime.clone()).execute(&mut build).await;

        assert_eq!(status, ExecutionStatus::Failure);
        assert_eq!(*runtime.ran.lock().unwrap(), vec!["notify"]);
        assert_eq!(*runtime.torn_down.lock().unwrap(), 1);
        let pipeline = build.pipeline("test").unwrap();
        assert!(pipeline.state.reason.clone().unwrap().starts_with("setup failed"));
        assert!(matches!(pipeline.step("unit").unwrap().state, StepState::Skipped { .. }));
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut engine = engine(ScriptedRuntime::default());
        let sink = events.clone();
        engine.add_event_handler(move |event| {
            let label = match event {
                ExecutionEvent::BuildStarted { .. } => "build-started".to_string(),
                ExecutionEvent::PipelineStarted { pipeline } => format!("start {}", pipeline),
                ExecutionEvent::StepCompleted { step, .. } => format!("done {}", step),
                ExecutionEvent::PipelineCompleted { status, .. } => format!("pipeline {}", status),
                ExecutionEvent::BuildCompleted { .. } => "build-completed".to_string(),
                _ => return,
            };
            sink.lock().unwrap().push(label);
        });

        let mut build = build();
        engine.execute(&mut build).await;

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                "build-started",
                "start test",
                "done lint",
                "done unit",
                "done report",
                "done notify",
                "pipeline success",
                "build-completed",
            ]
        );
    }
}
