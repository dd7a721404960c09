//! Pipeline domain model

use crate::core::{
    condition::Conditions,
    config::{EnvValue, PipelineConfig, Port, ServiceConfig, VolumeConfig, VolumeMount},
    state::{ExecutionStatus, PipelineState, StepState},
    step::Step,
};
use std::collections::BTreeMap;

/// A service container, alive for the whole pipeline run
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub image: String,
    pub ports: Vec<Port>,
    pub environment: BTreeMap<String, EnvValue>,
    pub commands: Vec<String>,
    pub mounts: Vec<VolumeMount>,
}

impl Service {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Service {
            name: config.name.clone(),
            image: config.image.clone(),
            ports: config.ports.clone(),
            environment: config.environment.clone(),
            commands: config.commands.clone(),
            mounts: config.volumes.clone(),
        }
    }
}

/// A pipeline ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Steps in declaration order
    pub steps: Vec<Step>,

    pub services: Vec<Service>,

    pub volumes: Vec<VolumeConfig>,

    /// Pipelines this one waits for
    pub depends_on: Vec<String>,

    pub trigger: Conditions,

    /// Execution state
    pub state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Pipeline {
            name: config.name.clone(),
            steps: config.steps.iter().map(Step::from_config).collect(),
            services: config.services.iter().map(Service::from_config).collect(),
            volumes: config.volumes.clone(),
            depends_on: config.depends_on.clone(),
            trigger: config.trigger.clone(),
            state: PipelineState::new(),
        }
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get a mutable step by name
    pub fn step_mut(&mut self, name: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.name == name)
    }

    /// Find a top-level volume by name
    pub fn volume(&self, name: &str) -> Option<&VolumeConfig> {
        self.volumes.iter().find(|v| v.name == name)
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    /// Check if every step reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// Check if pipeline has failed
    pub fn has_failed(&self) -> bool {
        self.state.status == ExecutionStatus::Failure
    }

    /// Status seen by `when` filters of the next step
    ///
    /// `failure` once the pipeline failed outside a step (a service did not
    /// start) or a step without `failure: ignore` failed.
    pub fn current_status(&self) -> ExecutionStatus {
        let step_failed = self
            .steps
            .iter()
            .any(|s| !s.ignore_failure && matches!(s.state, StepState::Failed { .. }));

        if step_failed || self.has_failed() {
            ExecutionStatus::Failure
        } else {
            ExecutionStatus::Success
        }
    }

    /// Steps that were actually started, in order
    pub fn executed_steps(&self) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.state.was_executed()).collect()
    }

    /// Recompute step counts from step states
    pub fn update_state_counts(&mut self) {
        let total = self.steps.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut skipped = 0;

        for step in &self.steps {
            match step.state {
                StepState::Completed { .. } => completed += 1,
                StepState::Failed { .. } => failed += 1,
                StepState::Skipped { .. } => skipped += 1,
                _ => {}
            }
        }

        self.state.update_counts(total, completed, failed, skipped);
    }
}
