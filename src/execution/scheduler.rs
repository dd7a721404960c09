//! Execution scheduler - orders pipelines and decides which ones run

use crate::core::{Build, ExecutionStatus, Pipeline};
use serde::Serialize;

/// Decision for one pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "lowercase")]
pub enum Gate {
    Run,
    Skip(String),
}

/// A pipeline as it would run if every step succeeded
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPipeline {
    pub name: String,
    pub gate: Gate,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub image: String,
    pub runs: bool,
}

/// Scheduler for pipelines within a build
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionScheduler;

impl ExecutionScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Pipeline indices in dependency order, document order between peers
    pub fn order(&self, pipelines: &[Pipeline]) -> Vec<usize> {
        let mut placed = vec![false; pipelines.len()];
        let mut order = Vec::with_capacity(pipelines.len());

        let ready = |index: usize, placed: &[bool]| {
            pipelines[index].depends_on.iter().all(|dep| {
                pipelines
                    .iter()
                    .position(|p| &p.name == dep)
                    .map_or(true, |i| placed[i])
            })
        };

        while order.len() < pipelines.len() {
            let next = (0..pipelines.len()).find(|&i| !placed[i] && ready(i, &placed));
            match next {
                Some(index) => {
                    placed[index] = true;
                    order.push(index);
                }
                // A cycle; validation rejects these, keep the rest in document order
                None => {
                    order.extend((0..pipelines.len()).filter(|&i| !placed[i]));
                    break;
                }
            }
        }

        order
    }

    /// Decide whether a pipeline runs, given its dependencies' outcomes
    pub fn gate(&self, pipeline: &Pipeline, build: &Build) -> Gate {
        let mut upstream = ExecutionStatus::Success;

        for dep in &pipeline.depends_on {
            let Some(dependency) = build.pipeline(dep) else {
                continue;
            };
            match dependency.status() {
                ExecutionStatus::Skipped => {
                    return Gate::Skip(format!("dependency '{}' was skipped", dep));
                }
                ExecutionStatus::Failure | ExecutionStatus::Killed => {
                    upstream = ExecutionStatus::Failure;
                }
                _ => {}
            }
        }

        match pipeline.trigger.mismatch(&build.context, upstream) {
            Some(reason) => Gate::Skip(format!("trigger: {}", reason)),
            None => Gate::Run,
        }
    }

    /// What would run for this build if every step succeeded
    pub fn plan(&self, build: &Build) -> Vec<PlannedPipeline> {
        let mut simulated = build.clone();
        let mut planned = Vec::with_capacity(build.pipelines.len());

        for index in self.order(&build.pipelines) {
            let gate = self.gate(&simulated.pipelines[index], &simulated);
            let pipeline = &mut simulated.pipelines[index];

            let steps = pipeline
                .steps
                .iter()
                .map(|step| PlannedStep {
                    name: step.name.clone(),
                    image: step.image.clone(),
                    runs: gate == Gate::Run
                        && step.should_run(&build.context, ExecutionStatus::Success),
                })
                .collect();

            match &gate {
                Gate::Run => pipeline.state.status = ExecutionStatus::Success,
                Gate::Skip(reason) => pipeline.state.skip(reason.clone()),
            }

            planned.push(PlannedPipeline {
                name: pipeline.name.clone(),
                gate,
                steps,
            });
        }

        planned
    }
}
