//! Contract checks beyond schema validation
//!
//! A document can be valid and still be unsafe to run: a notification that
//! never fires on failure, or a deploy pipeline that runs on any branch.
//! These checks report such findings without rejecting the document.

use crate::core::{
    condition::Condition,
    config::{DocumentConfig, PipelineConfig, StepConfig},
    step::Step,
};
use serde::Serialize;
use std::fmt;

/// Options for [`lint`]
#[derive(Debug, Clone)]
pub struct LintOptions {
    /// Branch deploy pipelines must be restricted to
    pub release_branch: String,
}

impl Default for LintOptions {
    fn default() -> Self {
        Self {
            release_branch: "master".to_string(),
        }
    }
}

/// One lint finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LintFinding {
    pub pipeline: String,
    pub step: Option<String>,
    pub message: String,
}

impl fmt::Display for LintFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "{}/{}: {}", self.pipeline, step, self.message),
            None => write!(f, "{}: {}", self.pipeline, self.message),
        }
    }
}

const CREDENTIAL_MARKERS: &[&str] = &["TOKEN", "PASSWORD", "SECRET", "KEY"];

/// Check a document against the release and notification conventions
pub fn lint(document: &DocumentConfig, options: &LintOptions) -> Vec<LintFinding> {
    let mut findings = Vec::new();

    for pipeline in document.pipelines() {
        if !pipeline.depends_on.is_empty() {
            check_release_gate(pipeline, options, &mut findings);
        }

        for step in &pipeline.steps {
            check_notification(pipeline, step, &mut findings);
            check_credentials(pipeline, step, &mut findings);
        }
    }

    findings
}

fn finding(pipeline: &PipelineConfig, step: Option<&StepConfig>, message: String) -> LintFinding {
    LintFinding {
        pipeline: pipeline.name.clone(),
        step: step.map(|s| s.name.clone()),
        message,
    }
}

/// True when the condition names exactly `value` and nothing else
fn restricted_to(condition: &Option<Condition>, value: &str) -> bool {
    condition
        .as_ref()
        .is_some_and(|c| c.include() == vec![value])
}

fn check_release_gate(
    pipeline: &PipelineConfig,
    options: &LintOptions,
    findings: &mut Vec<LintFinding>,
) {
    let trigger = &pipeline.trigger;

    if !restricted_to(&trigger.status, "success") {
        findings.push(finding(
            pipeline,
            None,
            "depends on other pipelines but its trigger does not restrict status to 'success'"
                .to_string(),
        ));
    }
    if !restricted_to(&trigger.branch, &options.release_branch) {
        findings.push(finding(
            pipeline,
            None,
            format!(
                "trigger should restrict branch to the release branch '{}'",
                options.release_branch
            ),
        ));
    }
    if !restricted_to(&trigger.event, "push") {
        findings.push(finding(
            pipeline,
            None,
            "trigger should restrict event to 'push'".to_string(),
        ));
    }
}

fn check_notification(
    pipeline: &PipelineConfig,
    step: &StepConfig,
    findings: &mut Vec<LintFinding>,
) {
    if !Step::from_config(step).is_notification() {
        return;
    }

    let runs_on = |status: &str| {
        step.when
            .status
            .as_ref()
            .is_some_and(|c| c.include().iter().any(|s| *s == status))
    };

    if !(runs_on("success") && runs_on("failure")) {
        findings.push(finding(
            pipeline,
            Some(step),
            "notification step should run on both success and failure".to_string(),
        ));
    }
}

fn check_credentials(
    pipeline: &PipelineConfig,
    step: &StepConfig,
    findings: &mut Vec<LintFinding>,
) {
    for (key, value) in &step.environment {
        if value.secret().is_some() {
            continue;
        }
        let upper = key.to_ascii_uppercase();
        if CREDENTIAL_MARKERS.iter().any(|marker| upper.contains(marker)) {
            findings.push(finding(
                pipeline,
                Some(step),
                format!("environment '{}' looks like a credential; use from_secret", key),
            ));
        }
    }
}
