//! CLI output formatting

use crate::{
    core::{lint::LintFinding, ExecutionStatus, Notification, StepState},
    execution::{ExecutionEvent, Gate, PlannedPipeline},
    persistence::ExecutionSummary,
};
use console::Emoji;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static BELL: Emoji<'_, '_> = Emoji("🔔 ", "* ");

/// Format a step state for display
pub fn format_step_state(state: &StepState) -> String {
    match state {
        StepState::Pending => style("PENDING").dim().to_string(),
        StepState::Running { .. } => style("RUNNING").yellow().to_string(),
        StepState::Completed { .. } => style("SUCCESS").green().to_string(),
        StepState::Failed { .. } => style("FAILURE").red().to_string(),
        StepState::Skipped { .. } => style("SKIPPED").dim().to_string(),
    }
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        ExecutionStatus::Pending | ExecutionStatus::Skipped => style(label).dim().to_string(),
        ExecutionStatus::Running => style(label).yellow().to_string(),
        ExecutionStatus::Success => style(label).green().to_string(),
        ExecutionStatus::Failure => style(label).red().to_string(),
        ExecutionStatus::Killed => style(label).magenta().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> &'static Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Success => &CHECK,
        ExecutionStatus::Failure | ExecutionStatus::Killed => &CROSS,
        ExecutionStatus::Running => &SPINNER,
        ExecutionStatus::Skipped => &SKIP,
        ExecutionStatus::Pending => &INFO,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    format!(
        "{}{} - {} [{}/{}] - {} ({}/{}) - {}",
        status_icon(summary.status),
        style(short_id(&summary.execution_id)).dim(),
        style(&summary.pipeline_name).bold(),
        summary.event,
        summary.branch,
        format_status(summary.status),
        summary.completed_steps,
        summary.total_steps,
        style(format!("{:.0}%", summary.progress * 100.0)).cyan()
    )
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::BuildStarted {
            execution_id,
            pipelines,
        } => format!(
            "{}Build {} ({} pipelines)",
            ROCKET,
            style(short_id(execution_id)).dim(),
            pipelines
        ),
        ExecutionEvent::PipelineStarted { pipeline } => {
            format!("{}Pipeline {}", ROCKET, style(pipeline).bold())
        }
        ExecutionEvent::PipelineSkipped { pipeline, reason } => format!(
            "{}Pipeline {} skipped ({})",
            SKIP,
            style(pipeline).bold(),
            style(reason).dim()
        ),
        ExecutionEvent::StepStarted { pipeline, step } => format!(
            "{}{}/{}",
            SPINNER,
            style(pipeline).dim(),
            style(step).cyan()
        ),
        ExecutionEvent::StepOutput {
            pipeline,
            step,
            output,
        } => format!(
            "{}Output from {}/{}:\n{}",
            INFO,
            style(pipeline).dim(),
            style(step).dim(),
            output
        ),
        ExecutionEvent::StepCompleted { pipeline, step } => format!(
            "{}{}/{}",
            CHECK,
            style(pipeline).dim(),
            style(step).green()
        ),
        ExecutionEvent::StepFailed {
            pipeline,
            step,
            error,
            ignored,
        } => {
            if *ignored {
                format!(
                    "{}{}/{}: {} (ignored)",
                    WARN,
                    style(pipeline).dim(),
                    style(step).yellow(),
                    style(error).dim()
                )
            } else {
                format!(
                    "{}{}/{}: {}",
                    CROSS,
                    style(pipeline).dim(),
                    style(step).red(),
                    style(error).dim()
                )
            }
        }
        ExecutionEvent::StepSkipped {
            pipeline,
            step,
            reason,
        } => format!(
            "{}{}/{} skipped ({})",
            SKIP,
            style(pipeline).dim(),
            style(step).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::PipelineCompleted { pipeline, status } => format!(
            "{}Pipeline {} {}",
            status_icon(*status),
            style(pipeline).bold(),
            format_status(*status)
        ),
        ExecutionEvent::BuildCompleted {
            execution_id,
            status,
        } => format!(
            "{}Build {} {}",
            status_icon(*status),
            style(short_id(execution_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Format a build plan for display
pub fn format_plan(plan: &[PlannedPipeline]) -> String {
    let mut lines = Vec::new();

    for pipeline in plan {
        match &pipeline.gate {
            Gate::Run => {
                lines.push(format!("{}{}", ROCKET, style(&pipeline.name).bold()));
                for step in &pipeline.steps {
                    if step.runs {
                        lines.push(format!(
                            "    {}{} ({})",
                            CHECK,
                            style(&step.name).green(),
                            style(&step.image).dim()
                        ));
                    } else {
                        lines.push(format!(
                            "    {}{} ({})",
                            SKIP,
                            style(&step.name).dim(),
                            style("when").dim()
                        ));
                    }
                }
            }
            Gate::Skip(reason) => lines.push(format!(
                "{}{} skipped ({})",
                SKIP,
                style(&pipeline.name).bold(),
                style(reason).dim()
            )),
        }
    }

    lines.join("\n")
}

/// Format a lint finding for display
pub fn format_lint_finding(finding: &LintFinding) -> String {
    format!("{}{}", WARN, style(finding).yellow())
}

/// Format a rendered notification for display
pub fn format_notification(notification: &Notification) -> String {
    format!(
        "{}{}/{}:\n{}",
        BELL,
        style(&notification.pipeline).dim(),
        style(&notification.step).cyan(),
        notification.message
    )
}

/// Format step output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();

    if lines.len() <= max_lines {
        output.to_string()
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

/// Human-readable duration
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
