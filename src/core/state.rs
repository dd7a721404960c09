//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Status of a build, a pipeline, or a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Running,
    /// Finished without a failing step
    Success,
    /// At least one step or service failed
    Failure,
    /// Gated out by a trigger, a `when` filter, or an upstream pipeline
    Skipped,
    /// Stopped from outside
    Killed,
}

impl ExecutionStatus {
    /// Drone name of the status, as used in `status` filters
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Killed => "killed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Failure
                | ExecutionStatus::Skipped
                | ExecutionStatus::Killed
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failure" => Ok(ExecutionStatus::Failure),
            "skipped" => Ok(ExecutionStatus::Skipped),
            "killed" => Ok(ExecutionStatus::Killed),
            other => anyhow::bail!("Unknown execution status: {}", other),
        }
    }
}

/// State of a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepState {
    /// Step has not been reached
    Pending,
    /// Step is currently running
    Running {
        started_at: DateTime<Utc>,
    },
    /// Step exited with code 0
    Completed {
        output: String,
        exit_code: i32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Step exited non-zero or could not be started
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step was not run (`when` filter or skipped pipeline)
    Skipped {
        reason: String,
    },
}

impl StepState {
    /// Check if step is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepState::Completed { .. } | StepState::Failed { .. } | StepState::Skipped { .. }
        )
    }

    /// Whether the step was actually started
    pub fn was_executed(&self) -> bool {
        matches!(self, StepState::Completed { .. } | StepState::Failed { .. })
    }

    /// Status view of the step state
    pub fn status(&self) -> ExecutionStatus {
        match self {
            StepState::Pending => ExecutionStatus::Pending,
            StepState::Running { .. } => ExecutionStatus::Running,
            StepState::Completed { .. } => ExecutionStatus::Success,
            StepState::Failed { .. } => ExecutionStatus::Failure,
            StepState::Skipped { .. } => ExecutionStatus::Skipped,
        }
    }
}

/// State of one pipeline within a build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Why the pipeline was skipped or errored outside of a step
    pub reason: Option<String>,

    /// Total number of steps
    pub total_steps: usize,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Number of failed steps
    pub failed_steps: usize,

    /// Number of skipped steps
    pub skipped_steps: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            reason: None,
            total_steps: 0,
            completed_steps: 0,
            failed_steps: 0,
            skipped_steps: 0,
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_steps: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_steps = total_steps;
    }

    /// Mark pipeline as failed; later steps see a `failure` status
    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failure;
    }

    /// Mark pipeline as skipped without running
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Skipped;
        self.reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    /// Close the pipeline; a running pipeline becomes successful
    pub fn finish(&mut self) {
        if self.status == ExecutionStatus::Running {
            self.status = ExecutionStatus::Success;
        }
        self.completed_at = Some(Utc::now());
    }

    /// Update step counts
    pub fn update_counts(&mut self, total: usize, completed: usize, failed: usize, skipped: usize) {
        self.total_steps = total;
        self.completed_steps = completed;
        self.failed_steps = failed;
        self.skipped_steps = skipped;
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.completed_steps + self.failed_steps + self.skipped_steps) as f64
            / self.total_steps as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a whole build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildState {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildState {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}
