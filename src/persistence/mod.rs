//! Persistence layer for build history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{Build, Pipeline};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of one pipeline run within a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Build execution ID, shared by every pipeline of the build
    pub execution_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    pub branch: String,

    pub event: String,

    /// Execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Progress (0.0 to 1.0)
    pub progress: f64,

    /// Number of completed steps
    pub completed_steps: usize,

    /// Total number of steps
    pub total_steps: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline run, replacing an earlier save of the same run
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load every pipeline run of a build
    async fn load_execution(&self, execution_id: Uuid) -> Result<Vec<ExecutionSummary>>;

    /// List runs of a pipeline, newest first
    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>>;

    /// List all pipeline names, sorted
    async fn list_pipelines(&self) -> Result<Vec<String>>;

    /// Most recent run of a pipeline
    async fn latest_execution(&self, pipeline_name: &str) -> Result<Option<ExecutionSummary>> {
        Ok(self.list_executions(pipeline_name).await?.into_iter().next())
    }
}

/// In-memory persistence (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<(Uuid, String), ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(
            (execution.execution_id, execution.pipeline_name.clone()),
            execution.clone(),
        );
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs
            .values()
            .filter(|e| e.execution_id == execution_id)
            .cloned()
            .collect();
        result.sort_by_key(|e| e.started_at);
        Ok(result)
    }

    async fn list_executions(&self, pipeline_name: &str) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs
            .values()
            .filter(|e| e.pipeline_name == pipeline_name)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(result)
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.keys().map(|(_, name)| name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Create a summary from a pipeline of a build
pub fn create_summary(build: &Build, pipeline: &Pipeline) -> ExecutionSummary {
    ExecutionSummary {
        execution_id: build.execution_id(),
        pipeline_name: pipeline.name.clone(),
        branch: build.context.branch.clone(),
        event: build.context.event.clone(),
        status: pipeline.state.status,
        started_at: pipeline
            .state
            .started_at
            .or(build.state.started_at)
            .unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        progress: pipeline.state.progress(),
        completed_steps: pipeline.state.completed_steps,
        total_steps: pipeline.state.total_steps,
    }
}

/// One summary per pipeline that ran; skipped pipelines are not recorded
pub fn create_summaries(build: &Build) -> Vec<ExecutionSummary> {
    build
        .pipelines
        .iter()
        .filter(|p| p.state.started_at.is_some())
        .map(|p| create_summary(build, p))
        .collect()
}
