//! Build - one run of a document for one event

use crate::core::{
    config::DocumentConfig,
    context::BuildContext,
    pipeline::Pipeline,
    state::{BuildState, ExecutionStatus},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message rendered by a notification step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub pipeline: String,
    pub step: String,
    pub message: String,
}

/// All pipelines of a document, evaluated against one build context
#[derive(Debug, Clone)]
pub struct Build {
    pub context: BuildContext,

    /// Pipelines in document order
    pub pipelines: Vec<Pipeline>,

    pub state: BuildState,

    /// Messages rendered by notification steps that ran
    pub notifications: Vec<Notification>,
}

impl Build {
    pub fn from_config(document: &DocumentConfig, context: BuildContext) -> Self {
        Build {
            context,
            pipelines: document.pipelines().map(Pipeline::from_config).collect(),
            state: BuildState::new(),
            notifications: Vec::new(),
        }
    }

    pub fn execution_id(&self) -> Uuid {
        self.state.execution_id
    }

    /// Get a pipeline by name
    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    /// Get a mutable pipeline by name
    pub fn pipeline_mut(&mut self, name: &str) -> Option<&mut Pipeline> {
        self.pipelines.iter_mut().find(|p| p.name == name)
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn status(&self) -> ExecutionStatus {
        self.state.status
    }

    /// `failure` when any pipeline failed, else `success`
    pub fn overall_status(&self) -> ExecutionStatus {
        if self.pipelines.iter().any(Pipeline::has_failed) {
            ExecutionStatus::Failure
        } else {
            ExecutionStatus::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_document() {
        let yaml = r#"
kind: pipeline
name: test
steps:
  - name: unit
    image: node
    commands: [npm test]
---
kind: secret
name: token
---
kind: pipeline
name: deploy
depends_on: [test]
steps:
  - name: deploy
    image: python
    commands: [fab deploy]
"#;
        let document = DocumentConfig::from_yaml(yaml).unwrap();
        let mut build = document.to_build(BuildContext::new("master", "push"));

        assert_eq!(build.pipelines.len(), 2);
        assert_eq!(build.pipelines[1].name, "deploy");
        assert_eq!(build.status(), ExecutionStatus::Pending);
        assert!(build.notifications().is_empty());
        assert_eq!(build.overall_status(), ExecutionStatus::Success);

        build.pipeline_mut("test").unwrap().state.fail();
        assert_eq!(build.overall_status(), ExecutionStatus::Failure);
        assert!(build.pipeline("missing").is_none());
    }
}
