//! Build context - the event a build runs for

use crate::core::state::ExecutionStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Description of the event that triggered a build
///
/// Trigger and `when` filters are evaluated against these fields, and
/// every step receives them as `DRONE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Repository as `namespace/name`
    pub repo: String,

    /// Branch the build runs for
    pub branch: String,

    /// Event name (`push`, `pull_request`, `tag`, ...)
    pub event: String,

    /// Commit SHA
    pub commit: String,

    /// Git reference, e.g. `refs/heads/master`
    pub reference: String,

    /// Commit author
    pub author: String,

    /// Commit message
    pub message: String,

    /// Build number
    pub number: u64,

    /// Link to the build
    pub link: String,

    /// Deployment target (promote/rollback events)
    pub target: Option<String>,

    /// Cron job name (cron events)
    pub cron: Option<String>,

    /// Pull request action (`opened`, `synchronized`, ...)
    pub action: Option<String>,

    /// Runner instance name
    pub instance: String,
}

impl BuildContext {
    /// Create a context for a branch and event with placeholder metadata
    pub fn new(branch: impl Into<String>, event: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            repo: "local/repo".to_string(),
            reference: format!("refs/heads/{}", branch),
            branch,
            event: event.into(),
            commit: String::new(),
            author: String::new(),
            message: String::new(),
            number: 1,
            link: String::new(),
            target: None,
            cron: None,
            action: None,
            instance: "localhost".to_string(),
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = repo.into();
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = commit.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_number(mut self, number: u64) -> Self {
        self.number = number;
        self
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = link.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Repository namespace (the part before `/`)
    pub fn repo_namespace(&self) -> &str {
        self.repo.split_once('/').map_or("", |(namespace, _)| namespace)
    }

    /// Repository name (the part after `/`)
    pub fn repo_name(&self) -> &str {
        self.repo.split_once('/').map_or(self.repo.as_str(), |(_, name)| name)
    }

    /// Environment variables injected into every step
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let mut set = |key: &str, value: &str| {
            env.insert(key.to_string(), value.to_string());
        };

        set("CI", "true");
        set("DRONE", "true");
        set("DRONE_BRANCH", &self.branch);
        set("DRONE_BUILD_EVENT", &self.event);
        set("DRONE_BUILD_NUMBER", &self.number.to_string());
        set("DRONE_BUILD_LINK", &self.link);
        set("DRONE_COMMIT", &self.commit);
        set("DRONE_COMMIT_SHA", &self.commit);
        set("DRONE_COMMIT_REF", &self.reference);
        set("DRONE_COMMIT_BRANCH", &self.branch);
        set("DRONE_COMMIT_AUTHOR", &self.author);
        set("DRONE_COMMIT_MESSAGE", &self.message);
        set("DRONE_REPO", &self.repo);
        set("DRONE_REPO_NAME", self.repo_name());
        set("DRONE_REPO_NAMESPACE", self.repo_namespace());
        if let Some(target) = &self.target {
            set("DRONE_DEPLOY_TO", target);
        }
        if let Some(cron) = &self.cron {
            set("DRONE_CRON", cron);
        }
        if let Some(action) = &self.action {
            set("DRONE_BUILD_ACTION", action);
        }

        env
    }

    /// Variables available to notification templates
    pub fn template_variables(&self, status: ExecutionStatus) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("build.status".to_string(), status.as_str().to_string());
        vars.insert("build.number".to_string(), self.number.to_string());
        vars.insert("build.event".to_string(), self.event.clone());
        vars.insert("build.link".to_string(), self.link.clone());
        vars.insert("commit.branch".to_string(), self.branch.clone());
        vars.insert("commit.sha".to_string(), self.commit.clone());
        vars.insert("commit.ref".to_string(), self.reference.clone());
        vars.insert("commit.author".to_string(), self.author.clone());
        vars.insert("commit.message".to_string(), self.message.clone());
        vars.insert("repo.name".to_string(), self.repo_name().to_string());
        vars.insert("repo.namespace".to_string(), self.repo_namespace().to_string());
        vars.insert("repo.full_name".to_string(), self.repo.clone());
        vars
    }
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new("master", "push")
    }
}
