//! Step domain model

use crate::core::{
    condition::Conditions,
    config::{EnvValue, SettingValue, StepConfig, VolumeMount},
    context::BuildContext,
    state::{ExecutionStatus, StepState},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single step in a pipeline
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name, unique within the pipeline
    pub name: String,

    /// Container image reference
    pub image: String,

    pub pull: PullPolicy,

    /// Shell commands, run in one shell with `set -e`
    pub commands: Vec<String>,

    pub environment: BTreeMap<String, EnvValue>,

    /// Plugin settings; `Some` marks a plugin step
    pub settings: Option<BTreeMap<String, SettingValue>>,

    pub mounts: Vec<VolumeMount>,

    /// Conditional execution
    pub when: Conditions,

    /// `failure: ignore`
    pub ignore_failure: bool,

    /// Runtime state
    pub state: StepState,
}

/// When to pull the step image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    Always,
    #[default]
    IfNotExists,
    Never,
}

impl PullPolicy {
    pub fn from_config(value: Option<&str>) -> Self {
        match value {
            Some("always") => PullPolicy::Always,
            Some("never") => PullPolicy::Never,
            _ => PullPolicy::IfNotExists,
        }
    }
}

impl Step {
    /// Create a step from a step config
    pub fn from_config(config: &StepConfig) -> Self {
        Step {
            name: config.name.clone(),
            image: config.image.clone(),
            pull: PullPolicy::from_config(config.pull.as_deref()),
            commands: config.commands.clone(),
            environment: config.environment.clone(),
            settings: config.settings.clone(),
            mounts: config.volumes.clone(),
            when: config.when.clone(),
            ignore_failure: config.failure.as_deref() == Some("ignore"),
            state: StepState::Pending,
        }
    }

    /// Plugin steps run the image's own entrypoint with `PLUGIN_*` settings
    pub fn is_plugin(&self) -> bool {
        self.settings.is_some()
    }

    /// Whether this step sends a build notification
    pub fn is_notification(&self) -> bool {
        let has_message = self
            .settings
            .as_ref()
            .is_some_and(|s| s.contains_key("message") || s.contains_key("template"));
        let name = self.name.to_ascii_lowercase();
        has_message || name.starts_with("notify") || name.starts_with("notification")
    }

    /// Evaluate the `when` filter against the build and the pipeline status
    pub fn should_run(&self, context: &BuildContext, status: ExecutionStatus) -> bool {
        self.when.matches(context, status)
    }

    /// Names of every secret the step references
    pub fn secret_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .environment
            .values()
            .filter_map(EnvValue::secret)
            .collect();

        if let Some(settings) = &self.settings {
            names.extend(settings.values().filter_map(|value| match value {
                SettingValue::Secret(secret) => Some(secret.from_secret.as_str()),
                SettingValue::Value(_) => None,
            }));
        }

        names
    }

    /// Build the shell script for the step's commands
    ///
    /// Each command is echoed with a `+ ` prefix before it runs, and the
    /// script stops at the first failing command.
    pub fn script(&self) -> String {
        let mut script = String::from("set -e\n");
        for command in &self.commands {
            script.push_str(&format!("echo {}\n", shell_quote(&format!("+ {}", command))));
            script.push_str(command);
            script.push('\n');
        }
        script
    }
}

/// Quote a string for POSIX shells
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Environment variable name for a plugin setting
pub fn plugin_variable(key: &str) -> String {
    format!("PLUGIN_{}", key.to_ascii_uppercase().replace('-', "_"))
}
