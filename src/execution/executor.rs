//! Step executor - turns steps into containers and runs them

use crate::{
    core::{
        config::{sanitize, EnvValue, SettingValue, VolumeMount},
        pipeline::{Pipeline, Service},
        secret::{mask, SecretError, SecretStore},
        step::{plugin_variable, Step},
        template::{self, TemplateError},
        BuildContext, ExecutionStatus,
    },
    runtime::{
        ContainerRuntime, ContainerSpec, Mount, MountSource, NetworkSpec, RuntimeConfig,
        RuntimeError,
    },
};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Mount point of the workspace inside step containers
pub const WORKSPACE_PATH: &str = "/drone/src";

/// Plugin settings rendered as notification templates
const TEMPLATE_SETTINGS: &[&str] = &["message", "template"];

/// Result of executing a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// Step exited with code 0
    Success { output: String },
    /// Step exited non-zero, timed out, or could not start
    Failed {
        error: String,
        exit_code: Option<i32>,
        output: String,
    },
}

/// Errors raised while preparing a container, before anything runs
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("Invalid template in setting '{setting}': {source}")]
    Template {
        setting: String,
        source: TemplateError,
    },
}

/// A step ready to hand to the runtime
#[derive(Debug, Clone)]
pub struct PreparedStep {
    pub spec: ContainerSpec,

    /// Rendered notification message, for notification steps
    pub message: Option<String>,

    /// Resolved secret values, masked in all output
    pub secrets: Vec<String>,
}

/// Executes a single step
pub struct StepExecutor<R> {
    runtime: R,
    secrets: Arc<dyn SecretStore>,
    config: RuntimeConfig,
}

impl<R: ContainerRuntime> StepExecutor<R> {
    pub fn new(runtime: R, secrets: Arc<dyn SecretStore>, config: RuntimeConfig) -> Self {
        Self {
            runtime,
            secrets,
            config,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Network and volumes for one pipeline run
    pub fn network(&self, execution_id: Uuid, pipeline: &Pipeline) -> NetworkSpec {
        let id = execution_id.simple().to_string();
        let name = format!(
            "{}_{}_{}",
            self.config.network_prefix,
            &id[..8],
            sanitize(&pipeline.name)
        );

        let volumes = pipeline
            .volumes
            .iter()
            .filter(|v| v.temp.is_some())
            .map(|v| volume_name(&name, &v.name))
            .collect();
        let services = pipeline
            .services
            .iter()
            .map(|s| container_name(&name, &s.name))
            .collect();

        NetworkSpec {
            name,
            volumes,
            services,
        }
    }

    /// Container spec for a service
    pub fn service_spec(
        &self,
        network: &NetworkSpec,
        pipeline: &Pipeline,
        service: &Service,
    ) -> Result<ContainerSpec, PrepareError> {
        let mut secrets = Vec::new();
        let environment = self.resolve_environment(&service.environment, &mut secrets)?;

        Ok(ContainerSpec {
            name: container_name(&network.name, &service.name),
            alias: service.name.clone(),
            image: service.image.clone(),
            script: (!service.commands.is_empty()).then(|| service.commands.join("\n")),
            environment,
            mounts: resolve_mounts(network, pipeline, &service.mounts),
            ports: service.ports.iter().map(ToString::to_string).collect(),
            network: network.name.clone(),
            working_dir: None,
            pull: Default::default(),
        })
    }

    /// Resolve everything a step needs; fails before anything runs
    ///
    /// `status` is the pipeline status when the step is reached, used for
    /// `DRONE_BUILD_STATUS` and for rendering notification templates.
    pub fn prepare(
        &self,
        network: &NetworkSpec,
        context: &BuildContext,
        pipeline: &Pipeline,
        step: &Step,
        status: ExecutionStatus,
    ) -> Result<PreparedStep, PrepareError> {
        let mut secrets = Vec::new();

        let mut environment = context.environment();
        environment.insert("DRONE_BUILD_STATUS".to_string(), status.as_str().to_string());
        environment.insert("DRONE_STAGE_NAME".to_string(), pipeline.name.clone());
        environment.insert("DRONE_STEP_NAME".to_string(), step.name.clone());
        environment.insert("DRONE_WORKSPACE".to_string(), WORKSPACE_PATH.to_string());
        environment.extend(self.resolve_environment(&step.environment, &mut secrets)?);

        let mut message = None;
        if let Some(settings) = &step.settings {
            let vars = context.template_variables(status);

            for (key, value) in settings {
                let mut value = match value {
                    SettingValue::Secret(secret) => {
                        let resolved = self.secrets.resolve(&secret.from_secret)?;
                        secrets.push(resolved.clone());
                        resolved
                    }
                    SettingValue::Value(value) => setting_string(value),
                };

                if TEMPLATE_SETTINGS.contains(&key.as_str()) && template::is_template(&value) {
                    value = template::render(&value, &vars).map_err(|source| {
                        PrepareError::Template {
                            setting: key.clone(),
                            source,
                        }
                    })?;
                }
                if TEMPLATE_SETTINGS.contains(&key.as_str()) && step.is_notification() {
                    message.get_or_insert_with(|| value.clone());
                }

                environment.insert(plugin_variable(key), value);
            }
        }

        let mut mounts = vec![Mount {
            source: MountSource::Host {
                path: self.config.workspace.display().to_string(),
            },
            target: WORKSPACE_PATH.to_string(),
        }];
        mounts.extend(resolve_mounts(network, pipeline, &step.mounts));

        let spec = ContainerSpec {
            name: container_name(&network.name, &step.name),
            alias: sanitize(&step.name),
            image: step.image.clone(),
            script: (!step.is_plugin()).then(|| step.script()),
            environment,
            mounts,
            ports: Vec::new(),
            network: network.name.clone(),
            working_dir: Some(WORKSPACE_PATH.to_string()),
            pull: step.pull,
        };

        if let Some(script) = &spec.script {
            debug!("Script for step {}:\n{}", step.name, script);
        }

        Ok(PreparedStep {
            spec,
            message,
            secrets,
        })
    }

    /// Run a prepared step with the configured timeout
    pub async fn execute(&self, prepared: &PreparedStep) -> ExecutionResult {
        let spec = &prepared.spec;
        info!("Executing step: {} ({})", spec.alias, spec.image);

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = match timeout(timeout_duration, self.runtime.run_step(spec)).await {
            Ok(result) => result,
            Err(_) => {
                error!("Timeout for step {} after {}s", spec.alias, self.config.timeout_secs);
                if let Err(e) = self.runtime.kill_step(spec).await {
                    warn!("Failed to stop timed out step {}: {}", spec.alias, e);
                }
                return ExecutionResult::Failed {
                    error: RuntimeError::Timeout(self.config.timeout_secs).to_string(),
                    exit_code: None,
                    output: String::new(),
                };
            }
        };

        match result {
            Ok(output) => {
                let text = mask(&output.output, &prepared.secrets);
                if output.success() {
                    ExecutionResult::Success { output: text }
                } else {
                    ExecutionResult::Failed {
                        error: format!("exit code {}", output.exit_code),
                        exit_code: Some(output.exit_code),
                        output: text,
                    }
                }
            }
            Err(e) => {
                let error = mask(&e.to_string(), &prepared.secrets);
                error!("Runtime error for step {}: {}", spec.alias, error);
                ExecutionResult::Failed {
                    error,
                    exit_code: None,
                    output: String::new(),
                }
            }
        }
    }

    fn resolve_environment(
        &self,
        environment: &BTreeMap<String, EnvValue>,
        secrets: &mut Vec<String>,
    ) -> Result<BTreeMap<String, String>, SecretError> {
        let mut resolved = BTreeMap::new();

        for (key, value) in environment {
            let value = match value.secret() {
                Some(name) => {
                    let secret = self.secrets.resolve(name)?;
                    secrets.push(secret.clone());
                    secret
                }
                None => value.literal().unwrap_or_default(),
            };
            resolved.insert(key.clone(), value);
        }

        Ok(resolved)
    }
}

fn container_name(network: &str, name: &str) -> String {
    format!("{}_{}", network, sanitize(name))
}

fn volume_name(network: &str, name: &str) -> String {
    format!("{}_{}", network, sanitize(name))
}

fn resolve_mounts(network: &NetworkSpec, pipeline: &Pipeline, mounts: &[VolumeMount]) -> Vec<Mount> {
    mounts
        .iter()
        .filter_map(|mount| {
            let volume = pipeline.volume(&mount.name)?;
            let source = match &volume.host {
                Some(host) => MountSource::Host {
                    path: host.path.clone(),
                },
                None => MountSource::Volume {
                    name: volume_name(&network.name, &volume.name),
                },
            };
            Some(Mount {
                source,
                target: mount.path.clone(),
            })
        })
        .collect()
}

/// Plugin setting as an environment value
///
/// Lists of scalars are comma separated; mappings are passed as JSON.
fn setting_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) if items.iter().all(is_scalar) => items
            .iter()
            .map(setting_string)
            .collect::<Vec<_>>()
            .join(","),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
