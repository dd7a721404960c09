//! Local shell runtime - runs step scripts with `sh -c` on the host

use crate::runtime::{
    ContainerOutput, ContainerRuntime, ContainerSpec, NetworkSpec, RuntimeConfig, RuntimeError,
};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

/// Runtime that ignores images and runs commands in the workspace
///
/// Useful when docker is unavailable. Services are not started, and plugin
/// steps cannot run because they rely on the image entrypoint.
#[derive(Debug, Clone)]
pub struct ShellRuntime {
    config: RuntimeConfig,
}

impl ShellRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ContainerRuntime for ShellRuntime {
    async fn setup(&self, _network: &NetworkSpec) -> Result<(), RuntimeError> {
        tokio::fs::create_dir_all(&self.config.workspace).await?;
        Ok(())
    }

    async fn start_service(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        warn!(
            "Shell runtime does not start services; '{}' ({}) must already be reachable",
            spec.alias, spec.image
        );
        Ok(())
    }

    async fn run_step(&self, spec: &ContainerSpec) -> Result<ContainerOutput, RuntimeError> {
        let Some(script) = &spec.script else {
            return Err(RuntimeError::Unsupported(format!(
                "plugin step '{}' needs a container runtime",
                spec.alias
            )));
        };

        debug!("Running '{}' in {}", spec.alias, self.config.workspace.display());

        let output = Command::new("sh")
            .arg("-c")
            .arg(script)
            .current_dir(&self.config.workspace)
            .envs(&spec.environment)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RuntimeError::Spawn(format!("sh: {}", e)))?;

        Ok(ContainerOutput::from_process(&output))
    }

    async fn teardown(&self, _network: &NetworkSpec) -> Result<(), RuntimeError> {
        Ok(())
    }
}
