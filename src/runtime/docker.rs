//! Docker CLI runtime - drives `docker` as a subprocess

use crate::core::step::PullPolicy;
use crate::runtime::{
    ContainerOutput, ContainerRuntime, ContainerSpec, MountSource, NetworkSpec, RuntimeConfig,
    RuntimeError,
};
use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runtime that runs containers through the docker CLI
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    config: RuntimeConfig,
}

impl DockerRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Arguments for `docker run`
    ///
    /// Environment values are not part of the arguments; only `-e NAME` is
    /// passed and docker reads the value from its own environment, so secret
    /// values never show up in the process list.
    pub fn run_args(spec: &ContainerSpec, detach: bool) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into()];

        if detach {
            args.push("-d".into());
        } else {
            args.push("--rm".into());
        }

        args.extend(["--name".into(), spec.name.clone()]);
        args.extend(["--network".into(), spec.network.clone()]);
        args.extend(["--network-alias".into(), spec.alias.clone()]);

        match spec.pull {
            PullPolicy::Always => args.extend(["--pull".into(), "always".into()]),
            PullPolicy::Never => args.extend(["--pull".into(), "never".into()]),
            PullPolicy::IfNotExists => {}
        }

        if let Some(dir) = &spec.working_dir {
            args.extend(["-w".into(), dir.clone()]);
        }

        for name in spec.environment.keys() {
            args.extend(["-e".into(), name.clone()]);
        }

        for mount in &spec.mounts {
            let source = match &mount.source {
                MountSource::Host { path } => path,
                MountSource::Volume { name } => name,
            };
            args.extend(["-v".into(), format!("{}:{}", source, mount.target)]);
        }

        for port in &spec.ports {
            args.extend(["--expose".into(), port.clone()]);
        }

        if let Some(script) = &spec.script {
            args.extend(["--entrypoint".into(), "/bin/sh".into()]);
            args.push(spec.image.clone());
            args.extend(["-c".into(), script.clone()]);
        } else {
            args.push(spec.image.clone());
        }

        args
    }

    async fn docker(&self, args: &[String], spec: Option<&ContainerSpec>) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.config.docker_binary, args.join(" "));

        let mut command = Command::new(&self.config.docker_binary);
        command.args(args).kill_on_drop(true);
        if let Some(spec) = spec {
            command.envs(&spec.environment);
        }

        command.output().await.map_err(|e| {
            RuntimeError::Spawn(format!("{}: {}", self.config.docker_binary, e))
        })
    }

    /// Run a docker command that must succeed
    async fn docker_checked(&self, args: &[String]) -> Result<(), RuntimeError> {
        let output = self.docker(args, None).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            warn!("docker {} exited with code {}: {}", args[0], code, stderr.trim());
            return Err(RuntimeError::Command {
                code,
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn setup(&self, network: &NetworkSpec) -> Result<(), RuntimeError> {
        info!("Creating network {}", network.name);
        self.docker_checked(&args(["network", "create", network.name.as_str()]))
            .await?;

        for volume in &network.volumes {
            self.docker_checked(&args(["volume", "create", volume.as_str()])).await?;
        }
        Ok(())
    }

    async fn start_service(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        info!("Starting service {} ({})", spec.alias, spec.image);
        let output = self.docker(&Self::run_args(spec, true), Some(spec)).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::Command {
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn run_step(&self, spec: &ContainerSpec) -> Result<ContainerOutput, RuntimeError> {
        let output = self.docker(&Self::run_args(spec, false), Some(spec)).await?;
        let output = ContainerOutput::from_process(&output);
        debug!("docker run {} exited with {}", spec.name, output.exit_code);
        Ok(output)
    }

    /// Killing the `docker run` client leaves the container running
    async fn kill_step(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        warn!("Removing step container {}", spec.name);
        self.docker_checked(&args(["rm", "-f", spec.name.as_str()])).await
    }

    async fn teardown(&self, network: &NetworkSpec) -> Result<(), RuntimeError> {
        let mut first_error = None;

        for service in &network.services {
            if let Err(e) = self.docker_checked(&args(["rm", "-f", service.as_str()])).await {
                warn!("Failed to remove service container {}: {}", service, e);
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self.docker_checked(&args(["network", "rm", network.name.as_str()])).await {
            warn!("Failed to remove network {}: {}", network.name, e);
            first_error.get_or_insert(e);
        }

        for volume in &network.volumes {
            if let Err(e) = self.docker_checked(&args(["volume", "rm", "-f", volume.as_str()])).await {
                warn!("Failed to remove volume {}: {}", volume, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
