//! Container runtimes that run pipeline steps and services

pub mod config;
pub mod docker;
pub mod dry_run;
pub mod response;
pub mod shell;

use crate::core::step::PullPolicy;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub use config::RuntimeConfig;
pub use docker::DockerRuntime;
pub use dry_run::DryRunRuntime;
pub use response::{ContainerOutput, RuntimeError};
pub use shell::ShellRuntime;

/// Where a mount comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSource {
    /// Host path
    Host { path: String },
    /// Named volume scoped to the pipeline run
    Volume { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: MountSource,
    /// Path inside the container
    pub target: String,
}

/// Everything a runtime needs to start one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Unique container name
    pub name: String,

    /// Host name other containers on the network reach it by
    pub alias: String,

    pub image: String,

    /// Shell script run with `/bin/sh -c`; `None` runs the image entrypoint
    pub script: Option<String>,

    /// Fully resolved environment, secrets included
    pub environment: BTreeMap<String, String>,

    pub mounts: Vec<Mount>,

    pub ports: Vec<String>,

    /// Network shared by the pipeline's containers
    pub network: String,

    pub working_dir: Option<String>,

    pub pull: PullPolicy,
}

/// Resources owned by one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Network name
    pub name: String,

    /// Named volumes created at setup, removed at teardown
    pub volumes: Vec<String>,

    /// Service container names, removed at teardown
    pub services: Vec<String>,
}

/// Trait for container execution - allows for different implementations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create the pipeline network and scratch volumes
    async fn setup(&self, network: &NetworkSpec) -> Result<(), RuntimeError>;

    /// Start a detached service container
    async fn start_service(&self, spec: &ContainerSpec) -> Result<(), RuntimeError>;

    /// Run a step container to completion
    ///
    /// A non-zero exit is reported through [`ContainerOutput::exit_code`];
    /// `Err` means the step could not be run at all.
    async fn run_step(&self, spec: &ContainerSpec) -> Result<ContainerOutput, RuntimeError>;

    /// Stop a step whose `run_step` future was abandoned, e.g. on timeout
    ///
    /// Runtimes whose steps die with the dropped future need nothing here.
    async fn kill_step(&self, _spec: &ContainerSpec) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Remove everything `setup` and `start_service` created
    async fn teardown(&self, network: &NetworkSpec) -> Result<(), RuntimeError>;
}
