//! Dry-run runtime - logs what would run and reports success

use crate::runtime::{ContainerOutput, ContainerRuntime, ContainerSpec, NetworkSpec, RuntimeError};
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct DryRunRuntime;

impl DryRunRuntime {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for DryRunRuntime {
    async fn setup(&self, network: &NetworkSpec) -> Result<(), RuntimeError> {
        info!("[dry-run] create network {}", network.name);
        Ok(())
    }

    async fn start_service(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        info!("[dry-run] start service {} ({})", spec.alias, spec.image);
        Ok(())
    }

    async fn run_step(&self, spec: &ContainerSpec) -> Result<ContainerOutput, RuntimeError> {
        info!("[dry-run] run {} ({})", spec.alias, spec.image);
        let output = match &spec.script {
            Some(script) => format!("[dry-run] {}\n{}", spec.image, script),
            None => format!("[dry-run] {} (plugin)\n", spec.image),
        };
        Ok(ContainerOutput::new(0, output))
    }

    async fn teardown(&self, network: &NetworkSpec) -> Result<(), RuntimeError> {
        info!("[dry-run] remove network {}", network.name);
        Ok(())
    }
}
