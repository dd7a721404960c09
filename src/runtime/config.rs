//! Runtime configuration

use std::path::PathBuf;

/// Configuration shared by the container runtimes and the step executor
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the docker CLI
    ///
    /// Defaults to "docker" (assumes it's on PATH).
    pub docker_binary: String,

    /// Host directory mounted as the step workspace
    pub workspace: PathBuf,

    /// Timeout for a single step in seconds
    pub timeout_secs: u64,

    /// Prefix for per-pipeline networks, containers and volumes
    pub network_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            workspace: PathBuf::from("."),
            timeout_secs: 3600,
            network_prefix: "drover".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docker_binary(mut self, docker_binary: impl Into<String>) -> Self {
        self.docker_binary = docker_binary.into();
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_network_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.network_prefix = prefix.into();
        self
    }
}
