//! Runtime result types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for runtime operations
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn {0}")]
    Spawn(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Unsupported by this runtime: {0}")]
    Unsupported(String),

    #[error("Command exited with code {code}: {stderr}")]
    Command { code: i32, stderr: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of running a container to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOutput {
    /// Process exit code, `-1` when killed by a signal
    pub exit_code: i32,

    /// Combined stdout and stderr
    pub output: String,
}

impl ContainerOutput {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Build from a finished process, stdout first
    pub fn from_process(output: &std::process::Output) -> Self {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            output: combined,
        }
    }
}
