//! drover - validate, plan and run Drone pipeline documents

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod runtime;

// Re-export commonly used types
pub use crate::core::config::DocumentConfig;
pub use crate::core::{Build, BuildContext, ExecutionStatus, Pipeline, Step, StepState};
pub use execution::{ExecutionEngine, ExecutionEvent, ExecutionScheduler};
pub use runtime::{ContainerRuntime, DockerRuntime, DryRunRuntime, RuntimeConfig, ShellRuntime};
