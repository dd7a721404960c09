//! Build execution engine

pub mod engine;
pub mod executor;
pub mod scheduler;

pub use engine::{EventHandler, ExecutionEngine, ExecutionEvent};
pub use executor::{ExecutionResult, PrepareError, PreparedStep, StepExecutor};
pub use scheduler::{ExecutionScheduler, Gate, PlannedPipeline, PlannedStep};
