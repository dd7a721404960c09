//! Core domain models
//!
//! This module defines the pipeline document, the conditions that gate
//! pipelines and steps, and the runtime model of a build.

pub mod build;
pub mod condition;
pub mod config;
pub mod context;
pub mod lint;
mod literal;
pub mod pipeline;
pub mod secret;
pub mod state;
pub mod step;
pub mod template;

pub use build::*;
pub use context::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
