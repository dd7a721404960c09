//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{
    FmtCommand, HistoryCommand, ListCommand, PlanCommand, RunCommand, ValidateCommand,
};
use std::ffi::OsString;
use std::path::PathBuf;

/// Runner for Drone pipeline documents
#[derive(Debug, Parser, Clone)]
#[command(name = "drover")]
#[command(version)]
#[command(about = "Validate, plan and run Drone pipeline documents", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print step output as it arrives
    #[arg(short, long, global = true)]
    pub stream: bool,

    /// History database, defaults to the user data directory
    #[arg(long, global = true, env = "DROVER_DB")]
    pub db: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a build
    Run(RunCommand),

    /// Validate and lint a pipeline document
    Validate(ValidateCommand),

    /// Re-emit a pipeline document in canonical form
    Fmt(FmtCommand),

    /// Show which pipelines and steps a build would run
    Plan(PlanCommand),

    /// List pipelines in history
    List(ListCommand),

    /// Show execution history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
