//! CLI command definitions

use crate::core::BuildContext;
use clap::Args;
use std::path::PathBuf;

const DEFAULT_FILE: &str = ".drone.yml";

/// Event a build is simulated for
#[derive(Debug, Args, Clone)]
pub struct BuildArgs {
    /// Branch the build runs for
    #[arg(short, long, default_value = "master")]
    pub branch: String,

    /// Event name (push, pull_request, tag, promote, ...)
    #[arg(short, long, default_value = "push")]
    pub event: String,

    /// Commit SHA
    #[arg(long)]
    pub commit: Option<String>,

    /// Git reference, defaults to refs/heads/<branch>
    #[arg(long = "ref")]
    pub reference: Option<String>,

    /// Repository as namespace/name
    #[arg(long)]
    pub repo: Option<String>,

    /// Deployment target for promote and rollback events
    #[arg(long)]
    pub target: Option<String>,

    /// Cron job name for cron events
    #[arg(long)]
    pub cron: Option<String>,

    /// Pull request action (opened, synchronized, closed, ...)
    #[arg(long)]
    pub action: Option<String>,

    /// Build number
    #[arg(long)]
    pub number: Option<u64>,
}

impl BuildArgs {
    /// Build context described by the flags
    pub fn to_context(&self) -> BuildContext {
        let mut context = BuildContext::new(&self.branch, &self.event);
        if let Some(commit) = &self.commit {
            context = context.with_commit(commit);
        }
        if let Some(reference) = &self.reference {
            context = context.with_reference(reference);
        }
        if let Some(repo) = &self.repo {
            context = context.with_repo(repo);
        }
        if let Some(target) = &self.target {
            context = context.with_target(target);
        }
        if let Some(cron) = &self.cron {
            context = context.with_cron(cron);
        }
        if let Some(action) = &self.action {
            context = context.with_action(action);
        }
        if let Some(number) = self.number {
            context = context.with_number(number);
        }
        context
    }
}

/// Run a build
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the pipeline document
    #[arg(short, long, default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    #[command(flatten)]
    pub build: BuildArgs,

    /// Where steps run
    #[arg(long, value_enum, default_value_t = RuntimeKind::Docker)]
    pub runtime: RuntimeKind,

    /// YAML or JSON file mapping secret names to values
    #[arg(long)]
    pub secrets_file: Option<PathBuf>,

    /// Secret overrides (name=value)
    #[arg(long, value_parser = parse_key_value)]
    pub secret: Vec<(String, String)>,

    /// Per-step timeout in seconds
    #[arg(long, env = "DROVER_TIMEOUT", default_value_t = 3600)]
    pub timeout: u64,

    /// Directory mounted as the workspace
    #[arg(long, env = "DROVER_WORKSPACE", default_value = ".")]
    pub workspace: PathBuf,

    /// Docker binary
    #[arg(long, env = "DROVER_DOCKER", default_value = "docker")]
    pub docker: String,

    /// Don't save the build to history
    #[arg(long)]
    pub no_history: bool,
}

/// Validate and lint a pipeline document
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the pipeline document
    #[arg(short, long, default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    /// Print the document as JSON
    #[arg(long)]
    pub json: bool,

    /// Treat lint findings as errors
    #[arg(long)]
    pub strict: bool,

    /// Branch deploy pipelines must be restricted to
    #[arg(long, default_value = "master")]
    pub release_branch: String,
}

/// Re-emit a pipeline document in canonical form
#[derive(Debug, Args, Clone)]
pub struct FmtCommand {
    /// Path to the pipeline document
    #[arg(short, long, default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    /// Exit non-zero if the file is not canonical
    #[arg(long, conflicts_with = "write")]
    pub check: bool,

    /// Rewrite the file in place
    #[arg(long)]
    pub write: bool,
}

/// Show which pipelines and steps a build would run
#[derive(Debug, Args, Clone)]
pub struct PlanCommand {
    /// Path to the pipeline document
    #[arg(short, long, default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    #[command(flatten)]
    pub build: BuildArgs,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List pipelines in history
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Show execution counts
    #[arg(long)]
    pub with_counts: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show execution history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent executions to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show the pipelines of a specific build
    #[arg(long)]
    pub execution_id: Option<String>,
}

/// Container runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RuntimeKind {
    Docker,
    Shell,
    #[clap(name = "dry-run")]
    DryRun,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
