use anyhow::{Context, Result};
use drover::cli::commands::{
    FmtCommand, HistoryCommand, ListCommand, PlanCommand, RunCommand, RuntimeKind,
    ValidateCommand,
};
use drover::cli::output::*;
use drover::cli::{Cli, Command};
use drover::core::lint::{lint, LintOptions};
use drover::core::secret::{ChainedSecrets, EnvSecrets, FileSecrets, SecretStore, StaticSecrets};
use drover::core::{Build, ExecutionStatus};
use drover::execution::{ExecutionEngine, ExecutionEvent, ExecutionScheduler};
use drover::persistence::{
    create_summaries, ExecutionSummary, PersistenceBackend, SqliteExecutionStore,
};
use drover::runtime::{
    ContainerRuntime, DockerRuntime, DryRunRuntime, RuntimeConfig, ShellRuntime,
};
use drover::DocumentConfig;
use std::path::Path;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_build(cmd, &cli).await?,
        Command::Validate(cmd) => validate_document(cmd)?,
        Command::Fmt(cmd) => format_document(cmd)?,
        Command::Plan(cmd) => plan_build(cmd)?,
        Command::List(cmd) => list_pipelines(cmd, cli.db.as_deref()).await?,
        Command::History(cmd) => show_history(cmd, cli.db.as_deref()).await?,
    }

    Ok(())
}

async fn open_store(db: Option<&Path>) -> Result<SqliteExecutionStore> {
    match db {
        Some(path) => SqliteExecutionStore::new(path).await,
        None => SqliteExecutionStore::with_default_path().await,
    }
}

fn load_secrets(cmd: &RunCommand) -> Result<Arc<dyn SecretStore>> {
    let overrides = cmd
        .secret
        .iter()
        .fold(StaticSecrets::new(), |secrets, (name, value)| {
            secrets.with(name, value)
        });

    let mut secrets = ChainedSecrets::new().with_store(overrides);
    if let Some(path) = &cmd.secrets_file {
        secrets = secrets.with_store(FileSecrets::load(path)?);
    }

    Ok(Arc::new(secrets.with_store(EnvSecrets::default())))
}

async fn run_build(cmd: &RunCommand, cli: &Cli) -> Result<()> {
    let document =
        DocumentConfig::from_file(&cmd.file).context("Failed to load pipeline document")?;

    println!(
        "{}Loaded {} pipelines from {}",
        INFO,
        style(document.pipelines().count()).cyan(),
        style(cmd.file.display()).bold()
    );

    let mut build = document.to_build(cmd.build.to_context());
    let secrets = load_secrets(cmd)?;
    for pipeline in &build.pipelines {
        for step in &pipeline.steps {
            for name in step.secret_names() {
                if secrets.get(name).is_none() {
                    println!(
                        "{}Secret {} used by {}/{} is not set",
                        WARN,
                        style(name).yellow(),
                        pipeline.name,
                        step.name
                    );
                }
            }
        }
    }

    let workspace = std::fs::canonicalize(&cmd.workspace)
        .with_context(|| format!("Workspace {} not found", cmd.workspace.display()))?;
    let config = RuntimeConfig::new()
        .with_docker_binary(&cmd.docker)
        .with_workspace(workspace)
        .with_timeout(cmd.timeout);

    println!();
    let status = match cmd.runtime {
        RuntimeKind::Docker => {
            let runtime = DockerRuntime::new(config.clone());
            execute_build(runtime, secrets, config, &mut build, cli.stream).await
        }
        RuntimeKind::Shell => {
            let runtime = ShellRuntime::new(config.clone());
            execute_build(runtime, secrets, config, &mut build, cli.stream).await
        }
        RuntimeKind::DryRun => {
            execute_build(DryRunRuntime::new(), secrets, config, &mut build, cli.stream).await
        }
    };

    println!();
    for pipeline in &build.pipelines {
        println!(
            "{} {}",
            style(&pipeline.name).bold(),
            format_status(pipeline.status())
        );
        for step in &pipeline.steps {
            println!("  {:<24} {}", step.name, format_step_state(&step.state));
        }
    }

    if !build.notifications().is_empty() {
        println!();
        for notification in build.notifications() {
            println!("{}", format_notification(notification));
        }
    }

    // Save to history
    if !cmd.no_history {
        let store = open_store(cli.db.as_deref()).await?;
        for summary in create_summaries(&build) {
            store.save_execution(&summary).await?;
        }
        println!(
            "\n{}Build saved to history (ID: {})",
            INFO,
            style(build.execution_id()).dim()
        );
    }

    // Print final status
    match status {
        ExecutionStatus::Failure | ExecutionStatus::Killed => {
            println!("\n{}Build {}", CROSS, style("failed").red());
            for pipeline in build.pipelines.iter().filter(|p| p.has_failed()) {
                error!(pipeline = %pipeline.name, "pipeline failed");
            }
            std::process::exit(1);
        }
        _ => println!("\n{}Build {}", CHECK, format_status(status)),
    }

    Ok(())
}

async fn execute_build<R: ContainerRuntime>(
    runtime: R,
    secrets: Arc<dyn SecretStore>,
    config: RuntimeConfig,
    build: &mut Build,
    stream: bool,
) -> ExecutionStatus {
    let mut engine = ExecutionEngine::new(runtime, secrets, config);

    engine.add_event_handler(move |event| {
        // Step output is only shown when streaming
        if matches!(event, ExecutionEvent::StepOutput { .. }) && !stream {
            return;
        }
        println!("{}", format_execution_event(&event));
    });

    engine.execute(build).await
}

fn validate_document(cmd: &ValidateCommand) -> Result<()> {
    println!("{}Validating {}...", INFO, cmd.file.display());

    let document = match DocumentConfig::from_file(&cmd.file) {
        Ok(document) => document,
        Err(e) => {
            println!("{}Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    };

    println!("{}Pipeline document is valid!", CHECK);
    for pipeline in document.pipelines() {
        println!(
            "  {}: {} steps, {} services",
            style(&pipeline.name).bold(),
            style(pipeline.steps.len()).cyan(),
            style(pipeline.services.len()).cyan()
        );
    }

    let options = LintOptions {
        release_branch: cmd.release_branch.clone(),
    };
    let findings = lint(&document, &options);
    for finding in &findings {
        println!("{}", format_lint_finding(finding));
    }

    if cmd.json {
        let pipelines: Vec<_> = document.pipelines().collect();
        println!("\n{}", serde_json::to_string_pretty(&pipelines)?);
    }

    if cmd.strict && !findings.is_empty() {
        println!("{}{} lint findings", CROSS, findings.len());
        std::process::exit(1);
    }

    Ok(())
}

fn format_document(cmd: &FmtCommand) -> Result<()> {
    let content = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("Failed to read {}", cmd.file.display()))?;
    let document = DocumentConfig::from_yaml(&content)
        .with_context(|| format!("Failed to load {}", cmd.file.display()))?;
    let canonical = document.to_yaml()?;

    if cmd.check {
        if canonical == content {
            println!("{}{} is formatted", CHECK, cmd.file.display());
        } else {
            println!("{}{} is not formatted", CROSS, cmd.file.display());
            std::process::exit(1);
        }
    } else if cmd.write {
        std::fs::write(&cmd.file, &canonical)
            .with_context(|| format!("Failed to write {}", cmd.file.display()))?;
        println!("{}Formatted {}", CHECK, cmd.file.display());
    } else {
        print!("{}", canonical);
    }

    Ok(())
}

fn plan_build(cmd: &PlanCommand) -> Result<()> {
    let document =
        DocumentConfig::from_file(&cmd.file).context("Failed to load pipeline document")?;
    let build = document.to_build(cmd.build.to_context());
    let plan = ExecutionScheduler::new().plan(&build);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!(
            "{}Plan for {} on {}:",
            INFO,
            style(&cmd.build.event).cyan(),
            style(&cmd.build.branch).cyan()
        );
        println!("{}", format_plan(&plan));
    }

    Ok(())
}

async fn list_pipelines(cmd: &ListCommand, db: Option<&Path>) -> Result<()> {
    let store = open_store(db).await?;
    let pipelines = store.list_pipelines().await?;

    if cmd.json {
        let mut json_data = Vec::new();
        for pipeline in &pipelines {
            let executions = store.list_executions(pipeline).await?;
            json_data.push(serde_json::json!({
                "name": pipeline,
                "execution_count": executions.len(),
            }));
        }
        let data = serde_json::json!({ "pipelines": json_data });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if pipelines.is_empty() {
        println!("{}No pipelines found in history", INFO);
        return Ok(());
    }

    println!("{}Pipelines in history:", INFO);

    for pipeline_name in &pipelines {
        if cmd.with_counts {
            let executions = store.list_executions(pipeline_name).await?;
            let succeeded = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Success)
                .count();
            let failed = executions
                .iter()
                .filter(|e| e.status == ExecutionStatus::Failure)
                .count();
            println!(
                "  {} ({} runs: {} succeeded, {} failed)",
                style(pipeline_name).bold(),
                style(executions.len()).cyan(),
                style(succeeded).green(),
                style(failed).red()
            );
        } else {
            println!("  {}", style(pipeline_name).bold());
        }
    }

    Ok(())
}

async fn show_history(cmd: &HistoryCommand, db: Option<&Path>) -> Result<()> {
    let store = open_store(db).await?;

    // If specific execution ID is requested
    if let Some(exec_id_str) = &cmd.execution_id {
        let exec_id = uuid::Uuid::parse_str(exec_id_str).context("Invalid execution ID format")?;
        let summaries = store.load_execution(exec_id).await?;

        if summaries.is_empty() {
            println!("{}Execution not found", WARN);
        }
        for summary in &summaries {
            print_execution_details(summary, cmd.verbose)?;
        }
        return Ok(());
    }

    let mut executions = match &cmd.pipeline {
        Some(pipeline_name) => store.list_executions(pipeline_name).await?,
        None => {
            let mut all_execs = Vec::new();
            for pipeline in store.list_pipelines().await? {
                all_execs.extend(store.list_executions(&pipeline).await?);
            }
            all_execs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all_execs
        }
    };
    executions.truncate(cmd.limit);

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{}No executions found", INFO);
        return Ok(());
    }

    println!("{}Execution history (showing latest {}):", INFO, cmd.limit);
    for summary in &executions {
        println!("  {}", format_execution_summary(summary));
    }

    Ok(())
}

fn print_execution_details(summary: &ExecutionSummary, verbose: bool) -> Result<()> {
    println!("{}Execution Details", INFO);
    println!("  ID: {}", style(summary.execution_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Event: {} on {}", summary.event, summary.branch);
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress * 100.0)).cyan(),
        summary.completed_steps,
        summary.total_steps
    );

    if verbose {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
