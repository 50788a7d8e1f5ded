//! Steward console - run a plan file with human approvals
//!
//! Loads a JSON plan draft, runs it through a [`Coordinator`] on its own
//! run thread, prints every notification and prompts on stdin whenever a
//! step needs approval.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use steward_coordinator::Coordinator;
use steward_engine::{StaticPlanner, WorkerRegistry};
use steward_types::{ApprovalResolution, Notification, PlanDraft, PlanStatus};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod console;
mod workers;

use config::{LoggingConfig, StewardConfig};
use console::{prompt_approval, Console, Decision};

/// Steward CLI
#[derive(Parser)]
#[command(name = "steward")]
#[command(about = "Steward - run a task plan with human-approved steps", long_about = None)]
#[command(version)]
struct Cli {
    /// Plan file (JSON plan draft)
    #[arg(short, long, env = "STEWARD_PLAN")]
    plan: PathBuf,

    /// Request text; defaults to the plan's goal
    request: Vec<String>,

    /// Configuration file path
    #[arg(short, long, env = "STEWARD_CONFIG")]
    config: Option<String>,

    /// Workspace directory for worker output
    #[arg(short, long, env = "STEWARD_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Model name handed to workers
    #[arg(long, env = "STEWARD_MODEL")]
    model: Option<String>,

    /// Approve every request without prompting
    #[arg(long, env = "STEWARD_AUTO_APPROVE")]
    auto_approve: bool,

    /// Log level
    #[arg(long, env = "STEWARD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "STEWARD_LOG_JSON")]
    json: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    // Logs go to stderr so they never interleave with prompts on stdout.
    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration, then override with CLI args
    let mut config =
        StewardConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if cli.auto_approve {
        config.approvals.auto_approve = true;
    }
    if let Some(workspace) = cli.workspace {
        config.coordinator.execution.workspace = workspace;
    }
    if let Some(model) = cli.model {
        config.coordinator.execution.model = model;
    }
    init_tracing(&config.logging);

    let raw = std::fs::read_to_string(&cli.plan)
        .with_context(|| format!("failed to read plan file {}", cli.plan.display()))?;
    let draft: PlanDraft = serde_json::from_str(&raw)
        .with_context(|| format!("invalid plan file {}", cli.plan.display()))?;

    let request = if cli.request.is_empty() {
        draft.goal.clone()
    } else {
        cli.request.join(" ")
    };
    if request.trim().is_empty() {
        bail!("nothing to do: pass a request or set a goal in the plan file");
    }

    let registry = Arc::new(WorkerRegistry::new());
    workers::register_templates(&registry)?;

    let coordinator = Coordinator::new(
        registry,
        Arc::new(StaticPlanner::new(draft)),
        config.coordinator.clone(),
    );
    let mut notifications = coordinator.subscribe();
    let run_id = coordinator.start(request)?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();
    let mut console = Console::new();

    let status = loop {
        let Some(envelope) = notifications.blocking_recv() else {
            bail!("notification stream closed before run {run_id} finished");
        };
        console.show(&envelope, &mut out)?;

        match envelope.notification {
            Notification::ApprovalRequested { request } => {
                let decision = if config.approvals.auto_approve {
                    writeln!(out, "Auto-approving step {}", request.step_id)?;
                    Decision::Resolve(ApprovalResolution::approve().with_notes("auto-approved"))
                } else {
                    prompt_approval(&mut input, &mut out, &request)?
                };
                match decision {
                    Decision::Resolve(resolution) => {
                        if let Err(err) =
                            coordinator.resolve_approval(&request.step_id, resolution)
                        {
                            warn!(
                                step_id = %request.step_id,
                                error = %err,
                                "Decision not delivered"
                            );
                            writeln!(out, "Could not deliver decision: {err}")?;
                        }
                    }
                    Decision::CancelRun => {
                        coordinator.cancel();
                    }
                }
            }
            Notification::RunFinished { status, .. } => break status,
            _ => {}
        }
    };

    coordinator.join()?;
    if status != PlanStatus::Completed {
        bail!("run {run_id} finished with status {status}");
    }
    Ok(())
}
