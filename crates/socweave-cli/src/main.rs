//! Operator CLI for the Socweave triage engine.
//!
//! Drives the engine end to end: run an alert through the pipeline, resume a
//! checkpointed run, inspect a run's state and log, resolve the HITL gate
//! (approve / dismiss / unlock), and validate a policy document. The CLI is
//! presentation only -- it renders read-only snapshots and routes every
//! mutation through the engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use socweave_core::collaborator::{StaticServices, StepServices};
use socweave_core::engine::checkpoint::CheckpointManager;
use socweave_core::engine::dag;
use socweave_core::engine::executor::{ExecutorError, TriageExecutor};
use socweave_core::engine::hitl::{self, HitlGate};
use socweave_core::engine::steps::{triage_pipeline, StepRunner};
use socweave_core::policy::{load_policy_file, PolicyStore};
use socweave_core::repository::memory::MemoryRunRepository;
use socweave_core::repository::RunRepository;
use socweave_infra::audit::JsonlAuditWriter;
use socweave_infra::config::load_engine_config;
use socweave_infra::live::LiveServices;
use socweave_infra::sqlite::{pool::default_database_url, DatabasePool, SqliteRunRepository};
use socweave_types::alert::Alert;
use socweave_types::log::dedupe;
use socweave_types::policy::Policy;
use socweave_types::run::RunState;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "socweave", version, about = "Security alert triage orchestration engine")]
struct Cli {
    /// Data directory (config.toml, default database location).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Run fully in-process: in-memory checkpoints and canned collaborators.
    #[arg(long, global = true)]
    offline: bool,

    /// Enable OpenTelemetry stdout export.
    #[arg(long, global = true)]
    otel: bool,

    /// Also append engine log events to this JSONL audit file.
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an alert through the triage pipeline.
    Run {
        /// Path to the alert JSON file.
        alert: PathBuf,

        /// Policy YAML file (defaults to the builtin policy).
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Chain the scorers instead of fanning them out.
        #[arg(long)]
        sequential: bool,

        /// Offline only: use canned scores that fall below the thresholds.
        #[arg(long)]
        inconclusive: bool,
    },

    /// Resume a checkpointed run, skipping completed steps.
    Resume {
        run_id: Uuid,

        /// Policy YAML file (must match the original run's policy for
        /// deterministic replay).
        #[arg(long)]
        policy: Option<PathBuf>,
    },

    /// Show a run's state, HITL outcome, and action log.
    Show { run_id: Uuid },

    /// Approve a run awaiting human review (runs the automated branch).
    Approve {
        run_id: Uuid,

        #[arg(long, default_value = "analyst")]
        by: String,

        #[arg(long)]
        policy: Option<PathBuf>,
    },

    /// Dismiss a run awaiting human review.
    Dismiss {
        run_id: Uuid,

        #[arg(long, default_value = "analyst")]
        by: String,
    },

    /// Reset a resolved run's effective HITL outcome back to pending.
    Unlock {
        run_id: Uuid,

        #[arg(long, default_value = "analyst")]
        by: String,
    },

    /// Validate a policy document without running anything.
    PolicyCheck { path: PathBuf },

    /// Print the pipeline's nodes and dependency edges.
    Topology {
        /// Describe the sequential-scorer variant.
        #[arg(long)]
        sequential: bool,
    },

    /// List recent runs.
    Runs {
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    socweave_observe::tracing_setup::init_tracing(cli.otel)
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let result = dispatch(&cli).await;
    socweave_observe::tracing_setup::shutdown_tracing();
    result
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Run {
            alert,
            policy,
            sequential,
            inconclusive,
        } => {
            let alert = load_alert(alert)?;
            let policy = load_policy(policy.as_deref().map(PathBuf::from))?;
            let audit = cli.audit_log.as_ref().map(JsonlAuditWriter::new);
            if cli.offline {
                let services = if *inconclusive {
                    StaticServices::inconclusive()
                } else {
                    StaticServices::escalating()
                };
                cmd_run(MemoryRunRepository::new(), services, policy, alert, *sequential, audit)
                    .await
            } else {
                let repo = sqlite_repo(cli).await?;
                let services = live_services(cli).await?;
                cmd_run(repo, services, policy, alert, *sequential, audit).await
            }
        }
        Command::Resume { run_id, policy } => {
            let policy = load_policy(policy.as_deref().map(PathBuf::from))?;
            if cli.offline {
                bail!("offline mode keeps no checkpoints across invocations; resume needs the SQLite store");
            }
            let repo = sqlite_repo(cli).await?;
            let services = live_services(cli).await?;
            cmd_resume(repo, services, policy, *run_id).await
        }
        Command::Show { run_id } => {
            let repo = sqlite_repo(cli).await?;
            cmd_show(repo, *run_id).await
        }
        Command::Approve { run_id, by, policy } => {
            let policy = load_policy(policy.as_deref().map(PathBuf::from))?;
            let repo = sqlite_repo(cli).await?;
            if cli.offline {
                cmd_approve(repo, StaticServices::escalating(), policy, *run_id, by).await
            } else {
                let services = live_services(cli).await?;
                cmd_approve(repo, services, policy, *run_id, by).await
            }
        }
        Command::Dismiss { run_id, by } => {
            let repo = sqlite_repo(cli).await?;
            cmd_dismiss(repo, *run_id, by).await
        }
        Command::Unlock { run_id, by } => {
            let repo = sqlite_repo(cli).await?;
            cmd_unlock(repo, *run_id, by).await
        }
        Command::PolicyCheck { path } => cmd_policy_check(path),
        Command::Topology { sequential } => {
            let topo = dag::topology(&triage_pipeline(!*sequential));
            println!("nodes: {}", topo.nodes.join(", "));
            for (from, to) in topo.edges {
                println!("  {from} -> {to}");
            }
            Ok(())
        }
        Command::Runs { limit } => {
            let repo = sqlite_repo(cli).await?;
            for run in repo.list_runs(*limit).await.map_err(|e| anyhow::anyhow!("{e}"))? {
                println!(
                    "{}  {:?}  alert={}  started={}",
                    run.run_id,
                    run.status,
                    run.alert_id,
                    run.started_at.to_rfc3339()
                );
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

fn load_alert(path: &PathBuf) -> Result<Alert> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alert file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse alert JSON {}", path.display()))
}

fn load_policy(path: Option<PathBuf>) -> Result<Arc<Policy>> {
    match path {
        Some(path) => {
            let store = PolicyStore::open(&path)
                .with_context(|| format!("failed to load policy {}", path.display()))?;
            Ok(store.current())
        }
        None => Ok(Arc::new(Policy::default())),
    }
}

async fn sqlite_repo(cli: &Cli) -> Result<SqliteRunRepository> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_engine_config(&data_dir).await;
    let url = config.database_url.unwrap_or_else(default_database_url);
    let pool = DatabasePool::new(&url)
        .await
        .with_context(|| format!("failed to open database {url}"))?;
    Ok(SqliteRunRepository::new(pool))
}

async fn live_services(cli: &Cli) -> Result<LiveServices> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_engine_config(&data_dir).await;
    LiveServices::from_config(&config).context("failed to wire collaborator clients")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_run<R, S>(
    repo: R,
    services: S,
    policy: Arc<Policy>,
    alert: Alert,
    sequential: bool,
    audit: Option<JsonlAuditWriter>,
) -> Result<()>
where
    R: RunRepository + 'static,
    S: StepServices + 'static,
{
    let runner = StepRunner::new(Arc::new(services), policy);
    let executor = TriageExecutor::with_pipeline(repo, runner, triage_pipeline(!sequential));

    match executor.execute(alert).await {
        Ok(result) => {
            println!("run {} -> {:?}", result.run_id, result.status);
            print_state(&result.state);
            if let Some(audit) = audit {
                audit
                    .append_all(&result.state.logs)
                    .with_context(|| format!("failed to write audit log {}", audit.path().display()))?;
            }
            Ok(())
        }
        Err(e @ ExecutorError::StepFailed { .. } | e @ ExecutorError::StepTimeout { .. }) => {
            bail!("{e}; the run is resumable from its last checkpoint")
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_resume<R, S>(
    repo: R,
    services: S,
    policy: Arc<Policy>,
    run_id: Uuid,
) -> Result<()>
where
    R: RunRepository + 'static,
    S: StepServices + 'static,
{
    let runner = StepRunner::new(Arc::new(services), policy);
    let executor = TriageExecutor::new(repo, runner);
    let result = executor.resume(run_id).await?;
    println!("run {} -> {:?}", result.run_id, result.status);
    print_state(&result.state);
    Ok(())
}

async fn cmd_show<R: RunRepository>(repo: R, run_id: Uuid) -> Result<()> {
    let checkpoint = CheckpointManager::new(repo);
    let state = checkpoint.load_state(run_id).await?;
    print_state(&state);
    Ok(())
}

async fn cmd_approve<R, S>(
    repo: R,
    services: S,
    policy: Arc<Policy>,
    run_id: Uuid,
    by: &str,
) -> Result<()>
where
    R: RunRepository + 'static,
    S: StepServices + 'static,
{
    let checkpoint = CheckpointManager::new(repo);
    let mut state = checkpoint.load_state(run_id).await?;
    let runner = StepRunner::new(Arc::new(services), policy);
    HitlGate::approve(&mut state, &runner, by).await?;
    checkpoint.save_state(&state, None).await;
    println!("run {run_id} approved; case {}", state.case_ref.as_deref().unwrap_or("-"));
    Ok(())
}

async fn cmd_dismiss<R: RunRepository>(repo: R, run_id: Uuid, by: &str) -> Result<()> {
    let checkpoint = CheckpointManager::new(repo);
    let mut state = checkpoint.load_state(run_id).await?;
    HitlGate::dismiss(&mut state, by)?;
    checkpoint.save_state(&state, None).await;
    println!("run {run_id} dismissed");
    Ok(())
}

async fn cmd_unlock<R: RunRepository>(repo: R, run_id: Uuid, by: &str) -> Result<()> {
    let checkpoint = CheckpointManager::new(repo);
    let mut state = checkpoint.load_state(run_id).await?;
    HitlGate::unlock(&mut state, by)?;
    checkpoint.save_state(&state, None).await;
    println!("run {run_id} unlocked; awaiting human review again");
    Ok(())
}

fn cmd_policy_check(path: &PathBuf) -> Result<()> {
    let policy = load_policy_file(path)
        .with_context(|| format!("policy {} is invalid", path.display()))?;
    println!(
        "policy OK: version {}, {} rule(s), thresholds: validity >= {:.2}, severity >= {}, escalate on {:?}",
        policy.policy_version,
        policy.playbook_rules.len(),
        policy.thresholds.validity_tp_min,
        policy.thresholds.severity_min,
        policy.thresholds.exploit_levels_escalate,
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_state(state: &RunState) {
    println!("alert:    {} ({})", state.alert.id, state.alert.title);
    println!("status:   {:?}", state.status);
    if let Some(note) = &state.status_note {
        println!("note:     {note}");
    }
    if let Some(decision) = &state.decision {
        println!(
            "decision: {} (escalate={}) -- {}",
            decision.route.as_str(),
            decision.escalate,
            decision.rationale
        );
    }
    if let Some(playbooks) = &state.playbooks {
        println!("playbooks: {} -- {}", playbooks.names.join(", "), playbooks.rationale);
    }
    if let Some(case_ref) = &state.case_ref {
        println!("case:     {case_ref}");
    }
    println!("hitl:     {:?}", hitl::resolve_outcome(&state.logs));

    println!("log:");
    for entry in dedupe(&state.logs) {
        let at = entry
            .at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {at}  {}  {}",
            entry.event,
            serde_json::Value::Object(entry.details.clone())
        );
    }
}
