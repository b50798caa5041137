//! `devforge` — the CLI front end for the continuous development
//! orchestrator.
//!
//! Grounded in the teacher's `clap::Parser` usage and
//! `tracing_subscriber::fmt()...init()` startup sequence
//! (`coordination/src/main.rs`), generalized from a flat-flag `Args` to a
//! proper `Subcommand` enum since this binary has a lifecycle (`init` ->
//! `approve` -> `run` -> `status`/`rollback`/`diff`) rather than the
//! teacher's single-shot tool-server entry point.
//!
//! Every subcommand is its own process and `devforge-core`'s managers hold
//! their state in memory, so the CLI persists the one blueprint/task-tree
//! pair it's working on as plain JSON under `<project>/.devforge/`
//! (`state.json`), reloading it at the top of each invocation — the same
//! "load, mutate, write back" shape as the teacher's
//! `state_machine.rs::save_checkpoint`/`load_checkpoint` pair, generalized
//! from one checkpoint file to the whole working set.

mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devforge_agents::{
    AgentCoordinator, ContinuousDevOrchestrator, CoordinatorConfig, HttpLlmClient,
    LlmEndpointConfig, LocalFileStore, OrchestratorRunConfig, TokioProcessRunner, WorkerExecutor,
};
use devforge_core::config::{OrchestratorConfig, TestFramework};
use devforge_core::events::EventBus;
use devforge_core::ids::{CheckpointId, Clock, IdGenerator, ModuleId, SystemClock, UuidGenerator};
use devforge_core::model::{Module, ModuleType};
use devforge_core::regression::{GateCommand, RegressionGate, RegressionGateConfig};
use devforge_core::{BlueprintManager, BoundaryChecker, CycleResetManager, TaskTreeManager, TimeTravelManager};
use tracing::info;

use state::ProjectState;

#[derive(Parser, Debug)]
#[command(name = "devforge", author, version, about, long_about = None)]
struct Cli {
    /// Project root devforge operates on; `.devforge/state.json` lives here.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new Draft blueprint and persist it.
    Init {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// Repeatable `name:responsibility1,responsibility2` module spec.
        #[arg(long = "module")]
        modules: Vec<String>,
    },
    /// Submit the persisted blueprint for review and approve or reject it.
    Approve {
        #[arg(long)]
        approver: String,
        #[arg(long)]
        reject: bool,
        #[arg(long, required_if_eq("reject", "true"))]
        reason: Option<String>,
    },
    /// Drive the persisted blueprint through the full execution loop.
    Run {
        /// Program to invoke for each test run, e.g. "npm".
        #[arg(long)]
        test_cmd: String,
        /// Arguments to `test_cmd`, e.g. "test".
        #[arg(long = "test-arg")]
        test_args: Vec<String>,
        #[arg(long, value_enum, default_value = "auto")]
        test_framework: CliTestFramework,
        /// Approve automatically once the blueprint reaches review, instead
        /// of waiting for a separate `devforge approve` invocation.
        #[arg(long)]
        auto_approve: bool,
        #[arg(long, default_value = "devforge.toml")]
        config: PathBuf,
    },
    /// Print the current blueprint and task-tree status.
    Status,
    /// Roll back to a checkpoint by id.
    Rollback {
        checkpoint_id: String,
        /// The checkpoint is task-scoped rather than a global checkpoint.
        #[arg(long)]
        task: bool,
    },
    /// Diff two checkpoints.
    Diff { from: String, to: String },
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliTestFramework {
    Vitest,
    Jest,
    Mocha,
    Pytest,
    Auto,
}

impl From<CliTestFramework> for TestFramework {
    fn from(value: CliTestFramework) -> Self {
        match value {
            CliTestFramework::Vitest => TestFramework::Vitest,
            CliTestFramework::Jest => TestFramework::Jest,
            CliTestFramework::Mocha => TestFramework::Mocha,
            CliTestFramework::Pytest => TestFramework::Pytest,
            CliTestFramework::Auto => TestFramework::Auto,
        }
    }
}

fn parse_module_spec(spec: &str) -> Result<Module> {
    let (name, responsibilities) = spec
        .split_once(':')
        .context("module spec must be NAME:RESP1,RESP2,...")?;
    Ok(Module {
        id: ModuleId::from(name),
        name: name.to_string(),
        description: String::new(),
        module_type: ModuleType::Other,
        responsibilities: responsibilities.split(',').map(|s| s.trim().to_string()).collect(),
        dependencies: vec![],
        interfaces: vec![],
        tech_stack: vec![],
        root_path: None,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { name, description, modules } => cmd_init(&cli.project, name, description, modules),
        Command::Approve { approver, reject, reason } => cmd_approve(&cli.project, approver, reject, reason),
        Command::Run { test_cmd, test_args, test_framework, auto_approve, config } => {
            cmd_run(&cli.project, test_cmd, test_args, test_framework.into(), auto_approve, &config).await
        }
        Command::Status => cmd_status(&cli.project),
        Command::Rollback { checkpoint_id, task } => cmd_rollback(&cli.project, checkpoint_id, task),
        Command::Diff { from, to } => cmd_diff(&cli.project, from, to),
    }
}

fn cmd_init(project: &PathBuf, name: String, description: String, module_specs: Vec<String>) -> Result<()> {
    let ids = Arc::new(UuidGenerator);
    let clock = Arc::new(SystemClock);
    let manager = BlueprintManager::new(ids, clock);

    let project_path = project.display().to_string();
    let mut blueprint = manager.create(name, description, project_path)?;
    for spec in module_specs {
        let module = parse_module_spec(&spec)?;
        blueprint = manager.add_module(&blueprint.id, module)?;
    }

    info!(blueprint_id = %blueprint.id, "created draft blueprint");
    println!("{}", blueprint_summary(&blueprint));
    ProjectState { blueprint, tree: None }.save(project)
}

fn blueprint_summary(blueprint: &devforge_core::model::Blueprint) -> String {
    format!(
        "blueprint {} \"{}\" status={:?} modules={}",
        blueprint.id,
        blueprint.name,
        blueprint.status,
        blueprint.modules.len()
    )
}

fn cmd_approve(project: &PathBuf, approver: String, reject: bool, reason: Option<String>) -> Result<()> {
    let ids = Arc::new(UuidGenerator);
    let clock = Arc::new(SystemClock);
    let manager = BlueprintManager::new(ids, clock);

    let mut state = ProjectState::load(project)?;
    manager.insert(state.blueprint.clone());

    if state.blueprint.status == devforge_core::model::BlueprintStatus::Draft {
        manager.submit_for_review(&state.blueprint.id)?;
    }
    state.blueprint = if reject {
        manager.reject(&state.blueprint.id, reason.unwrap_or_default())?
    } else {
        manager.approve(&state.blueprint.id, approver)?
    };

    println!("{}", blueprint_summary(&state.blueprint));
    state.save(project)
}

fn cmd_status(project: &PathBuf) -> Result<()> {
    let state = ProjectState::load(project)?;
    println!("{}", blueprint_summary(&state.blueprint));
    if let Some(tree) = &state.tree {
        println!(
            "tree {} stats: total={} passed={} failed={}",
            tree.id, tree.stats.total_tasks, tree.stats.passed, tree.stats.failed
        );
        for task in tree.root.iter().filter(|t| t.is_leaf()) {
            println!("  - [{}] {}", task.status, task.name);
        }
    } else {
        println!("no task tree yet (blueprint not approved/executed)");
    }
    Ok(())
}

fn cmd_rollback(project: &PathBuf, checkpoint_id: String, task_scoped: bool) -> Result<()> {
    let ids = Arc::new(UuidGenerator);
    let clock = Arc::new(SystemClock);
    let tree_manager = TaskTreeManager::new(ids, clock);

    let mut state = ProjectState::load(project)?;
    let tree = state.tree.clone().context("no task tree to roll back")?;
    tree_manager.restore(tree);

    let id = CheckpointId::from(checkpoint_id.as_str());
    if task_scoped {
        let node = tree_manager.rollback_to_checkpoint(&id)?;
        println!("rolled back task {} to status {}", node.id, node.status);
    } else {
        tree_manager.rollback_to_global_checkpoint(&id)?;
        println!("rolled back tree to checkpoint {checkpoint_id}");
    }

    state.tree = Some(tree_manager.current()?);
    state.save(project)
}

fn cmd_diff(project: &PathBuf, from: String, to: String) -> Result<()> {
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let clock = Arc::new(SystemClock);
    let tree_manager = Arc::new(TaskTreeManager::new(ids.clone(), clock));

    let state = ProjectState::load(project)?;
    let tree = state.tree.context("no task tree to diff")?;
    tree_manager.restore(tree);

    let time_travel = TimeTravelManager::new(tree_manager, ids);
    let diff = time_travel.compare(
        &CheckpointId::from(from.as_str()),
        &CheckpointId::from(to.as_str()),
    )?;

    println!("{} task status changes, {} file changes, {}ms elapsed", diff.task_changes.len(), diff.code_changes.len(), diff.time_elapsed_ms);
    for change in &diff.code_changes {
        println!("  {:?} {} (+{}/-{})", change.kind, change.path, change.lines_added, change.lines_removed);
    }
    Ok(())
}

async fn cmd_run(
    project: &PathBuf,
    test_cmd: String,
    test_args: Vec<String>,
    test_framework: TestFramework,
    auto_approve: bool,
    config_path: &std::path::Path,
) -> Result<()> {
    let state = ProjectState::load(project)?;
    let config = OrchestratorConfig::load(config_path)?;

    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let blueprints = Arc::new(BlueprintManager::new(ids.clone(), clock.clone()));
    blueprints.insert(state.blueprint.clone());
    let tree = Arc::new(TaskTreeManager::new(ids.clone(), clock.clone()));
    if let Some(persisted_tree) = state.tree.clone() {
        tree.restore(persisted_tree);
    }
    let boundary = Arc::new(BoundaryChecker::new(project.clone()));
    let runner = Arc::new(TokioProcessRunner);
    let files = Arc::new(LocalFileStore);
    let llm = Arc::new(HttpLlmClient::new(LlmEndpointConfig::from_env()));

    let worker = Arc::new(WorkerExecutor::new(
        llm,
        runner.clone(),
        files,
        boundary.clone(),
        (test_cmd.clone(), test_args.clone()),
        test_framework,
        config.max_tdd_iterations,
        config.tool_retry_attempts,
    ));
    let gate = Arc::new(RegressionGate::new(runner));
    let gate_config = RegressionGateConfig {
        enforce_type_check: config.safety.enforce_type_check,
        type_check: None,
        regression_test: GateCommand {
            name: "regression".into(),
            program: test_cmd,
            args: test_args,
        },
        acceptance_tests: Default::default(),
        test_framework,
        timeout: config.subprocess_timeout(),
        stderr_max_bytes: 4096,
    };
    let events = Arc::new(EventBus::new());
    let coordinator = Arc::new(AgentCoordinator::new(
        tree.clone(),
        worker,
        gate,
        gate_config,
        CoordinatorConfig {
            max_parallel_workers: config.worker_pool_size(),
            max_retries: config.safety.max_consecutive_failures,
            project_root: project.clone(),
            enforce_regression_gate: config.safety.enforce_regression_gate,
        },
        events.clone(),
    ));
    let cycle_reset = Arc::new(CycleResetManager::new(Default::default()));
    let time_travel = Arc::new(TimeTravelManager::new(tree.clone(), ids));

    let orchestrator = ContinuousDevOrchestrator::new(
        blueprints.clone(),
        tree.clone(),
        boundary,
        coordinator,
        cycle_reset,
        time_travel,
        events,
        OrchestratorRunConfig {
            tick_interval: Duration::from_millis(config.tick_interval_ms),
            cycle_check_interval: config.cycle_check_interval(),
            project_root: project.clone(),
            codebase_analysis_enabled: config.phases.codebase_analysis,
            impact_analysis_enabled: config.phases.impact_analysis,
            require_approval_before_execution: config.human_checkpoints.before_execution,
            escalate_on_high_risk: config.human_checkpoints.on_high_risk,
            max_consecutive_failures: config.safety.max_consecutive_failures,
        },
    );

    if auto_approve {
        let blueprints_for_approval = blueprints.clone();
        let blueprint_id = state.blueprint.id.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(200));
            loop {
                interval.tick().await;
                if let Ok(bp) = blueprints_for_approval.get(&blueprint_id) {
                    if bp.status == devforge_core::model::BlueprintStatus::InReview {
                        let _ = blueprints_for_approval.approve(&blueprint_id, "cli-auto-approve");
                        break;
                    }
                    if !matches!(bp.status, devforge_core::model::BlueprintStatus::Draft | devforge_core::model::BlueprintStatus::InReview) {
                        break;
                    }
                }
            }
        });
    }

    let result = orchestrator.run(&state.blueprint.id).await;

    let final_blueprint = blueprints.get(&state.blueprint.id)?;
    let final_tree = tree.current().ok();
    ProjectState { blueprint: final_blueprint, tree: final_tree }.save(project)?;

    result.map_err(anyhow::Error::from)
}
