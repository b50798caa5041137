//! AgentCoordinator — claims executable tasks and runs workers against a
//! bounded pool.
//!
//! The fan-out shape is grounded in the teacher's Deepthink mode
//! (`modes/deepthink.rs`): a `Semaphore` bounds concurrent workers, a
//! `JoinSet` collects outcomes, and a worker panic doesn't take down the
//! others. On top of that fan-out this module adds the submit -> gate ->
//! accept/retry loop the teacher's orchestrator runs per issue, generalized
//! to a task tree instead of a single issue.

use devforge_core::capabilities::ProcessRunner;
use devforge_core::error::CoreResult;
use devforge_core::events::{DevForgeEvent, SharedEventBus};
use devforge_core::ids::{BlueprintId, TaskId};
use devforge_core::model::{Module, SafetyBoundary, TaskNode, TaskStatus, TddPhase};
use devforge_core::regression::{RegressionGate, RegressionGateConfig, Submission};
use devforge_core::TaskTreeManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::worker::WorkerExecutor;

/// Outcome of one task's worker run, surfaced so the coordinator can
/// decide retry vs. escalation.
#[derive(Debug, Clone)]
pub struct TaskRunOutcome {
    pub task_id: TaskId,
    pub phase: TddPhase,
    pub gate_passed: bool,
}

pub struct CoordinatorConfig {
    pub max_parallel_workers: usize,
    pub max_retries: u32,
    pub project_root: PathBuf,
    /// When false, a regression gate rejection is logged as a warning and
    /// the task is still marked `Passed` rather than sent back for retry —
    /// matches `safety.enforceRegressionGate: false`.
    pub enforce_regression_gate: bool,
}

/// Claims the current executable set from a `TaskTreeManager`, runs up to
/// `max_parallel_workers` of them concurrently through a `WorkerExecutor`,
/// and submits each completed task to the `RegressionGate` before marking
/// it `Passed`. A gate failure reverts the task to `Pending` and bumps its
/// retry count; once `max_retries` is exhausted the task is left
/// `TestFailed` for the cycle-reset/human-escalation path to pick up.
pub struct AgentCoordinator {
    tree: Arc<TaskTreeManager>,
    worker: Arc<WorkerExecutor>,
    gate: Arc<RegressionGate>,
    gate_config: RegressionGateConfig,
    config: CoordinatorConfig,
    events: SharedEventBus,
}

impl AgentCoordinator {
    pub fn new(
        tree: Arc<TaskTreeManager>,
        worker: Arc<WorkerExecutor>,
        gate: Arc<RegressionGate>,
        gate_config: RegressionGateConfig,
        config: CoordinatorConfig,
        events: SharedEventBus,
    ) -> Self {
        Self {
            tree,
            worker,
            gate,
            gate_config,
            config,
            events,
        }
    }

    /// One scheduling tick: claim the executable set, run as many as the
    /// worker pool allows, and fold each result back into the tree. Returns
    /// the outcomes for whatever ran this tick; an empty tick (no
    /// executable tasks) is a normal quiescent state, not an error.
    pub async fn tick(
        &self,
        tree_id: &str,
        modules_by_id: &HashMap<String, Module>,
        boundary: &SafetyBoundary,
    ) -> CoreResult<Vec<TaskRunOutcome>> {
        let executable = self.tree.get_executable_tasks()?;
        if executable.is_empty() {
            return Ok(Vec::new());
        }

        let sem = Arc::new(Semaphore::new(self.config.max_parallel_workers));
        let mut join_set: JoinSet<CoreResult<TaskRunOutcome>> = JoinSet::new();

        for task in executable {
            self.tree.mark_status(&task.id, TaskStatus::Coding)?;
            let sem = sem.clone();
            let worker = self.worker.clone();
            let module = task
                .blueprint_module_id
                .as_ref()
                .and_then(|id| modules_by_id.get(id.as_str()))
                .cloned();
            let project_root = self.config.project_root.clone();
            let boundary = boundary.clone();
            let tree = self.tree.clone();
            let gate = self.gate.clone();
            let gate_config = self.gate_config.clone();
            let tree_id = tree_id.to_string();
            let max_retries = self.config.max_retries;
            let enforce_regression_gate = self.config.enforce_regression_gate;
            let events = self.events.clone();

            join_set.spawn(async move {
                let _permit = sem.acquire().await.expect("worker semaphore closed");
                Self::run_one(
                    &worker,
                    &tree,
                    &gate,
                    &gate_config,
                    &tree_id,
                    &task,
                    module.as_ref(),
                    &project_root,
                    &boundary,
                    max_retries,
                    enforce_regression_gate,
                    &events,
                )
                .await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(err)) => warn!(error = %err, "task run failed"),
                Err(join_err) => warn!(error = %join_err, "worker task panicked"),
            }
        }
        Ok(outcomes)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_one(
        worker: &WorkerExecutor,
        tree: &TaskTreeManager,
        gate: &RegressionGate,
        gate_config: &RegressionGateConfig,
        tree_id: &str,
        task: &TaskNode,
        module: Option<&Module>,
        project_root: &std::path::Path,
        boundary: &SafetyBoundary,
        max_retries: u32,
        enforce_regression_gate: bool,
        events: &SharedEventBus,
    ) -> CoreResult<TaskRunOutcome> {
        let result = worker.execute_task(task, module, project_root, boundary).await?;

        if result.final_phase != TddPhase::Done {
            return Self::handle_failure(tree, events, tree_id, task, max_retries);
        }

        let changed_files: Vec<String> = result.code_artifacts.iter().map(|f| f.path.clone()).collect();
        let worker_id = devforge_core::ids::WorkerId::from(format!("worker-{}", task.id));
        let submission = Submission {
            worker_id: worker_id.clone(),
            task_id: task.id.clone(),
            changed_files,
        };
        let gate_result = gate.validate(tree_id, &submission, gate_config, project_root).await;

        if gate_result.outcome.is_passed() {
            tree.mark_status(&task.id, TaskStatus::Passed)?;
            info!(task_id = %task.id, "task passed regression gate");
            Self::publish(events, DevForgeEvent::GatePassed {
                task_id: task.id.clone(),
                worker_id,
                timestamp: chrono::Utc::now(),
            });
            Ok(TaskRunOutcome {
                task_id: task.id.clone(),
                phase: TddPhase::Done,
                gate_passed: true,
            })
        } else if enforce_regression_gate {
            debug!(task_id = %task.id, recommendations = ?gate_result.recommendations, "regression gate rejected submission");
            Self::publish(events, DevForgeEvent::GateFailed {
                task_id: task.id.clone(),
                worker_id,
                recommendations: gate_result.recommendations.clone(),
                timestamp: chrono::Utc::now(),
            });
            Self::handle_failure(tree, events, tree_id, task, max_retries)
        } else {
            // `enforceRegressionGate: false`: the gate's rejection is
            // downgraded to a warning and the task is still accepted.
            warn!(
                task_id = %task.id,
                recommendations = ?gate_result.recommendations,
                "regression gate rejected submission but enforcement is disabled; accepting anyway"
            );
            tree.mark_status(&task.id, TaskStatus::Passed)?;
            Self::publish(events, DevForgeEvent::GateFailed {
                task_id: task.id.clone(),
                worker_id,
                recommendations: gate_result.recommendations.clone(),
                timestamp: chrono::Utc::now(),
            });
            Ok(TaskRunOutcome {
                task_id: task.id.clone(),
                phase: TddPhase::Done,
                gate_passed: false,
            })
        }
    }

    fn handle_failure(
        tree: &TaskTreeManager,
        events: &SharedEventBus,
        tree_id: &str,
        task: &TaskNode,
        max_retries: u32,
    ) -> CoreResult<TaskRunOutcome> {
        if task.retry_count + 1 >= max_retries {
            tree.mark_status(&task.id, TaskStatus::TestFailed)?;
            Self::publish(events, DevForgeEvent::HumanInterventionRequired {
                blueprint_id: BlueprintId::from(tree_id),
                reason: format!("task {} exhausted its retry budget ({max_retries} attempts)", task.id),
                timestamp: chrono::Utc::now(),
            });
        } else {
            tree.mark_status(&task.id, TaskStatus::Pending)?;
        }
        Ok(TaskRunOutcome {
            task_id: task.id.clone(),
            phase: TddPhase::Failed,
            gate_passed: false,
        })
    }

    fn publish(events: &SharedEventBus, event: DevForgeEvent) {
        if let Err(err) = events.publish(event) {
            warn!(error = %err, "failed to publish coordinator event");
        }
    }
}

/// A `ProcessRunner`-backed gate config convenience constructor lives in
/// `runner.rs`; this module only schedules, it never builds commands.
pub fn worker_pool_size(configured: Option<usize>) -> usize {
    configured.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get().min(4))
            .unwrap_or(1)
    })
}
