//! ContinuousDevOrchestrator — the top-level phase machine that drives one
//! requirement from codebase analysis through a completed (or failed)
//! execution, composing every manager in `devforge-core` plus this crate's
//! `AgentCoordinator`.
//!
//! Phase bookkeeping is the same `StateMachine`/`TransitionRecord`/
//! `IllegalTransition` idiom used for the worker's TDD cycle and grounded
//! the same way, in the teacher's `state_machine.rs`; here the phase list
//! is the orchestrator's own (`idle` through `completed`/`failed`/`paused`)
//! rather than the teacher's issue-to-merge pipeline. `stop()` is a
//! `tokio_util::sync::CancellationToken` checked at each phase boundary,
//! following the same cooperative-cancellation discipline as the teacher's
//! orchestrator loop.

use devforge_core::error::{CoreError, CoreResult};
use devforge_core::events::{DevForgeEvent, SharedEventBus};
use devforge_core::ids::BlueprintId;
use devforge_core::impact::ModuleChangeSignals;
use devforge_core::model::{Blueprint, BlueprintStatus, Module, SafetyBoundary};
use devforge_core::{
    BlueprintManager, BoundaryChecker, CycleResetManager, DirectoryHeuristicClassifier,
    ImpactAnalyzer, ReverseBlueprintClassifier, TaskTreeManager, TimeTravelManager,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::coordinator::AgentCoordinator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionOutcome {
    Completed,
    Paused,
}

impl ExecutionOutcome {
    fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    Idle,
    AnalyzingCodebase,
    AnalyzingRequirement,
    GeneratingBlueprint,
    AwaitingApproval,
    Executing,
    Validating,
    CycleReview,
    Completed,
    Failed,
    Paused,
}

impl OrchestratorPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AnalyzingCodebase => "analyzing_codebase",
            Self::AnalyzingRequirement => "analyzing_requirement",
            Self::GeneratingBlueprint => "generating_blueprint",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::Validating => "validating",
            Self::CycleReview => "cycle_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        write!(f, "{s}")
    }
}

fn is_legal_phase_transition(from: OrchestratorPhase, to: OrchestratorPhase) -> bool {
    use OrchestratorPhase::*;
    if from.is_terminal() {
        return false;
    }
    if to == Failed {
        return true;
    }
    if to == Paused && !matches!(from, Paused) {
        return true;
    }
    matches!(
        (from, to),
        (Idle, AnalyzingCodebase)
            | (AnalyzingCodebase, AnalyzingRequirement)
            | (AnalyzingRequirement, GeneratingBlueprint)
            | (GeneratingBlueprint, AwaitingApproval)
            | (AwaitingApproval, Executing)
            | (Executing, Validating)
            | (Validating, CycleReview)
            | (Validating, Completed)
            | (CycleReview, Executing)
            | (Paused, Executing)
    )
}

#[derive(Debug, Clone)]
pub struct PhaseTransitionRecord {
    pub from: OrchestratorPhase,
    pub to: OrchestratorPhase,
    pub elapsed_ms: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal orchestrator phase transition: {from} -> {to}")]
pub struct IllegalPhaseTransition {
    pub from: OrchestratorPhase,
    pub to: OrchestratorPhase,
}

pub struct OrchestratorRunConfig {
    pub tick_interval: Duration,
    pub cycle_check_interval: Duration,
    pub project_root: std::path::PathBuf,
    /// `phases.codebaseAnalysis`. When true and the blueprint carries no
    /// modules yet, the project root is scanned and reverse-engineered into
    /// modules before requirement analysis runs.
    pub codebase_analysis_enabled: bool,
    /// `phases.impactAnalysis`. When false, execution proceeds with the
    /// default (unrestricted) safety boundary and no risk is computed.
    pub impact_analysis_enabled: bool,
    /// `humanCheckpoints.beforeExecution`. When false, a blueprint that
    /// reaches review is approved automatically instead of waiting on a
    /// separate approval call.
    pub require_approval_before_execution: bool,
    /// `humanCheckpoints.onHighRisk`. When true, a high/critical impact
    /// verdict publishes `human_intervention_required` in addition to the
    /// warning log that always fires.
    pub escalate_on_high_risk: bool,
    /// `safety.maxConsecutiveFailures`. Once a worker's consecutive-failure
    /// count reaches this, the run pauses and emits
    /// `human_intervention_required` instead of continuing the execution
    /// loop.
    pub max_consecutive_failures: u32,
}

/// Composes every `devforge-core` manager plus the `AgentCoordinator` to
/// drive one blueprint through the full phase list. One instance owns
/// exactly one blueprint/task-tree pair at a time.
pub struct ContinuousDevOrchestrator {
    blueprints: Arc<BlueprintManager>,
    tree: Arc<TaskTreeManager>,
    boundary: Arc<BoundaryChecker>,
    coordinator: Arc<AgentCoordinator>,
    cycle_reset: Arc<CycleResetManager>,
    time_travel: Arc<TimeTravelManager>,
    events: SharedEventBus,
    config: OrchestratorRunConfig,
    phase: std::sync::Mutex<OrchestratorPhase>,
    history: std::sync::Mutex<Vec<PhaseTransitionRecord>>,
    started_at: std::sync::Mutex<Option<Instant>>,
    cancellation: CancellationToken,
    execution_boundary: std::sync::Mutex<Option<SafetyBoundary>>,
}

impl ContinuousDevOrchestrator {
    pub fn new(
        blueprints: Arc<BlueprintManager>,
        tree: Arc<TaskTreeManager>,
        boundary: Arc<BoundaryChecker>,
        coordinator: Arc<AgentCoordinator>,
        cycle_reset: Arc<CycleResetManager>,
        time_travel: Arc<TimeTravelManager>,
        events: SharedEventBus,
        config: OrchestratorRunConfig,
    ) -> Self {
        Self {
            blueprints,
            tree,
            boundary,
            coordinator,
            cycle_reset,
            time_travel,
            events,
            config,
            phase: std::sync::Mutex::new(OrchestratorPhase::Idle),
            history: std::sync::Mutex::new(Vec::new()),
            started_at: std::sync::Mutex::new(None),
            cancellation: CancellationToken::new(),
            execution_boundary: std::sync::Mutex::new(None),
        }
    }

    pub fn phase(&self) -> OrchestratorPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    pub fn history(&self) -> Vec<PhaseTransitionRecord> {
        self.history.lock().expect("history lock poisoned").clone()
    }

    /// Cooperative stop signal, checked at each phase boundary by `run`.
    pub fn stop(&self) {
        self.cancellation.cancel();
    }

    fn advance(&self, to: OrchestratorPhase, reason: Option<&str>) -> CoreResult<()> {
        let mut phase = self.phase.lock().expect("phase lock poisoned");
        if !is_legal_phase_transition(*phase, to) {
            return Err(CoreError::invalid_state(
                "OrchestratorPhase",
                "current",
                *phase,
                to,
            ));
        }
        let elapsed_ms = self
            .started_at
            .lock()
            .expect("started_at lock poisoned")
            .map(|s| s.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.history.lock().expect("history lock poisoned").push(PhaseTransitionRecord {
            from: *phase,
            to,
            elapsed_ms,
            reason: reason.map(String::from),
        });
        info!(from = %*phase, to = %to, "orchestrator phase transition");
        *phase = to;
        Ok(())
    }

    fn check_cancelled(&self) -> CoreResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(CoreError::CancellationRequested);
        }
        Ok(())
    }

    /// Runs `blueprint_id` through `analyzing_codebase` (reverse-engineers
    /// modules from the project root when `codebase_analysis_enabled` and
    /// the blueprint has none yet), `analyzing_requirement`,
    /// `generating_blueprint` (scores impact when `impact_analysis_enabled`)
    /// and on to `awaiting_approval`. There it either blocks on
    /// `wait_for_approval` being satisfied by a separate `approve`/`reject`
    /// call against `BlueprintManager`, or auto-approves immediately when
    /// `require_approval_before_execution` is false, before generating the
    /// task tree and entering the execution loop. If the blueprint was
    /// already approved before `run` was called (e.g. a CLI `approve`
    /// invocation against the same persisted state ahead of time), the
    /// review step and the wait are both skipped.
    pub async fn run(&self, blueprint_id: &BlueprintId) -> CoreResult<()> {
        *self.started_at.lock().expect("started_at lock poisoned") = Some(Instant::now());
        self.advance(OrchestratorPhase::AnalyzingCodebase, None)?;
        self.check_cancelled()?;
        if self.config.codebase_analysis_enabled {
            self.reverse_engineer_modules_if_empty(blueprint_id)?;
        }
        self.advance(OrchestratorPhase::AnalyzingRequirement, None)?;
        self.check_cancelled()?;
        self.advance(OrchestratorPhase::GeneratingBlueprint, None)?;

        let blueprint = self.blueprints.get(blueprint_id)?;

        if self.config.impact_analysis_enabled {
            // Every module the blueprint names is, by definition, new or
            // changed at this point — there is no prior code yet for a
            // finer-grained signal, so each module is treated as touched and
            // scored the same way an incremental blueprint update would be.
            let signals: HashMap<String, ModuleChangeSignals> = blueprint
                .modules
                .iter()
                .map(|m| {
                    (
                        m.id.as_str().to_string(),
                        ModuleChangeSignals {
                            files_touched: m.responsibilities.len().max(1),
                            touches_public_interface: !m.interfaces.is_empty(),
                            touches_dependency_graph: !m.dependencies.is_empty(),
                            removes_responsibility: false,
                        },
                    )
                })
                .collect();
            let impact =
                ImpactAnalyzer::new().analyze(&blueprint, &signals, SafetyBoundary::default());
            if impact.requires_human_approval {
                warn!(
                    risk = ?impact.overall_risk_level,
                    "impact analysis flagged this blueprint as high risk; approval is required regardless of config"
                );
                if self.config.escalate_on_high_risk {
                    self.publish(DevForgeEvent::HumanInterventionRequired {
                        blueprint_id: blueprint_id.clone(),
                        reason: format!("impact analysis risk level {:?}", impact.overall_risk_level),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            *self.execution_boundary.lock().expect("execution_boundary lock poisoned") =
                Some(impact.safety_boundary);
        } else {
            *self.execution_boundary.lock().expect("execution_boundary lock poisoned") =
                Some(SafetyBoundary::default());
        }

        // A blueprint loaded from a prior CLI `approve`/`reject` call may
        // already be past `Draft` — only drive the review transition
        // ourselves when it hasn't happened yet, so `run` is resumable
        // against a blueprint someone else already approved out-of-band.
        if blueprint.status == BlueprintStatus::Draft {
            self.blueprints.submit_for_review(blueprint_id)?;
        }
        self.advance(OrchestratorPhase::AwaitingApproval, None)?;
        if self.blueprints.get(blueprint_id)?.status != BlueprintStatus::Approved {
            if self.config.require_approval_before_execution {
                self.publish(DevForgeEvent::ApprovalRequired {
                    blueprint_id: blueprint_id.clone(),
                    reason: "blueprint ready for review".into(),
                    timestamp: chrono::Utc::now(),
                });
                self.wait_for_approval(blueprint_id).await?;
            } else {
                self.blueprints
                    .approve(blueprint_id, "auto-approved (before_execution checkpoint disabled)")?;
            }
        }
        self.check_cancelled()?;

        self.blueprints.start_execution(blueprint_id)?;
        self.tree.generate_from_blueprint(&blueprint)?;
        self.advance(OrchestratorPhase::Executing, None)?;
        if self.run_execution_loop(&blueprint).await?.is_paused() {
            return Ok(());
        }

        self.advance(OrchestratorPhase::Validating, None)?;
        let all_passed = self
            .tree
            .get_executable_tasks()?
            .is_empty();
        if all_passed {
            self.blueprints.complete(blueprint_id)?;
            self.advance(OrchestratorPhase::Completed, None)?;
            self.publish(DevForgeEvent::TaskCompleted {
                task_tree_id: devforge_core::ids::TaskTreeId::from("current"),
                task_id: devforge_core::ids::TaskId::from("root"),
                timestamp: chrono::Utc::now(),
            });
        } else {
            self.advance(OrchestratorPhase::Failed, Some("tasks remain after validation"))?;
            self.publish(DevForgeEvent::FlowFailed {
                blueprint_id: blueprint_id.clone(),
                reason: "tasks remain after validation".into(),
                timestamp: chrono::Utc::now(),
            });
        }
        Ok(())
    }

    /// Walks `project_root` and feeds the result through
    /// `DirectoryHeuristicClassifier` when the blueprint has no modules of
    /// its own yet, so a run bootstrapped onto an existing codebase starts
    /// from reverse-engineered module boundaries instead of an empty plan.
    fn reverse_engineer_modules_if_empty(&self, blueprint_id: &BlueprintId) -> CoreResult<()> {
        let blueprint = self.blueprints.get(blueprint_id)?;
        if !blueprint.modules.is_empty() {
            return Ok(());
        }
        let codebase = devforge_core::scan_codebase(&self.config.project_root);
        if codebase.files.is_empty() {
            return Ok(());
        }
        let discovered = DirectoryHeuristicClassifier.classify(&codebase);
        for module in discovered {
            self.blueprints.add_module(blueprint_id, module)?;
        }
        Ok(())
    }

    /// Polls the blueprint's status; a real deployment replaces this with
    /// an event-driven wait (e.g. a oneshot channel signaled by the CLI's
    /// `approve` command), but polling keeps this crate free of an
    /// additional notification primitive beyond what `BlueprintManager`
    /// already exposes.
    async fn wait_for_approval(&self, blueprint_id: &BlueprintId) -> CoreResult<()> {
        let mut interval = tokio::time::interval(Duration::from_millis(200));
        loop {
            interval.tick().await;
            self.check_cancelled()?;
            let blueprint = self.blueprints.get(blueprint_id)?;
            match blueprint.status {
                BlueprintStatus::Approved => return Ok(()),
                BlueprintStatus::Rejected => {
                    return Err(CoreError::GateFailure("blueprint rejected".into()));
                }
                _ => continue,
            }
        }
    }

    async fn run_execution_loop(&self, blueprint: &Blueprint) -> CoreResult<ExecutionOutcome> {
        let modules_by_id: HashMap<String, Module> = blueprint
            .modules
            .iter()
            .map(|m| (m.id.as_str().to_string(), m.clone()))
            .collect();
        let boundary = self
            .execution_boundary
            .lock()
            .expect("execution_boundary lock poisoned")
            .clone()
            .unwrap_or_default();
        let mut tick_interval = tokio::time::interval(self.config.tick_interval);
        let mut last_cycle_check = Instant::now();
        let mut stats = devforge_core::cycle_reset::CycleStats::new();
        let tree_id = blueprint.id.to_string();

        loop {
            tick_interval.tick().await;
            self.check_cancelled()?;

            let outcomes = self.coordinator.tick(&tree_id, &modules_by_id, &boundary).await?;
            for outcome in &outcomes {
                if outcome.gate_passed {
                    stats.tasks_completed += 1;
                    stats.consecutive_failures = 0;
                } else {
                    stats.consecutive_failures += 1;
                    warn!(task_id = %outcome.task_id, "task did not pass the regression gate");
                }
            }
            stats.tasks_remaining = self.tree.get_executable_tasks()?.len() as u32;

            if stats.consecutive_failures >= self.config.max_consecutive_failures {
                self.publish(DevForgeEvent::HumanInterventionRequired {
                    blueprint_id: blueprint.id.clone(),
                    reason: format!(
                        "{} consecutive task failures reached the configured limit ({})",
                        stats.consecutive_failures, self.config.max_consecutive_failures
                    ),
                    timestamp: chrono::Utc::now(),
                });
                self.advance(OrchestratorPhase::Paused, Some("consecutive failure limit reached"))?;
                return Ok(ExecutionOutcome::Paused);
            }

            if outcomes.is_empty() && stats.tasks_remaining == 0 {
                break;
            }

            if last_cycle_check.elapsed() >= self.config.cycle_check_interval {
                last_cycle_check = Instant::now();
                stats.elapsed = self.started_at
                    .lock()
                    .expect("started_at lock poisoned")
                    .map(|s| s.elapsed())
                    .unwrap_or_default();
                if let Some(trigger) = self.cycle_reset.check_triggers(&stats, false) {
                    let checkpoint = self.tree.create_global_checkpoint("cycle-reset", vec![])?;
                    let review = self.cycle_reset.reset(trigger, &stats, Some(checkpoint.id.clone()));
                    self.publish(DevForgeEvent::CycleReset {
                        blueprint_id: blueprint.id.clone(),
                        trigger: format!("{trigger:?}"),
                        summary: review.summary.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                    if let Some(restart) = review.restart_from_checkpoint {
                        self.time_travel.create_branch(&restart, "cycle-reset")?;
                        self.advance(OrchestratorPhase::CycleReview, Some(&review.summary))?;
                        self.advance(OrchestratorPhase::Executing, None)?;
                    }
                    stats.consecutive_failures = 0;
                }
            }
        }
        Ok(ExecutionOutcome::Completed)
    }

    fn publish(&self, event: DevForgeEvent) {
        if let Err(err) = self.events.publish(event) {
            warn!(error = %err, "failed to publish orchestrator event");
        }
    }

    /// Delegates a write-path check to the boundary checker this
    /// orchestrator was built with, for callers that need to validate a
    /// path before handing it to a worker (e.g. the CLI's `diff` command
    /// inspecting a proposed rollback target).
    pub fn check_write(&self, task_id: &str, path: &str, boundary: &SafetyBoundary) -> CoreResult<()> {
        self.boundary.check_write(task_id, path, boundary, &[])
    }
}
