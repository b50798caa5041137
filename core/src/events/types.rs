//! Event payloads published on the orchestrator's event bus.
//!
//! Named after the events called out across the component contracts:
//! `gate_passed`/`gate_failed` from the regression gate, `phase_changed`/
//! `approval_required`/`submission_blocked`/`human_intervention_required`/
//! `flow_failed` from the top-level orchestrator, plus `task_completed`
//! and the per-manager events (`task_status_changed`, `checkpoint_created`,
//! `cycle_reset`) that let a UI or log sink follow along without polling.

use crate::ids::{BlueprintId, CheckpointId, TaskId, TaskTreeId, WorkerId};
use crate::model::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DevForgeEvent {
    PhaseChanged {
        blueprint_id: BlueprintId,
        from: String,
        to: String,
        timestamp: DateTime<Utc>,
    },
    ApprovalRequired {
        blueprint_id: BlueprintId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    SubmissionBlocked {
        task_id: TaskId,
        worker_id: WorkerId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    HumanInterventionRequired {
        blueprint_id: BlueprintId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    FlowFailed {
        blueprint_id: BlueprintId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_tree_id: TaskTreeId,
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },
    TaskStatusChanged {
        task_tree_id: TaskTreeId,
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        timestamp: DateTime<Utc>,
    },
    CheckpointCreated {
        task_tree_id: TaskTreeId,
        checkpoint_id: CheckpointId,
        timestamp: DateTime<Utc>,
    },
    GatePassed {
        task_id: TaskId,
        worker_id: WorkerId,
        timestamp: DateTime<Utc>,
    },
    GateFailed {
        task_id: TaskId,
        worker_id: WorkerId,
        recommendations: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    CycleReset {
        blueprint_id: BlueprintId,
        trigger: String,
        summary: String,
        timestamp: DateTime<Utc>,
    },
}

impl DevForgeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseChanged { .. } => "phase_changed",
            Self::ApprovalRequired { .. } => "approval_required",
            Self::SubmissionBlocked { .. } => "submission_blocked",
            Self::HumanInterventionRequired { .. } => "human_intervention_required",
            Self::FlowFailed { .. } => "flow_failed",
            Self::TaskCompleted { .. } => "task_completed",
            Self::TaskStatusChanged { .. } => "task_status_changed",
            Self::CheckpointCreated { .. } => "checkpoint_created",
            Self::GatePassed { .. } => "gate_passed",
            Self::GateFailed { .. } => "gate_failed",
            Self::CycleReset { .. } => "cycle_reset",
        }
    }
}
