//! Core error taxonomy.
//!
//! Every fallible operation in `devforge-core` returns [`CoreResult`]. The
//! variants here are kinds, not exhaustive wrapper types: `InvalidState` and
//! `NotFound` surface straight to the caller, `BoundaryViolation` fails the
//! current TDD phase only, `ToolExecutionError`/`GateFailure` are retried or
//! escalated by the coordinator, and `CancellationRequested` unwinds cleanly.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A state-machine transition was attempted that the diagram forbids.
    #[error("invalid state transition on {entity} {id}: {from} -> {to}")]
    InvalidState {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    /// A referenced blueprint/task/checkpoint/module does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A worker attempted to write outside its task's safety boundary.
    #[error("boundary violation: {path} is not permitted for task {task_id} ({reason})")]
    BoundaryViolation {
        task_id: String,
        path: String,
        reason: String,
    },

    /// A subprocess (test run, type-check) exceeded its timeout.
    #[error("timeout after {elapsed_ms}ms (limit {limit_ms}ms) running {command}")]
    TimeoutExceeded {
        command: String,
        elapsed_ms: u64,
        limit_ms: u64,
    },

    /// The LLM client or process runner failed to execute at all (spawn
    /// failure, transport error) — distinct from a tool that ran and
    /// produced a failing result.
    #[error("tool execution failed after {attempts} attempt(s): {source}")]
    ToolExecutionError {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The regression gate rejected a submission.
    #[error("gate failure: {0}")]
    GateFailure(String),

    /// Cooperative cancellation was observed at a phase boundary.
    #[error("cancellation requested")]
    CancellationRequested,

    /// Anything else raised across a capability boundary.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn boundary_violation(
        task_id: impl Into<String>,
        path: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::BoundaryViolation {
            task_id: task_id.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the coordinator should retry on this error kind rather than
    /// surface it straight to the human-intervention path.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TimeoutExceeded { .. } | Self::ToolExecutionError { .. } | Self::GateFailure(_)
        )
    }
}
