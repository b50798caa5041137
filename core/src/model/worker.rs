//! Worker data model.

use crate::ids::{TaskId, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Claiming,
    Running,
    Paused,
    Failed,
    Terminated,
}

/// The TDD phase a worker's current task is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TddPhase {
    WriteTest,
    RunTestRed,
    WriteCode,
    RunTestGreen,
    Refactor,
    Done,
    Failed,
}

impl std::fmt::Display for TddPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::WriteTest => "write_test",
            Self::RunTestRed => "run_test_red",
            Self::WriteCode => "write_code",
            Self::RunTestGreen => "run_test_green",
            Self::Refactor => "refactor",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TddCycleState {
    pub phase: TddPhase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub last_error: Option<String>,
}

impl TddCycleState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            phase: TddPhase::WriteTest,
            iteration: 0,
            max_iterations,
            last_error: None,
        }
    }

    pub fn iterations_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub task_id: Option<TaskId>,
    pub tdd_cycle: Option<TddCycleState>,
    pub model_hint: Option<String>,
}

impl Worker {
    pub fn idle(id: WorkerId) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            task_id: None,
            tdd_cycle: None,
            model_hint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterations_exhausted_at_boundary() {
        let mut cycle = TddCycleState::new(5);
        cycle.iteration = 4;
        assert!(!cycle.iterations_exhausted());
        cycle.iteration = 5;
        assert!(cycle.iterations_exhausted());
    }

    #[test]
    fn new_worker_is_idle() {
        let worker = Worker::idle(WorkerId::from("w-1"));
        assert_eq!(worker.status, WorkerStatus::Idle);
        assert!(worker.task_id.is_none());
    }
}
