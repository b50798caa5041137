//! CycleResetManager.
//!
//! A deterministic, no-LLM decision engine that watches per-cycle
//! statistics and decides when to reset an execution cycle, grounded in
//! the teacher's `escalation::engine::EscalationEngine`: both consume a
//! running state plus a fresh signal and deterministically produce a
//! decision, with no model call in the loop.

use crate::ids::CheckpointId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetTrigger {
    WallClockThreshold,
    ConsecutiveFailures,
    MessageBudgetExceeded,
    HumanSignal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub trigger: ResetTrigger,
    pub tasks_completed: u32,
    pub tasks_remaining: u32,
    pub elapsed: Duration,
    pub tool_calls: u32,
    pub summary: String,
    pub restart_from_checkpoint: Option<CheckpointId>,
}

#[derive(Debug, Clone)]
pub struct CycleStats {
    pub tasks_completed: u32,
    pub tasks_remaining: u32,
    pub elapsed: Duration,
    pub tool_calls: u32,
    pub consecutive_failures: u32,
}

impl CycleStats {
    pub fn new() -> Self {
        Self {
            tasks_completed: 0,
            tasks_remaining: 0,
            elapsed: Duration::ZERO,
            tool_calls: 0,
            consecutive_failures: 0,
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CycleResetConfig {
    pub wall_clock_threshold: Duration,
    pub consecutive_failure_threshold: u32,
    pub message_budget: u32,
    pub restart_on_reset: bool,
}

impl Default for CycleResetConfig {
    fn default() -> Self {
        Self {
            wall_clock_threshold: Duration::from_secs(60 * 60),
            consecutive_failure_threshold: 3,
            message_budget: 500,
            restart_on_reset: true,
        }
    }
}

pub struct CycleResetManager {
    config: CycleResetConfig,
}

impl CycleResetManager {
    pub fn new(config: CycleResetConfig) -> Self {
        Self { config }
    }

    /// Checks the four reset triggers in priority order (explicit human
    /// signal first, since it overrides any other condition) and returns
    /// the trigger that fired, if any. Called at a fixed interval (default
    /// 60s) while a blueprint is executing.
    pub fn check_triggers(
        &self,
        stats: &CycleStats,
        human_signal: bool,
    ) -> Option<ResetTrigger> {
        if human_signal {
            return Some(ResetTrigger::HumanSignal);
        }
        if stats.consecutive_failures >= self.config.consecutive_failure_threshold {
            return Some(ResetTrigger::ConsecutiveFailures);
        }
        if stats.tool_calls >= self.config.message_budget {
            return Some(ResetTrigger::MessageBudgetExceeded);
        }
        if stats.elapsed >= self.config.wall_clock_threshold {
            return Some(ResetTrigger::WallClockThreshold);
        }
        None
    }

    /// Produces the `ReviewResult` for a triggered reset. `stable_checkpoint`
    /// is the most recent global checkpoint known to be stable; it becomes
    /// the restart point only when the config says to restart on reset.
    pub fn reset(
        &self,
        trigger: ResetTrigger,
        stats: &CycleStats,
        stable_checkpoint: Option<CheckpointId>,
    ) -> ReviewResult {
        let summary = format!(
            "cycle reset ({trigger:?}): {} tasks completed, {} remaining, {} tool calls over {:?}",
            stats.tasks_completed, stats.tasks_remaining, stats.tool_calls, stats.elapsed
        );
        ReviewResult {
            trigger,
            tasks_completed: stats.tasks_completed,
            tasks_remaining: stats.tasks_remaining,
            elapsed: stats.elapsed,
            tool_calls: stats.tool_calls,
            summary,
            restart_from_checkpoint: if self.config.restart_on_reset {
                stable_checkpoint
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_signal_overrides_everything() {
        let mgr = CycleResetManager::new(CycleResetConfig::default());
        let stats = CycleStats::new();
        assert_eq!(
            mgr.check_triggers(&stats, true),
            Some(ResetTrigger::HumanSignal)
        );
    }

    #[test]
    fn consecutive_failures_trigger_before_wall_clock() {
        let mgr = CycleResetManager::new(CycleResetConfig::default());
        let stats = CycleStats {
            consecutive_failures: 3,
            ..CycleStats::new()
        };
        assert_eq!(
            mgr.check_triggers(&stats, false),
            Some(ResetTrigger::ConsecutiveFailures)
        );
    }

    #[test]
    fn no_trigger_when_under_every_threshold() {
        let mgr = CycleResetManager::new(CycleResetConfig::default());
        let stats = CycleStats::new();
        assert_eq!(mgr.check_triggers(&stats, false), None);
    }

    #[test]
    fn reset_without_restart_config_drops_checkpoint() {
        let mgr = CycleResetManager::new(CycleResetConfig {
            restart_on_reset: false,
            ..CycleResetConfig::default()
        });
        let stats = CycleStats::new();
        let result = mgr.reset(
            ResetTrigger::WallClockThreshold,
            &stats,
            Some(CheckpointId::from("cp-1")),
        );
        assert!(result.restart_from_checkpoint.is_none());
    }

    #[test]
    fn reset_with_restart_config_carries_checkpoint() {
        let mgr = CycleResetManager::new(CycleResetConfig::default());
        let stats = CycleStats::new();
        let result = mgr.reset(
            ResetTrigger::MessageBudgetExceeded,
            &stats,
            Some(CheckpointId::from("cp-7")),
        );
        assert_eq!(result.restart_from_checkpoint, Some(CheckpointId::from("cp-7")));
    }
}
