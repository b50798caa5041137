//! Recognized top-level orchestrator configuration.
//!
//! Mirrors the teacher's `SwarmConfig`: a typed struct with `Default`
//! matching the documented defaults, constructible from a TOML file and
//! overridable by environment variables for the handful of numeric knobs
//! that benefit from per-run tuning without editing a file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasesConfig {
    pub codebase_analysis: bool,
    pub impact_analysis: bool,
    pub regression_testing: bool,
    pub cycle_reset: bool,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            codebase_analysis: true,
            impact_analysis: true,
            regression_testing: true,
            cycle_reset: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelAssignment {
    pub planner: String,
    pub worker: String,
    pub reviewer: String,
}

impl Default for ModelAssignment {
    fn default() -> Self {
        Self {
            planner: "planner-default".into(),
            worker: "worker-default".into(),
            reviewer: "reviewer-default".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HumanCheckpoints {
    pub before_execution: bool,
    pub on_high_risk: bool,
    pub on_regression_failure: bool,
    pub after_cycle_review: bool,
}

impl Default for HumanCheckpoints {
    fn default() -> Self {
        Self {
            before_execution: true,
            on_high_risk: true,
            on_regression_failure: false,
            after_cycle_review: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enforce_regression_gate: bool,
    pub enforce_type_check: bool,
    pub max_consecutive_failures: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enforce_regression_gate: true,
            enforce_type_check: true,
            max_consecutive_failures: 3,
        }
    }
}

/// Top-level orchestrator configuration, constructed from `devforge.toml`
/// plus `DEVFORGE_*` environment overrides (see `OrchestratorConfig::load`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub phases: PhasesConfig,
    pub model_assignment: ModelAssignment,
    pub human_checkpoints: HumanCheckpoints,
    pub safety: SafetyConfig,

    /// Default bound on write_test/write_code/run_test_green iterations
    /// per TDD cycle.
    pub max_tdd_iterations: u32,
    /// LLM sampling temperature passed to the worker's prompts.
    pub llm_temperature: f32,
    /// Worker pool size. `None` means `min(num_cpus, 4)`.
    pub worker_pool_size: Option<usize>,
    /// Coordinator main-loop tick interval.
    pub tick_interval_ms: u64,
    /// Cycle-reset trigger-check interval.
    pub cycle_check_interval_secs: u64,
    /// Hard subprocess timeout for test/type-check runs.
    pub subprocess_timeout_secs: u64,
    /// ToolExecutionError retry attempts before escalation.
    pub tool_retry_attempts: u32,
    /// Test framework used for output-pattern recognition.
    pub test_framework: TestFramework,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            phases: PhasesConfig::default(),
            model_assignment: ModelAssignment::default(),
            human_checkpoints: HumanCheckpoints::default(),
            safety: SafetyConfig::default(),
            max_tdd_iterations: 5,
            llm_temperature: 0.3,
            worker_pool_size: None,
            tick_interval_ms: 1500,
            cycle_check_interval_secs: 60,
            subprocess_timeout_secs: 60,
            tool_retry_attempts: 3,
            test_framework: TestFramework::Auto,
        }
    }
}

impl OrchestratorConfig {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits, then apply `DEVFORGE_*` environment overrides for the
    /// small set of numeric knobs worth tuning per-run.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DEVFORGE_MAX_TDD_ITERATIONS") {
            if let Ok(n) = v.parse() {
                self.max_tdd_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("DEVFORGE_WORKER_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.worker_pool_size = Some(n);
            }
        }
        if let Ok(v) = std::env::var("DEVFORGE_SUBPROCESS_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.subprocess_timeout_secs = n;
            }
        }
    }

    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(1)
        })
    }

    pub fn subprocess_timeout(&self) -> Duration {
        Duration::from_secs(self.subprocess_timeout_secs)
    }

    pub fn cycle_check_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_check_interval_secs)
    }
}

/// Test frameworks recognized by output-substring pattern matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFramework {
    Vitest,
    Jest,
    Mocha,
    Pytest,
    /// Detect from output; fall back to exit-code-only success semantics.
    Auto,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_tdd_iterations, 5);
        assert!((config.llm_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.cycle_check_interval_secs, 60);
        assert_eq!(config.subprocess_timeout_secs, 60);
        assert_eq!(config.tool_retry_attempts, 3);
        assert_eq!(config.safety.max_consecutive_failures, 3);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = OrchestratorConfig::load(std::path::Path::new("/nonexistent/devforge.toml"))
            .unwrap();
        assert_eq!(config.max_tdd_iterations, 5);
    }

    #[test]
    fn worker_pool_size_defaults_to_cpu_capped_at_four() {
        let config = OrchestratorConfig::default();
        assert!(config.worker_pool_size() >= 1);
        assert!(config.worker_pool_size() <= 4);
    }
}
