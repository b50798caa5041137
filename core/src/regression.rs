//! RegressionGate.
//!
//! Runs type-check, regression-test, and acceptance-test commands in
//! sequence against a worker's submission, stopping at the first failure,
//! directly grounded in the teacher's `verifier::pipeline::Verifier`
//! (sequential gates with fail-fast-by-default) and
//! `verifier::report::{GateResult, GateOutcome}`. Generalized so each gate
//! invokes the project's configured command rather than a hard-coded
//! `cargo` subcommand, and per-tree submissions are serialized with a
//! `tokio::sync::Mutex` held for the duration of `validate`, the same
//! single-flight discipline the teacher's escalation engine uses per tree.

use crate::capabilities::{ProcessRunner, SpawnOptions};
use crate::config::TestFramework;
use crate::ids::{TaskId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Passed,
    Failed,
    Skipped,
}

impl GateOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateStepResult {
    pub gate: String,
    pub outcome: GateOutcome,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub stderr_excerpt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub outcome: GateOutcome,
    pub steps: Vec<GateStepResult>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    pub changed_files: Vec<String>,
}

/// One named command to run as a gate: e.g. `("type_check", "npx", ["tsc",
/// "--noEmit"])`.
#[derive(Debug, Clone)]
pub struct GateCommand {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegressionGateConfig {
    pub enforce_type_check: bool,
    pub type_check: Option<GateCommand>,
    pub regression_test: GateCommand,
    /// Acceptance test commands keyed by the file path they're registered
    /// against; only commands whose key is a prefix of a changed file run.
    pub acceptance_tests: HashMap<String, GateCommand>,
    pub test_framework: TestFramework,
    pub timeout: Duration,
    pub stderr_max_bytes: usize,
}

const FAILURE_MARKERS: &[&str] = &["FAIL", "failed", "Error:", "✗", "AssertionError"];

fn looks_like_test_failure(framework: TestFramework, stdout: &str, stderr: &str) -> bool {
    let combined = format!("{stdout}\n{stderr}");
    match framework {
        TestFramework::Vitest | TestFramework::Jest | TestFramework::Mocha => {
            FAILURE_MARKERS.iter().any(|m| combined.contains(m))
        }
        TestFramework::Pytest => combined.contains("FAILED") || combined.contains("ERROR"),
        TestFramework::Auto => FAILURE_MARKERS.iter().any(|m| combined.contains(m)),
    }
}

pub struct RegressionGate {
    runner: Arc<dyn ProcessRunner>,
    /// One mutex per tree id, so submissions against different trees don't
    /// block each other but submissions against the same tree are FIFO.
    locks: Arc<tokio::sync::Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl RegressionGate {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            locks: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for_tree(&self, tree_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(tree_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn run_gate(
        &self,
        command: &GateCommand,
        cwd: &std::path::Path,
        timeout: Duration,
        stderr_max_bytes: usize,
    ) -> GateStepResult {
        let started = Instant::now();
        let opts = SpawnOptions {
            cwd: Some(cwd.to_path_buf()),
            env: HashMap::new(),
            timeout: Some(timeout),
        };
        match self.runner.spawn(&command.program, &command.args, opts).await {
            Ok(output) => {
                let outcome = if output.success() {
                    GateOutcome::Passed
                } else {
                    GateOutcome::Failed
                };
                GateStepResult {
                    gate: command.name.clone(),
                    outcome,
                    duration_ms: started.elapsed().as_millis() as u64,
                    exit_code: output.exit_code,
                    stderr_excerpt: if output.stderr.is_empty() {
                        None
                    } else {
                        Some(output.stderr.chars().take(stderr_max_bytes).collect())
                    },
                }
            }
            Err(err) => GateStepResult {
                gate: command.name.clone(),
                outcome: GateOutcome::Failed,
                duration_ms: started.elapsed().as_millis() as u64,
                exit_code: None,
                stderr_excerpt: Some(err.to_string()),
            },
        }
    }

    /// Runs type-check (if enforced), the regression test suite, then any
    /// acceptance tests registered against `submission.changed_files`, in
    /// that order, stopping at the first failure. Concurrent submissions
    /// against the same `tree_id` queue behind one another.
    pub async fn validate(
        &self,
        tree_id: &str,
        submission: &Submission,
        config: &RegressionGateConfig,
        project_root: &std::path::Path,
    ) -> GateResult {
        let tree_lock = self.lock_for_tree(tree_id).await;
        let _guard = tree_lock.lock().await;

        let mut steps = Vec::new();
        let mut recommendations = Vec::new();
        let mut failed = false;

        if config.enforce_type_check {
            if let Some(type_check) = &config.type_check {
                let result = self
                    .run_gate(type_check, project_root, config.timeout, config.stderr_max_bytes)
                    .await;
                if !result.outcome.is_passed() {
                    failed = true;
                    recommendations.push(format!(
                        "type-check failed for task {} (worker {})",
                        submission.task_id, submission.worker_id
                    ));
                }
                steps.push(result);
            }
        }

        if !failed {
            let result = self
                .run_gate(
                    &config.regression_test,
                    project_root,
                    config.timeout,
                    config.stderr_max_bytes,
                )
                .await;
            if !result.outcome.is_passed()
                || looks_like_test_failure(
                    config.test_framework,
                    result.stderr_excerpt.as_deref().unwrap_or(""),
                    "",
                )
            {
                failed = true;
                recommendations.push("regression test suite reported failures".to_string());
            }
            steps.push(result);
        } else {
            steps.push(GateStepResult {
                gate: config.regression_test.name.clone(),
                outcome: GateOutcome::Skipped,
                duration_ms: 0,
                exit_code: None,
                stderr_excerpt: None,
            });
        }

        if !failed {
            for file in &submission.changed_files {
                if let Some((prefix, command)) = config
                    .acceptance_tests
                    .iter()
                    .find(|(prefix, _)| file.starts_with(prefix.as_str()))
                {
                    let _ = prefix;
                    let result = self
                        .run_gate(command, project_root, config.timeout, config.stderr_max_bytes)
                        .await;
                    if !result.outcome.is_passed() {
                        failed = true;
                        recommendations.push(format!("acceptance test failed for {file}"));
                    }
                    steps.push(result);
                    if failed {
                        break;
                    }
                }
            }
        }

        GateResult {
            outcome: if failed {
                GateOutcome::Failed
            } else {
                GateOutcome::Passed
            },
            steps,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ProcessOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRunner {
        call_count: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn spawn(
            &self,
            _cmd: &str,
            _args: &[String],
            _opts: SpawnOptions,
        ) -> anyhow::Result<ProcessOutput> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            let fails = self.fail_on_call == Some(call);
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: if fails { "boom".into() } else { String::new() },
                exit_code: Some(if fails { 1 } else { 0 }),
            })
        }
    }

    fn config(type_check: bool) -> RegressionGateConfig {
        RegressionGateConfig {
            enforce_type_check: type_check,
            type_check: Some(GateCommand {
                name: "type_check".into(),
                program: "npx".into(),
                args: vec!["tsc".into(), "--noEmit".into()],
            }),
            regression_test: GateCommand {
                name: "regression_test".into(),
                program: "npm".into(),
                args: vec!["test".into()],
            },
            acceptance_tests: HashMap::new(),
            test_framework: TestFramework::Vitest,
            timeout: Duration::from_secs(5),
            stderr_max_bytes: 4096,
        }
    }

    fn submission() -> Submission {
        Submission {
            worker_id: WorkerId::from("w-1"),
            task_id: TaskId::from("t-1"),
            changed_files: vec!["src/auth/login.ts".into()],
        }
    }

    #[tokio::test]
    async fn all_gates_pass() {
        let gate = RegressionGate::new(Arc::new(FakeRunner {
            call_count: AtomicUsize::new(0),
            fail_on_call: None,
        }));
        let result = gate
            .validate("tree-1", &submission(), &config(true), std::path::Path::new("/proj"))
            .await;
        assert_eq!(result.outcome, GateOutcome::Passed);
        assert_eq!(result.steps.len(), 2);
    }

    #[tokio::test]
    async fn type_check_failure_skips_regression_test() {
        let gate = RegressionGate::new(Arc::new(FakeRunner {
            call_count: AtomicUsize::new(0),
            fail_on_call: Some(0),
        }));
        let result = gate
            .validate("tree-1", &submission(), &config(true), std::path::Path::new("/proj"))
            .await;
        assert_eq!(result.outcome, GateOutcome::Failed);
        assert_eq!(result.steps[0].outcome, GateOutcome::Failed);
        assert_eq!(result.steps[1].outcome, GateOutcome::Skipped);
        assert_eq!(result.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn acceptance_test_runs_only_for_matching_changed_files() {
        let gate = RegressionGate::new(Arc::new(FakeRunner {
            call_count: AtomicUsize::new(0),
            fail_on_call: None,
        }));
        let mut cfg = config(false);
        cfg.acceptance_tests.insert(
            "src/auth".into(),
            GateCommand {
                name: "auth_acceptance".into(),
                program: "npm".into(),
                args: vec!["run".into(), "test:auth".into()],
            },
        );
        let result = gate
            .validate("tree-1", &submission(), &cfg, std::path::Path::new("/proj"))
            .await;
        assert_eq!(result.steps.len(), 2);
        assert_eq!(result.steps[1].gate, "auth_acceptance");
    }
}
