//! WorkerExecutor — drives one leaf task through its TDD cycle.
//!
//! Phase transitions follow the same discipline as the teacher's
//! `StateMachine`: an explicit allow-list (`is_legal_phase_transition`),
//! any non-terminal phase can always fall through to `Failed`, and every
//! attempted transition is recorded whether or not it was legal. The
//! phases themselves (write a failing test, confirm it's red, write code,
//! confirm it's green, refactor) are this crate's own cycle, not the
//! teacher's issue-to-merge pipeline.

use async_trait::async_trait;
use devforge_core::capabilities::{FileStore, LLMClient, Message, ProcessOutput, ProcessRunner, Role, SpawnOptions};
use devforge_core::config::TestFramework;
use devforge_core::error::{CoreError, CoreResult};
use devforge_core::ids::TaskId;
use devforge_core::model::{FileRef, Module, TaskNode, TddCycleState, TddPhase};
use devforge_core::BoundaryChecker;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::test_framework::TestOutputParser;

/// Whether `to` is a legal next phase from `from`. `Failed` is reachable
/// from every non-terminal phase; `Done` and `Failed` are terminal.
pub fn is_legal_phase_transition(from: TddPhase, to: TddPhase) -> bool {
    use TddPhase::*;
    if matches!(from, Done | Failed) {
        return false;
    }
    if to == Failed {
        return true;
    }
    matches!(
        (from, to),
        (WriteTest, RunTestRed)
            | (RunTestRed, WriteCode)
            | (RunTestRed, WriteTest)
            | (WriteCode, RunTestGreen)
            | (RunTestGreen, WriteCode)
            | (RunTestGreen, Refactor)
            | (Refactor, Done)
    )
}

#[derive(Debug, Clone)]
pub struct PhaseTransitionRecord {
    pub from: TddPhase,
    pub to: TddPhase,
    pub iteration: u32,
    pub elapsed_ms: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("illegal TDD phase transition: {from:?} -> {to:?}")]
pub struct IllegalPhaseTransition {
    pub from: TddPhase,
    pub to: TddPhase,
}

/// Tracks one task's progress through the TDD cycle and enforces the
/// phase graph above.
pub struct PhaseMachine {
    cycle: TddCycleState,
    started_at: Instant,
    history: Vec<PhaseTransitionRecord>,
}

impl PhaseMachine {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            cycle: TddCycleState::new(max_iterations),
            started_at: Instant::now(),
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> TddPhase {
        self.cycle.phase
    }

    pub fn cycle(&self) -> &TddCycleState {
        &self.cycle
    }

    pub fn history(&self) -> &[PhaseTransitionRecord] {
        &self.history
    }

    fn advance(&mut self, to: TddPhase, reason: Option<&str>) -> Result<(), IllegalPhaseTransition> {
        if !is_legal_phase_transition(self.cycle.phase, to) {
            return Err(IllegalPhaseTransition {
                from: self.cycle.phase,
                to,
            });
        }
        self.history.push(PhaseTransitionRecord {
            from: self.cycle.phase,
            to,
            iteration: self.cycle.iteration,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.cycle.phase = to;
        Ok(())
    }

    fn fail(&mut self, reason: &str) {
        self.cycle.last_error = Some(reason.to_string());
        let _ = self.advance(TddPhase::Failed, Some(reason));
    }
}

/// The result of running one task to completion (or exhaustion).
#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub final_phase: TddPhase,
    pub code_artifacts: Vec<FileRef>,
    pub history: Vec<PhaseTransitionRecord>,
}

/// Drives the TDD cycle for a single leaf task against the injected
/// capabilities. One `WorkerExecutor` instance is reused across tasks by
/// the coordinator's worker pool; it holds no per-task state itself.
pub struct WorkerExecutor {
    llm: Arc<dyn LLMClient>,
    runner: Arc<dyn ProcessRunner>,
    files: Arc<dyn FileStore>,
    boundary: Arc<BoundaryChecker>,
    test_command: (String, Vec<String>),
    test_framework: TestFramework,
    max_iterations: u32,
    tool_retry_attempts: u32,
}

impl WorkerExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LLMClient>,
        runner: Arc<dyn ProcessRunner>,
        files: Arc<dyn FileStore>,
        boundary: Arc<BoundaryChecker>,
        test_command: (String, Vec<String>),
        test_framework: TestFramework,
        max_iterations: u32,
        tool_retry_attempts: u32,
    ) -> Self {
        Self {
            llm,
            runner,
            files,
            boundary,
            test_command,
            test_framework,
            max_iterations,
            tool_retry_attempts,
        }
    }

    /// Retries a capability call (LLM request, subprocess spawn, file write)
    /// up to `tool_retry_attempts` times with exponential backoff, the way
    /// the teacher's `tool_executor.rs` retries a flaky shell-out before
    /// surfacing it to the state machine. The final attempt's error is what
    /// gets wrapped into `CoreError::ToolExecutionError`.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let attempts = self.tool_retry_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    last_err = Some(err);
                    if attempt < attempts {
                        let backoff_ms = 100u64 * 2u64.pow(attempt - 1);
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }
        Err(CoreError::ToolExecutionError {
            attempts,
            source: last_err.expect("with_retry loop always runs at least once"),
        })
    }

    /// `test_path`/`code_path` follow the `src/<module>/<task>.test.ts` /
    /// `src/<module>/<task>.ts` convention; module root comes from
    /// `module.effective_root()` and falls back to `src/task` when the
    /// task has no owning module.
    fn artifact_paths(task: &TaskNode, module: Option<&Module>) -> (String, String) {
        let slug = slugify(&task.name);
        let root = module.map(|m| m.effective_root()).unwrap_or_else(|| "src".into());
        (format!("{root}/{slug}.test.ts"), format!("{root}/{slug}.ts"))
    }

    async fn run_test_command(&self, project_root: &Path) -> CoreResult<ProcessOutput> {
        let (program, args) = &self.test_command;
        self.with_retry(|| {
            self.runner.spawn(
                program,
                args,
                SpawnOptions {
                    cwd: Some(project_root.to_path_buf()),
                    env: Default::default(),
                    timeout: Some(Duration::from_secs(60)),
                },
            )
        })
        .await
    }

    /// Formats the failing-test excerpt handed back to the model on the
    /// next `write_code` iteration, parsed with the richer per-framework
    /// patterns rather than the gate's plain pass/fail boolean.
    fn diagnostic_excerpt(&self, output: &ProcessOutput) -> String {
        let summary = TestOutputParser::parse(self.test_framework, &output.stdout, &output.stderr);
        TestOutputParser::format_for_fix_prompt(&summary)
    }

    async fn write_artifact(
        &self,
        task_id: &TaskId,
        project_root: &Path,
        path: &str,
        content: &str,
        boundary: &devforge_core::model::SafetyBoundary,
        scoped_modules: &[Module],
    ) -> CoreResult<FileRef> {
        self.boundary
            .check_write(task_id.as_str(), path, boundary, scoped_modules)?;
        let full_path = project_root.join(path);
        if let Some(parent) = full_path.parent() {
            self.with_retry(|| self.files.mkdir_all(parent)).await?;
        }
        self.with_retry(|| self.files.write(&full_path, content)).await?;
        Ok(FileRef {
            path: path.to_string(),
            content_hash: content_hash(content),
        })
    }

    async fn ask_llm(&self, system_prompt: &str, user_prompt: &str) -> CoreResult<String> {
        let response = self
            .with_retry(|| {
                self.llm.create_message(
                    &[Message {
                        role: Role::User,
                        content: user_prompt.to_string(),
                    }],
                    None,
                    Some(system_prompt),
                )
            })
            .await?;
        Ok(response.text())
    }

    /// Runs `task` through write_test -> run_test_red -> write_code ->
    /// run_test_green -> refactor -> done, iterating write_code/run_test
    /// up to `max_iterations` times before failing the task. Refactor is
    /// best-effort: if the refactored code fails its tests, the
    /// pre-refactor code (already confirmed green) is kept and the task
    /// still completes.
    pub async fn execute_task(
        &self,
        task: &TaskNode,
        module: Option<&Module>,
        project_root: &Path,
        boundary: &devforge_core::model::SafetyBoundary,
    ) -> CoreResult<TaskExecutionResult> {
        let mut machine = PhaseMachine::new(self.max_iterations);
        let scoped_modules: Vec<Module> = module.cloned().into_iter().collect();
        let (test_path, code_path) = Self::artifact_paths(task, module);
        let mut artifacts = Vec::new();

        let test_source = self
            .ask_llm(
                "Write a single failing unit test for the described responsibility. \
                 Output only the test file's source, no commentary.",
                &task.description,
            )
            .await;
        let test_source = match test_source {
            Ok(s) => s,
            Err(err) => {
                machine.fail(&err.to_string());
                return Ok(self.finish(machine, artifacts));
            }
        };
        machine
            .advance(TddPhase::RunTestRed, None)
            .map_err(|e| CoreError::invalid_state("TddPhase", task.id.to_string(), e.from, e.to))?;
        let test_artifact = self
            .write_artifact(
                &task.id,
                project_root,
                &test_path,
                &test_source,
                boundary,
                &scoped_modules,
            )
            .await;
        let test_artifact = match test_artifact {
            Ok(a) => a,
            Err(err) => {
                machine.fail(&err.to_string());
                return Ok(self.finish(machine, artifacts));
            }
        };
        artifacts.push(test_artifact);

        // A new test that already passes before any implementation exists
        // is a test-writing mistake, but there's no code yet to blame it
        // on; note it in the cycle's last_error and proceed into
        // write_code anyway; run_test_green will catch a genuinely useless
        // test once real code is in place.
        match self.run_test_command(project_root).await {
            Ok(output) if !output.success() => {}
            Ok(_) => {
                machine.cycle.last_error = Some("test passed before any implementation existed".into());
            }
            Err(err) => {
                machine.fail(&err.to_string());
                return Ok(self.finish(machine, artifacts));
            }
        }

        if let Err(e) = machine.advance(TddPhase::WriteCode, None) {
            machine.fail(&e.to_string());
            return Ok(self.finish(machine, artifacts));
        }

        let mut last_failure_excerpt: Option<String> = None;
        loop {
            let mut user_prompt = format!("{}\n\nTest:\n{}", task.description, test_source);
            if let Some(excerpt) = &last_failure_excerpt {
                user_prompt.push_str(&format!("\n\nPrevious attempt failed:\n{excerpt}"));
            }
            let code_source = self
                .ask_llm(
                    "Write the minimal implementation that makes the accompanying test pass. \
                     Output only the implementation file's source, no commentary.",
                    &user_prompt,
                )
                .await;
            let code_source = match code_source {
                Ok(s) => s,
                Err(err) => {
                    machine.fail(&err.to_string());
                    return Ok(self.finish(machine, artifacts));
                }
            };

            if let Err(e) = machine.advance(TddPhase::RunTestGreen, None) {
                machine.fail(&e.to_string());
                return Ok(self.finish(machine, artifacts));
            }
            let code_artifact = self
                .write_artifact(
                    &task.id,
                    project_root,
                    &code_path,
                    &code_source,
                    boundary,
                    &scoped_modules,
                )
                .await;
            let code_artifact = match code_artifact {
                Ok(a) => a,
                Err(err) => {
                    machine.fail(&err.to_string());
                    return Ok(self.finish(machine, artifacts));
                }
            };
            artifacts.retain(|f: &FileRef| f.path != code_path);
            artifacts.push(code_artifact);

            let output = match self.run_test_command(project_root).await {
                Ok(o) => o,
                Err(err) => {
                    machine.fail(&err.to_string());
                    return Ok(self.finish(machine, artifacts));
                }
            };

            if output.success() {
                break;
            }
            last_failure_excerpt = Some(self.diagnostic_excerpt(&output));

            machine.cycle.iteration += 1;
            if machine.cycle.iterations_exhausted() {
                machine.fail("max TDD iterations exhausted without a passing test");
                return Ok(self.finish(machine, artifacts));
            }
            if let Err(e) = machine.advance(TddPhase::WriteCode, Some("test still red")) {
                machine.fail(&e.to_string());
                return Ok(self.finish(machine, artifacts));
            }
        }

        if let Err(e) = machine.advance(TddPhase::Refactor, None) {
            machine.fail(&e.to_string());
            return Ok(self.finish(machine, artifacts));
        }

        if let Ok(refactored) = self
            .ask_llm(
                "Refactor the implementation for clarity without changing its behavior. \
                 Output only the refactored source, no commentary.",
                &code_path,
            )
            .await
        {
            if let Ok(refactored_artifact) = self
                .write_artifact(
                    &task.id,
                    project_root,
                    &code_path,
                    &refactored,
                    boundary,
                    &scoped_modules,
                )
                .await
            {
                match self.run_test_command(project_root).await {
                    Ok(o) if o.success() => {
                        artifacts.retain(|f| f.path != code_path);
                        artifacts.push(refactored_artifact);
                    }
                    _ => {
                        // Refactor regressed the tests; keep the last
                        // known-green artifact already in `artifacts`.
                    }
                }
            }
        }

        if let Err(e) = machine.advance(TddPhase::Done, None) {
            machine.fail(&e.to_string());
        }
        Ok(self.finish(machine, artifacts))
    }

    fn finish(&self, machine: PhaseMachine, artifacts: Vec<FileRef>) -> TaskExecutionResult {
        TaskExecutionResult {
            final_phase: machine.phase(),
            code_artifacts: artifacts,
            history: machine.history,
        }
    }
}

fn slugify(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn content_hash(content: &str) -> String {
    // FNV-1a, matching the checkpoint snapshot hash in devforge-core.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in content.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use devforge_core::capabilities::{LLMResponse, Block, ProcessOutput};
    use devforge_core::model::{ModuleType, SafetyBoundary};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeLLM;

    #[async_trait]
    impl LLMClient for FakeLLM {
        async fn create_message(
            &self,
            _messages: &[Message],
            _tools: Option<&[devforge_core::capabilities::ToolSchema]>,
            _system_prompt: Option<&str>,
        ) -> anyhow::Result<LLMResponse> {
            Ok(LLMResponse {
                content: vec![Block::Text {
                    text: "// generated".into(),
                }],
            })
        }
    }

    /// Fails the first `red_calls` test runs, then passes forever after —
    /// simulates exactly one red/green cycle with no refactor regression.
    struct ScriptedRunner {
        call_count: AtomicUsize,
        red_calls: usize,
    }

    #[async_trait]
    impl ProcessRunner for ScriptedRunner {
        async fn spawn(
            &self,
            _cmd: &str,
            _args: &[String],
            _opts: SpawnOptions,
        ) -> anyhow::Result<ProcessOutput> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            let passed = call >= self.red_calls;
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(if passed { 0 } else { 1 }),
            })
        }
    }

    struct InMemoryFiles {
        written: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FileStore for InMemoryFiles {
        async fn read(&self, path: &Path) -> anyhow::Result<String> {
            let written = self.written.lock().unwrap();
            written
                .iter()
                .find(|(p, _)| p == &path.to_string_lossy())
                .map(|(_, c)| c.clone())
                .ok_or_else(|| anyhow::anyhow!("not found"))
        }
        async fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
            self.written
                .lock()
                .unwrap()
                .push((path.to_string_lossy().to_string(), content.to_string()));
            Ok(())
        }
        async fn mkdir_all(&self, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
        async fn remove(&self, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
        async fn exists(&self, _path: &Path) -> bool {
            true
        }
    }

    fn task() -> TaskNode {
        TaskNode {
            id: TaskId::from("task-1"),
            parent_id: None,
            name: "expose echo".into(),
            description: "expose echo(x:string):string".into(),
            status: devforge_core::model::TaskStatus::Pending,
            priority: 0,
            depth: 2,
            children: vec![],
            dependencies: vec![],
            blueprint_module_id: None,
            test_spec: None,
            acceptance_tests: vec![],
            code_artifacts: vec![],
            retry_count: 0,
            started_at: None,
            completed_at: None,
            owner: None,
            insertion_seq: 1,
        }
    }

    fn module() -> Module {
        Module {
            id: devforge_core::ids::ModuleId::from("lib"),
            name: "lib".into(),
            description: String::new(),
            module_type: ModuleType::Backend,
            responsibilities: vec!["expose echo".into()],
            dependencies: vec![],
            interfaces: vec![],
            tech_stack: vec![],
            root_path: None,
        }
    }

    #[test]
    fn phase_transitions_follow_the_tdd_cycle() {
        assert!(is_legal_phase_transition(TddPhase::WriteTest, TddPhase::RunTestRed));
        assert!(is_legal_phase_transition(TddPhase::RunTestGreen, TddPhase::Refactor));
        assert!(!is_legal_phase_transition(TddPhase::WriteTest, TddPhase::Refactor));
        assert!(is_legal_phase_transition(TddPhase::WriteCode, TddPhase::Failed));
        assert!(!is_legal_phase_transition(TddPhase::Done, TddPhase::WriteTest));
    }

    #[tokio::test]
    async fn single_red_green_cycle_reaches_done() {
        let executor = WorkerExecutor::new(
            Arc::new(FakeLLM),
            Arc::new(ScriptedRunner {
                call_count: AtomicUsize::new(0),
                red_calls: 1,
            }),
            Arc::new(InMemoryFiles {
                written: Mutex::new(vec![]),
            }),
            Arc::new(BoundaryChecker::new("/proj")),
            ("npm".into(), vec!["test".into()]),
            TestFramework::Auto,
            5,
            3,
        );

        let result = executor
            .execute_task(&task(), Some(&module()), Path::new("/proj"), &SafetyBoundary::default())
            .await
            .unwrap();

        assert_eq!(result.final_phase, TddPhase::Done);
        assert!(result.code_artifacts.iter().any(|a| a.path.ends_with(".test.ts")));
        assert!(result.code_artifacts.iter().any(|a| a.path.ends_with(".ts") && !a.path.ends_with(".test.ts")));
    }

    #[tokio::test]
    async fn exhausting_iterations_fails_the_task() {
        let executor = WorkerExecutor::new(
            Arc::new(FakeLLM),
            Arc::new(ScriptedRunner {
                call_count: AtomicUsize::new(0),
                red_calls: 1000,
            }),
            Arc::new(InMemoryFiles {
                written: Mutex::new(vec![]),
            }),
            Arc::new(BoundaryChecker::new("/proj")),
            ("npm".into(), vec!["test".into()]),
            TestFramework::Auto,
            2,
            3,
        );

        let result = executor
            .execute_task(&task(), Some(&module()), Path::new("/proj"), &SafetyBoundary::default())
            .await
            .unwrap();

        assert_eq!(result.final_phase, TddPhase::Failed);
    }

    /// Fails to spawn the first `fail_calls` times, then succeeds — exercises
    /// the retry-with-backoff path rather than the test-framework red/green
    /// loop above.
    struct FlakyThenGreenRunner {
        call_count: AtomicUsize,
        fail_calls: usize,
    }

    #[async_trait]
    impl ProcessRunner for FlakyThenGreenRunner {
        async fn spawn(
            &self,
            _cmd: &str,
            _args: &[String],
            _opts: SpawnOptions,
        ) -> anyhow::Result<ProcessOutput> {
            let call = self.call_count.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_calls {
                return Err(anyhow::anyhow!("transient spawn failure"));
            }
            Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }

    struct AlwaysFailingRunner;

    #[async_trait]
    impl ProcessRunner for AlwaysFailingRunner {
        async fn spawn(
            &self,
            _cmd: &str,
            _args: &[String],
            _opts: SpawnOptions,
        ) -> anyhow::Result<ProcessOutput> {
            Err(anyhow::anyhow!("spawn always fails"))
        }
    }

    #[tokio::test]
    async fn transient_spawn_failures_are_retried_before_surfacing() {
        let executor = WorkerExecutor::new(
            Arc::new(FakeLLM),
            Arc::new(FlakyThenGreenRunner {
                call_count: AtomicUsize::new(0),
                fail_calls: 2,
            }),
            Arc::new(InMemoryFiles {
                written: Mutex::new(vec![]),
            }),
            Arc::new(BoundaryChecker::new("/proj")),
            ("npm".into(), vec!["test".into()]),
            TestFramework::Auto,
            5,
            3,
        );

        let output = executor.run_test_command(Path::new("/proj")).await.unwrap();
        assert!(output.success());
    }

    #[tokio::test]
    async fn persistent_spawn_failure_surfaces_as_tool_execution_error_after_all_attempts() {
        let executor = WorkerExecutor::new(
            Arc::new(FakeLLM),
            Arc::new(AlwaysFailingRunner),
            Arc::new(InMemoryFiles {
                written: Mutex::new(vec![]),
            }),
            Arc::new(BoundaryChecker::new("/proj")),
            ("npm".into(), vec!["test".into()]),
            TestFramework::Auto,
            5,
            3,
        );

        let err = executor.run_test_command(Path::new("/proj")).await.unwrap_err();
        match err {
            CoreError::ToolExecutionError { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected ToolExecutionError, got {other:?}"),
        }
    }

    #[test]
    fn slugify_replaces_non_alphanumeric_runs() {
        assert_eq!(slugify("expose echo(x:string):string"), "expose_echo_x_string_string");
    }
}
