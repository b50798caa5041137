//! Worker/coordinator/orchestrator layer: the pieces that actually call an
//! LLM and a shell, on top of `devforge-core`'s pure managers.

pub mod coordinator;
pub mod llm;
pub mod orchestrator;
pub mod runner;
pub mod test_framework;
pub mod worker;

pub use coordinator::{AgentCoordinator, CoordinatorConfig, TaskRunOutcome, worker_pool_size};
pub use llm::{HttpLlmClient, LlmEndpointConfig};
pub use orchestrator::{ContinuousDevOrchestrator, OrchestratorPhase, OrchestratorRunConfig};
pub use runner::{LocalFileStore, TokioProcessRunner};
pub use test_framework::{FailingTest, TestOutputParser, TestRunSummary};
pub use worker::{IllegalPhaseTransition, PhaseMachine, TaskExecutionResult, WorkerExecutor};
