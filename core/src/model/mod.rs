//! The shared data model. Field-for-field serde fidelity with ISO-8601
//! timestamps so Blueprint/TaskTree can round-trip to JSON.

pub mod blueprint;
pub mod checkpoint;
pub mod safety;
pub mod task_tree;
pub mod worker;

pub use blueprint::{
    Blueprint, BlueprintStatus, BusinessProcess, DesignImage, Module, ModuleInterface,
    ModuleType, NonFunctionalRequirement, ProcessKind, ProcessStep, TechStack, Version,
};
pub use checkpoint::{Checkpoint, CheckpointScope, FileChange, SnapshotFile};
pub use safety::{ChangeKind, ImpactReport, ModuleImpact, RiskLevel, SafetyBoundary};
pub use task_tree::{AcceptanceTest, FileRef, TaskNode, TaskStatus, TaskTree, TaskTreeStats};
pub use worker::{TddCycleState, TddPhase, Worker, WorkerStatus};
