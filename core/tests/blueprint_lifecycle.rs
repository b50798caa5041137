//! Cross-module integration coverage: a blueprint's full Draft -> Approved
//! -> Executing -> Completed lifecycle, feeding the resulting modules
//! through the impact analyzer and boundary checker the way
//! `ContinuousDevOrchestrator::run` does.

use std::sync::Arc;

use devforge_core::ids::{SequentialGenerator, SystemClock};
use devforge_core::impact::ModuleChangeSignals;
use devforge_core::model::{ModuleType, SafetyBoundary, TaskStatus};
use devforge_core::{BlueprintManager, BoundaryChecker, ImpactAnalyzer, TaskTreeManager};

fn manager() -> BlueprintManager {
    BlueprintManager::new(Arc::new(SequentialGenerator::new()), Arc::new(SystemClock))
}

#[test]
fn single_module_blueprint_goes_from_draft_to_completed() {
    let manager = manager();
    let blueprint = manager.create("echo", "echo service", "/proj").unwrap();
    let blueprint = manager
        .add_module(
            &blueprint.id,
            devforge_core::model::Module {
                id: devforge_core::ids::ModuleId::from("lib"),
                name: "lib".into(),
                description: String::new(),
                module_type: ModuleType::Backend,
                responsibilities: vec!["expose echo(x:string):string".into()],
                dependencies: vec![],
                interfaces: vec![],
                tech_stack: vec![],
                root_path: None,
            },
        )
        .unwrap();

    manager.submit_for_review(&blueprint.id).unwrap();
    let blueprint = manager.approve(&blueprint.id, "alice").unwrap();
    assert_eq!(blueprint.status, devforge_core::model::BlueprintStatus::Approved);

    let signals: std::collections::HashMap<String, ModuleChangeSignals> = blueprint
        .modules
        .iter()
        .map(|m| {
            (
                m.id.as_str().to_string(),
                ModuleChangeSignals {
                    files_touched: 1,
                    touches_public_interface: false,
                    touches_dependency_graph: false,
                    removes_responsibility: false,
                },
            )
        })
        .collect();
    let impact = ImpactAnalyzer::new().analyze(&blueprint, &signals, SafetyBoundary::default());
    assert!(!impact.requires_human_approval);
    assert_eq!(impact.per_module.len(), 1);

    let blueprint = manager.start_execution(&blueprint.id).unwrap();
    assert_eq!(blueprint.status, devforge_core::model::BlueprintStatus::Executing);

    let tree_manager = TaskTreeManager::new(Arc::new(SequentialGenerator::new()), Arc::new(SystemClock));
    let tree = tree_manager.generate_from_blueprint(&blueprint).unwrap();
    assert_eq!(tree.stats.total_tasks, 1);

    let task = tree_manager.get_executable_tasks().unwrap().remove(0);

    let boundary = BoundaryChecker::new("/proj");
    boundary
        .check_write(task.id.as_str(), "src/lib/echo.test.ts", &impact.safety_boundary, &blueprint.modules)
        .unwrap();

    tree_manager.mark_status(&task.id, TaskStatus::Passed).unwrap();
    assert_eq!(tree_manager.get_executable_tasks().unwrap().len(), 0);

    let blueprint = manager.complete(&blueprint.id).unwrap();
    assert_eq!(blueprint.status, devforge_core::model::BlueprintStatus::Completed);
}

#[test]
fn rejecting_a_blueprint_records_the_reason_and_stops_the_lifecycle() {
    let manager = manager();
    let blueprint = manager.create("risky", "touches core auth", "/proj").unwrap();
    manager.submit_for_review(&blueprint.id).unwrap();

    let rejected = manager.reject(&blueprint.id, "touches payment module without tests").unwrap();
    assert_eq!(rejected.status, devforge_core::model::BlueprintStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("touches payment module without tests")
    );

    assert!(manager.start_execution(&rejected.id).is_err());
}

#[test]
fn boundary_checker_rejects_writes_outside_declared_module_roots() {
    let manager = manager();
    let blueprint = manager.create("echo", "echo service", "/proj").unwrap();
    let blueprint = manager
        .add_module(
            &blueprint.id,
            devforge_core::model::Module {
                id: devforge_core::ids::ModuleId::from("lib"),
                name: "lib".into(),
                description: String::new(),
                module_type: ModuleType::Backend,
                responsibilities: vec!["expose echo".into()],
                dependencies: vec![],
                interfaces: vec![],
                tech_stack: vec![],
                root_path: Some("src/lib".into()),
            },
        )
        .unwrap();

    let boundary = BoundaryChecker::new("/proj");
    let result = boundary.check_write(
        "task-1",
        "src/other/secret.ts",
        &SafetyBoundary::default(),
        &blueprint.modules,
    );
    assert!(result.is_err());
}
