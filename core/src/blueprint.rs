//! BlueprintManager.
//!
//! Owns Blueprint CRUD and the status state machine
//! `draft -> in_review -> {approved | rejected}`; `approved -> executing ->
//! completed`; `rejected -> draft`. Any other transition is an
//! `InvalidState` error and leaves status unchanged, following the same
//! "validate then advance" discipline as the orchestrator's TDD state
//! machine.

use crate::error::{CoreError, CoreResult};
use crate::ids::{BlueprintId, IdGenerator};
use crate::model::{
    Blueprint, BlueprintStatus, BusinessProcess, Module, NonFunctionalRequirement, TechStack,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

fn is_legal_transition(from: BlueprintStatus, to: BlueprintStatus) -> bool {
    use BlueprintStatus::*;
    matches!(
        (from, to),
        (Draft, InReview)
            | (InReview, Approved)
            | (InReview, Rejected)
            | (Approved, Executing)
            | (Executing, Completed)
            | (Rejected, Draft)
    )
}

pub struct BlueprintManager {
    store: Arc<RwLock<HashMap<BlueprintId, Blueprint>>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn crate::ids::Clock>,
}

impl BlueprintManager {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn crate::ids::Clock>) -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
            ids,
            clock,
        }
    }

    pub fn create(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        project_path: impl Into<String>,
    ) -> CoreResult<Blueprint> {
        let now = self.clock.now();
        let blueprint = Blueprint {
            id: BlueprintId::new(self.ids.next_id("bp")),
            name: name.into(),
            description: description.into(),
            project_path: project_path.into(),
            version: crate::model::Version::INITIAL,
            status: BlueprintStatus::Draft,
            created_at: now,
            updated_at: now,
            approved_by: None,
            rejection_reason: None,
            modules: vec![],
            processes: vec![],
            non_functional_requirements: vec![],
            design_images: vec![],
            tech_stack: TechStack::default(),
        };
        self.store
            .write()
            .expect("blueprint store poisoned")
            .insert(blueprint.id.clone(), blueprint.clone());
        Ok(blueprint)
    }

    pub fn get(&self, id: &BlueprintId) -> CoreResult<Blueprint> {
        self.store
            .read()
            .expect("blueprint store poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Blueprint", id.to_string()))
    }

    pub fn list(&self) -> Vec<Blueprint> {
        self.store
            .read()
            .expect("blueprint store poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Loads a blueprint a previous process already created (a CLI's `init`
    /// persisted it to disk; a later `approve`/`run` invocation reloads it
    /// into a fresh manager) rather than minting a new one via `create`.
    pub fn insert(&self, blueprint: Blueprint) {
        self.store
            .write()
            .expect("blueprint store poisoned")
            .insert(blueprint.id.clone(), blueprint);
    }

    fn mutate(
        &self,
        id: &BlueprintId,
        f: impl FnOnce(&mut Blueprint) -> CoreResult<()>,
    ) -> CoreResult<Blueprint> {
        let mut store = self.store.write().expect("blueprint store poisoned");
        let blueprint = store
            .get_mut(id)
            .ok_or_else(|| CoreError::not_found("Blueprint", id.to_string()))?;
        f(blueprint)?;
        blueprint.updated_at = self.clock.now();
        Ok(blueprint.clone())
    }

    pub fn update(&self, id: &BlueprintId, description: impl Into<String>) -> CoreResult<Blueprint> {
        let description = description.into();
        self.mutate(id, |bp| {
            bp.description = description;
            Ok(())
        })
    }

    pub fn add_module(&self, id: &BlueprintId, module: Module) -> CoreResult<Blueprint> {
        self.mutate(id, |bp| {
            bp.modules.push(module);
            Ok(())
        })
    }

    pub fn add_process(&self, id: &BlueprintId, process: BusinessProcess) -> CoreResult<Blueprint> {
        self.mutate(id, |bp| {
            bp.processes.push(process);
            Ok(())
        })
    }

    pub fn add_nfr(
        &self,
        id: &BlueprintId,
        nfr: NonFunctionalRequirement,
    ) -> CoreResult<Blueprint> {
        self.mutate(id, |bp| {
            bp.non_functional_requirements.push(nfr);
            Ok(())
        })
    }

    fn transition(&self, id: &BlueprintId, to: BlueprintStatus) -> CoreResult<Blueprint> {
        self.mutate(id, |bp| {
            if !is_legal_transition(bp.status, to) {
                return Err(CoreError::invalid_state(
                    "Blueprint",
                    bp.id.to_string(),
                    bp.status,
                    to,
                ));
            }
            bp.status = to;
            Ok(())
        })
    }

    pub fn submit_for_review(&self, id: &BlueprintId) -> CoreResult<Blueprint> {
        self.transition(id, BlueprintStatus::InReview)
    }

    pub fn approve(&self, id: &BlueprintId, approver: impl Into<String>) -> CoreResult<Blueprint> {
        let approver = approver.into();
        let result = self.transition(id, BlueprintStatus::Approved)?;
        self.mutate(id, |bp| {
            bp.approved_by = Some(approver);
            bp.rejection_reason = None;
            Ok(())
        })?;
        Ok(result)
    }

    pub fn reject(&self, id: &BlueprintId, reason: impl Into<String>) -> CoreResult<Blueprint> {
        let reason = reason.into();
        self.transition(id, BlueprintStatus::Rejected)?;
        self.mutate(id, |bp| {
            bp.rejection_reason = Some(reason);
            Ok(())
        })
    }

    pub fn start_execution(&self, id: &BlueprintId) -> CoreResult<Blueprint> {
        self.transition(id, BlueprintStatus::Executing)
    }

    pub fn complete(&self, id: &BlueprintId) -> CoreResult<Blueprint> {
        self.transition(id, BlueprintStatus::Completed)
    }

    /// Pure with respect to `base`: clones it, bumps the patch version,
    /// and appends modules/processes derived from `requirement` while
    /// preserving the ids of surviving entities.
    pub fn create_incremental_blueprint(
        &self,
        base: &Blueprint,
        requirement: &str,
        extra_modules: Vec<Module>,
        extra_processes: Vec<BusinessProcess>,
    ) -> CoreResult<Blueprint> {
        let now = self.clock.now();
        let mut incremental = base.clone();
        incremental.id = BlueprintId::new(self.ids.next_id("bp"));
        incremental.version = base.version.bump_patch();
        incremental.status = BlueprintStatus::Draft;
        incremental.approved_by = None;
        incremental.rejection_reason = None;
        incremental.created_at = now;
        incremental.updated_at = now;
        incremental.description = format!("{} (incremental: {requirement})", base.description);
        incremental.modules.extend(extra_modules);
        incremental.processes.extend(extra_processes);

        self.store
            .write()
            .expect("blueprint store poisoned")
            .insert(incremental.id.clone(), incremental.clone());
        Ok(incremental)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SequentialGenerator, SystemClock};

    fn manager() -> BlueprintManager {
        BlueprintManager::new(Arc::new(SequentialGenerator::new()), Arc::new(SystemClock))
    }

    #[test]
    fn full_happy_path_state_machine() {
        let mgr = manager();
        let bp = mgr.create("echo", "desc", "/proj").unwrap();
        assert_eq!(bp.status, BlueprintStatus::Draft);

        let bp = mgr.submit_for_review(&bp.id).unwrap();
        assert_eq!(bp.status, BlueprintStatus::InReview);

        let bp = mgr.approve(&bp.id, "alice").unwrap();
        assert_eq!(bp.status, BlueprintStatus::Approved);
        assert_eq!(bp.approved_by.as_deref(), Some("alice"));

        let bp = mgr.start_execution(&bp.id).unwrap();
        assert_eq!(bp.status, BlueprintStatus::Executing);

        let bp = mgr.complete(&bp.id).unwrap();
        assert_eq!(bp.status, BlueprintStatus::Completed);
    }

    #[test]
    fn rejection_then_redraft() {
        let mgr = manager();
        let bp = mgr.create("x", "d", "/p").unwrap();
        let bp = mgr.submit_for_review(&bp.id).unwrap();
        let bp = mgr.reject(&bp.id, "needs more detail").unwrap();
        assert_eq!(bp.status, BlueprintStatus::Rejected);
        assert_eq!(bp.rejection_reason.as_deref(), Some("needs more detail"));

        let bp = mgr.transition(&bp.id, BlueprintStatus::Draft).unwrap();
        assert_eq!(bp.status, BlueprintStatus::Draft);
    }

    #[test]
    fn illegal_transition_is_rejected_and_status_unchanged() {
        let mgr = manager();
        let bp = mgr.create("x", "d", "/p").unwrap();
        // Draft -> Approved directly is illegal; must go through InReview.
        let err = mgr.approve(&bp.id, "alice").unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        let reloaded = mgr.get(&bp.id).unwrap();
        assert_eq!(reloaded.status, BlueprintStatus::Draft);
    }

    #[test]
    fn illegal_transition_from_executing_back_to_draft() {
        let mgr = manager();
        let bp = mgr.create("x", "d", "/p").unwrap();
        let bp = mgr.submit_for_review(&bp.id).unwrap();
        let bp = mgr.approve(&bp.id, "alice").unwrap();
        let bp = mgr.start_execution(&bp.id).unwrap();
        let err = mgr.transition(&bp.id, BlueprintStatus::Draft).unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[test]
    fn create_incremental_is_pure_and_bumps_patch() {
        let mgr = manager();
        let base = mgr.create("base", "d", "/p").unwrap();
        let module = Module {
            id: crate::ids::ModuleId::from("new-mod"),
            name: "billing".into(),
            description: String::new(),
            module_type: crate::model::ModuleType::Backend,
            responsibilities: vec![],
            dependencies: vec![],
            interfaces: vec![],
            tech_stack: vec![],
            root_path: None,
        };
        let incremental = mgr
            .create_incremental_blueprint(&base, "add billing", vec![module], vec![])
            .unwrap();

        assert_ne!(incremental.id, base.id);
        assert_eq!(incremental.version, base.version.bump_patch());
        assert_eq!(incremental.modules.len(), 1);
        // base is untouched
        let reloaded_base = mgr.get(&base.id).unwrap();
        assert_eq!(reloaded_base.modules.len(), 0);
        assert_eq!(reloaded_base.version, crate::model::Version::INITIAL);
    }

    #[test]
    fn not_found_for_unknown_id() {
        let mgr = manager();
        let err = mgr.get(&BlueprintId::from("missing")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
