//! Blueprint data model.

use crate::ids::{BlueprintId, ModuleId, ProcessId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
    Executing,
    Completed,
    Archived,
}

impl std::fmt::Display for BlueprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Archived => "archived",
        };
        write!(f, "{s}")
    }
}

/// Semantic version triple. `createIncrementalBlueprint` bumps the patch
/// component; a blueprint's version is never allowed to go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const INITIAL: Version = Version {
        major: 0,
        minor: 1,
        patch: 0,
    };

    pub fn bump_patch(self) -> Self {
        Self {
            patch: self.patch + 1,
            ..self
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Frontend,
    Backend,
    Database,
    Service,
    Infrastructure,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceDirection {
    In,
    Out,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Api,
    Event,
    Message,
    File,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleInterface {
    pub id: String,
    pub direction: InterfaceDirection,
    pub kind: InterfaceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    pub responsibilities: Vec<String>,
    /// Declared dependencies on other modules, by id. The dependency graph
    /// across a blueprint's modules must be acyclic.
    pub dependencies: Vec<ModuleId>,
    pub interfaces: Vec<ModuleInterface>,
    pub tech_stack: Vec<String>,
    pub root_path: Option<String>,
}

impl Module {
    /// `rootPath`, falling back to the `src/<moduleName>/` convention used
    /// by the boundary-checking policy.
    pub fn effective_root(&self) -> String {
        self.root_path
            .clone()
            .unwrap_or_else(|| format!("src/{}", self.name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    AsIs,
    ToBe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStep {
    pub order: u32,
    pub name: String,
    pub description: String,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessProcess {
    pub id: ProcessId,
    pub name: String,
    pub description: String,
    pub kind: ProcessKind,
    pub steps: Vec<ProcessStep>,
    pub actors: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl BusinessProcess {
    /// Invariant: `step.order` is contiguous from 1.
    pub fn has_contiguous_steps(&self) -> bool {
        self.steps
            .iter()
            .enumerate()
            .all(|(i, step)| step.order == (i as u32) + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonFunctionalRequirement {
    pub id: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignImage {
    pub id: String,
    pub reference: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TechStack {
    pub languages: Vec<String>,
    pub frameworks: Vec<String>,
    pub infrastructure: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    pub id: BlueprintId,
    pub name: String,
    pub description: String,
    pub project_path: String,
    pub version: Version,
    pub status: BlueprintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub modules: Vec<Module>,
    pub processes: Vec<BusinessProcess>,
    pub non_functional_requirements: Vec<NonFunctionalRequirement>,
    pub design_images: Vec<DesignImage>,
    pub tech_stack: TechStack,
}

impl Blueprint {
    pub fn find_module(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.iter().find(|m| &m.id == id)
    }

    /// Invariant: the module dependency graph is acyclic. Detects cycles
    /// via iterative DFS with an explicit recursion-stack set.
    pub fn module_graph_is_acyclic(&self) -> bool {
        use std::collections::HashSet;

        fn visit<'a>(
            module: &'a ModuleId,
            by_id: &std::collections::HashMap<&'a ModuleId, &'a Module>,
            visited: &mut HashSet<&'a ModuleId>,
            stack: &mut HashSet<&'a ModuleId>,
        ) -> bool {
            if stack.contains(module) {
                return false;
            }
            if visited.contains(module) {
                return true;
            }
            visited.insert(module);
            stack.insert(module);
            if let Some(m) = by_id.get(module) {
                for dep in &m.dependencies {
                    if !visit(dep, by_id, visited, stack) {
                        return false;
                    }
                }
            }
            stack.remove(module);
            true
        }

        let by_id: std::collections::HashMap<&ModuleId, &Module> =
            self.modules.iter().map(|m| (&m.id, m)).collect();
        let mut visited = HashSet::new();
        let mut stack = HashSet::new();
        self.modules
            .iter()
            .all(|m| visit(&m.id, &by_id, &mut visited, &mut stack))
    }

    /// Invariant: `approvedBy` is set iff status >= approved.
    pub fn approval_invariant_holds(&self) -> bool {
        let at_or_past_approved = matches!(
            self.status,
            BlueprintStatus::Approved | BlueprintStatus::Executing | BlueprintStatus::Completed
        );
        self.approved_by.is_some() == at_or_past_approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(id: &str, deps: &[&str]) -> Module {
        Module {
            id: ModuleId::from(id),
            name: id.to_string(),
            description: String::new(),
            module_type: ModuleType::Backend,
            responsibilities: vec![],
            dependencies: deps.iter().map(|d| ModuleId::from(*d)).collect(),
            interfaces: vec![],
            tech_stack: vec![],
            root_path: None,
        }
    }

    fn blueprint(modules: Vec<Module>) -> Blueprint {
        Blueprint {
            id: BlueprintId::from("bp-1"),
            name: "test".into(),
            description: String::new(),
            project_path: "/tmp/proj".into(),
            version: Version::INITIAL,
            status: BlueprintStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            approved_by: None,
            rejection_reason: None,
            modules,
            processes: vec![],
            non_functional_requirements: vec![],
            design_images: vec![],
            tech_stack: TechStack::default(),
        }
    }

    #[test]
    fn acyclic_graph_passes() {
        let bp = blueprint(vec![module("a", &[]), module("b", &["a"])]);
        assert!(bp.module_graph_is_acyclic());
    }

    #[test]
    fn cyclic_graph_fails() {
        let bp = blueprint(vec![module("a", &["b"]), module("b", &["a"])]);
        assert!(!bp.module_graph_is_acyclic());
    }

    #[test]
    fn contiguous_steps() {
        let process = BusinessProcess {
            id: ProcessId::from("p-1"),
            name: "checkout".into(),
            description: String::new(),
            kind: ProcessKind::ToBe,
            steps: vec![
                ProcessStep {
                    order: 1,
                    name: "a".into(),
                    description: String::new(),
                    actor: "user".into(),
                },
                ProcessStep {
                    order: 2,
                    name: "b".into(),
                    description: String::new(),
                    actor: "user".into(),
                },
            ],
            actors: vec![],
            inputs: vec![],
            outputs: vec![],
        };
        assert!(process.has_contiguous_steps());
    }

    #[test]
    fn non_contiguous_steps_detected() {
        let mut process = BusinessProcess {
            id: ProcessId::from("p-1"),
            name: "checkout".into(),
            description: String::new(),
            kind: ProcessKind::ToBe,
            steps: vec![ProcessStep {
                order: 2,
                name: "a".into(),
                description: String::new(),
                actor: "user".into(),
            }],
            actors: vec![],
            inputs: vec![],
            outputs: vec![],
        };
        assert!(!process.has_contiguous_steps());
        process.steps[0].order = 1;
        assert!(process.has_contiguous_steps());
    }

    #[test]
    fn approval_invariant() {
        let mut bp = blueprint(vec![]);
        assert!(bp.approval_invariant_holds());
        bp.status = BlueprintStatus::Approved;
        assert!(!bp.approval_invariant_holds());
        bp.approved_by = Some("alice".into());
        assert!(bp.approval_invariant_holds());
    }

    #[test]
    fn version_bump_increments_patch_only() {
        let v = Version::INITIAL.bump_patch();
        assert_eq!(v, Version { major: 0, minor: 1, patch: 1 });
        assert!(v > Version::INITIAL);
    }

    #[test]
    fn module_effective_root_falls_back_to_src_convention() {
        let m = module("billing", &[]);
        assert_eq!(m.effective_root(), "src/billing");
    }
}
