//! TimeTravelManager.
//!
//! Presents a tree's checkpoint list as a navigable history: diffing two
//! checkpoints, restoring one, and branching off a past checkpoint by
//! name. Built on top of `TaskTreeManager`'s checkpoint storage the same
//! way the teacher's higher-level coordination modules sit on top of
//! `StateStore` rather than duplicate its storage.
//!
//! The line-diff heuristic for `codeChanges` stays the simple symmetric
//! set-difference-of-lines approach named in the original design rather
//! than a real Myers diff: it is deterministic, cheap, and the diff output
//! is informational (for a human review summary), not applied to files.

use crate::ids::{BranchId, CheckpointId};
use crate::model::{Checkpoint, TaskStatus};
use crate::task_tree::TaskTreeManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChange {
    pub task_id: String,
    pub from_status: Option<TaskStatus>,
    pub to_status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeChangeKind {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeChange {
    pub path: String,
    pub kind: CodeChangeKind,
    pub lines_added: usize,
    pub lines_removed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDiff {
    pub task_changes: Vec<TaskChange>,
    pub code_changes: Vec<CodeChange>,
    pub time_elapsed_ms: i64,
}

struct Branch {
    name: String,
    checkpoint_id: CheckpointId,
}

pub struct TimeTravelManager {
    tree_manager: Arc<TaskTreeManager>,
    branches: RwLock<HashMap<BranchId, Branch>>,
    active_branch: RwLock<Option<BranchId>>,
    ids: Arc<dyn crate::ids::IdGenerator>,
}

impl TimeTravelManager {
    pub fn new(tree_manager: Arc<TaskTreeManager>, ids: Arc<dyn crate::ids::IdGenerator>) -> Self {
        Self {
            tree_manager,
            branches: RwLock::new(HashMap::new()),
            active_branch: RwLock::new(None),
            ids,
        }
    }

    fn find_checkpoint(&self, id: &CheckpointId) -> crate::error::CoreResult<Checkpoint> {
        self.tree_manager
            .list_checkpoints()?
            .into_iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| crate::error::CoreError::not_found("Checkpoint", id.to_string()))
    }

    pub fn list_checkpoints(&self) -> crate::error::CoreResult<Vec<Checkpoint>> {
        self.tree_manager.list_checkpoints()
    }

    /// Task status diffs between two checkpoints' tree snapshots, including
    /// nodes that appear or disappear between them (global checkpoints
    /// only — task checkpoints don't carry a tree snapshot).
    fn task_changes(from: &Checkpoint, to: &Checkpoint) -> Vec<TaskChange> {
        let mut from_statuses = HashMap::new();
        if let Some(tree) = &from.tree_snapshot {
            for node in tree.iter() {
                from_statuses.insert(node.id.to_string(), node.status);
            }
        }
        let mut to_statuses = HashMap::new();
        if let Some(tree) = &to.tree_snapshot {
            for node in tree.iter() {
                to_statuses.insert(node.id.to_string(), node.status);
            }
        }

        let mut ids: Vec<&String> = from_statuses.keys().chain(to_statuses.keys()).collect();
        ids.sort();
        ids.dedup();

        ids.into_iter()
            .filter_map(|id| {
                let from_status = from_statuses.get(id).copied();
                let to_status = to_statuses.get(id).copied();
                if from_status == to_status {
                    None
                } else {
                    Some(TaskChange {
                        task_id: id.clone(),
                        from_status,
                        to_status,
                    })
                }
            })
            .collect()
    }

    /// Symmetric set difference of line multisets between two contents,
    /// counted as (lines only `after` has, lines only `before` has).
    fn line_diff(before: &str, after: &str) -> (usize, usize) {
        let mut before_lines: Vec<&str> = before.lines().collect();
        let mut after_lines: Vec<&str> = after.lines().collect();
        before_lines.sort_unstable();
        after_lines.sort_unstable();

        let before_multiset: HashSet<&str> = before_lines.iter().copied().collect();
        let after_multiset: HashSet<&str> = after_lines.iter().copied().collect();

        let added = after_lines
            .iter()
            .filter(|l| !before_multiset.contains(*l))
            .count();
        let removed = before_lines
            .iter()
            .filter(|l| !after_multiset.contains(*l))
            .count();
        (added, removed)
    }

    fn code_changes(from: &Checkpoint, to: &Checkpoint) -> Vec<CodeChange> {
        let from_paths = from.snapshot_paths();
        let to_paths = to.snapshot_paths();
        let mut all_paths: Vec<&str> = from_paths.union(&to_paths).copied().collect();
        all_paths.sort_unstable();

        all_paths
            .into_iter()
            .filter_map(|path| {
                let before = from.content_for(path);
                let after = to.content_for(path);
                match (before, after) {
                    (None, Some(content)) => {
                        let (added, _) = Self::line_diff("", content);
                        Some(CodeChange {
                            path: path.to_string(),
                            kind: CodeChangeKind::Added,
                            lines_added: added,
                            lines_removed: 0,
                        })
                    }
                    (Some(content), None) => {
                        let (_, removed) = Self::line_diff(content, "");
                        Some(CodeChange {
                            path: path.to_string(),
                            kind: CodeChangeKind::Deleted,
                            lines_added: 0,
                            lines_removed: removed,
                        })
                    }
                    (Some(before), Some(after)) if before != after => {
                        let (added, removed) = Self::line_diff(before, after);
                        Some(CodeChange {
                            path: path.to_string(),
                            kind: CodeChangeKind::Modified,
                            lines_added: added,
                            lines_removed: removed,
                        })
                    }
                    _ => None,
                }
            })
            .collect()
    }

    pub fn compare(
        &self,
        from_id: &CheckpointId,
        to_id: &CheckpointId,
    ) -> crate::error::CoreResult<CheckpointDiff> {
        let from = self.find_checkpoint(from_id)?;
        let to = self.find_checkpoint(to_id)?;
        let time_elapsed_ms = (to.timestamp - from.timestamp).num_milliseconds();
        Ok(CheckpointDiff {
            task_changes: Self::task_changes(&from, &to),
            code_changes: Self::code_changes(&from, &to),
            time_elapsed_ms,
        })
    }

    /// Rolls back to `checkpoint_id` (global checkpoints only) and records
    /// a named branch pointing at it.
    pub fn create_branch(
        &self,
        checkpoint_id: &CheckpointId,
        name: impl Into<String>,
    ) -> crate::error::CoreResult<BranchId> {
        self.tree_manager
            .rollback_to_global_checkpoint(checkpoint_id)?;
        let branch_id = BranchId::new(self.ids.next_id("branch"));
        self.branches.write().expect("branch lock poisoned").insert(
            branch_id.clone(),
            Branch {
                name: name.into(),
                checkpoint_id: checkpoint_id.clone(),
            },
        );
        *self.active_branch.write().expect("branch lock poisoned") = Some(branch_id.clone());
        Ok(branch_id)
    }

    /// Local bookkeeping only: records which branch is "current" without
    /// touching the live tree.
    pub fn switch_branch(&self, branch_id: &BranchId) -> crate::error::CoreResult<()> {
        if !self
            .branches
            .read()
            .expect("branch lock poisoned")
            .contains_key(branch_id)
        {
            return Err(crate::error::CoreError::not_found(
                "Branch",
                branch_id.to_string(),
            ));
        }
        *self.active_branch.write().expect("branch lock poisoned") = Some(branch_id.clone());
        Ok(())
    }

    pub fn active_branch(&self) -> Option<BranchId> {
        self.active_branch.read().expect("branch lock poisoned").clone()
    }

    pub fn branch_name(&self, branch_id: &BranchId) -> Option<String> {
        self.branches
            .read()
            .expect("branch lock poisoned")
            .get(branch_id)
            .map(|b| b.name.clone())
    }

    pub fn branch_checkpoint(&self, branch_id: &BranchId) -> Option<CheckpointId> {
        self.branches
            .read()
            .expect("branch lock poisoned")
            .get(branch_id)
            .map(|b| b.checkpoint_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SequentialGenerator, SystemClock};
    use crate::model::{Blueprint, BlueprintStatus, Module, ModuleType};

    fn setup() -> (Arc<TaskTreeManager>, TimeTravelManager) {
        let ids = Arc::new(SequentialGenerator::new());
        let clock = Arc::new(SystemClock);
        let tree_mgr = Arc::new(TaskTreeManager::new(ids.clone(), clock));
        let bp = Blueprint {
            id: crate::ids::BlueprintId::from("bp-1"),
            name: "demo".into(),
            description: String::new(),
            project_path: "/tmp".into(),
            version: crate::model::Version::INITIAL,
            status: BlueprintStatus::Approved,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            approved_by: Some("a".into()),
            rejection_reason: None,
            modules: vec![Module {
                id: crate::ids::ModuleId::from("auth"),
                name: "auth".into(),
                description: String::new(),
                module_type: ModuleType::Backend,
                responsibilities: vec!["login".into()],
                dependencies: vec![],
                interfaces: vec![],
                tech_stack: vec![],
                root_path: None,
            }],
            processes: vec![],
            non_functional_requirements: vec![],
            design_images: vec![],
            tech_stack: Default::default(),
        };
        tree_mgr.generate_from_blueprint(&bp).unwrap();
        let time_travel = TimeTravelManager::new(tree_mgr.clone(), ids);
        (tree_mgr, time_travel)
    }

    #[test]
    fn compare_detects_modified_file_and_task_status_change() {
        let (tree_mgr, time_travel) = setup();
        let cp1 = tree_mgr
            .create_global_checkpoint("before", vec![])
            .unwrap();

        let task = tree_mgr.get_executable_tasks().unwrap().remove(0);
        tree_mgr.mark_status(&task.id, TaskStatus::Passed).unwrap();
        let cp2 = tree_mgr.create_global_checkpoint("after", vec![]).unwrap();

        let diff = time_travel.compare(&cp1.id, &cp2.id).unwrap();
        assert_eq!(diff.task_changes.len(), 1);
        assert_eq!(diff.task_changes[0].to_status, Some(TaskStatus::Passed));
    }

    #[test]
    fn create_branch_rolls_back_and_records_name() {
        let (tree_mgr, time_travel) = setup();
        let cp = tree_mgr
            .create_global_checkpoint("checkpoint-a", vec![])
            .unwrap();
        let branch_id = time_travel.create_branch(&cp.id, "experiment").unwrap();
        assert_eq!(time_travel.branch_name(&branch_id), Some("experiment".into()));
        assert_eq!(time_travel.active_branch(), Some(branch_id));
    }

    #[test]
    fn switch_branch_is_pure_bookkeeping() {
        let (tree_mgr, time_travel) = setup();
        let cp = tree_mgr.create_global_checkpoint("a", vec![]).unwrap();
        let branch = time_travel.create_branch(&cp.id, "b1").unwrap();
        let executable_before = tree_mgr.get_executable_tasks().unwrap().len();

        time_travel.switch_branch(&branch).unwrap();
        let executable_after = tree_mgr.get_executable_tasks().unwrap().len();
        assert_eq!(executable_before, executable_after);
    }

    #[test]
    fn code_line_diff_counts_symmetric_difference() {
        let (added, removed) =
            TimeTravelManager::line_diff("a\nb\nc", "a\nb\nd");
        assert_eq!(added, 1);
        assert_eq!(removed, 1);
    }
}
