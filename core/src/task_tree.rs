//! TaskTreeManager.
//!
//! Owns a single project's TaskTree: generation from an approved blueprint,
//! status mutation, the executable-set computation workers poll for claims,
//! and task/global checkpoint creation and rollback. Checkpoint handling
//! mirrors the teacher's `StateStore::checkpoint`/`restore` pairing in
//! `state/store.rs` — a checkpoint records enough to reconstruct state, and
//! rollback replaces the live tree wholesale rather than patching it.

use crate::error::{CoreError, CoreResult};
use crate::ids::{Clock, IdGenerator, TaskId, TaskTreeId};
use crate::model::{
    AcceptanceTest, Blueprint, Checkpoint, CheckpointScope, FileChange, FileRef, SnapshotFile,
    TaskNode, TaskStatus, TaskTree,
};
use std::sync::{Arc, RwLock};

pub struct TaskTreeManager {
    tree: Arc<RwLock<Option<TaskTree>>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl TaskTreeManager {
    pub fn new(ids: Arc<dyn IdGenerator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tree: Arc::new(RwLock::new(None)),
            ids,
            clock,
        }
    }

    /// One leaf task per module responsibility and per declared interface,
    /// grouped under a root node per module so the tree mirrors the
    /// blueprint's module boundaries, plus one root per `BusinessProcess`
    /// whose step tasks chain on the previous step in declaration order.
    /// Dependencies are derived from each module's declared `dependencies`:
    /// a task for module B that depends on module A gets module A's tasks
    /// as prerequisites.
    pub fn generate_from_blueprint(&self, blueprint: &Blueprint) -> CoreResult<TaskTree> {
        let mut seq: u64 = 0;
        let mut module_root_tasks = std::collections::HashMap::new();
        let mut module_roots = Vec::new();

        for module in &blueprint.modules {
            let mut children = Vec::new();
            for responsibility in &module.responsibilities {
                seq += 1;
                children.push(TaskNode {
                    id: TaskId::new(self.ids.next_id("task")),
                    parent_id: None,
                    name: responsibility.clone(),
                    description: format!("{}: {responsibility}", module.name),
                    status: TaskStatus::Pending,
                    priority: 0,
                    depth: 2,
                    children: vec![],
                    dependencies: vec![],
                    blueprint_module_id: Some(module.id.clone()),
                    test_spec: None,
                    acceptance_tests: Vec::<AcceptanceTest>::new(),
                    code_artifacts: Vec::<FileRef>::new(),
                    retry_count: 0,
                    started_at: None,
                    completed_at: None,
                    owner: None,
                    insertion_seq: seq,
                });
            }
            for interface in &module.interfaces {
                seq += 1;
                children.push(TaskNode {
                    id: TaskId::new(self.ids.next_id("task")),
                    parent_id: None,
                    name: format!("interface: {}", interface.id),
                    description: format!(
                        "{}: {:?} {:?} interface {}",
                        module.name, interface.direction, interface.kind, interface.id
                    ),
                    status: TaskStatus::Pending,
                    priority: 0,
                    depth: 2,
                    children: vec![],
                    dependencies: vec![],
                    blueprint_module_id: Some(module.id.clone()),
                    test_spec: None,
                    acceptance_tests: Vec::<AcceptanceTest>::new(),
                    code_artifacts: Vec::<FileRef>::new(),
                    retry_count: 0,
                    started_at: None,
                    completed_at: None,
                    owner: None,
                    insertion_seq: seq,
                });
            }
            seq += 1;
            let module_task_ids: Vec<TaskId> = children.iter().map(|c| c.id.clone()).collect();
            let root_task = TaskNode {
                id: TaskId::new(self.ids.next_id("task")),
                parent_id: None,
                name: module.name.clone(),
                description: module.description.clone(),
                status: TaskStatus::Pending,
                priority: 0,
                depth: 1,
                children,
                dependencies: vec![],
                blueprint_module_id: Some(module.id.clone()),
                test_spec: None,
                acceptance_tests: vec![],
                code_artifacts: vec![],
                retry_count: 0,
                started_at: None,
                completed_at: None,
                owner: None,
                insertion_seq: seq,
            };
            module_root_tasks.insert(module.id.clone(), module_task_ids);
            module_roots.push(root_task);
        }

        // Wire inter-module dependencies: every leaf task under module X
        // depends on every leaf task under each module X declares as a
        // dependency.
        for module in &blueprint.modules {
            if module.dependencies.is_empty() {
                continue;
            }
            let mut prereqs = Vec::new();
            for dep_id in &module.dependencies {
                if let Some(tasks) = module_root_tasks.get(dep_id) {
                    prereqs.extend(tasks.iter().cloned());
                }
            }
            if let Some(root) = module_roots
                .iter_mut()
                .find(|r| r.blueprint_module_id.as_ref() == Some(&module.id))
            {
                for child in root.children.iter_mut() {
                    child.dependencies = prereqs.clone();
                }
            }
        }

        // One root per BusinessProcess, with its steps chained in order:
        // step N depends on step N-1's task so execution preserves the
        // process's declared order.
        let mut process_roots = Vec::new();
        for process in &blueprint.processes {
            let mut steps: Vec<&crate::model::ProcessStep> = process.steps.iter().collect();
            steps.sort_by_key(|s| s.order);

            let mut children = Vec::new();
            let mut previous: Option<TaskId> = None;
            for step in steps {
                seq += 1;
                let id = TaskId::new(self.ids.next_id("task"));
                children.push(TaskNode {
                    id: id.clone(),
                    parent_id: None,
                    name: step.name.clone(),
                    description: format!("{}: step {} — {}", process.name, step.order, step.description),
                    status: TaskStatus::Pending,
                    priority: 0,
                    depth: 2,
                    children: vec![],
                    dependencies: previous.into_iter().collect(),
                    blueprint_module_id: None,
                    test_spec: None,
                    acceptance_tests: Vec::<AcceptanceTest>::new(),
                    code_artifacts: Vec::<FileRef>::new(),
                    retry_count: 0,
                    started_at: None,
                    completed_at: None,
                    owner: None,
                    insertion_seq: seq,
                });
                previous = Some(id);
            }

            seq += 1;
            process_roots.push(TaskNode {
                id: TaskId::new(self.ids.next_id("task")),
                parent_id: None,
                name: process.name.clone(),
                description: process.description.clone(),
                status: TaskStatus::Pending,
                priority: 0,
                depth: 1,
                children,
                dependencies: vec![],
                blueprint_module_id: None,
                test_spec: None,
                acceptance_tests: vec![],
                code_artifacts: vec![],
                retry_count: 0,
                started_at: None,
                completed_at: None,
                owner: None,
                insertion_seq: seq,
            });
        }

        let mut roots = module_roots;
        roots.extend(process_roots);

        let root = TaskNode {
            id: TaskId::new(self.ids.next_id("task")),
            parent_id: None,
            name: blueprint.name.clone(),
            description: blueprint.description.clone(),
            status: TaskStatus::Pending,
            priority: 0,
            depth: 0,
            children: roots,
            dependencies: vec![],
            blueprint_module_id: None,
            test_spec: None,
            acceptance_tests: vec![],
            code_artifacts: vec![],
            retry_count: 0,
            started_at: None,
            completed_at: None,
            owner: None,
            insertion_seq: 0,
        };

        let mut tree = TaskTree {
            id: TaskTreeId::new(self.ids.next_id("tree")),
            blueprint_id: blueprint.id.clone(),
            root,
            checkpoints: vec![],
            stats: Default::default(),
        };
        tree.recompute_stats();

        *self.tree.write().expect("task tree lock poisoned") = Some(tree.clone());
        Ok(tree)
    }

    fn with_tree<R>(&self, f: impl FnOnce(&TaskTree) -> CoreResult<R>) -> CoreResult<R> {
        let guard = self.tree.read().expect("task tree lock poisoned");
        let tree = guard
            .as_ref()
            .ok_or_else(|| CoreError::not_found("TaskTree", "current"))?;
        f(tree)
    }

    fn with_tree_mut<R>(&self, f: impl FnOnce(&mut TaskTree) -> CoreResult<R>) -> CoreResult<R> {
        let mut guard = self.tree.write().expect("task tree lock poisoned");
        let tree = guard
            .as_mut()
            .ok_or_else(|| CoreError::not_found("TaskTree", "current"))?;
        f(tree)
    }

    pub fn list_checkpoints(&self) -> CoreResult<Vec<Checkpoint>> {
        self.with_tree(|tree| Ok(tree.checkpoints.clone()))
    }

    /// The live tree, for callers that persist it wholesale (a CLI's
    /// `status`/`diff` commands) rather than going through a narrower accessor.
    pub fn current(&self) -> CoreResult<TaskTree> {
        self.with_tree(|tree| Ok(tree.clone()))
    }

    /// Replaces the live tree with one loaded from disk, mirroring the
    /// teacher's `StateStore::restore` — used to resume a tree a previous
    /// process generated rather than regenerating it from the blueprint.
    pub fn restore(&self, tree: TaskTree) {
        *self.tree.write().expect("task tree lock poisoned") = Some(tree);
    }

    pub fn find_task(&self, id: &TaskId) -> CoreResult<TaskNode> {
        self.with_tree(|tree| {
            tree.find(id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("Task", id.to_string()))
        })
    }

    /// Leaf tasks that are `Pending`, not `Blocked`, and whose every
    /// dependency has reached a status satisfying `TaskStatus::satisfies_dependency`.
    /// Ordered by `priority` descending, then `insertion_seq` ascending.
    pub fn get_executable_tasks(&self) -> CoreResult<Vec<TaskNode>> {
        self.with_tree(|tree| {
            let mut executable: Vec<TaskNode> = tree
                .root
                .iter()
                .filter(|node| node.is_leaf() && node.status == TaskStatus::Pending)
                .filter(|node| {
                    node.dependencies.iter().all(|dep_id| {
                        tree.find(dep_id)
                            .map(|dep| dep.status.satisfies_dependency())
                            .unwrap_or(false)
                    })
                })
                .cloned()
                .collect();
            executable.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.insertion_seq.cmp(&b.insertion_seq))
            });
            Ok(executable)
        })
    }

    pub fn mark_status(&self, id: &TaskId, status: TaskStatus) -> CoreResult<TaskNode> {
        let now = self.clock.now();
        self.with_tree_mut(|tree| {
            let node = tree
                .find_mut(id)
                .ok_or_else(|| CoreError::not_found("Task", id.to_string()))?;
            node.status = status;
            match status {
                TaskStatus::Coding | TaskStatus::TestWriting if node.started_at.is_none() => {
                    node.started_at = Some(now);
                }
                TaskStatus::Passed | TaskStatus::Approved | TaskStatus::Rejected => {
                    node.completed_at = Some(now);
                }
                _ => {}
            }
            let result = node.clone();
            tree.recompute_stats();
            Ok(result)
        })
    }

    pub fn record_acceptance_test_result(
        &self,
        id: &TaskId,
        test: AcceptanceTest,
    ) -> CoreResult<TaskNode> {
        self.with_tree_mut(|tree| {
            let node = tree
                .find_mut(id)
                .ok_or_else(|| CoreError::not_found("Task", id.to_string()))?;
            node.acceptance_tests.push(test);
            Ok(node.clone())
        })
    }

    pub fn create_task_checkpoint(
        &self,
        task_id: &TaskId,
        name: impl Into<String>,
        files: Vec<SnapshotFile>,
    ) -> CoreResult<Checkpoint> {
        let checkpoint = Checkpoint {
            id: crate::ids::CheckpointId::new(self.ids.next_id("cp")),
            timestamp: self.clock.now(),
            scope: CheckpointScope::Task,
            name: name.into(),
            description: format!("task checkpoint for {task_id}"),
            can_restore: true,
            code_snapshot: Some(files),
            file_changes: None,
            tree_snapshot: None,
            task_status: Some(self.find_task(task_id)?.status),
            test_result: None,
        };
        self.with_tree_mut(|tree| {
            tree.checkpoints.push(checkpoint.clone());
            Ok(())
        })?;
        Ok(checkpoint)
    }

    pub fn create_global_checkpoint(
        &self,
        name: impl Into<String>,
        file_changes: Vec<FileChange>,
    ) -> CoreResult<Checkpoint> {
        let tree_snapshot = self.with_tree(|tree| Ok(tree.root.clone()))?;
        let checkpoint = Checkpoint {
            id: crate::ids::CheckpointId::new(self.ids.next_id("cp")),
            timestamp: self.clock.now(),
            scope: CheckpointScope::Global,
            name: name.into(),
            description: "global checkpoint".into(),
            can_restore: true,
            code_snapshot: None,
            file_changes: Some(file_changes),
            tree_snapshot: Some(tree_snapshot),
            task_status: None,
            test_result: None,
        };
        self.with_tree_mut(|tree| {
            tree.checkpoints.push(checkpoint.clone());
            Ok(())
        })?;
        Ok(checkpoint)
    }

    /// Restores a task's status and code artifacts from a task-scoped
    /// checkpoint; does not touch sibling tasks.
    pub fn rollback_to_checkpoint(
        &self,
        checkpoint_id: &crate::ids::CheckpointId,
    ) -> CoreResult<TaskNode> {
        self.with_tree_mut(|tree| {
            let checkpoint = tree
                .checkpoints
                .iter()
                .find(|c| &c.id == checkpoint_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("Checkpoint", checkpoint_id.to_string()))?;
            if checkpoint.scope != CheckpointScope::Task {
                return Err(CoreError::invalid_state(
                    "Checkpoint",
                    checkpoint_id.to_string(),
                    "task",
                    "global",
                ));
            }
            let files = checkpoint.code_snapshot.clone().unwrap_or_default();
            let status = checkpoint
                .task_status
                .ok_or_else(|| CoreError::GateFailure("checkpoint missing task status".into()))?;

            // A task checkpoint doesn't record which task it belongs to
            // directly, so the caller is expected to have looked it up by
            // description; find the first task whose current code
            // artifacts overlap the snapshot paths.
            let snapshot_paths: std::collections::HashSet<&str> =
                files.iter().map(|f| f.path.as_str()).collect();
            let node = tree
                .root
                .iter_mut()
                .find(|n| {
                    n.code_artifacts
                        .iter()
                        .any(|f| snapshot_paths.contains(f.path.as_str()))
                        || n.status == status
                })
                .ok_or_else(|| CoreError::not_found("Task", "matching checkpoint"))?;
            node.status = status;
            node.code_artifacts = files
                .into_iter()
                .map(|f| FileRef {
                    path: f.path,
                    content_hash: f.sha256,
                })
                .collect();
            let result = node.clone();
            tree.recompute_stats();
            Ok(result)
        })
    }

    /// Replaces the entire live tree with the snapshot recorded in a
    /// global checkpoint.
    pub fn rollback_to_global_checkpoint(
        &self,
        checkpoint_id: &crate::ids::CheckpointId,
    ) -> CoreResult<TaskTree> {
        self.with_tree_mut(|tree| {
            let checkpoint = tree
                .checkpoints
                .iter()
                .find(|c| &c.id == checkpoint_id)
                .cloned()
                .ok_or_else(|| CoreError::not_found("Checkpoint", checkpoint_id.to_string()))?;
            if checkpoint.scope != CheckpointScope::Global {
                return Err(CoreError::invalid_state(
                    "Checkpoint",
                    checkpoint_id.to_string(),
                    "global",
                    "task",
                ));
            }
            let snapshot = checkpoint
                .tree_snapshot
                .clone()
                .ok_or_else(|| CoreError::GateFailure("checkpoint missing tree snapshot".into()))?;
            tree.root = snapshot;
            tree.recompute_stats();
            Ok(tree.clone())
        })
    }
}
