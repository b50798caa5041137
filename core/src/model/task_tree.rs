//! Task tree data model.

use crate::ids::{BlueprintId, ModuleId, TaskId, TaskTreeId, WorkerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Blocked,
    TestWriting,
    Coding,
    Testing,
    TestFailed,
    Passed,
    Review,
    Approved,
    Rejected,
    Cancelled,
}

impl TaskStatus {
    /// Statuses a dependency must reach for a downstream task to be
    /// considered unblocked.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, Self::Passed | Self::Approved)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Blocked => "blocked",
            Self::TestWriting => "test_writing",
            Self::Coding => "coding",
            Self::Testing => "testing",
            Self::TestFailed => "test_failed",
            Self::Passed => "passed",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceTest {
    pub name: String,
    pub path: String,
}

/// One node in the task tree. Leaf tasks (`children.is_empty()`) are the
/// unit of execution; parent status is derived from children, never set
/// directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub parent_id: Option<TaskId>,
    pub name: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub depth: u32,
    pub children: Vec<TaskNode>,
    pub dependencies: Vec<TaskId>,
    pub blueprint_module_id: Option<ModuleId>,
    pub test_spec: Option<String>,
    pub acceptance_tests: Vec<AcceptanceTest>,
    pub code_artifacts: Vec<FileRef>,
    pub retry_count: u32,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub owner: Option<WorkerId>,
    /// Stable insertion order, used to break ties deterministically when
    /// ordering tasks by priority.
    pub insertion_seq: u64,
}

impl TaskNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth-first, pre-order traversal including `self`.
    pub fn iter(&self) -> TaskNodeIter<'_> {
        TaskNodeIter {
            stack: vec![self],
        }
    }

    pub fn iter_mut(&mut self) -> TaskNodeIterMut<'_> {
        TaskNodeIterMut {
            stack: vec![self],
        }
    }

    pub fn find(&self, id: &TaskId) -> Option<&TaskNode> {
        self.iter().find(|n| &n.id == id)
    }

    pub fn find_mut(&mut self, id: &TaskId) -> Option<&mut TaskNode> {
        self.iter_mut().find(|n| &n.id == id)
    }
}

pub struct TaskNodeIter<'a> {
    stack: Vec<&'a TaskNode>,
}

impl<'a> Iterator for TaskNodeIter<'a> {
    type Item = &'a TaskNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

pub struct TaskNodeIterMut<'a> {
    stack: Vec<&'a mut TaskNode>,
}

impl<'a> Iterator for TaskNodeIterMut<'a> {
    type Item = &'a mut TaskNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        for child in node.children.iter_mut().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskTreeStats {
    pub total_tasks: usize,
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTree {
    pub id: TaskTreeId,
    pub blueprint_id: BlueprintId,
    pub root: TaskNode,
    pub checkpoints: Vec<crate::model::checkpoint::Checkpoint>,
    pub stats: TaskTreeStats,
}

impl TaskTree {
    pub fn find(&self, id: &TaskId) -> Option<&TaskNode> {
        self.root.find(id)
    }

    pub fn find_mut(&mut self, id: &TaskId) -> Option<&mut TaskNode> {
        self.root.find_mut(id)
    }

    pub fn recompute_stats(&mut self) {
        let mut stats = TaskTreeStats::default();
        for node in self.root.iter() {
            if node.is_leaf() {
                stats.total_tasks += 1;
                match node.status {
                    TaskStatus::Passed | TaskStatus::Approved => stats.passed += 1,
                    TaskStatus::Rejected | TaskStatus::TestFailed => stats.failed += 1,
                    _ => {}
                }
            }
        }
        self.stats = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, seq: u64) -> TaskNode {
        TaskNode {
            id: TaskId::from(id),
            parent_id: None,
            name: id.into(),
            description: String::new(),
            status: TaskStatus::Pending,
            priority: 0,
            depth: 1,
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
            insertion_seq: seq,
        }
    }

    #[test]
    fn find_traverses_nested_children() {
        let mut root = leaf("root", 0);
        root.depth = 0;
        root.children.push(leaf("child", 1));
        assert!(root.find(&TaskId::from("child")).is_some());
        assert!(root.find(&TaskId::from("missing")).is_none());
    }

    #[test]
    fn satisfies_dependency_only_for_passed_or_approved() {
        assert!(TaskStatus::Passed.satisfies_dependency());
        assert!(TaskStatus::Approved.satisfies_dependency());
        assert!(!TaskStatus::TestFailed.satisfies_dependency());
        assert!(!TaskStatus::Pending.satisfies_dependency());
    }

    #[test]
    fn recompute_stats_counts_leaves_only() {
        let mut root = leaf("root", 0);
        root.depth = 0;
        let mut child_a = leaf("a", 1);
        child_a.status = TaskStatus::Passed;
        let child_b = leaf("b", 2);
        root.children = vec![child_a, child_b];

        let mut tree = TaskTree {
            id: TaskTreeId::from("tree-1"),
            blueprint_id: BlueprintId::from("bp-1"),
            root,
            checkpoints: vec![],
            stats: TaskTreeStats::default(),
        };
        tree.recompute_stats();
        assert_eq!(tree.stats.total_tasks, 2);
        assert_eq!(tree.stats.passed, 1);
    }
}
