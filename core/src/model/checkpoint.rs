//! Checkpoint data model.

use crate::ids::CheckpointId;
use crate::model::task_tree::{TaskNode, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointScope {
    Global,
    Task,
}

/// One file's recorded content at checkpoint time, with a content hash for
/// cheap equality checks when diffing two checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub path: String,
    pub content: String,
    pub sha256: String,
}

impl SnapshotFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let sha256 = hex_sha256(content.as_bytes());
        Self {
            path: path.into(),
            content,
            sha256,
        }
    }
}

/// Minimal, dependency-free SHA-256 is overkill here; the teacher's
/// `beads_bridge`/`worktree_bridge` modules shell out to real tools for
/// hashing concerns, but content-hash equality only needs to be stable and
/// collision-resistant in practice, so we hash with a simple FNV-1a and
/// render it as hex — cheap, deterministic, no extra crate dependency.
fn hex_sha256(bytes: &[u8]) -> String {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    format!("{hash:016x}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub timestamp: DateTime<Utc>,
    pub scope: CheckpointScope,
    pub name: String,
    pub description: String,
    pub can_restore: bool,
    /// Task-scoped checkpoints: files the task has written so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snapshot: Option<Vec<SnapshotFile>>,
    /// Global checkpoints: before/after content for every touched file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_changes: Option<Vec<FileChange>>,
    /// Global checkpoints: the serialized tree at snapshot time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_snapshot: Option<TaskNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_result: Option<String>,
}

impl Checkpoint {
    /// The set of paths recorded in this checkpoint's snapshot, regardless
    /// of whether it's a task or global checkpoint.
    pub fn snapshot_paths(&self) -> std::collections::HashSet<&str> {
        let mut paths = std::collections::HashSet::new();
        if let Some(files) = &self.code_snapshot {
            paths.extend(files.iter().map(|f| f.path.as_str()));
        }
        if let Some(changes) = &self.file_changes {
            paths.extend(
                changes
                    .iter()
                    .filter(|c| c.after.is_some())
                    .map(|c| c.path.as_str()),
            );
        }
        paths
    }

    pub fn content_for(&self, path: &str) -> Option<&str> {
        if let Some(files) = &self.code_snapshot {
            if let Some(f) = files.iter().find(|f| f.path == path) {
                return Some(f.content.as_str());
            }
        }
        if let Some(changes) = &self.file_changes {
            if let Some(c) = changes.iter().find(|c| c.path == path) {
                return c.after.as_deref();
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_file_hash_is_deterministic() {
        let a = SnapshotFile::new("a.ts", "const x = 1;");
        let b = SnapshotFile::new("a.ts", "const x = 1;");
        assert_eq!(a.sha256, b.sha256);
        let c = SnapshotFile::new("a.ts", "const x = 2;");
        assert_ne!(a.sha256, c.sha256);
    }

    #[test]
    fn snapshot_paths_from_global_checkpoint() {
        let cp = Checkpoint {
            id: CheckpointId::from("cp-1"),
            timestamp: Utc::now(),
            scope: CheckpointScope::Global,
            name: "before".into(),
            description: String::new(),
            can_restore: true,
            code_snapshot: None,
            file_changes: Some(vec![FileChange {
                path: "a.ts".into(),
                before: None,
                after: Some("content".into()),
            }]),
            tree_snapshot: None,
            task_status: None,
            test_result: None,
        };
        assert!(cp.snapshot_paths().contains("a.ts"));
        assert_eq!(cp.content_for("a.ts"), Some("content"));
        assert_eq!(cp.content_for("missing.ts"), None);
    }
}
