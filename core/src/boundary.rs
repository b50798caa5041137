//! BoundaryChecker.
//!
//! Confirms a proposed write path falls inside a task's safety boundary
//! before any worker writes a byte. Path handling follows the same
//! discipline as the teacher's worktree isolation layer: never trust a
//! caller-supplied path directly, always resolve it relative to the
//! project root and reject anything that walks outside that root.

use crate::error::{CoreError, CoreResult};
use crate::ids::ModuleId;
use crate::model::{Module, SafetyBoundary};
use std::path::{Component, Path, PathBuf};

pub struct BoundaryChecker {
    project_root: PathBuf,
}

impl BoundaryChecker {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Resolves `path` (which may be relative or absolute) against the
    /// project root, collapsing `.`/`..` components purely lexically — no
    /// filesystem access, so this works against paths that don't exist yet.
    /// Returns `None` if the resolved path climbs above the project root.
    fn normalize(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.project_root.join(candidate)
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return None;
                    }
                }
                Component::CurDir => {}
                other => normalized.push(other.as_os_str()),
            }
        }
        if normalized.starts_with(&self.project_root) {
            Some(normalized)
        } else {
            None
        }
    }

    /// A path is allowed for a task if it normalizes inside the project
    /// root, and (when the task is scoped to specific modules) falls under
    /// at least one of those modules' effective roots, and is not forbidden
    /// by the safety boundary.
    pub fn check_write(
        &self,
        task_id: &str,
        path: &str,
        boundary: &SafetyBoundary,
        scoped_modules: &[Module],
    ) -> CoreResult<()> {
        let normalized = self.normalize(path).ok_or_else(|| {
            CoreError::boundary_violation(task_id, path, "path escapes project root")
        })?;
        let relative = normalized
            .strip_prefix(&self.project_root)
            .unwrap_or(&normalized)
            .to_string_lossy()
            .replace('\\', "/");

        for forbidden in &boundary.forbidden_paths {
            if path_matches(&relative, forbidden) {
                return Err(CoreError::boundary_violation(
                    task_id,
                    path,
                    format!("matches forbidden pattern {forbidden}"),
                ));
            }
        }

        if !boundary.allowed_paths.is_empty()
            && !boundary
                .allowed_paths
                .iter()
                .any(|allowed| path_matches(&relative, allowed))
        {
            return Err(CoreError::boundary_violation(
                task_id,
                path,
                "not under any allowed path",
            ));
        }

        if !scoped_modules.is_empty() {
            let module_allows = scoped_modules
                .iter()
                .any(|m| relative.starts_with(&m.effective_root()));
            if !module_allows {
                return Err(CoreError::boundary_violation(
                    task_id,
                    path,
                    "outside the task's assigned module roots",
                ));
            }
        }

        Ok(())
    }

    pub fn module_allowed(
        &self,
        task_id: &str,
        module_id: &ModuleId,
        boundary: &SafetyBoundary,
    ) -> CoreResult<()> {
        if boundary.module_allowed(module_id) {
            Ok(())
        } else {
            Err(CoreError::boundary_violation(
                task_id,
                module_id.to_string(),
                "module is not permitted by the safety boundary",
            ))
        }
    }
}

/// `pattern` is matched with `globset`; a trailing `/**` additionally
/// matches the prefix itself (not just paths under it), and a pattern with
/// no `*` at all is a plain prefix match. BoundaryChecker builds a fresh
/// matcher per call rather than caching a `GlobSet`, since boundaries are
/// small, per-task lists rebuilt on every check.
fn path_matches(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        if path == prefix || path.starts_with(&format!("{prefix}/")) {
            return true;
        }
    }
    if !pattern.contains('*') {
        return path == pattern || path.starts_with(&format!("{pattern}/"));
    }
    globset::Glob::new(pattern)
        .map(|glob| glob.compile_matcher().is_match(path))
        .unwrap_or(false)
}
