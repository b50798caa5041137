//! Bootstrap-time filesystem scan feeding `ReverseBlueprintClassifier`.
//!
//! Walks a project root the same way the teacher's file-discovery layer
//! does — respecting `.gitignore` via the `ignore` crate rather than a
//! hand-rolled directory skip-list — and reports it as a `CodebaseInfo`.

use crate::capabilities::CodebaseInfo;
use ignore::WalkBuilder;
use std::path::Path;

/// Scans `root` for files and directories, populating a `CodebaseInfo` a
/// `ReverseBlueprintClassifier` can group into modules. `.devforge` (this
/// project's own state directory) is always excluded in addition to
/// whatever `.gitignore` rules the walked tree declares.
pub fn scan_codebase(root: &Path) -> CodebaseInfo {
    let mut info = CodebaseInfo::default();
    let walker = WalkBuilder::new(root)
        .git_ignore(true)
        .require_git(false)
        .hidden(false)
        .filter_entry(|entry| entry.file_name() != ".devforge")
        .build();

    for entry in walker.flatten() {
        let path = entry.path();
        if path == root {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        match entry.file_type() {
            Some(ft) if ft.is_dir() => info.directories.push(relative),
            Some(ft) if ft.is_file() => {
                if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                    *info.languages.entry(ext.to_string()).or_insert(0) += 1;
                }
                info.files.push(relative);
            }
            _ => {}
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_files_and_skips_devforge_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/auth")).unwrap();
        std::fs::write(dir.path().join("src/auth/login.ts"), "x").unwrap();
        std::fs::create_dir_all(dir.path().join(".devforge")).unwrap();
        std::fs::write(dir.path().join(".devforge/state.json"), "{}").unwrap();

        let info = scan_codebase(dir.path());
        assert!(info.files.iter().any(|f| f == "src/auth/login.ts"));
        assert!(!info.files.iter().any(|f| f.starts_with(".devforge")));
        assert_eq!(info.languages.get("ts"), Some(&1));
    }

    #[test]
    fn respects_gitignore_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "ignored.txt\n").unwrap();
        std::fs::write(dir.path().join("ignored.txt"), "x").unwrap();
        std::fs::write(dir.path().join("kept.txt"), "x").unwrap();

        let info = scan_codebase(dir.path());
        assert!(info.files.iter().any(|f| f == "kept.txt"));
        assert!(!info.files.iter().any(|f| f == "ignored.txt"));
    }
}
