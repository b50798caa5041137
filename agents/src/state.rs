//! On-disk persistence for the one blueprint/task-tree pair a `devforge`
//! project works on at a time.
//!
//! Every subcommand is a fresh process and `devforge-core`'s managers are
//! in-memory only, so this is the seam that makes the CLI feel like one
//! continuous session: `init` writes the file, every later subcommand
//! loads it into a fresh manager via `BlueprintManager::insert`/
//! `TaskTreeManager::restore`, and writes it back before exiting.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use devforge_core::model::{Blueprint, TaskTree};
use serde::{Deserialize, Serialize};

const STATE_FILE: &str = "state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub blueprint: Blueprint,
    pub tree: Option<TaskTree>,
}

impl ProjectState {
    fn path(project: &Path) -> PathBuf {
        project.join(".devforge").join(STATE_FILE)
    }

    pub fn load(project: &Path) -> Result<Self> {
        let path = Self::path(project);
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("no devforge project state at {} (run `devforge init` first)", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("corrupt project state at {}", path.display()))
    }

    pub fn save(&self, project: &Path) -> Result<()> {
        let path = Self::path(project);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, raw).with_context(|| format!("failed writing {}", path.display()))
    }
}
