//! Concrete capability adapters: a real subprocess runner and a real
//! filesystem store, so `devforge-core`'s managers never import
//! `tokio::process` or `tokio::fs` directly.
//!
//! `TokioProcessRunner` follows the teacher's `Verifier::run_gate`
//! pattern in `verifier/pipeline.rs`: `kill_on_drop(true)`, a dedicated
//! process group on unix so a timeout kills the whole subtree, and
//! `tokio::time::timeout` wrapping the spawn rather than a manual deadline
//! loop.

use async_trait::async_trait;
use devforge_core::capabilities::{FileStore, ProcessOutput, ProcessRunner, SpawnOptions};
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn spawn(
        &self,
        cmd: &str,
        args: &[String],
        opts: SpawnOptions,
    ) -> anyhow::Result<ProcessOutput> {
        let mut command = Command::new(cmd);
        command.args(args).kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &opts.env {
            command.env(key, value);
        }

        // New process group so a timeout kills the whole subtree (a test
        // runner's own spawned children included), not just the direct child.
        #[cfg(unix)]
        command.process_group(0);

        let timeout = opts.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let output = tokio::time::timeout(timeout, command.output()).await??;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }
}

/// Reads/writes files relative to nothing in particular — callers always
/// pass fully resolved paths (`BoundaryChecker` has already normalized
/// them against the project root before a `FileStore` method is called).
pub struct LocalFileStore;

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &Path) -> anyhow::Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write(&self, path: &Path, content: &str) -> anyhow::Result<()> {
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn mkdir_all(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn remove(&self, path: &Path) -> anyhow::Result<()> {
        if tokio::fs::metadata(path).await.is_ok() {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_file_store_round_trips_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/file.txt");
        let store = LocalFileStore;

        store.mkdir_all(path.parent().unwrap()).await.unwrap();
        store.write(&path, "hello").await.unwrap();
        assert!(store.exists(&path).await);
        assert_eq!(store.read(&path).await.unwrap(), "hello");

        store.remove(&path).await.unwrap();
        assert!(!store.exists(&path).await);
    }

    #[tokio::test]
    async fn process_runner_captures_exit_code_and_output() {
        let runner = TokioProcessRunner;
        let output = runner
            .spawn("echo", &["hi".to_string()], SpawnOptions::default())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout.trim(), "hi");
    }
}
