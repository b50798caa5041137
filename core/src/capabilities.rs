//! Capability interfaces — the leaf dependencies of the system.
//!
//! `LLMClient`, `ProcessRunner`, and `FileStore` are the three external
//! collaborators the orchestrator is injected with. None of them are
//! implemented in this crate; `devforge-agents` supplies concrete adapters
//! (a real subprocess runner, a real filesystem store) and callers supply
//! their own `LLMClient`. Keeping these as small trait objects rather than
//! dynamic class composition keeps the orchestrator testable against fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A single message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool schema the model may call (opaque JSON schema payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One block of an LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    ToolUse { name: String, input: serde_json::Value },
}

/// The completed response to a `createMessage` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Vec<Block>,
}

impl LLMResponse {
    /// Concatenate every text block, ignoring tool-use blocks. Most of the
    /// TDD phases only care about the model's prose/code response.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                Block::ToolUse { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The opaque LLM vendor client. Implementations talk HTTP to whatever
/// provider is configured; this crate never depends on a vendor SDK.
#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn create_message(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<LLMResponse>;
}

/// Options for a subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

/// The result of a subprocess invocation. `ProcessRunner::spawn` must not
/// throw on a non-zero exit code — only on spawn failure or timeout.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Out-of-process command execution (tests, type-check, git, package
/// managers). Long-running I/O happens here, outside the cooperative event
/// loop, bounded by the coordinator's worker pool.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn spawn(
        &self,
        cmd: &str,
        args: &[String],
        opts: SpawnOptions,
    ) -> anyhow::Result<ProcessOutput>;
}

/// Filesystem access abstraction so BoundaryChecker and checkpoint
/// snapshotting can be tested against an in-memory store.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &std::path::Path) -> anyhow::Result<String>;
    async fn write(&self, path: &std::path::Path, content: &str) -> anyhow::Result<()>;
    async fn mkdir_all(&self, path: &std::path::Path) -> anyhow::Result<()>;
    async fn remove(&self, path: &std::path::Path) -> anyhow::Result<()>;
    async fn exists(&self, path: &std::path::Path) -> bool;
}

/// Opaque output of an external codebase scanner, consumed but never
/// produced by this crate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodebaseInfo {
    /// Directory paths discovered, relative to the project root.
    pub directories: Vec<String>,
    /// Files discovered, relative to the project root.
    pub files: Vec<String>,
    /// Languages detected, keyed by file extension.
    pub languages: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_text_ignores_tool_use() {
        let resp = LLMResponse {
            content: vec![
                Block::Text {
                    text: "hello".into(),
                },
                Block::ToolUse {
                    name: "write_file".into(),
                    input: serde_json::json!({}),
                },
                Block::Text {
                    text: "world".into(),
                },
            ],
        };
        assert_eq!(resp.text(), "hello\nworld");
    }

    #[test]
    fn process_output_success() {
        let out = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
        };
        assert!(out.success());
        let out = ProcessOutput {
            exit_code: Some(1),
            ..out
        };
        assert!(!out.success());
    }
}
