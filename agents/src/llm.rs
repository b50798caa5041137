//! A concrete `LLMClient` talking to an OpenAI-compatible chat endpoint.
//!
//! Grounded in the teacher's `council::GeminiLibrarian`/`ClaudeArchitect`
//! members: a `reqwest::Client` built once with a generous timeout, a JSON
//! body posted to the configured URL, and the response's text content
//! unwrapped by hand rather than pulled in through a vendor SDK (the
//! teacher's own `SwarmConfig::Endpoint` already points at `.../v1` local
//! endpoints this shape talks to directly).

use async_trait::async_trait;
use devforge_core::capabilities::{Block, LLMClient, LLMResponse, Message, Role, ToolSchema};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Where to reach the model and how to authenticate, mirroring the
/// teacher's `Endpoint { url, model, api_key }`.
#[derive(Debug, Clone)]
pub struct LlmEndpointConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

impl LlmEndpointConfig {
    /// `DEVFORGE_LLM_URL` / `DEVFORGE_LLM_MODEL` / `DEVFORGE_LLM_API_KEY`,
    /// falling back to a local llama.cpp-style default (no key required).
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DEVFORGE_LLM_URL").unwrap_or_else(|_| "http://localhost:8080/v1".into()),
            model: std::env::var("DEVFORGE_LLM_MODEL").unwrap_or_else(|_| "default".into()),
            api_key: std::env::var("DEVFORGE_LLM_API_KEY").unwrap_or_else(|_| "not-needed".into()),
        }
    }
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    config: LlmEndpointConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmEndpointConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
            config,
        }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[async_trait]
impl LLMClient for HttpLlmClient {
    async fn create_message(
        &self,
        messages: &[Message],
        tools: Option<&[ToolSchema]>,
        system_prompt: Option<&str>,
    ) -> anyhow::Result<LLMResponse> {
        let mut chat_messages = Vec::with_capacity(messages.len() + 1);
        if let Some(system) = system_prompt {
            chat_messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for message in messages {
            chat_messages.push(serde_json::json!({
                "role": Self::role_str(message.role),
                "content": message.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": chat_messages,
            "temperature": 0.3,
        });
        if let Some(tools) = tools {
            let tool_defs: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(tool_defs);
        }

        let url = format!("{}/chat/completions", self.config.url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM endpoint returned {status}: {text}");
        }

        let payload: serde_json::Value = response.json().await?;
        let choice = &payload["choices"][0]["message"];

        let mut content = Vec::new();
        if let Some(text) = choice["content"].as_str() {
            if !text.is_empty() {
                content.push(Block::Text { text: text.to_string() });
            }
        }
        if let Some(calls) = choice["tool_calls"].as_array() {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
                let args_raw = call["function"]["arguments"].as_str().unwrap_or("{}");
                let input = serde_json::from_str(args_raw).unwrap_or(serde_json::json!({}));
                content.push(Block::ToolUse { name, input });
            }
        }

        Ok(LLMResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_str_maps_every_variant() {
        assert_eq!(HttpLlmClient::role_str(Role::System), "system");
        assert_eq!(HttpLlmClient::role_str(Role::User), "user");
        assert_eq!(HttpLlmClient::role_str(Role::Assistant), "assistant");
    }

    #[test]
    fn from_env_falls_back_to_local_defaults() {
        std::env::remove_var("DEVFORGE_LLM_URL");
        std::env::remove_var("DEVFORGE_LLM_MODEL");
        std::env::remove_var("DEVFORGE_LLM_API_KEY");
        let config = LlmEndpointConfig::from_env();
        assert_eq!(config.url, "http://localhost:8080/v1");
        assert_eq!(config.model, "default");
        assert_eq!(config.api_key, "not-needed");
    }

    #[test]
    fn response_parsing_extracts_text_and_tool_calls() {
        let payload = serde_json::json!({
            "choices": [{
                "message": {
                    "content": "here's the plan",
                    "tool_calls": [{
                        "function": {
                            "name": "write_file",
                            "arguments": "{\"path\":\"src/lib.rs\"}"
                        }
                    }]
                }
            }]
        });
        let choice = &payload["choices"][0]["message"];

        let mut content = Vec::new();
        if let Some(text) = choice["content"].as_str() {
            if !text.is_empty() {
                content.push(Block::Text { text: text.to_string() });
            }
        }
        if let Some(calls) = choice["tool_calls"].as_array() {
            for call in calls {
                let name = call["function"]["name"].as_str().unwrap_or_default().to_string();
                let args_raw = call["function"]["arguments"].as_str().unwrap_or("{}");
                let input = serde_json::from_str(args_raw).unwrap_or(serde_json::json!({}));
                content.push(Block::ToolUse { name, input });
            }
        }

        assert_eq!(content.len(), 2);
        match &content[0] {
            Block::Text { text } => assert_eq!(text, "here's the plan"),
            _ => panic!("expected text block"),
        }
        match &content[1] {
            Block::ToolUse { name, input } => {
                assert_eq!(name, "write_file");
                assert_eq!(input["path"], "src/lib.rs");
            }
            _ => panic!("expected tool use block"),
        }
    }
}
