//! Anthropic Provider
//!
//! Messages API with `tool_use` / `tool_result` content blocks.

use std::time::Duration;

use agent_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, FinishReason, GenerationOptions, LlmProvider, ModelInfo, ProviderInfo,
        TokenUsage,
    },
    tool::{ToolCall, ToolSchema},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::http;

const API_VERSION: &str = "2023-06-01";

/// Anthropic provider configuration
#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,

    /// `max_tokens` is mandatory for this API; used when the agent sets none
    pub default_max_tokens: u32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".into(),
            default_max_tokens: 4096,
            timeout_secs: 120,
        }
    }

    /// `None` when `ANTHROPIC_API_KEY` is unset
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("ANTHROPIC_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Some(config)
    }
}

pub struct AnthropicProvider {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    pub fn from_config(config: AnthropicConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/v1/{}", self.config.base_url, path))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
    }

    /// Split out the system prompt and convert the rest to content blocks.
    ///
    /// Consecutive tool results are merged into one user turn.
    fn convert_messages(messages: &[Message]) -> (String, Vec<Value>) {
        let mut system = Vec::new();
        let mut converted: Vec<Value> = Vec::new();
        let mut pending_results: Vec<Value> = Vec::new();

        for m in messages {
            if m.role == Role::Tool {
                pending_results.push(json!({
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id.clone().unwrap_or_default(),
                    "content": m.content,
                }));
                continue;
            }
            if !pending_results.is_empty() {
                converted.push(json!({ "role": "user", "content": std::mem::take(&mut pending_results) }));
            }

            match m.role {
                Role::System => system.push(m.content.as_str()),
                Role::Assistant if m.has_tool_calls() => {
                    let mut blocks = Vec::new();
                    if !m.content.is_empty() {
                        blocks.push(json!({ "type": "text", "text": m.content }));
                    }
                    for call in &m.tool_calls {
                        let input: Value = serde_json::from_str(&call.arguments)
                            .ok()
                            .filter(Value::is_object)
                            .unwrap_or_else(|| json!({}));
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": input,
                        }));
                    }
                    converted.push(json!({ "role": "assistant", "content": blocks }));
                }
                Role::Assistant => converted.push(json!({ "role": "assistant", "content": m.content })),
                _ => converted.push(json!({ "role": "user", "content": m.content })),
            }
        }
        if !pending_results.is_empty() {
            converted.push(json!({ "role": "user", "content": pending_results }));
        }

        (system.join("\n\n"), converted)
    }

    fn build_request(&self, messages: &[Message], options: &GenerationOptions, tools: &[ToolSchema]) -> Value {
        let (system, converted) = Self::convert_messages(messages);
        let mut body = json!({
            "model": options.model,
            "max_tokens": options.max_tokens.unwrap_or(self.config.default_max_tokens),
            "temperature": options.temperature,
            "messages": converted,
        });

        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.parameters_json(),
                }))
                .collect();
        }
        body
    }

    fn parse_response(body: Value) -> Result<Completion> {
        let response: MessagesResponse = serde_json::from_value(body)?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                ContentBlock::Text { text: part } => text.push_str(&part),
                ContentBlock::ToolUse { id, name, input } => {
                    let id = if id.is_empty() {
                        format!("toolu_{}", uuid::Uuid::new_v4().simple())
                    } else {
                        id
                    };
                    tool_calls.push(ToolCall::new(id, name, input.to_string()));
                }
                ContentBlock::Other => {}
            }
        }

        let finish_reason = match response.stop_reason.as_deref() {
            Some("tool_use") => FinishReason::ToolUse,
            Some("max_tokens") => FinishReason::Length,
            _ if !tool_calls.is_empty() => FinishReason::ToolUse,
            _ => FinishReason::Stop,
        };

        Ok(Completion {
            content: text,
            tool_calls,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens.saturating_add(u.output_tokens),
            }),
            finish_reason: Some(finish_reason),
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "anthropic".into(),
            supports_tools: true,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Anthropic health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        tools: &[ToolSchema],
    ) -> Result<Completion> {
        let request = self
            .request(reqwest::Method::POST, "messages")
            .json(&self.build_request(messages, options, tools));

        let body = http::send_json("Anthropic", request).await?;
        Self::parse_response(body)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let request = self.request(reqwest::Method::GET, "models");
        Ok(http::model_list(&http::send_json("Anthropic", request).await?))
    }
}
