//! OpenAI-compatible Provider
//!
//! Chat Completions API with native function calling. Works against any
//! server speaking the same wire format via `OPENAI_BASE_URL`.

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

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,

    /// API root, without trailing `/chat/completions`
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 120,
        }
    }

    /// `None` when `OPENAI_API_KEY` is unset
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        Some(config)
    }
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Convert agent messages to the chat format
    fn convert_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Assistant if m.has_tool_calls() => {
                    let content = Some(m.content.as_str()).filter(|c| !c.is_empty());
                    let tool_calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|call| json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments },
                        }))
                        .collect();
                    json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })
                }
                Role::Tool => json!({
                    "role": "tool",
                    "content": m.content,
                    "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                }),
                role => json!({ "role": role.to_string(), "content": m.content }),
            })
            .collect()
    }

    /// Request body; tool definitions are omitted entirely when there are none
    fn build_request(messages: &[Message], options: &GenerationOptions, tools: &[ToolSchema]) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": Self::convert_messages(messages),
            "temperature": options.temperature,
        });

        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_json(),
                    },
                }))
                .collect();
        }
        body
    }

    fn parse_response(body: Value) -> Result<Completion> {
        let response: ChatResponse = serde_json::from_value(body)?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("response contained no choices".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let id = call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                ToolCall::new(id, call.function.name, call.function.arguments)
            })
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("tool_calls" | "function_call") => FinishReason::ToolUse,
            Some("content_filter") => FinishReason::ContentFilter,
            _ if !tool_calls.is_empty() => FinishReason::ToolUse,
            _ => FinishReason::Stop,
        };

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: Some(finish_reason),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: Option<String>,
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "openai".into(),
            supports_tools: true,
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.list_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
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
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&Self::build_request(messages, options, tools));

        let body = http::send_json("OpenAI", request).await?;
        Self::parse_response(body)
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let request = self
            .client
            .get(self.url("models"))
            .bearer_auth(&self.config.api_key);
        Ok(http::model_list(&http::send_json("OpenAI", request).await?))
    }
}
