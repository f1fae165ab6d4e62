//! Reasoning Loop
//!
//! The bounded generate → execute tools → regenerate cycle.
//!
//! ```text
//! Generating ──tool calls──▶ Executing ──batch done──▶ Generating ...
//!     │                                                    │
//!     └──no tool calls──▶ FinalAnswer ──streamed──▶ Done   └─ ceiling ─▶ Failed
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{AgentError, Result};
use crate::events::{EventBuffer, EventSink, StreamEvent, ToolCallEvent};
use crate::message::{ContextMessage, Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{AgentToolkit, ToolCall, ToolRegistry, ToolSource};

/// Default ceiling on generate/execute rounds
pub const DEFAULT_MAX_ITERATIONS: usize = 15;

/// Default pause between streamed characters
pub const DEFAULT_STREAM_DELAY: Duration = Duration::from_millis(10);

/// A configured persona: provider, model, prompt and sampling settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// Provider name, e.g. "openai" or "anthropic"
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Unset or zero means provider default
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 { 0.7 }

impl AgentProfile {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens.filter(|&n| n > 0),
        }
    }
}

/// Loop configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Maximum generate/execute rounds before giving up
    pub max_iterations: usize,

    /// Delay between streamed characters of the final answer
    pub stream_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            stream_delay: DEFAULT_STREAM_DELAY,
        }
    }
}

/// One user turn to answer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub message: String,
    #[serde(default)]
    pub context: Vec<ContextMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl InferenceRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

/// Final answer plus what happened on the way
#[derive(Clone, Debug, Serialize)]
pub struct Reply {
    pub content: String,
    pub tool_events: Vec<ToolCallEvent>,
}

/// Text appended to tool results when the round budget runs low
pub fn iteration_guidance(iteration: usize, max_iterations: usize) -> Option<String> {
    let round = iteration + 1;
    if iteration >= max_iterations.saturating_sub(3) {
        Some(format!(
            "\n\n[Iteration {}/{}: You're approaching the iteration limit. Please provide a final response based on the information gathered so far.]",
            round, max_iterations
        ))
    } else if iteration >= max_iterations.saturating_sub(5) {
        Some(format!(
            "\n\n[Iteration {}/{}: Consider summarizing your findings and providing a final response rather than continuing exploration]",
            round, max_iterations
        ))
    } else {
        None
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<dyn ToolSource>,
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<dyn ToolSource>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<dyn ToolSource>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// Answer a request, pushing events to `sink` as they happen.
    ///
    /// Ends with exactly one `done` or `error` event unless the sink itself
    /// has closed, in which case nothing more is sent and `Cancelled` is
    /// returned.
    pub async fn stream(
        &self,
        profile: &AgentProfile,
        request: &InferenceRequest,
        sink: &dyn EventSink,
    ) -> Result<String> {
        self.run_with(profile, request, sink, self.config.stream_delay).await
    }

    /// Answer a request without pacing, collecting tool events
    pub async fn respond(&self, profile: &AgentProfile, request: &InferenceRequest) -> Result<Reply> {
        let buffer = EventBuffer::new();
        let content = self.run_with(profile, request, &buffer, Duration::ZERO).await?;
        Ok(Reply {
            content,
            tool_events: buffer.tool_events(),
        })
    }

    async fn run_with(
        &self,
        profile: &AgentProfile,
        request: &InferenceRequest,
        sink: &dyn EventSink,
        stream_delay: Duration,
    ) -> Result<String> {
        match self.drive(profile, request, sink, stream_delay).await {
            Ok(content) => {
                sink.emit(StreamEvent::Done { content: content.clone() }).await?;
                info!(agent = %profile.id, chars = content.len(), "Inference complete");
                Ok(content)
            }
            Err(AgentError::Cancelled) => {
                info!(agent = %profile.id, "Caller went away, abandoning inference");
                Err(AgentError::Cancelled)
            }
            Err(e) => {
                error!(agent = %profile.id, error = %e, "Inference failed");
                let message = format!("Failed to generate response: {}", e);
                // Best effort, the caller may already be gone
                if sink.emit(StreamEvent::Error { message }).await.is_err() {
                    debug!(agent = %profile.id, "Error event not delivered");
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        profile: &AgentProfile,
        request: &InferenceRequest,
        sink: &dyn EventSink,
        stream_delay: Duration,
    ) -> Result<String> {
        let toolkit = self.resolve_tools(&profile.id).await;

        sink.emit(StreamEvent::Metadata {
            request_id: uuid::Uuid::new_v4().to_string(),
            agent_id: profile.id.clone(),
            session_id: request.session_id.clone(),
            model: profile.model.clone(),
            tools: toolkit.tools.names().into_iter().map(String::from).collect(),
            tool_errors: toolkit.failures.clone(),
            started_at: Utc::now(),
        })
        .await?;

        let mut conversation =
            Conversation::from_context(&profile.system_prompt, &request.context, &request.message);
        let options = profile.generation_options();
        let schemas = toolkit.tools.schemas();
        let max_iterations = self.config.max_iterations;

        for iteration in 0..max_iterations {
            debug!(agent = %profile.id, iteration, phase = "generating", "Calling model");

            let completion = unless_closed(
                sink,
                self.provider.complete(conversation.messages(), &options, &schemas),
            )
            .await??;

            if !completion.has_tool_calls() {
                debug!(agent = %profile.id, iteration, phase = "final_answer", "Streaming answer");
                return self.stream_answer(completion.content, sink, stream_delay).await;
            }

            debug!(
                agent = %profile.id,
                iteration,
                phase = "executing",
                calls = completion.tool_calls.len(),
                "Executing tool calls"
            );

            let results = self
                .execute_batch(&toolkit.tools, &completion.tool_calls, iteration, sink)
                .await?;

            conversation.push(Message::assistant_with_tools(
                completion.content,
                completion.tool_calls,
            ));
            conversation.extend(results);

            sink.emit(StreamEvent::ToolEvent(ToolCallEvent::batch_complete())).await?;
        }

        Err(AgentError::IterationLimitExceeded(max_iterations))
    }

    /// Resolve the agent's tools, degrading to none when servers fail
    async fn resolve_tools(&self, agent_id: &str) -> AgentToolkit {
        match self.tools.agent_tools(agent_id).await {
            Ok(toolkit) => {
                if !toolkit.failures.is_empty() {
                    warn!(
                        agent = %agent_id,
                        failures = ?toolkit.failures,
                        "Some tool servers are unavailable"
                    );
                }
                toolkit
            }
            Err(AgentError::NoToolsAvailable(failures)) => {
                warn!(agent = %agent_id, failures = ?failures, "No tool servers reachable, continuing without tools");
                AgentToolkit {
                    tools: ToolRegistry::new(),
                    failures,
                }
            }
            Err(e) => {
                warn!(agent = %agent_id, error = %e, "Failed to get agent tools, continuing without tools");
                AgentToolkit {
                    tools: ToolRegistry::new(),
                    failures: vec![e.to_string()],
                }
            }
        }
    }

    /// Run every call of one round in order and build the tool messages
    async fn execute_batch(
        &self,
        tools: &ToolRegistry,
        calls: &[ToolCall],
        iteration: usize,
        sink: &dyn EventSink,
    ) -> Result<Vec<Message>> {
        let guidance = iteration_guidance(iteration, self.config.max_iterations).unwrap_or_default();
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let output = self.execute_tool(tools, call, sink).await?;
            results.push(Message::tool(
                format!("{}{}", output, guidance),
                &call.id,
                &call.name,
            ));
        }

        Ok(results)
    }

    /// Execute one call; failures become model-visible text
    async fn execute_tool(
        &self,
        tools: &ToolRegistry,
        call: &ToolCall,
        sink: &dyn EventSink,
    ) -> Result<String> {
        let started = Instant::now();
        sink.emit(StreamEvent::ToolEvent(ToolCallEvent::start(
            &call.id,
            &call.name,
            &call.arguments,
        )))
        .await?;

        let outcome = match tools.get(&call.name) {
            Some(tool) => unless_closed(sink, tool.call(&call.arguments)).await?,
            None => Err(AgentError::ToolNotFound(call.name.clone())),
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(result) => {
                debug!(tool = %call.name, duration_ms, "Tool succeeded");
                sink.emit(StreamEvent::ToolEvent(ToolCallEvent::result(
                    &call.id,
                    &call.name,
                    result.clone(),
                    duration_ms,
                )))
                .await?;
                Ok(result)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, duration_ms, "Tool failed");
                sink.emit(StreamEvent::ToolEvent(ToolCallEvent::error(
                    &call.id,
                    &call.name,
                    e.to_string(),
                    duration_ms,
                )))
                .await?;
                Ok(format!("Error executing tool: {}", e))
            }
        }
    }

    /// Emit the answer one character at a time
    async fn stream_answer(
        &self,
        content: String,
        sink: &dyn EventSink,
        stream_delay: Duration,
    ) -> Result<String> {
        for ch in content.chars() {
            sink.emit(StreamEvent::Token(ch.to_string())).await?;
            if !stream_delay.is_zero() {
                tokio::time::sleep(stream_delay).await;
            }
        }
        Ok(content)
    }

    /// Get configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

/// Run `work` unless the caller goes away first, in which case it is dropped
async fn unless_closed<F: Future>(sink: &dyn EventSink, work: F) -> Result<F::Output> {
    tokio::select! {
        output = work => Ok(output),
        () = sink.closed() => Err(AgentError::Cancelled),
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Option<Arc<dyn ToolSource>>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: None,
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolSource>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn stream_delay(mut self, delay: Duration) -> Self {
        self.config.stream_delay = delay;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;
        if self.config.max_iterations == 0 {
            return Err(AgentError::Config("max_iterations must be at least 1".into()));
        }
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(ToolRegistry::new()));

        Ok(Agent::new(provider, tools, self.config))
    }
}
