//! OpenAI-compatible LLM Provider
//!
//! Implementation of `LlmProvider` over the streaming `/chat/completions`
//! endpoint with function calling.

use std::time::Duration;

use async_trait::async_trait;
use aura_core::{
    error::{AgentError, Result},
    message::{ConversationTurn, Role},
    provider::{GenerationOptions, LlmProvider, ModelStream},
    tool::{ToolCall, ToolCallState, ToolSchema},
};
use futures::StreamExt;
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::sse::ChunkDecoder;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API root, without the trailing `/chat/completions`
    pub base_url: String,

    /// Bearer token; local servers usually need none
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.into(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| OPENAI_BASE_URL.into());
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        let timeout_secs = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(120);

        Self {
            base_url,
            api_key,
            timeout_secs,
        }
    }

    /// The hosted API refuses anonymous requests
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_none() && self.base_url.starts_with(OPENAI_BASE_URL) {
            return Err(AgentError::Config(
                "OPENAI_API_KEY is required for the hosted API".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(AgentError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Streaming chat completions provider
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    /// Create from configuration
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env())
    }

    pub const fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Convert the turn log to chat messages
    ///
    /// Resolved tool calls become an assistant `tool_calls` entry followed by
    /// one `tool` message each. Pending calls are not sent.
    fn convert_turns(turns: &[ConversationTurn], system_prompt: Option<&str>) -> Vec<Value> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(json!({"role": "system", "content": prompt}));
        }

        for turn in turns {
            match turn.role {
                Role::User => messages.push(json!({
                    "role": "user",
                    "content": turn.text.as_deref().unwrap_or_default(),
                })),
                Role::Assistant => {
                    let resolved: Vec<&ToolCall> =
                        turn.tool_calls.iter().filter(|c| c.is_terminal()).collect();
                    if turn.text.is_none() && resolved.is_empty() {
                        continue;
                    }

                    let mut message = json!({"role": "assistant", "content": turn.text});
                    if !resolved.is_empty() {
                        message["tool_calls"] = resolved
                            .iter()
                            .map(|call| {
                                json!({
                                    "id": call.call_id,
                                    "type": "function",
                                    "function": {
                                        "name": call.tool_name,
                                        "arguments": call.input.to_string(),
                                    },
                                })
                            })
                            .collect();
                    }
                    messages.push(message);

                    for call in resolved {
                        let content = match &call.state {
                            ToolCallState::Completed { output } => output.to_string(),
                            ToolCallState::Failed { error } => json!({"error": error}).to_string(),
                            ToolCallState::Pending => continue,
                        };
                        messages.push(json!({
                            "role": "tool",
                            "tool_call_id": call.call_id,
                            "content": content,
                        }));
                    }
                }
            }
        }

        messages
    }

    /// Convert tool schemas to function definitions
    fn convert_tools(tools: &[ToolSchema]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                let mut properties = Map::new();
                for param in &tool.parameters {
                    let mut property = json!({
                        "type": param.param_type,
                        "description": param.description,
                    });
                    if let Some(values) = &param.enum_values {
                        property["enum"] = json!(values);
                    }
                    if let Some(default) = &param.default {
                        property["default"] = default.clone();
                    }
                    properties.insert(param.name.clone(), property);
                }
                let required: Vec<&str> = tool
                    .parameters
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| p.name.as_str())
                    .collect();

                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": {
                            "type": "object",
                            "properties": properties,
                            "required": required,
                        },
                    },
                })
            })
            .collect()
    }

    /// Build the request body
    fn build_body(
        turns: &[ConversationTurn],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Value {
        let mut body = json!({
            "model": options.model,
            "messages": Self::convert_turns(turns, options.system_prompt.as_deref()),
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "stream": true,
        });
        if !tools.is_empty() {
            body["tools"] = Value::from(Self::convert_tools(tools));
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool> {
        let request = self.authorize(self.client.get(self.config.endpoint("models")));
        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(true),
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Model server health check failed");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!("Model server health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete_stream(
        &self,
        turns: &[ConversationTurn],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ModelStream> {
        let body = Self::build_body(turns, tools, options);
        tracing::debug!(model = %options.model, turns = turns.len(), "Requesting completion");

        let response = self
            .authorize(self.client.post(self.config.endpoint("chat/completions")))
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited(format!(
                "{} rate limited the request",
                self.config.base_url
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Provider(format!("{status}: {detail}")));
        }

        let mut bytes = response.bytes_stream();
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut decoder = ChunkDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let events = match chunk {
                    Ok(chunk) => decoder.push(&chunk),
                    Err(e) => vec![Err(AgentError::Transport(e.to_string()))],
                };
                for event in events {
                    let failed = event.is_err();
                    if tx.send(event).await.is_err() || failed {
                        return;
                    }
                }
            }
            for event in decoder.finish() {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
