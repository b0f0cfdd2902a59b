//! Model Provider and Completion Transport
//!
//! Two layers of streaming sit here:
//!
//! - [`LlmProvider`] is the raw model: given the turn log and tool schemas it
//!   streams [`ModelEvent`]s (text deltas and tool-use requests).
//! - [`CompletionTransport`] is what the UI core consumes: it streams
//!   [`TurnEvent`]s describing how a single assistant turn grows, including
//!   tool results once they have been executed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aura_core::provider::CompletionTransport;
//!
//! let mut stream = transport.open(history).await?;
//! while let Some(event) = stream.next().await {
//!     ingestor.apply(&event?)?;
//! }
//! ```

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::message::{ConversationTurn, TurnId};
use crate::tool::{ToolCall, ToolSchema};

/// Configuration for model generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini", "llama3.2")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// System prompt, sent ahead of the turn log
    #[serde(default)]
    pub system_prompt: Option<String>,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_max_tokens() -> u32 {
    1024
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

/// One chunk of raw model output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    /// Streamed text
    TextDelta { delta: String },

    /// The model wants a tool executed
    ToolUse {
        call_id: String,
        name: String,
        input: serde_json::Value,
    },

    /// End of this model response
    Done,
}

/// Stream of raw model output
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent>> + Send>>;

/// Strategy trait for model backends
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    /// Stream a response to the turn log. The last turn may be an assistant
    /// turn whose tool calls have just resolved.
    async fn complete_stream(
        &self,
        turns: &[ConversationTurn],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<ModelStream>;
}

/// One update to the streaming assistant turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A new assistant turn was opened
    AssistantStarted { turn_id: TurnId },

    TextDelta { turn_id: TurnId, delta: String },

    /// A tool call was issued (state `pending`)
    ToolCallStarted { turn_id: TurnId, call: ToolCall },

    ToolCallCompleted {
        turn_id: TurnId,
        call_id: String,
        output: serde_json::Value,
    },

    ToolCallFailed {
        turn_id: TurnId,
        call_id: String,
        error: String,
    },

    /// The assistant turn is final
    Finished { turn_id: TurnId },
}

impl TurnEvent {
    pub const fn turn_id(&self) -> &TurnId {
        match self {
            Self::AssistantStarted { turn_id }
            | Self::TextDelta { turn_id, .. }
            | Self::ToolCallStarted { turn_id, .. }
            | Self::ToolCallCompleted { turn_id, .. }
            | Self::ToolCallFailed { turn_id, .. }
            | Self::Finished { turn_id } => turn_id,
        }
    }
}

/// Stream of turn updates for one completion round trip
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// Opens model completions on behalf of the UI core
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Begin streaming a new assistant turn in reply to `history`, whose last
    /// entry is the user turn that triggered it.
    async fn open(&self, history: Vec<ConversationTurn>) -> Result<TurnStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(opts.max_tokens, 1024);
        assert_eq!(opts.model, "gpt-4o-mini");
    }

    #[test]
    fn test_turn_event_exposes_turn_id() {
        let id = TurnId::from_string("t1");
        let event = TurnEvent::TextDelta {
            turn_id: id.clone(),
            delta: "hi".into(),
        };
        assert_eq!(event.turn_id(), &id);
    }
}
