//! Conversation Turns
//!
//! The ordered, append-only log of user and assistant turns. Assistant turns
//! stream in over time, so the log allows exactly one kind of in-place
//! mutation: extending the *last* turn while its completion is in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::tool::ToolCall;

/// Role of a turn's author
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Spoken or typed user input
    User,
    /// Model output, possibly carrying tool calls
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Stable identifier of a turn, unique within a conversation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(String);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single entry in the turn log
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: TurnId,

    pub role: Role,

    /// Plain-text content, absent for turns that only carry tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Tool calls in the order the model issued them
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a user turn with a fresh id
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::User,
            text: Some(text.into()),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Create an empty assistant turn that will be filled by streaming
    pub fn assistant(id: TurnId) -> Self {
        Self {
            id,
            role: Role::Assistant,
            text: None,
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Builder helper, mostly for tests and offline providers
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Builder helper, mostly for tests and offline providers
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Append a streamed text delta
    pub fn append_text(&mut self, delta: &str) {
        match self.text.as_mut() {
            Some(text) => text.push_str(delta),
            None => self.text = Some(delta.to_string()),
        }
    }

    pub fn find_call(&self, call_id: &str) -> Option<&ToolCall> {
        self.tool_calls.iter().find(|c| c.call_id == call_id)
    }

    pub fn find_call_mut(&mut self, call_id: &str) -> Option<&mut ToolCall> {
        self.tool_calls.iter_mut().find(|c| c.call_id == call_id)
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Append-only turn log
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TurnLog {
    turns: Vec<ConversationTurn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a finalized or newly opened turn
    pub fn push(&mut self, turn: ConversationTurn) -> Result<()> {
        if self.contains(&turn.id) {
            return Err(AgentError::Ingest(format!("turn {} already in log", turn.id)));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Get all turns, oldest first
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn contains(&self, id: &TurnId) -> bool {
        self.turns.iter().any(|t| &t.id == id)
    }

    /// Locate a tool call anywhere in the log
    pub fn find_call(&self, call_id: &str) -> Option<&ToolCall> {
        self.turns.iter().find_map(|t| t.find_call(call_id))
    }

    /// Extend the streaming assistant turn with text
    pub fn append_text(&mut self, turn_id: &TurnId, delta: &str) -> Result<()> {
        self.streaming_turn(turn_id)?.append_text(delta);
        Ok(())
    }

    /// Attach a newly issued tool call to the streaming assistant turn
    pub fn add_tool_call(&mut self, turn_id: &TurnId, call: ToolCall) -> Result<()> {
        if self.find_call(&call.call_id).is_some() {
            return Err(AgentError::Ingest(format!(
                "tool call {} already in log",
                call.call_id
            )));
        }
        self.streaming_turn(turn_id)?.tool_calls.push(call);
        Ok(())
    }

    /// Move a pending call on the streaming turn to `completed`
    pub fn complete_call(
        &mut self,
        turn_id: &TurnId,
        call_id: &str,
        output: serde_json::Value,
    ) -> Result<()> {
        self.streaming_call(turn_id, call_id)?.complete(output)
    }

    /// Move a pending call on the streaming turn to `failed`
    pub fn fail_call(
        &mut self,
        turn_id: &TurnId,
        call_id: &str,
        error: impl Into<String>,
    ) -> Result<()> {
        self.streaming_call(turn_id, call_id)?.fail(error)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last turn, provided it is the assistant turn named by `turn_id`
    fn streaming_turn(&mut self, turn_id: &TurnId) -> Result<&mut ConversationTurn> {
        match self.turns.last_mut() {
            Some(turn) if &turn.id == turn_id && turn.role == Role::Assistant => Ok(turn),
            _ => Err(AgentError::Ingest(format!(
                "turn {turn_id} is not the streaming assistant turn"
            ))),
        }
    }

    fn streaming_call(&mut self, turn_id: &TurnId, call_id: &str) -> Result<&mut ToolCall> {
        self.streaming_turn(turn_id)?
            .find_call_mut(call_id)
            .ok_or_else(|| AgentError::Ingest(format!("unknown tool call {call_id}")))
    }
}
