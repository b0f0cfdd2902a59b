//! Session Management
//!
//! A session is one conversation: its turn log plus bookkeeping. Nothing is
//! persisted beyond the lifetime of the process.
//!
//! The log is private. Readers get `&TurnLog`; every write goes through the
//! session so the activity timestamp can never drift from the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::message::{ConversationTurn, Role, TurnId, TurnLog};
use crate::tool::ToolCall;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,

    log: TurnLog,

    created_at: DateTime<Utc>,

    /// Last time the log changed
    updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            log: TurnLog::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Read-only view of the turn log
    pub const fn log(&self) -> &TurnLog {
        &self.log
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        self.log.turns()
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Title from the first user turn
    pub fn title(&self) -> String {
        self.log
            .turns()
            .iter()
            .find(|t| t.role == Role::User)
            .and_then(|t| t.text.as_deref())
            .map_or_else(
                || {
                    let short: String = self.id.0.chars().take(8).collect();
                    format!("Session {short}")
                },
                |text| {
                    let preview: String = text.chars().take(50).collect();
                    if text.chars().count() > 50 {
                        format!("{preview}...")
                    } else {
                        preview
                    }
                },
            )
    }

    pub fn push(&mut self, turn: ConversationTurn) -> Result<()> {
        self.log.push(turn)?;
        self.touch();
        Ok(())
    }

    pub fn append_text(&mut self, turn_id: &TurnId, delta: &str) -> Result<()> {
        self.log.append_text(turn_id, delta)?;
        self.touch();
        Ok(())
    }

    pub fn add_tool_call(&mut self, turn_id: &TurnId, call: ToolCall) -> Result<()> {
        self.log.add_tool_call(turn_id, call)?;
        self.touch();
        Ok(())
    }

    pub fn complete_call(
        &mut self,
        turn_id: &TurnId,
        call_id: &str,
        output: serde_json::Value,
    ) -> Result<()> {
        self.log.complete_call(turn_id, call_id, output)?;
        self.touch();
        Ok(())
    }

    pub fn fail_call(
        &mut self,
        turn_id: &TurnId,
        call_id: &str,
        error: impl Into<String>,
    ) -> Result<()> {
        self.log.fail_call(turn_id, call_id, error)?;
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
