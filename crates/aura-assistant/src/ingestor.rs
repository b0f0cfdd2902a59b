//! Message Ingestor
//!
//! Owns the session's turn log. The only mutation it offers the UI is
//! [`MessageIngestor::append_user_turn`]; everything else arrives as
//! [`TurnEvent`]s from the completion transport and may only extend the last
//! assistant turn.

use aura_core::{ConversationTurn, Session, ToolCallState, TurnEvent, TurnId};

use crate::error::{AssistantError, Result};

#[derive(Debug, Default)]
pub struct MessageIngestor {
    session: Session,

    /// Bumped on every change to the log
    revision: u64,
}

impl MessageIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current log, oldest turn first
    pub fn turns(&self) -> &[ConversationTurn] {
        self.session.turns()
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Record what the user said or typed
    pub fn append_user_turn(&mut self, text: &str) -> Result<TurnId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AssistantError::EmptyInput);
        }

        let turn = ConversationTurn::user(text);
        let id = turn.id.clone();
        self.session.push(turn)?;
        self.bump();

        tracing::debug!(turn_id = %id, "User turn appended");
        Ok(id)
    }

    /// Apply one streamed update. Returns whether the log changed;
    /// re-delivered updates are accepted and report no change.
    pub fn apply(&mut self, event: &TurnEvent) -> Result<bool> {
        let session = &mut self.session;

        let changed = match event {
            TurnEvent::AssistantStarted { turn_id } => {
                if session.log().contains(turn_id) {
                    false
                } else {
                    session.push(ConversationTurn::assistant(turn_id.clone()))?;
                    true
                }
            }
            TurnEvent::TextDelta { turn_id, delta } => {
                if delta.is_empty() {
                    false
                } else {
                    session.append_text(turn_id, delta)?;
                    true
                }
            }
            TurnEvent::ToolCallStarted { turn_id, call } => {
                if session.log().find_call(&call.call_id).is_some() {
                    false
                } else {
                    session.add_tool_call(turn_id, call.clone())?;
                    true
                }
            }
            TurnEvent::ToolCallCompleted {
                turn_id,
                call_id,
                output,
            } => {
                let repeat = session.log().find_call(call_id).is_some_and(|c| {
                    matches!(&c.state, ToolCallState::Completed { output: prev } if prev == output)
                });
                if repeat {
                    false
                } else {
                    session.complete_call(turn_id, call_id, output.clone())?;
                    true
                }
            }
            TurnEvent::ToolCallFailed {
                turn_id,
                call_id,
                error,
            } => {
                let repeat = session.log().find_call(call_id).is_some_and(|c| {
                    matches!(&c.state, ToolCallState::Failed { error: prev } if prev == error)
                });
                if repeat {
                    false
                } else {
                    session.fail_call(turn_id, call_id, error.clone())?;
                    true
                }
            }
            TurnEvent::Finished { .. } => false,
        };

        if changed {
            self.bump();
        }
        Ok(changed)
    }

    fn bump(&mut self) {
        self.revision += 1;
    }
}
