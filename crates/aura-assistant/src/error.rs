//! Error Types for the Assistant

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

/// Errors returned from actions and collaborators
#[derive(Error, Debug)]
pub enum AssistantError {
    /// A completion round trip is already in flight
    #[error("Assistant is busy with a previous request")]
    Busy,

    #[error("Nothing to send")]
    EmptyInput,

    #[error("No trade receipt is awaiting confirmation")]
    NoActiveReceipt,

    #[error("A trade is already being executed")]
    TradeInProgress,

    #[error("Ticker not supported: {0}")]
    UnsupportedTicker(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error(transparent)]
    Core(#[from] aura_core::AgentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error surfaced on the public state instead of being returned
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SessionError {
    /// Completion stream failed or was rejected
    Transport(String),

    /// Confirmed trade was not executed
    TradeExecution(String),
}

impl SessionError {
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(msg) | Self::TradeExecution(msg) => msg,
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Connection problem: {msg}"),
            Self::TradeExecution(msg) => write!(f, "Trade failed: {msg}"),
        }
    }
}
