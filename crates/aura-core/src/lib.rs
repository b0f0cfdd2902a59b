//! # aura-core
//!
//! Conversation vocabulary for the aura trading assistant: turns, tool calls
//! and their lifecycle, and the streaming completion transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Agent (CompletionTransport)                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  Tool Loop  │──│    Tools    │──│   LlmProvider        │  │
//! │  │             │  │   Registry  │  │   (Strategy)         │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! └───────────────────────────┬──────────────────────────────────┘
//!                             │ TurnEvent stream
//!                             ▼
//!                   TurnLog (append-only)
//! ```
//!
//! The `LlmProvider` trait lets the model backend be swapped without touching
//! the tool loop or anything downstream of the turn log.

pub mod error;
pub mod message;
pub mod provider;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result};
pub use message::{ConversationTurn, Role, TurnId, TurnLog};
pub use provider::{CompletionTransport, LlmProvider, ModelEvent, TurnEvent, TurnStream};
pub use reasoning::{Agent, AgentConfig};
pub use session::{Session, SessionId};
pub use tool::{Tool, ToolCall, ToolCallState, ToolKind, ToolRegistry, ToolSchema};
