//! # aura-assistant
//!
//! Conversation state for a voice/chat stock trading assistant. The user asks
//! for quotes and charts or proposes trades; the model answers with tool
//! calls; this crate turns the growing turn log into one screen to show.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  TurnEvent   ┌─────────────────┐  log   ┌────────────────────┐
//! │  Completion  │ ───────────► │ MessageIngestor │ ─────► │ ToolResultResolver │
//! │  transport   │              └─────────────────┘        └─────────┬──────────┘
//! └──────────────┘                                        chart / receipt
//!        ▲                                                           ▼
//!        │ submit(text)         ┌─────────────────┐        ┌────────────────────┐
//!        └───────────────────── │    Assistant    │ ◄───── │  PhaseController   │
//!                               └─────────────────┘        └────────────────────┘
//!                                 confirm / cancel / reset     entry
//!                                                              viewing_data
//!                                                              awaiting_trade_confirmation
//! ```
//!
//! ## Rules that always hold
//!
//! - A pending trade receipt outranks any chart, whichever arrived last.
//! - A receipt the user cancelled or executed never comes back.
//! - Rescanning an unchanged log changes nothing and replays no transitions.
//! - The busy flag always drops once the safety timeout elapses.

pub mod assistant;
pub mod brokerage;
pub mod busy;
pub mod config;
pub mod error;
pub mod ingestor;
pub mod model;
pub mod phase;
pub mod resolver;
pub mod speech;
pub mod state;
pub mod svckit;

pub use assistant::{Assistant, AssistantEvent};
pub use config::AssistantConfig;
pub use error::{AssistantError, Result, SessionError};
pub use model::{
    AccountSummary, ChartPeriod, ChartView, InteractionMode, OrderSide, OrderType, Position,
    TradeReceipt, TradeResult,
};
pub use phase::UiPhase;
pub use state::{AssistantSnapshot, ConversationState, Effect};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{ChartDataTool, QuoteLookupTool, TradeReceiptTool, trading_tools};
}

/// System prompt for the trading assistant
pub const AURA_SYSTEM_PROMPT: &str = r"You are Aura, a calm and concise stock trading assistant.
Users often talk to you by voice, so keep replies short and conversational.

## Tools

- `get_quote` - latest price and daily change for a ticker
- `render_chart` - show a price chart for a ticker and period (1D, 1W, 1M, 3M, 1Y)
- `generate_trade_receipt` - prepare an order for the user to review

## Rules

1. Whenever the user asks how a stock is doing, call `render_chart` so they can see it.
2. Never claim a trade was placed. Every buy or sell goes through
   `generate_trade_receipt`; the user confirms it on screen.
3. Default to market orders unless the user names a limit or stop price.
4. If a tool reports an error, say so plainly and suggest a supported ticker.
5. Do not give investment advice beyond the numbers you looked up.";
