//! Conversation State
//!
//! Synchronous core that the async driver feeds one event at a time. Each
//! method applies a single event to completion and returns the side effects
//! the rendering and voice layers should perform.
//!
//! ```text
//!   TurnEvent ──► MessageIngestor ──► ToolResultResolver ──► PhaseController
//!                                            ▲                     ▲
//!   user actions ────────────────────────────┴─────────────────────┘
//! ```

use serde::Serialize;
use tokio::time::Instant;

use aura_core::{AgentError, ConversationTurn, TurnEvent, TurnId};

use crate::busy::{BusyTracker, RoundTrip};
use crate::config::AssistantConfig;
use crate::error::{AssistantError, Result, SessionError};
use crate::ingestor::MessageIngestor;
use crate::model::{ChartView, InteractionMode, TradeOrder, TradeReceipt, TradeResult};
use crate::phase::{PhaseController, PhaseTransition, UiPhase};
use crate::resolver::ToolResultResolver;
use crate::speech::sanitize_for_speech;

/// Side effect requested by a state change
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Phase changed; play its entry animation or greeting
    PhaseEntered(UiPhase),

    /// Sanitized assistant reply for text-to-speech
    Speak(String),

    StopSpeaking,

    /// Reopen voice capture
    ResumeListening,

    /// A confirmed trade was accepted
    TradeExecuted(TradeResult),
}

/// Everything the rendering layer reads
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssistantSnapshot {
    pub phase: UiPhase,
    pub chart: Option<ChartView>,
    pub receipt: Option<TradeReceipt>,
    pub is_busy: bool,
    pub last_error: Option<SessionError>,
    pub executing_trade: bool,
    pub mode: InteractionMode,
}

/// Order handed to the trade executor, tagged with the receipt it came from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTrade {
    pub source_call_id: String,
    pub order: TradeOrder,
}

#[derive(Debug)]
pub struct ConversationState {
    ingestor: MessageIngestor,
    resolver: ToolResultResolver,
    phases: PhaseController,
    busy: BusyTracker,
    last_error: Option<SessionError>,
    executing_trade: bool,
    mode: InteractionMode,

    /// Round whose reply has already been handed to speech
    spoken_round: Option<u64>,
}

impl ConversationState {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            ingestor: MessageIngestor::new(),
            resolver: ToolResultResolver::new(),
            phases: PhaseController::new(),
            busy: BusyTracker::new(config.busy_safety_timeout),
            last_error: None,
            executing_trade: false,
            mode: config.mode,
            spoken_round: None,
        }
    }

    pub const fn phase(&self) -> UiPhase {
        self.phases.phase()
    }

    pub const fn chart(&self) -> Option<&ChartView> {
        self.resolver.chart()
    }

    pub const fn receipt(&self) -> Option<&TradeReceipt> {
        self.resolver.receipt()
    }

    pub const fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub const fn last_error(&self) -> Option<&SessionError> {
        self.last_error.as_ref()
    }

    pub const fn is_executing_trade(&self) -> bool {
        self.executing_trade
    }

    pub const fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub const fn busy(&self) -> &BusyTracker {
        &self.busy
    }

    pub const fn ingestor(&self) -> &MessageIngestor {
        &self.ingestor
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        self.ingestor.turns()
    }

    /// Owned copy of the log for the completion transport
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.turns().to_vec()
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.mode = mode;
    }

    pub fn snapshot(&self) -> AssistantSnapshot {
        AssistantSnapshot {
            phase: self.phase(),
            chart: self.chart().cloned(),
            receipt: self.receipt().cloned(),
            is_busy: self.is_busy(),
            last_error: self.last_error.clone(),
            executing_trade: self.executing_trade,
            mode: self.mode,
        }
    }

    /// Record a user message and open a new round. Rejected while busy.
    pub fn begin_submit(&mut self, text: &str, now: Instant) -> Result<RoundTrip> {
        if self.busy.is_busy() {
            tracing::debug!(round = self.busy.round(), "Submit rejected while busy");
            return Err(AssistantError::Busy);
        }
        self.ingestor.append_user_turn(text)?;
        self.last_error = None;
        Ok(self.busy.raise(now))
    }

    /// The transport accepted the request and is streaming
    pub fn transport_opened(&mut self, round: u64) {
        self.busy.transport_started(round);
    }

    /// Apply one streamed chunk. Chunks the log cannot accept are dropped.
    pub fn apply_turn_event(&mut self, round: u64, event: &TurnEvent) -> Vec<Effect> {
        let changed = match self.ingestor.apply(event) {
            Ok(changed) => changed,
            Err(e) => {
                tracing::warn!(
                    round,
                    turn_id = %event.turn_id(),
                    error = %e,
                    "Dropping turn event"
                );
                return Vec::new();
            }
        };

        let mut effects = if changed { self.recompute() } else { Vec::new() };

        if let TurnEvent::Finished { turn_id } = event {
            if self.busy.is_current(round) && self.spoken_round != Some(round) {
                self.spoken_round = Some(round);
                if self.mode == InteractionMode::Voice {
                    effects.extend(self.spoken_reply(turn_id).map(Effect::Speak));
                }
            }
        }
        effects
    }

    fn spoken_reply(&self, turn_id: &TurnId) -> Option<String> {
        self.turns()
            .iter()
            .rev()
            .find(|t| &t.id == turn_id)
            .and_then(|t| t.text.as_deref())
            .map(sanitize_for_speech)
            .filter(|s| !s.is_empty())
    }

    /// The stream ended. Returns whether the busy flag dropped.
    pub fn transport_closed(&mut self, round: u64) -> bool {
        self.busy.transport_finished(round)
    }

    /// The stream failed. The log and derived state are left as they were.
    pub fn transport_failed(&mut self, round: u64, error: &AgentError) -> bool {
        if !self.busy.is_current(round) {
            tracing::debug!(round, error = %error, "Ignoring error from stale round");
            return false;
        }
        tracing::warn!(round, error = %error, "Completion transport failed");
        self.last_error = Some(SessionError::Transport(error.user_message()));
        self.busy.transport_failed(round);
        true
    }

    pub fn safety_timeout(&mut self, round: u64, now: Instant) -> bool {
        self.busy.expire(round, now)
    }

    /// Resolver pass over the current log
    pub fn recompute(&mut self) -> Vec<Effect> {
        let resolution = self.resolver.resolve(self.ingestor.turns());
        let transition = self.phases.on_resolution(
            resolution,
            self.resolver.chart().is_some(),
            self.resolver.receipt().is_some(),
        );
        entered(transition).into_iter().collect()
    }

    /// Hand the active receipt to the trade executor
    pub fn begin_trade(&mut self) -> Result<PendingTrade> {
        if self.executing_trade {
            return Err(AssistantError::TradeInProgress);
        }
        let receipt = self.resolver.receipt().ok_or(AssistantError::NoActiveReceipt)?;
        if let Some(error) = &receipt.error {
            return Err(AssistantError::InvalidOrder(error.clone()));
        }

        let trade = PendingTrade {
            source_call_id: receipt.source_call_id.clone(),
            order: receipt.order(),
        };
        self.executing_trade = true;
        self.last_error = None;

        tracing::info!(
            call_id = %trade.source_call_id,
            ticker = %trade.order.ticker,
            side = %trade.order.side,
            qty = %trade.order.qty,
            "Trade confirmed"
        );
        Ok(trade)
    }

    /// Outcome from the trade executor. Failures keep the receipt on screen.
    pub fn trade_finished(
        &mut self,
        source_call_id: &str,
        result: Result<TradeResult>,
    ) -> Vec<Effect> {
        self.executing_trade = false;

        let outcome = match result {
            Ok(outcome) if outcome.success => outcome,
            Ok(outcome) => {
                let reason = outcome.error.unwrap_or_else(|| "order rejected".into());
                return self.trade_failed(source_call_id, reason);
            }
            Err(e) => return self.trade_failed(source_call_id, e.to_string()),
        };

        tracing::info!(call_id = source_call_id, order_id = ?outcome.order_id, "Trade executed");
        let mut effects = vec![Effect::TradeExecuted(outcome)];
        let still_shown = self
            .resolver
            .receipt()
            .is_some_and(|r| r.source_call_id == source_call_id);
        if still_shown {
            effects.extend(self.dismiss_receipt());
        }
        effects
    }

    /// Drop the active receipt without trading
    pub fn cancel_trade(&mut self) -> Result<Vec<Effect>> {
        if self.executing_trade {
            return Err(AssistantError::TradeInProgress);
        }
        let mut effects = vec![Effect::StopSpeaking];
        effects.extend(self.dismiss_receipt());
        Ok(effects)
    }

    pub fn clear_chart(&mut self) -> Vec<Effect> {
        if !self.resolver.clear_chart() {
            return Vec::new();
        }
        self.settle()
    }

    /// Back to the entry screen with nothing displayed
    pub fn reset_to_entry(&mut self) -> Vec<Effect> {
        self.resolver.clear_chart();
        self.resolver.clear_receipt(self.ingestor.turns());
        self.last_error = None;

        let mut effects = vec![Effect::StopSpeaking];
        effects.extend(entered(self.phases.reset()));
        effects
    }

    pub fn stop_speaking(&self) -> Vec<Effect> {
        vec![Effect::StopSpeaking]
    }

    /// Voice playback ended
    pub fn speech_finished(&self) -> Vec<Effect> {
        if self.mode == InteractionMode::Voice && !self.busy.is_busy() {
            vec![Effect::ResumeListening]
        } else {
            Vec::new()
        }
    }

    fn trade_failed(&mut self, source_call_id: &str, reason: String) -> Vec<Effect> {
        tracing::warn!(call_id = source_call_id, reason = %reason, "Trade failed");
        self.last_error = Some(SessionError::TradeExecution(reason));
        Vec::new()
    }

    fn dismiss_receipt(&mut self) -> Vec<Effect> {
        if self.resolver.clear_receipt(self.ingestor.turns()).is_none() {
            return Vec::new();
        }
        self.settle()
    }

    fn settle(&mut self) -> Vec<Effect> {
        let transition = self.phases.settle(
            self.resolver.chart().is_some(),
            self.resolver.receipt().is_some(),
        );
        entered(transition).into_iter().collect()
    }
}

fn entered(transition: Option<PhaseTransition>) -> Option<Effect> {
    transition.map(|t| Effect::PhaseEntered(t.to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::ToolCall;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;

    fn state() -> ConversationState {
        ConversationState::new(&AssistantConfig::default())
    }

    /// Runs one full round trip that issues `call` and completes it with `output`
    fn round(
        state: &mut ConversationState,
        text: &str,
        call: ToolCall,
        output: serde_json::Value,
    ) -> Vec<Effect> {
        let trip = state.begin_submit(text, Instant::now()).unwrap();
        state.transport_opened(trip.round);

        let turn_id = TurnId::new();
        let call_id = call.call_id.clone();
        let events = [
            TurnEvent::AssistantStarted { turn_id: turn_id.clone() },
            TurnEvent::ToolCallStarted { turn_id: turn_id.clone(), call },
            TurnEvent::ToolCallCompleted { turn_id: turn_id.clone(), call_id, output },
            TurnEvent::TextDelta { turn_id: turn_id.clone(), delta: "**Done.**".into() },
            TurnEvent::Finished { turn_id },
        ];
        let effects = events
            .iter()
            .flat_map(|e| state.apply_turn_event(trip.round, e))
            .collect();
        state.transport_closed(trip.round);
        effects
    }

    fn chart_call(id: &str) -> (ToolCall, serde_json::Value) {
        (
            ToolCall::pending(id, "render_chart", json!({"ticker": "AAPL", "period": "1M"})),
            json!({"ticker": "AAPL", "period": "1M", "bars": []}),
        )
    }

    fn receipt_call(id: &str, qty: u32) -> (ToolCall, serde_json::Value) {
        (
            ToolCall::pending(
                id,
                "generate_trade_receipt",
                json!({"ticker": "AAPL", "qty": qty, "side": "buy"}),
            ),
            json!({"ticker": "AAPL", "qty": qty, "side": "buy", "orderType": "market",
                   "currentPrice": "189.84", "estimatedTotal": "949.20"}),
        )
    }

    fn show_chart(state: &mut ConversationState) -> Vec<Effect> {
        let (call, output) = chart_call("chart-1");
        round(state, "show AAPL", call, output)
    }

    fn propose_trade(state: &mut ConversationState) -> Vec<Effect> {
        let (call, output) = receipt_call("receipt-1", 5);
        round(state, "buy 5 shares", call, output)
    }

    #[tokio::test]
    async fn test_chart_request_shows_chart() {
        let mut state = state();
        let effects = show_chart(&mut state);

        assert_eq!(state.phase(), UiPhase::ViewingData);
        assert_eq!(state.chart().unwrap().ticker, "AAPL");
        assert!(effects.contains(&Effect::PhaseEntered(UiPhase::ViewingData)));
        assert!(effects.contains(&Effect::Speak("Done.".into())));
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn test_receipt_preempts_chart() {
        let mut state = state();
        show_chart(&mut state);
        propose_trade(&mut state);

        assert_eq!(state.phase(), UiPhase::AwaitingTradeConfirmation);
        assert_eq!(state.receipt().unwrap().qty, dec!(5));
        assert_eq!(state.chart().unwrap().ticker, "AAPL");
    }

    #[tokio::test]
    async fn test_cancel_returns_to_chart_and_never_resurfaces() {
        let mut state = state();
        show_chart(&mut state);
        propose_trade(&mut state);

        let effects = state.cancel_trade().unwrap();
        assert_eq!(effects, vec![Effect::StopSpeaking, Effect::PhaseEntered(UiPhase::ViewingData)]);
        assert!(state.receipt().is_none());

        assert!(state.recompute().is_empty());
        assert!(state.receipt().is_none());
        assert_eq!(state.phase(), UiPhase::ViewingData);
    }

    #[tokio::test]
    async fn test_confirm_success_clears_receipt() {
        let mut state = state();
        show_chart(&mut state);
        propose_trade(&mut state);

        let trade = state.begin_trade().unwrap();
        assert_eq!(trade.source_call_id, "receipt-1");
        assert_eq!(trade.order.qty, dec!(5));
        assert!(state.snapshot().executing_trade);

        let result = TradeResult::accepted("paper-1", dec!(189.84));
        let effects = state.trade_finished(&trade.source_call_id, Ok(result.clone()));
        assert_eq!(
            effects,
            vec![Effect::TradeExecuted(result), Effect::PhaseEntered(UiPhase::ViewingData)]
        );
        assert!(state.receipt().is_none());
        assert!(!state.is_executing_trade());
    }

    #[tokio::test]
    async fn test_trade_failure_keeps_receipt() {
        let mut state = state();
        propose_trade(&mut state);

        let trade = state.begin_trade().unwrap();
        let effects = state.trade_finished(
            &trade.source_call_id,
            Ok(TradeResult::rejected("Insufficient buying power")),
        );

        assert!(effects.is_empty());
        assert_eq!(state.phase(), UiPhase::AwaitingTradeConfirmation);
        assert!(state.receipt().is_some());
        assert_eq!(
            state.last_error(),
            Some(&SessionError::TradeExecution("Insufficient buying power".into()))
        );

        // Retry is allowed
        assert!(state.begin_trade().is_ok());
    }

    #[tokio::test]
    async fn test_double_confirm_rejected() {
        let mut state = state();
        propose_trade(&mut state);
        state.begin_trade().unwrap();
        assert!(matches!(state.begin_trade(), Err(AssistantError::TradeInProgress)));
        assert!(matches!(state.cancel_trade(), Err(AssistantError::TradeInProgress)));
    }

    #[tokio::test]
    async fn test_confirm_without_receipt() {
        let mut state = state();
        assert!(matches!(state.begin_trade(), Err(AssistantError::NoActiveReceipt)));
    }

    #[tokio::test]
    async fn test_failed_tool_call_changes_nothing() {
        let mut state = state();
        show_chart(&mut state);
        let before = state.snapshot();

        let trip = state.begin_submit("show TSLA", Instant::now()).unwrap();
        state.transport_opened(trip.round);
        let turn_id = TurnId::new();
        let events = [
            TurnEvent::AssistantStarted { turn_id: turn_id.clone() },
            TurnEvent::ToolCallStarted {
                turn_id: turn_id.clone(),
                call: ToolCall::pending("chart-2", "render_chart", json!({"ticker": "TSLA"})),
            },
            TurnEvent::ToolCallFailed {
                turn_id: turn_id.clone(),
                call_id: "chart-2".into(),
                error: "data vendor timeout".into(),
            },
            TurnEvent::Finished { turn_id },
        ];
        let effects: Vec<Effect> = events
            .iter()
            .flat_map(|e| state.apply_turn_event(trip.round, e))
            .collect();
        state.transport_closed(trip.round);

        assert!(effects.is_empty());
        assert_eq!(state.snapshot(), before);
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn test_submit_rejected_while_busy() {
        let mut state = state();
        let now = Instant::now();
        let trip = state.begin_submit("show AAPL", now).unwrap();

        assert!(matches!(state.begin_submit("show TSLA", now), Err(AssistantError::Busy)));
        assert_eq!(state.turns().len(), 1);

        assert!(state.safety_timeout(trip.round, trip.deadline));
        assert!(state.begin_submit("show TSLA", trip.deadline).is_ok());
    }

    #[tokio::test]
    async fn test_busy_clears_after_timeout_without_response() {
        let config = AssistantConfig::default().with_busy_safety_timeout(Duration::from_secs(5));
        let mut state = ConversationState::new(&config);
        let now = Instant::now();
        let trip = state.begin_submit("hello", now).unwrap();
        state.transport_opened(trip.round);

        assert!(!state.safety_timeout(trip.round, now + Duration::from_secs(4)));
        assert!(state.is_busy());
        assert!(state.safety_timeout(trip.round, now + Duration::from_secs(5)));
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn test_transport_error_is_surfaced() {
        let mut state = state();
        show_chart(&mut state);
        let before = state.turns().len();

        let trip = state.begin_submit("show TSLA", Instant::now()).unwrap();
        let error = AgentError::Transport("connection reset".into());
        assert!(state.transport_failed(trip.round, &error));

        assert!(!state.is_busy());
        assert!(matches!(state.last_error(), Some(SessionError::Transport(_))));
        assert_eq!(state.turns().len(), before + 1);
        assert_eq!(state.phase(), UiPhase::ViewingData);

        // Next submit clears the error
        state.begin_submit("try again", Instant::now()).unwrap();
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn test_repeated_chart_does_not_reenter_phase() {
        let mut state = state();
        show_chart(&mut state);
        let (call, output) = chart_call("chart-2");
        let effects = round(&mut state, "show AAPL again", call, output);
        assert!(!effects.iter().any(|e| matches!(e, Effect::PhaseEntered(_))));
    }

    #[tokio::test]
    async fn test_reset_to_entry() {
        let mut state = state();
        show_chart(&mut state);
        propose_trade(&mut state);

        let effects = state.reset_to_entry();
        assert_eq!(effects, vec![Effect::StopSpeaking, Effect::PhaseEntered(UiPhase::Entry)]);
        assert!(state.chart().is_none());
        assert!(state.receipt().is_none());
        assert!(state.recompute().is_empty());
        assert_eq!(state.phase(), UiPhase::Entry);
    }

    #[tokio::test]
    async fn test_clear_chart_falls_back_to_entry() {
        let mut state = state();
        show_chart(&mut state);
        assert_eq!(state.clear_chart(), vec![Effect::PhaseEntered(UiPhase::Entry)]);
        assert!(state.clear_chart().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_finish_speaks_once() {
        let mut state = state();
        let trip = state.begin_submit("hello", Instant::now()).unwrap();
        state.transport_opened(trip.round);

        let turn_id = TurnId::new();
        let events = [
            TurnEvent::AssistantStarted { turn_id: turn_id.clone() },
            TurnEvent::TextDelta {
                turn_id: turn_id.clone(),
                delta: "Hi there.".into(),
            },
            TurnEvent::Finished { turn_id: turn_id.clone() },
            TurnEvent::Finished { turn_id },
        ];
        let spoken = events
            .iter()
            .flat_map(|e| state.apply_turn_event(trip.round, e))
            .filter(|e| matches!(e, Effect::Speak(_)))
            .count();
        assert_eq!(spoken, 1);

        // A later round speaks again
        state.transport_closed(trip.round);
        let effects = show_chart(&mut state);
        assert!(effects.contains(&Effect::Speak("Done.".into())));
    }

    #[tokio::test]
    async fn test_chat_mode_is_silent() {
        let config = AssistantConfig::default().with_mode(InteractionMode::Chat);
        let mut state = ConversationState::new(&config);
        let effects = show_chart(&mut state);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Speak(_))));
        assert!(state.speech_finished().is_empty());
    }

    #[tokio::test]
    async fn test_resume_listening_only_when_idle() {
        let mut busy = state();
        busy.begin_submit("show AAPL", Instant::now()).unwrap();
        assert!(busy.speech_finished().is_empty());

        let mut idle = state();
        assert_eq!(idle.speech_finished(), vec![Effect::ResumeListening]);
        idle.set_mode(InteractionMode::Chat);
        assert!(idle.speech_finished().is_empty());
    }
}
