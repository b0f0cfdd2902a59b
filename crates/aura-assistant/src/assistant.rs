//! Assistant driver
//!
//! Owns the [`ConversationState`] and everything asynchronous around it:
//! forwarding the completion stream, the busy-flag safety timer and trade
//! execution. All of those report back through one event channel, and
//! [`Assistant::process_next`] applies them one at a time, so the state is
//! never mutated concurrently.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut assistant = Assistant::new(agent, brokerage, AssistantConfig::from_env());
//! let mut snapshots = assistant.subscribe();
//!
//! assistant.submit("show me AAPL")?;
//! while let Some(effects) = assistant.process_next().await {
//!     render(&snapshots.borrow_and_update(), &effects);
//! }
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use aura_core::{AgentError, CompletionTransport, TurnEvent};

use crate::brokerage::TradeExecutor;
use crate::busy::RoundTrip;
use crate::config::AssistantConfig;
use crate::error::Result;
use crate::model::TradeResult;
use crate::state::{AssistantSnapshot, ConversationState, Effect, PendingTrade};

/// Something that happened outside the caller's direct control
#[derive(Debug)]
pub enum AssistantEvent {
    TransportOpened { round: u64 },
    Turn { round: u64, event: TurnEvent },
    TransportError { round: u64, error: AgentError },
    TransportClosed { round: u64 },
    SafetyTimeout { round: u64 },
    TradeSettled {
        source_call_id: String,
        result: Result<TradeResult>,
    },
}

pub struct Assistant {
    transport: Arc<dyn CompletionTransport>,
    executor: Arc<dyn TradeExecutor>,
    state: ConversationState,
    events_tx: mpsc::UnboundedSender<AssistantEvent>,
    events_rx: mpsc::UnboundedReceiver<AssistantEvent>,
    snapshots: watch::Sender<AssistantSnapshot>,
}

impl Assistant {
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        executor: Arc<dyn TradeExecutor>,
        config: &AssistantConfig,
    ) -> Self {
        let state = ConversationState::new(config);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            transport,
            executor,
            state,
            events_tx,
            events_rx,
            snapshots,
        }
    }

    pub const fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn snapshot(&self) -> AssistantSnapshot {
        self.state.snapshot()
    }

    /// Receive every published snapshot change
    pub fn subscribe(&self) -> watch::Receiver<AssistantSnapshot> {
        self.snapshots.subscribe()
    }

    /// Send a user message. Rejected while a previous one is still busy.
    pub fn submit(&mut self, text: &str) -> Result<()> {
        let trip = self.state.begin_submit(text, Instant::now())?;
        tracing::info!(round = trip.round, "Submitting user turn");

        self.spawn_completion(trip.round);
        self.spawn_safety_timer(trip);
        self.publish();
        Ok(())
    }

    /// Execute the trade on the active receipt
    pub fn confirm_trade(&mut self) -> Result<()> {
        let trade = self.state.begin_trade()?;
        self.spawn_trade(trade);
        self.publish();
        Ok(())
    }

    pub fn cancel_trade(&mut self) -> Result<Vec<Effect>> {
        let effects = self.state.cancel_trade()?;
        self.publish();
        Ok(effects)
    }

    pub fn reset_to_entry(&mut self) -> Vec<Effect> {
        let effects = self.state.reset_to_entry();
        self.publish();
        effects
    }

    pub fn clear_chart(&mut self) -> Vec<Effect> {
        let effects = self.state.clear_chart();
        self.publish();
        effects
    }

    pub fn stop_speaking(&self) -> Vec<Effect> {
        self.state.stop_speaking()
    }

    pub fn speech_finished(&self) -> Vec<Effect> {
        self.state.speech_finished()
    }

    /// Wait for the next background event and apply it
    pub async fn process_next(&mut self) -> Option<Vec<Effect>> {
        let event = self.events_rx.recv().await?;
        Some(self.handle(event))
    }

    /// Process events until the busy flag drops
    pub async fn settle(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        while self.state.is_busy() {
            match self.process_next().await {
                Some(more) => effects.extend(more),
                None => break,
            }
        }
        effects
    }

    pub fn handle(&mut self, event: AssistantEvent) -> Vec<Effect> {
        let effects = match event {
            AssistantEvent::TransportOpened { round } => {
                self.state.transport_opened(round);
                Vec::new()
            }
            AssistantEvent::Turn { round, event } => self.state.apply_turn_event(round, &event),
            AssistantEvent::TransportError { round, error } => {
                self.state.transport_failed(round, &error);
                Vec::new()
            }
            AssistantEvent::TransportClosed { round } => {
                self.state.transport_closed(round);
                Vec::new()
            }
            AssistantEvent::SafetyTimeout { round } => {
                self.state.safety_timeout(round, Instant::now());
                Vec::new()
            }
            AssistantEvent::TradeSettled {
                source_call_id,
                result,
            } => self.state.trade_finished(&source_call_id, result),
        };
        self.publish();
        effects
    }

    fn publish(&self) {
        let next = self.state.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn spawn_completion(&self, round: u64) {
        let transport = self.transport.clone();
        let history = self.state.history();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let mut stream = match transport.open(history).await {
                Ok(stream) => stream,
                Err(error) => {
                    let _ = tx.send(AssistantEvent::TransportError { round, error });
                    return;
                }
            };
            let _ = tx.send(AssistantEvent::TransportOpened { round });

            while let Some(item) = stream.next().await {
                let sent = match item {
                    Ok(event) => tx.send(AssistantEvent::Turn { round, event }),
                    Err(error) => {
                        let _ = tx.send(AssistantEvent::TransportError { round, error });
                        return;
                    }
                };
                if sent.is_err() {
                    tracing::debug!(round, "Assistant dropped; abandoning stream");
                    return;
                }
            }
            let _ = tx.send(AssistantEvent::TransportClosed { round });
        });
    }

    fn spawn_safety_timer(&self, trip: RoundTrip) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(trip.deadline).await;
            let _ = tx.send(AssistantEvent::SafetyTimeout { round: trip.round });
        });
    }

    fn spawn_trade(&self, trade: PendingTrade) {
        let executor = self.executor.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = executor.submit_order(&trade.order).await;
            let _ = tx.send(AssistantEvent::TradeSettled {
                source_call_id: trade.source_call_id,
                result,
            });
        });
    }
}
