//! Tool Loop
//!
//! The [`Agent`] is the completion transport: it asks the provider for a
//! response, executes any tool calls the model issues, feeds the results back
//! and streams every step out as a [`TurnEvent`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{AgentError, Result};
use crate::message::{ConversationTurn, TurnId};
use crate::provider::{
    CompletionTransport, GenerationOptions, LlmProvider, ModelEvent, TurnEvent, TurnStream,
};
use crate::tool::{ToolCall, ToolRegistry};

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Generation options, including the system prompt
    pub generation: GenerationOptions,

    /// Tool round trips allowed per completion before the turn is closed
    pub max_tool_roundtrips: usize,

    /// Buffered turn events per open completion
    pub channel_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            max_tool_roundtrips: 3,
            channel_capacity: 64,
        }
    }
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionTransport for Agent {
    async fn open(&self, history: Vec<ConversationTurn>) -> Result<TurnStream> {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let run = ToolLoop {
            provider: self.provider.clone(),
            tools: self.tools.clone(),
            config: self.config.clone(),
            tx,
        };

        tokio::spawn(async move {
            let tx = run.tx.clone();
            if let Err(e) = run.drive(history).await {
                tracing::warn!(error = %e, "Completion ended with error");
                // Receiver may already be gone
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// State for one spawned completion
struct ToolLoop {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    tx: mpsc::Sender<Result<TurnEvent>>,
}

impl ToolLoop {
    async fn drive(&self, mut history: Vec<ConversationTurn>) -> Result<()> {
        let turn_id = TurnId::new();
        history.push(ConversationTurn::assistant(turn_id.clone()));
        let idx = history.len() - 1;
        let schemas = self.tools.schemas();

        self.emit(TurnEvent::AssistantStarted {
            turn_id: turn_id.clone(),
        })
        .await?;

        let mut round = 0;
        loop {
            let mut stream = self
                .provider
                .complete_stream(&history, &schemas, &self.config.generation)
                .await?;

            let mut issued = Vec::new();
            while let Some(event) = stream.next().await {
                match event? {
                    ModelEvent::TextDelta { delta } => {
                        history[idx].append_text(&delta);
                        self.emit(TurnEvent::TextDelta {
                            turn_id: turn_id.clone(),
                            delta,
                        })
                        .await?;
                    }
                    ModelEvent::ToolUse { call_id, name, input } => {
                        if history[idx].find_call(&call_id).is_some() {
                            tracing::warn!(
                                call_id = %call_id,
                                tool = %name,
                                "Duplicate tool call id, skipped"
                            );
                            continue;
                        }
                        let call = ToolCall::pending(call_id, name, input);
                        history[idx].tool_calls.push(call.clone());
                        self.emit(TurnEvent::ToolCallStarted {
                            turn_id: turn_id.clone(),
                            call: call.clone(),
                        })
                        .await?;
                        issued.push(call);
                    }
                    ModelEvent::Done => break,
                }
            }

            if issued.is_empty() {
                break;
            }

            for call in issued {
                let event = self.run_tool(&turn_id, &call).await;
                let slot = history[idx].find_call_mut(&call.call_id).ok_or_else(|| {
                    AgentError::Ingest(format!("tool call {} missing from turn", call.call_id))
                })?;
                match &event {
                    TurnEvent::ToolCallCompleted { output, .. } => slot.complete(output.clone())?,
                    TurnEvent::ToolCallFailed { error, .. } => slot.fail(error.clone())?,
                    _ => {}
                }
                self.emit(event).await?;
            }

            round += 1;
            if round >= self.config.max_tool_roundtrips {
                tracing::warn!(
                    max = self.config.max_tool_roundtrips,
                    "Tool round trip limit reached, closing turn"
                );
                break;
            }
        }

        self.emit(TurnEvent::Finished { turn_id }).await
    }

    /// Execute one call; registry errors become a failed call, not a stream error
    async fn run_tool(&self, turn_id: &TurnId, call: &ToolCall) -> TurnEvent {
        tracing::debug!(tool = %call.tool_name, call_id = %call.call_id, "Executing tool");

        match self.tools.execute(&call.tool_name, &call.input).await {
            Ok(output) => TurnEvent::ToolCallCompleted {
                turn_id: turn_id.clone(),
                call_id: call.call_id.clone(),
                output,
            },
            Err(e) => {
                tracing::warn!(
                    tool = %call.tool_name,
                    call_id = %call.call_id,
                    error = %e,
                    "Tool failed"
                );
                TurnEvent::ToolCallFailed {
                    turn_id: turn_id.clone(),
                    call_id: call.call_id.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    async fn emit(&self, event: TurnEvent) -> Result<()> {
        self.tx
            .send(Ok(event))
            .await
            .map_err(|_| AgentError::Transport("turn stream receiver dropped".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelStream;
    use crate::tool::{ParameterSchema, Tool, ToolSchema};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Issues one tool call per round until `tool_rounds` is used up, then speaks
    struct LoopingProvider {
        calls: AtomicUsize,
        tool_rounds: usize,
        tool: &'static str,
    }

    #[async_trait]
    impl LlmProvider for LoopingProvider {
        fn name(&self) -> &str {
            "looping"
        }

        async fn complete_stream(
            &self,
            _turns: &[ConversationTurn],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<ModelStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let events = if n < self.tool_rounds {
                vec![
                    Ok(ModelEvent::ToolUse {
                        call_id: format!("call-{n}"),
                        name: self.tool.into(),
                        input: json!({"ticker": "AAPL"}),
                    }),
                    Ok(ModelEvent::Done),
                ]
            } else {
                vec![
                    Ok(ModelEvent::TextDelta { delta: "AAPL looks ".into() }),
                    Ok(ModelEvent::TextDelta { delta: "solid.".into() }),
                    Ok(ModelEvent::Done),
                ]
            };
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    /// Requests the same call id twice in one response, then again next round
    struct RepeatingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for RepeatingProvider {
        fn name(&self) -> &str {
            "repeating"
        }

        async fn complete_stream(
            &self,
            _turns: &[ConversationTurn],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<ModelStream> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let tool_use = || {
                Ok(ModelEvent::ToolUse {
                    call_id: "call-same".into(),
                    name: "render_chart".into(),
                    input: json!({"ticker": "AAPL"}),
                })
            };
            let events = match n {
                0 => vec![tool_use(), tool_use(), Ok(ModelEvent::Done)],
                1 => vec![tool_use(), Ok(ModelEvent::Done)],
                _ => vec![
                    Ok(ModelEvent::TextDelta {
                        delta: "Done.".into(),
                    }),
                    Ok(ModelEvent::Done),
                ],
            };
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl LlmProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete_stream(
            &self,
            _turns: &[ConversationTurn],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> Result<ModelStream> {
            Err(AgentError::ProviderUnavailable("offline".into()))
        }
    }

    struct ChartTool;

    #[async_trait]
    impl Tool for ChartTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "render_chart".into(),
                description: "Chart".into(),
                parameters: vec![ParameterSchema::required("ticker", "string", "Ticker")],
                has_side_effects: false,
            }
        }

        async fn execute(&self, input: &serde_json::Value) -> Result<serde_json::Value> {
            Ok(json!({"ticker": input["ticker"], "period": "1M", "bars": []}))
        }
    }

    fn agent(provider: impl LlmProvider + 'static, max_tool_roundtrips: usize) -> Agent {
        let mut tools = ToolRegistry::new();
        tools.register(ChartTool);
        let config = AgentConfig {
            max_tool_roundtrips,
            ..AgentConfig::default()
        };
        Agent::new(Arc::new(provider), Arc::new(tools), config)
    }

    async fn collect(agent: &Agent) -> Vec<Result<TurnEvent>> {
        let stream = agent.open(vec![ConversationTurn::user("show AAPL")]).await.unwrap();
        stream.collect().await
    }

    #[tokio::test]
    async fn test_tool_then_text() {
        let agent = agent(
            LoopingProvider {
                calls: AtomicUsize::new(0),
                tool_rounds: 1,
                tool: "render_chart",
            },
            3,
        );
        let events: Vec<_> = collect(&agent).await.into_iter().map(Result::unwrap).collect();

        assert!(matches!(events[0], TurnEvent::AssistantStarted { .. }));
        assert!(matches!(events[1], TurnEvent::ToolCallStarted { .. }));
        assert!(matches!(events[2], TurnEvent::ToolCallCompleted { .. }));
        assert!(matches!(events.last(), Some(TurnEvent::Finished { .. })));

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::TextDelta { delta, .. } => Some(delta.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "AAPL looks solid.");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_failed_call() {
        let agent = agent(
            LoopingProvider {
                calls: AtomicUsize::new(0),
                tool_rounds: 1,
                tool: "place_order_now",
            },
            3,
        );
        let events: Vec<_> = collect(&agent).await.into_iter().map(Result::unwrap).collect();
        assert!(events.iter().any(|e| matches!(e, TurnEvent::ToolCallFailed { .. })));
        assert!(matches!(events.last(), Some(TurnEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_roundtrip_limit_closes_turn() {
        let agent = agent(
            LoopingProvider {
                calls: AtomicUsize::new(0),
                tool_rounds: 10,
                tool: "render_chart",
            },
            2,
        );
        let events: Vec<_> = collect(&agent).await.into_iter().map(Result::unwrap).collect();
        let started = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolCallStarted { .. }))
            .count();
        assert_eq!(started, 2);
        assert!(matches!(events.last(), Some(TurnEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_repeated_call_id_runs_once() {
        let agent = agent(RepeatingProvider { calls: AtomicUsize::new(0) }, 3);
        let events: Vec<_> = collect(&agent).await.into_iter().map(Result::unwrap).collect();

        let started = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolCallStarted { .. }))
            .count();
        let completed = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolCallCompleted { .. }))
            .count();
        assert_eq!(started, 1);
        assert_eq!(completed, 1);
        assert!(matches!(events.last(), Some(TurnEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_provider_error_ends_stream_with_err() {
        let agent = agent(BrokenProvider, 3);
        let events = collect(&agent).await;
        assert!(matches!(events[0], Ok(TurnEvent::AssistantStarted { .. })));
        assert!(matches!(events.last(), Some(Err(AgentError::ProviderUnavailable(_)))));
    }
}
