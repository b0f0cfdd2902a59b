//! Keyword Provider
//!
//! Offline stand-in for a hosted model. It recognises a few phrasings, asks
//! for the matching tool, then describes the tool results once they are in.
//!
//! | Input                        | Tool                     |
//! |------------------------------|--------------------------|
//! | `show AAPL`, `chart TSLA 1Y` | `render_chart`           |
//! | `buy 5 AAPL`, `sell 2 of F`  | `generate_trade_receipt` |
//! | `price of MSFT`, `quote NVDA`| `get_quote`              |

use async_trait::async_trait;
use serde_json::json;

use aura_assistant::model::{ChartView, StockQuote, TradeReceipt};
use aura_core::{
    ConversationTurn, LlmProvider, ModelEvent, Result, ToolCall, ToolCallState, ToolKind,
    provider::{GenerationOptions, ModelStream},
    tool::ToolSchema,
};

const HELP: &str =
    "I can show a chart, look up a price, or prepare a trade. Try \"show AAPL\" or \"buy 5 F\".";

const PERIODS: [&str; 5] = ["1D", "1W", "1M", "3M", "1Y"];

/// Words that are never tickers
const FILLER: [&str; 16] = [
    "A", "AN", "THE", "OF", "ME", "FOR", "SHARE", "SHARES", "STOCK", "PLEASE", "SHOW", "CHART",
    "PRICE", "QUOTE", "BUY", "SELL",
];

#[derive(Debug, Default)]
pub struct KeywordProvider;

impl KeywordProvider {
    pub const fn new() -> Self {
        Self
    }

    /// Tool request for a user message, if it matches a known phrasing
    fn plan(text: &str) -> Option<(ToolKind, serde_json::Value)> {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_uppercase())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |word: &str| words.iter().any(|w| w == word);

        if has("BUY") || has("SELL") {
            let side = if has("BUY") { "buy" } else { "sell" };
            let qty = words.iter().find_map(|w| w.parse::<u32>().ok().filter(|q| *q > 0))?;
            let ticker = ticker(&words)?;
            return Some((
                ToolKind::GenerateTradeReceipt,
                json!({"ticker": ticker, "qty": qty, "side": side}),
            ));
        }

        if has("PRICE") || has("QUOTE") {
            return Some((ToolKind::GetQuote, json!({"ticker": ticker(&words)?})));
        }

        if has("SHOW") || has("CHART") {
            let mut input = json!({"ticker": ticker(&words)?});
            if let Some(period) = words.iter().find(|w| PERIODS.contains(&w.as_str())) {
                input["period"] = json!(period);
            }
            return Some((ToolKind::RenderChart, input));
        }

        None
    }

    /// Spoken summary of the tool calls resolved in the current turn
    fn describe(calls: &[ToolCall]) -> String {
        calls
            .iter()
            .map(describe_call)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn ticker(words: &[String]) -> Option<String> {
    words
        .iter()
        .find(|w| {
            (1..=5).contains(&w.len())
                && w.chars().all(|c| c.is_ascii_alphabetic())
                && !FILLER.contains(&w.as_str())
        })
        .cloned()
}

fn describe_call(call: &ToolCall) -> String {
    let output = match &call.state {
        ToolCallState::Completed { output } => output,
        ToolCallState::Failed { error } => return format!("Sorry, that didn't work: {error}."),
        ToolCallState::Pending => return String::new(),
    };
    if let Some(error) = output.get("error").and_then(|e| e.as_str()) {
        return format!("{error}.");
    }

    let output = output.clone();
    match call.kind() {
        Some(ToolKind::GetQuote) => serde_json::from_value::<StockQuote>(output).map_or_else(
            |_| HELP.to_string(),
            |q| format!("{} is at ${}, {}% today.", q.ticker, q.price, q.change_percent),
        ),
        Some(ToolKind::RenderChart) => serde_json::from_value::<ChartView>(output).map_or_else(
            |_| HELP.to_string(),
            |c| format!("Here's the {} chart for **{}**.", c.period.label(), c.ticker),
        ),
        Some(ToolKind::GenerateTradeReceipt) => {
            serde_json::from_value::<TradeReceipt>(output).map_or_else(
                |_| HELP.to_string(),
                |r| {
                    format!(
                        "I've prepared an order to {} {} {} for about ${}. \
                         Confirm when you're ready.",
                        r.side, r.qty, r.ticker, r.estimated_total
                    )
                },
            )
        }
        None => String::new(),
    }
}

#[async_trait]
impl LlmProvider for KeywordProvider {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn complete_stream(
        &self,
        turns: &[ConversationTurn],
        _tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> Result<ModelStream> {
        let current = turns.last().filter(|t| !t.is_user());

        let events = match current {
            Some(turn) if !turn.tool_calls.is_empty() => {
                vec![ModelEvent::TextDelta { delta: Self::describe(&turn.tool_calls) }]
            }
            _ => {
                let request = turns
                    .iter()
                    .rev()
                    .find(|t| t.is_user())
                    .and_then(|t| t.text.as_deref())
                    .and_then(Self::plan);
                match request {
                    Some((kind, input)) => {
                        tracing::debug!(tool = kind.name(), %input, "Keyword match");
                        vec![ModelEvent::ToolUse {
                            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                            name: kind.name().into(),
                            input,
                        }]
                    }
                    None => vec![ModelEvent::TextDelta { delta: HELP.into() }],
                }
            }
        };

        let events = events.into_iter().chain([ModelEvent::Done]).map(Ok);
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::TurnId;
    use futures::StreamExt;

    async fn run(turns: &[ConversationTurn]) -> Vec<ModelEvent> {
        let stream = KeywordProvider::new()
            .complete_stream(turns, &[], &GenerationOptions::default())
            .await
            .unwrap();
        stream.map(Result::unwrap).collect().await
    }

    #[test]
    fn test_plan_chart() {
        let (kind, input) = KeywordProvider::plan("Show me AAPL over 1y please").unwrap();
        assert_eq!(kind, ToolKind::RenderChart);
        assert_eq!(input, json!({"ticker": "AAPL", "period": "1Y"}));
    }

    #[test]
    fn test_plan_trade() {
        let (kind, input) = KeywordProvider::plan("sell 2 shares of tsla").unwrap();
        assert_eq!(kind, ToolKind::GenerateTradeReceipt);
        assert_eq!(input, json!({"ticker": "TSLA", "qty": 2, "side": "sell"}));
    }

    #[test]
    fn test_plan_quote() {
        let (kind, input) = KeywordProvider::plan("what's the price of MSFT?").unwrap();
        assert_eq!(kind, ToolKind::GetQuote);
        assert_eq!(input, json!({"ticker": "MSFT"}));
    }

    #[test]
    fn test_plan_trade_needs_quantity() {
        assert!(KeywordProvider::plan("buy AAPL").is_none());
        assert!(KeywordProvider::plan("hello there").is_none());
    }

    #[tokio::test]
    async fn test_first_round_requests_tool() {
        let turns = vec![
            ConversationTurn::user("show F"),
            ConversationTurn::assistant(TurnId::new()),
        ];
        let events = run(&turns).await;
        assert!(matches!(&events[0], ModelEvent::ToolUse { name, .. } if name == "render_chart"));
        assert_eq!(events.last(), Some(&ModelEvent::Done));
    }

    #[tokio::test]
    async fn test_second_round_describes_results() {
        let call = ToolCall::completed(
            "c1",
            "generate_trade_receipt",
            json!({}),
            json!({"ticker": "F", "qty": 5, "side": "buy", "estimatedTotal": "52.10"}),
        );
        let turns = vec![
            ConversationTurn::user("buy 5 F"),
            ConversationTurn::assistant(TurnId::new()).with_tool_call(call),
        ];
        let events = run(&turns).await;
        let ModelEvent::TextDelta { delta } = &events[0] else {
            panic!("expected text, got {events:?}");
        };
        assert!(delta.contains("buy 5 F for about $52.10"));
    }

    #[tokio::test]
    async fn test_unknown_request_gets_help() {
        let turns = vec![
            ConversationTurn::user("tell me a joke"),
            ConversationTurn::assistant(TurnId::new()),
        ];
        let events = run(&turns).await;
        assert_eq!(events[0], ModelEvent::TextDelta { delta: HELP.into() });
    }
}
