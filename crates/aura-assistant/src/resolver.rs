//! Tool Result Resolver
//!
//! Derives the active chart and trade receipt from the turn log. Every pass
//! rescans the whole log, newest turn first, and only reports a kind as
//! changed when its derived value differs structurally from what was emitted
//! last time. Running a pass twice on the same log is therefore a no-op.
//!
//! Receipts the user has dismissed are remembered by call id in the cleared
//! set and never selected again, even though their calls stay `completed` in
//! the log. Dismissing a receipt also suppresses every older receipt it
//! superseded, so cancelling never brings back an earlier proposal.

use std::collections::HashSet;

use aura_core::{ConversationTurn, Role, ToolCall, ToolKind};

use crate::model::{ChartView, TradeReceipt};

/// Which derived values changed in a pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub chart_changed: bool,
    pub receipt_changed: bool,
}

impl Resolution {
    pub const fn is_empty(self) -> bool {
        !self.chart_changed && !self.receipt_changed
    }
}

/// Freshest eligible values found by one scan
#[derive(Debug, Default)]
struct Candidates {
    chart: Option<(String, ChartView)>,
    receipt: Option<TradeReceipt>,
}

#[derive(Debug, Default)]
pub struct ToolResultResolver {
    chart: Option<ChartView>,

    /// Call that produced the freshest chart seen, even if equal in content
    chart_source: Option<String>,

    /// Chart call hidden by `clear_chart`
    dismissed_chart: Option<String>,

    receipt: Option<TradeReceipt>,

    /// Receipt call ids that must never resurface. Grows for the whole session.
    cleared: HashSet<String>,
}

impl ToolResultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn chart(&self) -> Option<&ChartView> {
        self.chart.as_ref()
    }

    pub const fn receipt(&self) -> Option<&TradeReceipt> {
        self.receipt.as_ref()
    }

    pub fn is_cleared(&self, call_id: &str) -> bool {
        self.cleared.contains(call_id)
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.len()
    }

    /// Recompute both derived values from the full log
    pub fn resolve(&mut self, turns: &[ConversationTurn]) -> Resolution {
        let found = self.scan(turns);

        let chart = found.chart.as_ref().map(|(_, chart)| chart);
        let chart_changed = chart != self.chart.as_ref();
        if let Some((source, chart)) = found.chart {
            self.chart_source = Some(source);
            if chart_changed {
                self.chart = Some(chart);
            }
        } else if chart_changed {
            self.chart = None;
        }

        let receipt_changed = found.receipt != self.receipt;
        if receipt_changed {
            self.receipt = found.receipt;
        }

        let resolution = Resolution {
            chart_changed,
            receipt_changed,
        };
        if !resolution.is_empty() {
            tracing::debug!(
                chart = ?self.chart.as_ref().map(|c| &c.ticker),
                receipt = ?self.receipt.as_ref().map(|r| &r.source_call_id),
                ?resolution,
                "Derived state changed"
            );
        }
        resolution
    }

    /// Hide the current chart until a newer chart call completes
    pub fn clear_chart(&mut self) -> bool {
        if self.chart.take().is_none() {
            return false;
        }
        self.dismissed_chart = self.chart_source.clone();
        true
    }

    /// Suppress the current receipt, and the completed receipts logged before
    /// it, for the rest of the session. Returns the current receipt's call id.
    pub fn clear_receipt(&mut self, turns: &[ConversationTurn]) -> Option<String> {
        let receipt = self.receipt.take()?;
        let source = receipt.source_call_id;

        let older = turns
            .iter()
            .filter(|t| t.role == Role::Assistant)
            .flat_map(|t| t.tool_calls.iter())
            .take_while(|c| c.call_id != source)
            .filter(|c| c.is_completed() && c.kind() == Some(ToolKind::GenerateTradeReceipt))
            .map(|c| c.call_id.clone());
        self.cleared.extend(older);
        self.cleared.insert(source.clone());

        tracing::debug!(call_id = %source, cleared = self.cleared.len(), "Receipt cleared");
        Some(source)
    }

    fn scan(&self, turns: &[ConversationTurn]) -> Candidates {
        let mut found = Candidates::default();
        let mut chart_done = false;
        let mut receipt_done = false;

        let calls = turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Assistant)
            .flat_map(|t| t.tool_calls.iter().rev());

        for call in calls {
            if chart_done && receipt_done {
                break;
            }
            let Some(output) = call.output() else {
                continue;
            };

            match call.kind() {
                Some(ToolKind::RenderChart) if !chart_done => {
                    if let Some(chart) = parse::<ChartView>(call, output) {
                        chart_done = true;
                        if self.dismissed_chart.as_deref() != Some(call.call_id.as_str()) {
                            found.chart = Some((call.call_id.clone(), chart));
                        }
                    }
                }
                Some(ToolKind::GenerateTradeReceipt)
                    if !receipt_done && !self.cleared.contains(&call.call_id) =>
                {
                    if let Some(mut receipt) = parse::<TradeReceipt>(call, output) {
                        receipt.source_call_id.clone_from(&call.call_id);
                        found.receipt = Some(receipt);
                        receipt_done = true;
                    }
                }
                _ => {}
            }
        }

        found
    }
}

/// Payloads that cannot be read as the expected shape are skipped
fn parse<T: serde::de::DeserializeOwned>(call: &ToolCall, output: &serde_json::Value) -> Option<T> {
    match serde_json::from_value(output.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                call_id = %call.call_id,
                tool = %call.tool_name,
                error = %e,
                "Unreadable tool output"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_core::{ToolCall, TurnId};
    use serde_json::json;

    fn assistant(calls: Vec<ToolCall>) -> ConversationTurn {
        calls
            .into_iter()
            .fold(ConversationTurn::assistant(TurnId::new()), ConversationTurn::with_tool_call)
    }

    fn chart(id: &str, ticker: &str) -> ToolCall {
        ToolCall::completed(
            id,
            "render_chart",
            json!({"ticker": ticker}),
            json!({"ticker": ticker, "period": "1M", "bars": []}),
        )
    }

    fn receipt(id: &str, ticker: &str, qty: u32) -> ToolCall {
        ToolCall::completed(
            id,
            "generate_trade_receipt",
            json!({"ticker": ticker, "qty": qty, "side": "buy"}),
            json!({"ticker": ticker, "qty": qty, "side": "buy", "orderType": "market",
                   "currentPrice": "10.00", "estimatedTotal": "50.00"}),
        )
    }

    #[test]
    fn test_latest_chart_wins() {
        let turns = vec![
            ConversationTurn::user("show AAPL"),
            assistant(vec![chart("c1", "AAPL")]),
            ConversationTurn::user("and TSLA"),
            assistant(vec![chart("c2", "TSLA")]),
        ];
        let mut resolver = ToolResultResolver::new();
        let res = resolver.resolve(&turns);

        assert!(res.chart_changed);
        assert!(!res.receipt_changed);
        assert_eq!(resolver.chart().unwrap().ticker, "TSLA");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let turns = vec![assistant(vec![chart("c1", "AAPL"), receipt("r1", "AAPL", 5)])];
        let mut resolver = ToolResultResolver::new();

        assert!(!resolver.resolve(&turns).is_empty());
        let chart = resolver.chart().cloned();
        let receipt = resolver.receipt().cloned();

        assert!(resolver.resolve(&turns).is_empty());
        assert_eq!(resolver.chart().cloned(), chart);
        assert_eq!(resolver.receipt().cloned(), receipt);
    }

    #[test]
    fn test_structurally_equal_chart_is_not_a_change() {
        let mut turns = vec![assistant(vec![chart("c1", "AAPL")])];
        let mut resolver = ToolResultResolver::new();
        assert!(resolver.resolve(&turns).chart_changed);

        turns.push(ConversationTurn::user("show it again"));
        turns.push(assistant(vec![chart("c2", "AAPL")]));
        assert!(!resolver.resolve(&turns).chart_changed);
    }

    #[test]
    fn test_pending_and_failed_calls_are_ignored() {
        let mut failed = ToolCall::pending("c2", "render_chart", json!({"ticker": "TSLA"}));
        failed.fail("upstream timeout").unwrap();
        let turns = vec![
            assistant(vec![chart("c1", "AAPL")]),
            assistant(vec![
                ToolCall::pending("c3", "render_chart", json!({"ticker": "MSFT"})),
                failed,
            ]),
        ];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);
        assert_eq!(resolver.chart().unwrap().ticker, "AAPL");
    }

    #[test]
    fn test_soft_error_payload_still_selected() {
        let call = ToolCall::completed(
            "c1",
            "render_chart",
            json!({"ticker": "XYZ"}),
            json!({"ticker": "XYZ", "error": "Ticker not supported: XYZ"}),
        );
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&[assistant(vec![call])]);
        assert!(resolver.chart().unwrap().is_error());
    }

    #[test]
    fn test_user_turns_are_never_scanned() {
        let user = ConversationTurn::user("fake").with_tool_call(chart("u1", "AAPL"));
        let mut resolver = ToolResultResolver::new();
        assert!(resolver.resolve(&[user]).is_empty());
        assert!(resolver.chart().is_none());
    }

    #[test]
    fn test_receipt_carries_source_call_id() {
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&[assistant(vec![receipt("r1", "F", 5)])]);
        assert_eq!(resolver.receipt().unwrap().source_call_id, "r1");
    }

    #[test]
    fn test_cleared_receipt_never_resurfaces() {
        let turns = vec![
            assistant(vec![receipt("r1", "F", 5)]),
            assistant(vec![receipt("r2", "F", 10)]),
        ];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);
        assert_eq!(resolver.receipt().unwrap().source_call_id, "r2");

        assert_eq!(resolver.clear_receipt(&turns).as_deref(), Some("r2"));
        assert!(resolver.is_cleared("r2"));
        assert!(resolver.is_cleared("r1"));

        for _ in 0..3 {
            assert!(resolver.resolve(&turns).is_empty());
            assert!(resolver.receipt().is_none());
        }
        assert_eq!(resolver.cleared_count(), 2);
    }

    #[test]
    fn test_newer_receipt_after_clear_is_selected() {
        let mut turns = vec![assistant(vec![receipt("r1", "F", 5)])];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);
        resolver.clear_receipt(&turns);

        turns.push(assistant(vec![receipt("r2", "F", 5)]));
        assert!(resolver.resolve(&turns).receipt_changed);
        assert_eq!(resolver.receipt().unwrap().source_call_id, "r2");
        assert!(!resolver.is_cleared("r2"));
    }

    #[test]
    fn test_clear_receipt_leaves_chart() {
        let turns = vec![assistant(vec![chart("c1", "AAPL"), receipt("r1", "AAPL", 5)])];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);
        resolver.clear_receipt(&turns);
        assert!(resolver.chart().is_some());
        assert!(resolver.resolve(&turns).is_empty());
    }

    #[test]
    fn test_cleared_chart_stays_hidden_until_newer_chart() {
        let mut turns = vec![assistant(vec![chart("c1", "AAPL")])];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);

        assert!(resolver.clear_chart());
        assert!(!resolver.clear_chart());
        assert!(resolver.resolve(&turns).is_empty());
        assert!(resolver.chart().is_none());

        turns.push(assistant(vec![chart("c2", "AAPL")]));
        assert!(resolver.resolve(&turns).chart_changed);
        assert_eq!(resolver.chart().unwrap().ticker, "AAPL");
    }

    #[test]
    fn test_unreadable_output_is_skipped() {
        let bad = ToolCall::completed("c2", "render_chart", json!({}), json!({"nope": true}));
        let turns = vec![assistant(vec![chart("c1", "AAPL")]), assistant(vec![bad])];
        let mut resolver = ToolResultResolver::new();
        resolver.resolve(&turns);
        assert_eq!(resolver.chart().unwrap().ticker, "AAPL");
    }
}
