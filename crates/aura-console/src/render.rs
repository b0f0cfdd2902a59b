//! Terminal rendering of assistant snapshots

use aura_assistant::{
    AccountSummary, AssistantSnapshot, ChartView, Effect, Position, TradeReceipt, UiPhase,
};

/// Lines describing what changed between two snapshots
pub fn diff(previous: &AssistantSnapshot, next: &AssistantSnapshot) -> Vec<String> {
    let mut lines = Vec::new();

    if next.chart != previous.chart {
        if let Some(chart) = &next.chart {
            lines.push(chart_line(chart));
        }
    }
    if next.receipt != previous.receipt {
        if let Some(receipt) = &next.receipt {
            lines.extend(receipt_lines(receipt));
        }
    }
    if next.is_busy != previous.is_busy {
        lines.push(if next.is_busy { "  … thinking".into() } else { String::new() });
    }
    if next.executing_trade && !previous.executing_trade {
        lines.push("  … submitting order".into());
    }
    if next.last_error != previous.last_error {
        if let Some(error) = &next.last_error {
            lines.push(format!("  ! {error}"));
        }
    }

    lines.retain(|l| !l.is_empty());
    lines
}

pub fn effect_line(effect: &Effect) -> Option<String> {
    match effect {
        Effect::PhaseEntered(phase) => Some(format!("── {} ──", phase_title(*phase))),
        Effect::Speak(text) => Some(format!("aura> {text}")),
        Effect::TradeExecuted(result) => Some(format!(
            "  ✓ order {} {}",
            result.order_id.as_deref().unwrap_or("?"),
            result.status.as_deref().unwrap_or("accepted"),
        )),
        Effect::StopSpeaking | Effect::ResumeListening => None,
    }
}

pub const fn phase_title(phase: UiPhase) -> &'static str {
    match phase {
        UiPhase::Entry => "Ask me about a stock",
        UiPhase::ViewingData => "Market data",
        UiPhase::AwaitingTradeConfirmation => "Review your order  (/confirm or /cancel)",
    }
}

pub fn account_lines(account: &AccountSummary) -> Vec<String> {
    vec![
        format!(
            "  [account] portfolio ${}  cash ${}",
            account.portfolio_value, account.cash
        ),
        format!(
            "            buying power ${}  day trades {}",
            account.buying_power, account.day_trade_count
        ),
    ]
}

pub fn position_lines(positions: &[Position]) -> Vec<String> {
    if positions.is_empty() {
        return vec!["  [positions] none".into()];
    }
    positions
        .iter()
        .map(|p| {
            format!(
                "  [position] {} {} @ ${}  now ${}  value ${}  P/L ${} ({}%)",
                p.ticker,
                p.qty,
                p.avg_entry_price,
                p.current_price,
                p.market_value(),
                p.unrealized_pl,
                p.unrealized_pl_percent
            )
        })
        .collect()
}

fn chart_line(chart: &ChartView) -> String {
    if let Some(error) = &chart.error {
        return format!("  [chart] {}: {error}", chart.ticker);
    }
    let range = chart
        .bars
        .iter()
        .map(|b| (b.low, b.high))
        .reduce(|(lo, hi), (l, h)| (lo.min(l), hi.max(h)));
    match (range, chart.last_close()) {
        (Some((low, high)), Some(close)) => format!(
            "  [chart] {} {}  {} bars  close {close}  range {low} – {high}",
            chart.ticker,
            chart.period,
            chart.bars.len()
        ),
        _ => format!("  [chart] {} {}  no data", chart.ticker, chart.period),
    }
}

fn receipt_lines(receipt: &TradeReceipt) -> Vec<String> {
    if let Some(error) = &receipt.error {
        return vec![format!("  [receipt] {} {}: {error}", receipt.side, receipt.ticker)];
    }
    let mut lines = vec![
        format!(
            "  [receipt] {} {} {} ({})",
            receipt.side.to_string().to_uppercase(),
            receipt.qty,
            receipt.ticker,
            receipt.order_type
        ),
        format!(
            "            price ${}  est. total ${}",
            receipt.current_price, receipt.estimated_total
        ),
    ];
    if let Some(stop) = receipt.stop_loss {
        lines.push(format!("            stop loss ${stop}"));
    }
    lines
}
