//! Domain Models
//!
//! Market data, chart and receipt payloads, and the order hand-off.
//! Uses `rust_decimal` for all prices and totals - never use f64 for money!
//!
//! Tool payloads serialize in camelCase because that is what the rendering
//! layer and the model both see.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Time window a chart covers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartPeriod {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[default]
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    OneYear,
}

impl ChartPeriod {
    /// Number of bars a chart of this period carries
    pub const fn bar_count(self) -> usize {
        match self {
            Self::OneDay => 7,
            Self::OneWeek => 5,
            Self::OneMonth => 21,
            Self::ThreeMonths => 63,
            Self::OneYear => 252,
        }
    }

    /// Whether bars are hourly rather than daily
    pub const fn is_intraday(self) -> bool {
        matches!(self, Self::OneDay)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::OneWeek => "1W",
            Self::OneMonth => "1M",
            Self::ThreeMonths => "3M",
            Self::OneYear => "1Y",
        }
    }
}

impl std::fmt::Display for ChartPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Market => write!(f, "market"),
            Self::Limit => write!(f, "limit"),
            Self::Stop => write!(f, "stop"),
            Self::StopLimit => write!(f, "stop_limit"),
        }
    }
}

/// One OHLCV bar
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBar {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

/// Quote snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockQuote {
    pub ticker: String,

    /// Last trade price in USD
    pub price: Decimal,

    /// Change since previous close
    pub change: Decimal,

    pub change_percent: Decimal,

    pub volume: u64,
}

/// Chart currently on screen
///
/// Equality is structural: two charts with the same ticker, period and bars
/// are the same chart regardless of which call produced them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartView {
    pub ticker: String,

    #[serde(default)]
    pub period: ChartPeriod,

    #[serde(default)]
    pub bars: Vec<StockBar>,

    /// Tool-level soft error (e.g. unknown ticker), rendered as an error card
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChartView {
    pub fn new(ticker: impl Into<String>, period: ChartPeriod, bars: Vec<StockBar>) -> Self {
        Self {
            ticker: ticker.into().to_uppercase(),
            period,
            bars,
            error: None,
        }
    }

    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Close of the most recent bar
    pub fn last_close(&self) -> Option<Decimal> {
        self.bars.last().map(|b| b.close)
    }
}

/// Trade awaiting the user's confirmation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub ticker: String,

    pub qty: Decimal,

    pub side: OrderSide,

    #[serde(default)]
    pub order_type: OrderType,

    #[serde(default)]
    pub current_price: Decimal,

    /// `current_price * qty`, rounded to cents
    #[serde(default)]
    pub estimated_total: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,

    /// Tool call that produced this receipt; a lookup key for suppression
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_call_id: String,

    /// Tool-level soft error (e.g. price unavailable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeReceipt {
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The order exactly as the user saw it
    pub fn order(&self) -> TradeOrder {
        TradeOrder {
            ticker: self.ticker.clone(),
            qty: self.qty,
            side: self.side,
            order_type: self.order_type,
            stop_loss: self.stop_loss,
        }
    }
}

/// Order handed to the trade executor on confirmation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrder {
    pub ticker: String,
    pub qty: Decimal,
    pub side: OrderSide,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
}

/// Outcome reported by the trade executor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filled_price: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TradeResult {
    pub fn accepted(order_id: impl Into<String>, filled_price: Decimal) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            status: Some("accepted".into()),
            filled_price: Some(filled_price),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            status: Some("rejected".into()),
            filled_price: None,
            error: Some(error.into()),
        }
    }
}

/// Balances of the brokerage account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub buying_power: Decimal,

    /// Cash plus the market value of every position
    pub portfolio_value: Decimal,

    pub cash: Decimal,

    pub day_trade_count: u32,
}

/// Open holding in one ticker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub ticker: String,
    pub qty: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,

    #[serde(rename = "unrealizedPL")]
    pub unrealized_pl: Decimal,

    #[serde(rename = "unrealizedPLPercent")]
    pub unrealized_pl_percent: Decimal,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        (self.qty * self.current_price).round_dp(2)
    }
}

/// How the user is talking to the assistant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Voice,
    Chat,
}

impl std::str::FromStr for InteractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "voice" => Ok(Self::Voice),
            "chat" | "text" => Ok(Self::Chat),
            other => Err(format!("unknown interaction mode: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_chart_payload_parses_with_defaults() {
        let chart: ChartView = serde_json::from_value(json!({
            "ticker": "XYZ",
            "error": "Ticker not found"
        }))
        .unwrap();
        assert_eq!(chart.period, ChartPeriod::OneMonth);
        assert!(chart.bars.is_empty());
        assert!(chart.is_error());
    }

    #[test]
    fn test_receipt_accepts_numeric_fields() {
        let receipt: TradeReceipt = serde_json::from_value(json!({
            "ticker": "AAPL",
            "qty": 5,
            "side": "buy",
            "orderType": "stop_limit",
            "currentPrice": 189.5,
            "estimatedTotal": "947.50",
            "stopLoss": 180
        }))
        .unwrap();
        assert_eq!(receipt.qty, dec!(5));
        assert_eq!(receipt.order_type, OrderType::StopLimit);
        assert_eq!(receipt.estimated_total, dec!(947.50));
        assert_eq!(receipt.stop_loss, Some(dec!(180)));
        assert!(receipt.source_call_id.is_empty());
    }

    #[test]
    fn test_order_copies_receipt_fields_verbatim() {
        let receipt = TradeReceipt {
            ticker: "F".into(),
            qty: dec!(10),
            side: OrderSide::Sell,
            order_type: OrderType::Market,
            current_price: dec!(10.42),
            estimated_total: dec!(104.20),
            stop_loss: Some(dec!(11)),
            source_call_id: "c9".into(),
            error: None,
        };
        let order = receipt.order();
        assert_eq!(order.ticker, "F");
        assert_eq!(order.qty, dec!(10));
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.stop_loss, Some(dec!(11)));
    }

    #[test]
    fn test_period_labels() {
        let period: ChartPeriod = serde_json::from_value(json!("3M")).unwrap();
        assert_eq!(period, ChartPeriod::ThreeMonths);
        assert_eq!(period.to_string(), "3M");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("Chat".parse::<InteractionMode>().unwrap(), InteractionMode::Chat);
        assert!("telepathy".parse::<InteractionMode>().is_err());
    }
}
