//! Paper Brokerage
//!
//! Offline market data and order simulation. Prices are static reference
//! values and bar series come from a random walk seeded by the ticker, so
//! the same chart request yields the same chart.

use std::collections::{BTreeMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;

use super::{MarketDataClient, TradeExecutor};
use crate::error::{AssistantError, Result};
use crate::model::{
    AccountSummary, ChartPeriod, OrderSide, Position, StockBar, StockQuote, TradeOrder,
    TradeResult,
};

const STARTING_CASH: Decimal = dec!(100000);

#[derive(Debug, Clone, Copy)]
struct Holding {
    qty: Decimal,
    avg_entry_price: Decimal,
}

/// Paper account state
#[derive(Debug)]
struct PaperAccount {
    cash: Decimal,
    holdings: BTreeMap<String, Holding>,

    /// Tickers bought since the account opened
    bought: HashSet<String>,
    day_trade_count: u32,
}

impl PaperAccount {
    fn new() -> Self {
        Self {
            cash: STARTING_CASH,
            holdings: BTreeMap::new(),
            bought: HashSet::new(),
            day_trade_count: 0,
        }
    }

    fn held(&self, ticker: &str) -> Decimal {
        self.holdings.get(ticker).map_or(Decimal::ZERO, |h| h.qty)
    }

    fn buy(&mut self, ticker: &str, qty: Decimal, price: Decimal, total: Decimal) {
        self.cash -= total;
        let holding = self.holdings.entry(ticker.to_string()).or_insert(Holding {
            qty: Decimal::ZERO,
            avg_entry_price: price,
        });
        let cost = holding.qty * holding.avg_entry_price + qty * price;
        holding.qty += qty;
        holding.avg_entry_price = (cost / holding.qty).round_dp(4);
        self.bought.insert(ticker.to_string());
    }

    fn sell(&mut self, ticker: &str, qty: Decimal, total: Decimal) {
        self.cash += total;
        if let Some(holding) = self.holdings.get_mut(ticker) {
            holding.qty -= qty;
            if holding.qty.is_zero() {
                self.holdings.remove(ticker);
            }
        }
        if self.bought.contains(ticker) {
            self.day_trade_count += 1;
        }
    }
}

/// Simulated brokerage with static prices
pub struct PaperBrokerage {
    account: Mutex<PaperAccount>,

    /// Timestamp of the most recent bar
    anchor: DateTime<Utc>,
}

impl Default for PaperBrokerage {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBrokerage {
    pub fn new() -> Self {
        let today = Utc::now().date_naive();
        let close = today.and_hms_opt(20, 0, 0).unwrap_or_default();
        Self::with_anchor(Utc.from_utc_datetime(&close))
    }

    /// Create with a fixed last-bar timestamp (for tests)
    pub fn with_anchor(anchor: DateTime<Utc>) -> Self {
        Self {
            account: Mutex::new(PaperAccount::new()),
            anchor,
        }
    }

    /// (price, previous close, average daily volume)
    fn reference(ticker: &str) -> Option<(Decimal, Decimal, u64)> {
        match ticker.to_uppercase().as_str() {
            "AAPL" => Some((dec!(189.84), dec!(187.15), 54_000_000)),
            "TSLA" => Some((dec!(248.50), dec!(252.10), 98_000_000)),
            "MSFT" => Some((dec!(415.20), dec!(412.70), 21_000_000)),
            "NVDA" => Some((dec!(875.30), dec!(860.05), 41_000_000)),
            "AMZN" => Some((dec!(178.25), dec!(176.90), 37_000_000)),
            "GOOGL" => Some((dec!(141.80), dec!(142.35), 25_000_000)),
            "META" => Some((dec!(485.60), dec!(479.95), 15_000_000)),
            "F" => Some((dec!(10.42), dec!(10.55), 48_000_000)),
            "SPY" => Some((dec!(510.20), dec!(508.75), 70_000_000)),
            _ => None,
        }
    }

    fn price(ticker: &str) -> Result<Decimal> {
        Self::reference(ticker)
            .map(|(price, _, _)| price)
            .ok_or_else(|| AssistantError::UnsupportedTicker(ticker.to_uppercase()))
    }

    /// Timestamps for `count` bars ending at the anchor, oldest first
    fn timestamps(&self, period: ChartPeriod, count: usize) -> Vec<DateTime<Utc>> {
        let mut stamps = Vec::with_capacity(count);
        let mut at = self.anchor;
        while stamps.len() < count {
            if period.is_intraday() || !matches!(at.weekday(), Weekday::Sat | Weekday::Sun) {
                stamps.push(at);
            }
            at -= if period.is_intraday() {
                Duration::hours(1)
            } else {
                Duration::days(1)
            };
        }
        stamps.reverse();
        stamps
    }
}

/// Price walk for one ticker and period
struct Walk(StdRng);

impl Walk {
    fn seeded(ticker: &str, period: ChartPeriod) -> Self {
        let mut hasher = DefaultHasher::new();
        ticker.hash(&mut hasher);
        period.label().hash(&mut hasher);
        Self(StdRng::seed_from_u64(hasher.finish()))
    }

    /// Signed fraction within +/- `max_bp` basis points
    fn basis_points(&mut self, max_bp: i64) -> Decimal {
        Decimal::new(self.0.gen_range(-max_bp..=max_bp), 4)
    }

    fn volume(&mut self, average: u64) -> u64 {
        average / 2 + self.0.gen_range(0..=average)
    }
}

#[async_trait]
impl MarketDataClient for PaperBrokerage {
    async fn get_quote(&self, ticker: &str) -> Result<StockQuote> {
        let (price, prev_close, volume) = Self::reference(ticker)
            .ok_or_else(|| AssistantError::UnsupportedTicker(ticker.to_uppercase()))?;

        let change = price - prev_close;
        let change_percent = (change / prev_close * dec!(100)).round_dp(2);

        Ok(StockQuote {
            ticker: ticker.to_uppercase(),
            price,
            change,
            change_percent,
            volume,
        })
    }

    async fn get_bars(&self, ticker: &str, period: ChartPeriod) -> Result<Vec<StockBar>> {
        let (price, _, volume) = Self::reference(ticker)
            .ok_or_else(|| AssistantError::UnsupportedTicker(ticker.to_uppercase()))?;

        let count = period.bar_count();
        let mut walk = Walk::seeded(&ticker.to_uppercase(), period);

        // Walk backwards from today's price so the chart ends at the quote
        let mut closes = vec![price; count];
        for i in (0..count.saturating_sub(1)).rev() {
            closes[i] = (closes[i + 1] * (Decimal::ONE - walk.basis_points(200))).round_dp(2);
        }

        let bars = self
            .timestamps(period, count)
            .into_iter()
            .zip(closes.iter().enumerate())
            .map(|(timestamp, (i, &close))| {
                let open = if i == 0 {
                    (close * (Decimal::ONE + walk.basis_points(100))).round_dp(2)
                } else {
                    closes[i - 1]
                };
                let high_pad = Decimal::ONE + walk.basis_points(80).abs();
                let low_pad = Decimal::ONE - walk.basis_points(80).abs();
                StockBar {
                    timestamp,
                    open,
                    high: (open.max(close) * high_pad).round_dp(2),
                    low: (open.min(close) * low_pad).round_dp(2),
                    close,
                    volume: walk.volume(volume),
                }
            })
            .collect();

        Ok(bars)
    }

    fn name(&self) -> &str {
        "PaperBrokerage"
    }
}

#[async_trait]
impl TradeExecutor for PaperBrokerage {
    async fn submit_order(&self, order: &TradeOrder) -> Result<TradeResult> {
        let ticker = order.ticker.to_uppercase();
        let Ok(price) = Self::price(&ticker) else {
            return Ok(TradeResult::rejected(format!("{ticker} is not tradable")));
        };

        if order.qty <= Decimal::ZERO {
            return Ok(TradeResult::rejected("Quantity must be positive"));
        }

        if let Some(stop) = order.stop_loss {
            let valid = match order.side {
                OrderSide::Buy => stop < price,
                OrderSide::Sell => stop > price,
            };
            if !valid {
                return Ok(TradeResult::rejected(format!(
                    "Stop loss {stop} is on the wrong side of {price} for a {} order",
                    order.side
                )));
            }
        }

        let total = (price * order.qty).round_dp(2);
        let mut account = self.account.lock().await;

        match order.side {
            OrderSide::Buy => {
                if total > account.cash {
                    return Ok(TradeResult::rejected(format!(
                        "Insufficient buying power: need {total}, have {}",
                        account.cash
                    )));
                }
                account.buy(&ticker, order.qty, price, total);
            }
            OrderSide::Sell => {
                let held = account.held(&ticker);
                if order.qty > held {
                    return Ok(TradeResult::rejected(format!(
                        "Insufficient shares: selling {}, holding {held}",
                        order.qty
                    )));
                }
                account.sell(&ticker, order.qty, total);
            }
        }

        let order_id = format!("paper-{}", uuid::Uuid::new_v4());
        tracing::info!(
            order_id = %order_id,
            ticker = %ticker,
            side = %order.side,
            qty = %order.qty,
            order_type = %order.order_type,
            "Paper order filled"
        );

        Ok(TradeResult::accepted(order_id, price))
    }

    async fn account(&self) -> Result<AccountSummary> {
        let positions = self.positions().await?;
        let account = self.account.lock().await;
        let invested: Decimal = positions.iter().map(Position::market_value).sum();

        Ok(AccountSummary {
            buying_power: account.cash,
            portfolio_value: account.cash + invested,
            cash: account.cash,
            day_trade_count: account.day_trade_count,
        })
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        let account = self.account.lock().await;

        account
            .holdings
            .iter()
            .map(|(ticker, holding)| {
                let current_price = Self::price(ticker)?;
                let gain = current_price - holding.avg_entry_price;
                Ok(Position {
                    ticker: ticker.clone(),
                    qty: holding.qty,
                    avg_entry_price: holding.avg_entry_price,
                    current_price,
                    unrealized_pl: (gain * holding.qty).round_dp(2),
                    unrealized_pl_percent: (gain / holding.avg_entry_price * dec!(100))
                        .round_dp(2),
                })
            })
            .collect()
    }
}
