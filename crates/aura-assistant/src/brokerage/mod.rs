//! Brokerage Integration
//!
//! Market data and order execution collaborators. Tools read quotes and bars
//! through [`MarketDataClient`]; confirmed receipts are handed to
//! [`TradeExecutor`].

mod paper;

pub use paper::PaperBrokerage;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    AccountSummary, ChartPeriod, Position, StockBar, StockQuote, TradeOrder, TradeResult,
};

/// Market data client trait (Strategy pattern)
///
/// Implement this for each data vendor: Alpaca, Polygon, Alpha Vantage, etc.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Get a quote snapshot for a ticker
    async fn get_quote(&self, ticker: &str) -> Result<StockQuote>;

    /// Get OHLCV bars covering `period`, oldest first
    async fn get_bars(&self, ticker: &str, period: ChartPeriod) -> Result<Vec<StockBar>>;

    /// Data vendor name
    fn name(&self) -> &str;
}

/// Executes orders the user has explicitly confirmed
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Submit an order. A broker-side rejection is `Ok` with `success: false`;
    /// `Err` means the broker could not be reached at all.
    async fn submit_order(&self, order: &TradeOrder) -> Result<TradeResult>;

    /// Cash, buying power and portfolio value
    async fn account(&self) -> Result<AccountSummary>;

    /// Open positions, sorted by ticker
    async fn positions(&self) -> Result<Vec<Position>>;
}
