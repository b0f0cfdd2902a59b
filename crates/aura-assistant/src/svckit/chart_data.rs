//! Chart Data Tool
//!
//! `render_chart`: OHLCV bars for a ticker and period, shaped as a [`ChartView`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use aura_core::{
    AgentError, Result as CoreResult, Tool, ToolKind, ToolSchema,
    tool::ParameterSchema,
};

use crate::brokerage::MarketDataClient;
use crate::error::AssistantError;
use crate::model::{ChartPeriod, ChartView};

#[derive(Debug, Deserialize)]
struct ChartArgs {
    ticker: String,
    #[serde(default)]
    period: Option<ChartPeriod>,
}

/// Tool for fetching chart data
pub struct ChartDataTool {
    market: Arc<dyn MarketDataClient>,
}

impl ChartDataTool {
    pub fn new(market: Arc<dyn MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for ChartDataTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolKind::RenderChart.name().into(),
            description: "Display a candlestick chart for a ticker. Call this whenever the \
                          user asks about a stock's price or performance."
                .into(),
            parameters: vec![
                ParameterSchema::required(
                    "ticker",
                    "string",
                    "The stock ticker symbol, e.g. AAPL, TSLA, MSFT",
                ),
                ParameterSchema::optional("period", "string", "Time period for the chart")
                    .with_default(serde_json::json!("1M"))
                    .with_enum(&["1D", "1W", "1M", "3M", "1Y"]),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &serde_json::Value) -> CoreResult<serde_json::Value> {
        let args: ChartArgs = serde_json::from_value(input.clone())
            .map_err(|e| AgentError::ToolValidation(e.to_string()))?;
        let ticker = args.ticker.trim().to_uppercase();
        let period = args.period.unwrap_or_default();

        let chart = match self.market.get_bars(&ticker, period).await {
            Ok(bars) => ChartView::new(ticker, period, bars),
            Err(e @ AssistantError::UnsupportedTicker(_)) => ChartView {
                error: Some(e.to_string()),
                ..ChartView::new(ticker, period, Vec::new())
            },
            Err(e) => return Err(AgentError::ToolExecution(e.to_string())),
        };

        tracing::debug!(
            ticker = %chart.ticker,
            period = %period,
            bars = chart.bars.len(),
            "Chart data ready"
        );
        Ok(serde_json::to_value(chart)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brokerage::PaperBrokerage;
    use serde_json::json;

    fn tool() -> ChartDataTool {
        ChartDataTool::new(Arc::new(PaperBrokerage::new()))
    }

    #[tokio::test]
    async fn test_chart_defaults_to_one_month() {
        let out = tool().execute(&json!({"ticker": "aapl"})).await.unwrap();
        let chart: ChartView = serde_json::from_value(out).unwrap();
        assert_eq!(chart.ticker, "AAPL");
        assert_eq!(chart.period, ChartPeriod::OneMonth);
        assert_eq!(chart.bars.len(), 21);
        assert!(!chart.is_error());
    }

    #[tokio::test]
    async fn test_same_request_same_chart() {
        let tool = tool();
        let a = tool.execute(&json!({"ticker": "F", "period": "1W"})).await.unwrap();
        let b = tool.execute(&json!({"ticker": "F", "period": "1W"})).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_soft_error() {
        let out = tool().execute(&json!({"ticker": "NOPE"})).await.unwrap();
        let chart: ChartView = serde_json::from_value(out).unwrap();
        assert!(chart.is_error());
        assert!(chart.bars.is_empty());
    }

    #[tokio::test]
    async fn test_bad_period_is_validation_error() {
        let err = tool().execute(&json!({"ticker": "F", "period": "5Y"})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }
}
