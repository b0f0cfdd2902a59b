//! Quote Lookup Tool
//!
//! `get_quote`: current price snapshot for a single ticker.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use aura_core::{
    AgentError, Result as CoreResult, Tool, ToolKind, ToolSchema,
    tool::ParameterSchema,
};

use crate::brokerage::MarketDataClient;
use crate::error::AssistantError;

#[derive(Debug, Deserialize)]
struct QuoteArgs {
    ticker: String,
}

/// Tool for looking up stock quotes
pub struct QuoteLookupTool {
    market: Arc<dyn MarketDataClient>,
}

impl QuoteLookupTool {
    pub fn new(market: Arc<dyn MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for QuoteLookupTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolKind::GetQuote.name().into(),
            description: "Get the current live price of a stock. Only use when the user \
                          asks for a number with no visual context."
                .into(),
            parameters: vec![ParameterSchema::required(
                "ticker",
                "string",
                "The stock ticker symbol, e.g. AAPL, TSLA, MSFT",
            )],
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &serde_json::Value) -> CoreResult<serde_json::Value> {
        let args: QuoteArgs = serde_json::from_value(input.clone())
            .map_err(|e| AgentError::ToolValidation(e.to_string()))?;
        let ticker = args.ticker.trim().to_uppercase();

        match self.market.get_quote(&ticker).await {
            Ok(quote) => Ok(serde_json::to_value(quote)?),
            // Soft error: the call completes and the UI shows an error card
            Err(e @ AssistantError::UnsupportedTicker(_)) => Ok(json!({
                "ticker": ticker,
                "error": e.to_string(),
            })),
            Err(e) => Err(AgentError::ToolExecution(e.to_string())),
        }
    }
}
