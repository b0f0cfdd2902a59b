//! Trade Receipt Tool
//!
//! `generate_trade_receipt`: prices a proposed order so the user can review it
//! before confirming. Nothing is submitted here.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use aura_core::{
    AgentError, Result as CoreResult, Tool, ToolKind, ToolSchema,
    tool::ParameterSchema,
};

use crate::brokerage::MarketDataClient;
use crate::model::{OrderSide, OrderType, TradeReceipt};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptArgs {
    ticker: String,
    qty: Decimal,
    side: OrderSide,
    #[serde(default)]
    order_type: OrderType,
    #[serde(default)]
    stop_loss: Option<Decimal>,
}

/// Tool for generating trade receipts
pub struct TradeReceiptTool {
    market: Arc<dyn MarketDataClient>,
}

impl TradeReceiptTool {
    pub fn new(market: Arc<dyn MarketDataClient>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl Tool for TradeReceiptTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolKind::GenerateTradeReceipt.name().into(),
            description: "Generate a trade confirmation receipt for the user to review \
                          before executing. Every trade must go through this first."
                .into(),
            parameters: vec![
                ParameterSchema::required("ticker", "string", "The stock ticker symbol"),
                ParameterSchema::required("qty", "number", "Number of shares"),
                ParameterSchema::required("side", "string", "Buy or sell")
                    .with_enum(&["buy", "sell"]),
                ParameterSchema::optional("orderType", "string", "Order type")
                    .with_default(serde_json::json!("market"))
                    .with_enum(&["market", "limit", "stop", "stop_limit"]),
                ParameterSchema::optional("stopLoss", "number", "Stop loss price, if applicable"),
            ],
            has_side_effects: false,
        }
    }

    async fn execute(&self, input: &serde_json::Value) -> CoreResult<serde_json::Value> {
        let args: ReceiptArgs = serde_json::from_value(input.clone())
            .map_err(|e| AgentError::ToolValidation(e.to_string()))?;

        if args.qty <= Decimal::ZERO {
            return Err(AgentError::ToolValidation("qty must be positive".into()));
        }

        let ticker = args.ticker.trim().to_uppercase();
        let mut receipt = TradeReceipt {
            ticker,
            qty: args.qty,
            side: args.side,
            order_type: args.order_type,
            current_price: Decimal::ZERO,
            estimated_total: Decimal::ZERO,
            stop_loss: args.stop_loss,
            source_call_id: String::new(),
            error: None,
        };

        match self.market.get_quote(&receipt.ticker).await {
            Ok(quote) => {
                receipt.current_price = quote.price;
                receipt.estimated_total = (quote.price * receipt.qty).round_dp(2);
            }
            // Still a receipt; the card shows why it cannot be priced
            Err(e) => receipt.error = Some(e.to_string()),
        }

        tracing::debug!(
            ticker = %receipt.ticker,
            side = %receipt.side,
            qty = %receipt.qty,
            total = %receipt.estimated_total,
            "Receipt priced"
        );
        Ok(serde_json::to_value(receipt)?)
    }
}
