//! Service Kit - Agent Tools
//!
//! Trading tools that implement `aura_core::Tool`.

mod chart_data;
mod quote_lookup;
mod trade_receipt;

pub use chart_data::ChartDataTool;
pub use quote_lookup::QuoteLookupTool;
pub use trade_receipt::TradeReceiptTool;

use std::sync::Arc;

use aura_core::ToolRegistry;

use crate::brokerage::MarketDataClient;

/// Registry with every trading tool wired to `market`
pub fn trading_tools(market: &Arc<dyn MarketDataClient>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(QuoteLookupTool::new(market.clone()));
    tools.register(ChartDataTool::new(market.clone()));
    tools.register(TradeReceiptTool::new(market.clone()));
    tools
}
