//! Shared fixtures for unit tests

use crate::models::{Message, ToolCall};
use crate::tools::{MarketDataSource, PriceBar, StockPerformanceTool, Tool, ToolCatalog};
use crate::Result;
use serde_json::json;
use std::sync::Arc;

/// Two daily bars for any ticker: 100.00 then 105.00
pub struct FixedHistory;

#[async_trait::async_trait]
impl MarketDataSource for FixedHistory {
    async fn daily_history(&self, _ticker: &str) -> Result<Vec<PriceBar>> {
        Ok(vec![
            PriceBar {
                timestamp: 1_717_372_800,
                open: 99.0,
                high: 101.0,
                low: 98.0,
                close: 100.0,
                volume: 900_000,
            },
            PriceBar {
                timestamp: 1_717_459_200,
                open: 100.5,
                high: 106.0,
                low: 99.0,
                close: 105.0,
                volume: 1_000_000,
            },
        ])
    }
}

/// Catalog holding only `get_stock_performance` over [`FixedHistory`]
pub fn nvda_catalog() -> Arc<ToolCatalog> {
    let tool: Arc<dyn Tool> = Arc::new(StockPerformanceTool::new(Arc::new(FixedHistory)));
    Arc::new(ToolCatalog::new(vec![tool]).unwrap())
}

pub fn stock_call(id: &str, ticker: &str) -> Message {
    Message::assistant_call(
        "",
        ToolCall::new(id, "get_stock_performance", json!({ "ticker": ticker })),
    )
}
