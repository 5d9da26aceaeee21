//! `get_stock_performance`: recent price action for a ticker
//!
//! HTTP-backed source calls the Yahoo Finance chart endpoint.

use crate::error::AnalystError;
use crate::tools::{require_str, Tool};
use crate::Result;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// One daily bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Source of recent daily price history, oldest bar first
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Unknown symbols yield an empty history, not an error
    async fn daily_history(&self, ticker: &str) -> Result<Vec<PriceBar>>;
}

pub struct StockPerformanceTool {
    source: Arc<dyn MarketDataSource>,
}

impl StockPerformanceTool {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl Tool for StockPerformanceTool {
    fn name(&self) -> &'static str {
        "get_stock_performance"
    }

    fn description(&self) -> &'static str {
        "Retrieves the latest stock performance data for a given ticker symbol. \
         Use this to get current stock prices, recent price changes, and trading volume. \
         The input must be a single valid stock ticker symbol (e.g., 'NVDA', 'AAPL'); \
         it is looked up in upper case."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": {
                    "type": "string",
                    "description": "Stock ticker symbol, e.g. NVDA"
                }
            },
            "required": ["ticker"]
        })
    }

    async fn invoke(&self, arguments: &Value) -> Result<String> {
        let requested = require_str(arguments, "ticker")?;
        let symbol = requested.to_uppercase();
        info!(ticker = %requested, symbol = %symbol, "Tool 'get_stock_performance' called");

        let history = self.source.daily_history(&symbol).await?;
        Ok(render_performance(requested, &history))
    }
}

/// Summarize the last two bars; guards the prior-close division
pub fn render_performance(ticker: &str, history: &[PriceBar]) -> String {
    let Some(latest) = history.last() else {
        return format!("Could not find historical data for ticker {}.", ticker);
    };

    let prev_close = history
        .len()
        .checked_sub(2)
        .and_then(|i| history.get(i))
        .map(|bar| bar.close);

    let change_line = match prev_close {
        Some(prev) => {
            let change = latest.close - prev;
            if prev == 0.0 {
                format!("Change: ${:.2} (n/a)", change)
            } else {
                format!("Change: ${:.2} ({:.2}%)", change, change / prev * 100.0)
            }
        }
        None => "Change: n/a (no prior close)".to_string(),
    };

    format!(
        "Data for {}:\n\
         Latest Close Price: ${:.2}\n\
         {}\n\
         Daily High: ${:.2}\n\
         Daily Low: ${:.2}\n\
         Volume: {}",
        ticker,
        latest.close,
        change_line,
        latest.high,
        latest.low,
        group_thousands(latest.volume)
    )
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

//
// ================= Yahoo Finance =================
//

/// Market data over the Yahoo Finance v8 chart API (one month, daily)
pub struct YahooChartSource {
    client: Client,
    base_url: String,
    in_flight: Arc<Semaphore>,
}

impl YahooChartSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("market-insights-analyst/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            in_flight: Arc::new(Semaphore::new(4)),
        })
    }

    fn chart_url(&self, ticker: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AnalystError::ToolError(format!("Invalid market data URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| AnalystError::ToolError("Market data URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", ticker]);

        url.query_pairs_mut()
            .append_pair("range", "1mo")
            .append_pair("interval", "1d");

        Ok(url)
    }
}

#[async_trait::async_trait]
impl MarketDataSource for YahooChartSource {
    async fn daily_history(&self, ticker: &str) -> Result<Vec<PriceBar>> {
        let url = self.chart_url(ticker)?;

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| AnalystError::ToolError("Market data source closed".to_string()))?;

        debug!(%url, "Fetching price history");

        let response = self.client.get(url).send().await.map_err(|e| {
            AnalystError::ToolError(format!("Market data request failed for {}: {}", ticker, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, ticker, "Market data error response");
            return Err(AnalystError::ToolError(format!(
                "Market data API returned {} for {}: {}",
                status, ticker, body
            )));
        }

        let chart: ChartResponse = response
            .json()
            .await
            .map_err(|e| AnalystError::ToolError(format!("Invalid market data JSON: {}", e)))?;

        Ok(chart.into_bars())
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl ChartResponse {
    /// Bars with a missing close, high or low are skipped
    fn into_bars(self) -> Vec<PriceBar> {
        let Some(result) = self.chart.result.and_then(|r| r.into_iter().next()) else {
            return Vec::new();
        };
        let Some(quote) = result.indicators.quote.into_iter().next() else {
            return Vec::new();
        };

        fn at(series: &[Option<f64>], i: usize) -> Option<f64> {
            series.get(i).copied().flatten()
        }

        result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, &timestamp)| {
                let close = at(&quote.close, i)?;
                let high = at(&quote.high, i)?;
                let low = at(&quote.low, i)?;
                Some(PriceBar {
                    timestamp,
                    open: at(&quote.open, i).unwrap_or(close),
                    high,
                    low,
                    close,
                    volume: at(&quote.volume, i).unwrap_or(0.0).max(0.0) as u64,
                })
            })
            .collect()
    }
}
