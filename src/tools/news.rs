//! `search_financial_news`: semantic retrieval over the prebuilt news index

use crate::index::{Embedder, NewsIndex};
use crate::tools::{require_str, Tool};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Returned whenever retrieval finds nothing relevant
pub const NO_NEWS_SENTINEL: &str = "No relevant financial news found for that query.";

const DEFAULT_TOP_K: usize = 4;

pub struct NewsSearchTool {
    index: Arc<NewsIndex>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: f32,
}

impl NewsSearchTool {
    pub fn new(index: Arc<NewsIndex>, embedder: Arc<dyn Embedder>, min_score: f32) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
            min_score,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }
}

#[async_trait::async_trait]
impl Tool for NewsSearchTool {
    fn name(&self) -> &'static str {
        "search_financial_news"
    }

    fn description(&self) -> &'static str {
        "Searches for relevant financial news articles from the knowledge base. \
         Use this to find information on company strategies, market sentiment, product \
         announcements, and reactions to economic events. The input should be a descriptive \
         query about the information you are looking for."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Descriptive query about the news you are looking for"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, arguments: &Value) -> Result<String> {
        let query = require_str(arguments, "query")?;
        info!(query, "Tool 'search_financial_news' called");

        if self.index.is_empty() {
            debug!("News index is empty");
            return Ok(NO_NEWS_SENTINEL.to_string());
        }

        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(vector) = vectors.first() else {
            return Ok(NO_NEWS_SENTINEL.to_string());
        };

        let hits = self.index.search(vector, self.top_k, self.min_score)?;
        debug!(hits = hits.len(), "News retrieval complete");

        if hits.is_empty() {
            return Ok(NO_NEWS_SENTINEL.to_string());
        }

        Ok(hits
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
