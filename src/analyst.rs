//! Analyst pipeline: research loop, then report synthesis
//!
//! Both stages share one query deadline.

use crate::agent::Orchestrator;
use crate::config::{AnalystConfig, LoopLimits};
use crate::error::AnalystError;
use crate::gemini::GeminiClient;
use crate::index::{Embedder, GeminiEmbedder, NewsIndex};
use crate::inference::{GeminiInference, InferenceClient};
use crate::models::AnalysisReport;
use crate::synthesis::Synthesizer;
use crate::tools::{NewsSearchTool, StockPerformanceTool, Tool, ToolCatalog, YahooChartSource};
use crate::Result;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info};

pub struct Analyst {
    orchestrator: Orchestrator,
    synthesizer: Synthesizer,
}

impl Analyst {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        catalog: Arc<ToolCatalog>,
        limits: LoopLimits,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(inference.clone(), catalog, limits),
            synthesizer: Synthesizer::new(inference),
        }
    }

    /// Wire the Gemini backend, the news index and the market data source
    pub async fn from_config(config: &AnalystConfig) -> Result<Self> {
        let client = Arc::new(GeminiClient::from_config(config)?);
        let inference = Arc::new(GeminiInference::new(client.clone(), &config.gemini_model));

        let embedder: Arc<dyn Embedder> =
            Arc::new(GeminiEmbedder::new(client, &config.embedding_model));
        let index = NewsIndex::load_or_empty(&config.news_index_path, embedder.as_ref()).await?;

        let market_data = Arc::new(YahooChartSource::new(&config.market_data_base_url)?);

        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(
                NewsSearchTool::new(Arc::new(index), embedder, config.news_min_score)
                    .with_top_k(config.news_top_k),
            ),
            Arc::new(StockPerformanceTool::new(market_data)),
        ];
        let catalog = Arc::new(ToolCatalog::new(tools)?);

        info!(
            model = %config.gemini_model,
            tools = catalog.list_specs().len(),
            "Analyst initialized"
        );

        Ok(Self::new(inference, catalog, config.limits))
    }

    /// Research `query` with tools, then write the report
    pub async fn analyze(&self, query: &str) -> Result<AnalysisReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AnalystError::InvalidQuery("query must not be empty".to_string()));
        }

        let started = Instant::now();
        let limits = self.orchestrator.limits();
        let deadline = started + limits.query_timeout;
        info!(query, "Running analyst");

        let outcome = match self.orchestrator.research_until(query, deadline).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Research failed");
                return Err(e);
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let report = match tokio::time::timeout(
            remaining,
            self.synthesizer.synthesize(&outcome.conversation),
        )
        .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!(error = %e, "Synthesis failed");
                return Err(e);
            }
            Err(_) => {
                error!("Query budget exhausted during synthesis");
                return Err(AnalystError::Timeout {
                    stage: "synthesis",
                    budget: limits.query_timeout,
                    partial: outcome.conversation,
                });
            }
        };

        let mut reasoning_trace = outcome.reasoning_trace;
        reasoning_trace.push("SYNTHESIZE: Report written".to_string());
        let execution_time_ms = started.elapsed().as_millis() as u64;

        info!(steps = outcome.steps, execution_time_ms, "Analyst run complete");

        Ok(AnalysisReport {
            report,
            conversation: outcome.conversation,
            reasoning_trace,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ScriptedInference, ScriptedStep};
    use crate::models::{Message, Role};
    use crate::test_support::{nvda_catalog, stock_call};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_end_to_end_report() {
        let model = Arc::new(ScriptedInference::replies(vec![
            stock_call("call-1", "NVDA"),
            Message::assistant("NVDA closed at $105.00."),
            Message::assistant("# NVDA Update\nNVDA closed at $105.00, up 5.00%."),
        ]));
        let analyst = Analyst::new(model.clone(), nvda_catalog(), LoopLimits::default());

        let result = assert_ok!(analyst.analyze("What is NVDA's latest close?").await);
        assert!(result.report.starts_with("# NVDA Update"));
        assert_eq!(result.conversation.len(), 4);
        assert_eq!(result.reasoning_trace.last().map(String::as_str), Some("SYNTHESIZE: Report written"));

        // Synthesis is the third call and sees the whole history, no tools
        let requests = model.requests();
        assert_eq!(requests.len(), 3);
        let roles: Vec<Role> = requests[2].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert!(requests[2].tool_names.is_none());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let model = Arc::new(ScriptedInference::replies(vec![]));
        let analyst = Analyst::new(model.clone(), nvda_catalog(), LoopLimits::default());

        let err = assert_err!(analyst.analyze("   ").await);
        assert!(matches!(err, AnalystError::InvalidQuery(_)));
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesis_shares_query_deadline() {
        let model = Arc::new(ScriptedInference::new(vec![
            ScriptedStep::Reply(Message::assistant("done researching")),
            ScriptedStep::Hang,
        ]));
        let limits = LoopLimits {
            query_timeout: Duration::from_secs(30),
            ..LoopLimits::default()
        };
        let analyst = Analyst::new(model, nvda_catalog(), limits);

        let err = assert_err!(analyst.analyze("q").await);
        assert!(matches!(err, AnalystError::Timeout { stage: "synthesis", .. }));
        assert_eq!(err.partial_conversation().map(|c| c.len()), Some(2));
    }
}
