//! Research orchestrator - the REASON / ACT loop
//!
//! REASON: ask the model for its next move given the whole conversation.
//!   A tool call moves to ACT; plain content ends the loop.
//! ACT: run the requested tool, append its observation, back to REASON.

use crate::config::LoopLimits;
use crate::error::AnalystError;
use crate::inference::{InferenceClient, InferenceRequest};
use crate::models::{Message, ResearchOutcome, Role};
use crate::state::Conversation;
use crate::tools::ToolCatalog;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Reason,
    Act,
}

/// Drives one query's conversation through the model and the tool catalog
pub struct Orchestrator {
    inference: Arc<dyn InferenceClient>,
    catalog: Arc<ToolCatalog>,
    limits: LoopLimits,
}

impl Orchestrator {
    pub fn new(
        inference: Arc<dyn InferenceClient>,
        catalog: Arc<ToolCatalog>,
        limits: LoopLimits,
    ) -> Self {
        Self {
            inference,
            catalog,
            limits,
        }
    }

    pub fn limits(&self) -> LoopLimits {
        self.limits
    }

    /// Run the loop under the configured query budget
    pub async fn research(&self, query: &str) -> Result<ResearchOutcome> {
        self.research_until(query, Instant::now() + self.limits.query_timeout)
            .await
    }

    /// Run the loop until the model stops calling tools or `deadline` passes
    pub async fn research_until(&self, query: &str, deadline: Instant) -> Result<ResearchOutcome> {
        let mut conversation = Conversation::seed(query);
        let mut reasoning_trace = vec!["INPUT: Query received".to_string()];
        let mut steps: u32 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut state = LoopState::Reason;

        info!(query, max_steps = self.limits.max_steps, "Research loop starting");

        loop {
            state = match state {
                LoopState::Reason => {
                    if steps >= self.limits.max_steps {
                        warn!(steps, "Model still requesting tools at step limit");
                        return Err(AnalystError::MaxStepsExceeded {
                            limit: self.limits.max_steps,
                            partial: conversation,
                        });
                    }
                    steps += 1;

                    let request = InferenceRequest::new(conversation.messages())
                        .with_tools(self.catalog.list_specs());
                    let reply = self
                        .bounded("inference step", deadline, &conversation, self.inference.infer(request))
                        .await??;

                    if reply.role != Role::Assistant {
                        return Err(AnalystError::InferenceError(format!(
                            "model replied with role '{}'",
                            reply.role
                        )));
                    }

                    let next = match &reply.tool_call {
                        Some(call) => {
                            debug!(step = steps, tool = %call.name, call_id = %call.id, "Model requested tool");
                            reasoning_trace.push(format!("REASON: step {} requested {}", steps, call.name));
                            LoopState::Act
                        }
                        None => {
                            reasoning_trace.push(format!("REASON: step {} produced final answer", steps));
                            LoopState::Reason
                        }
                    };

                    conversation.push(reply)?;

                    if next == LoopState::Reason {
                        info!(steps, messages = conversation.len(), "Research loop complete");
                        reasoning_trace.push("COMPLETE: Model finished research".to_string());
                        return Ok(ResearchOutcome {
                            conversation,
                            steps,
                            reasoning_trace,
                        });
                    }
                    next
                }

                LoopState::Act => {
                    let call = conversation.pending_call().cloned().ok_or_else(|| {
                        AnalystError::InvalidConversation(
                            "ACT reached without a pending tool call".to_string(),
                        )
                    })?;

                    let started = Instant::now();
                    let outcome = self
                        .bounded(
                            "tool step",
                            deadline,
                            &conversation,
                            self.catalog.invoke(&call.name, &call.arguments),
                        )
                        .await?;
                    let elapsed_ms = started.elapsed().as_millis() as u64;

                    let (observation, failure) = match outcome {
                        Ok(text) => {
                            consecutive_failures = 0;
                            (text, None)
                        }
                        Err(AnalystError::UnknownTool(name)) => {
                            warn!(tool = %name, "Model requested a tool outside the catalog");
                            return Err(AnalystError::UnknownTool(name));
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            warn!(
                                tool = %call.name,
                                error = %e,
                                consecutive_failures,
                                "Tool failed; feeding error back to model"
                            );
                            (format!("Error: {}", e), Some(e.to_string()))
                        }
                    };

                    reasoning_trace.push(format!(
                        "ACT: {} {} ({} ms)",
                        call.name,
                        if failure.is_some() { "failed" } else { "succeeded" },
                        elapsed_ms
                    ));
                    conversation.push(Message::tool(call.id, observation))?;

                    let cap = self.limits.max_consecutive_tool_failures;
                    if let Some(last_error) = failure {
                        if cap > 0 && consecutive_failures >= cap {
                            return Err(AnalystError::ToolFailuresExceeded {
                                count: consecutive_failures,
                                last_error,
                                partial: conversation,
                            });
                        }
                    }

                    LoopState::Reason
                }
            };
        }
    }

    /// Await `fut` within the step budget, clipped to the query deadline.
    /// The outer `Result` only reports timeouts.
    async fn bounded<F>(
        &self,
        stage: &'static str,
        deadline: Instant,
        conversation: &Conversation,
        fut: F,
    ) -> Result<F::Output>
    where
        F: Future,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (stage, budget, limit) = if remaining < self.limits.step_timeout {
            ("query", remaining, self.limits.query_timeout)
        } else {
            (stage, self.limits.step_timeout, self.limits.step_timeout)
        };

        match tokio::time::timeout(budget, fut).await {
            Ok(output) => Ok(output),
            Err(_) => {
                warn!(stage, budget_ms = limit.as_millis() as u64, "Budget exhausted");
                Err(AnalystError::Timeout {
                    stage,
                    budget: limit,
                    partial: conversation.clone(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ScriptedInference, ScriptedStep};
    use crate::models::ToolCall;
    use crate::test_support::{nvda_catalog, stock_call};
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator(model: Arc<ScriptedInference>, limits: LoopLimits) -> Orchestrator {
        Orchestrator::new(model, nvda_catalog(), limits)
    }

    #[tokio::test]
    async fn test_tool_call_then_final_answer() {
        let model = Arc::new(ScriptedInference::replies(vec![
            stock_call("call-1", "NVDA"),
            Message::assistant("NVDA closed at $105.00, up 5%."),
        ]));

        let outcome = orchestrator(model.clone(), LoopLimits::default())
            .research("What is NVDA's latest close?")
            .await
            .unwrap();

        let messages = outcome.conversation.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(
            messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call-1"));
        assert!(messages[2].content.contains("Change: $5.00 (5.00%)"));
        assert!(messages[3].tool_call.is_none());
        assert!(outcome.conversation.validate().is_ok());
        assert_eq!(outcome.steps, 2);

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
        assert_eq!(
            requests[0].tool_names.as_deref(),
            Some(&["get_stock_performance".to_string()][..])
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_aborts_query() {
        let model = Arc::new(ScriptedInference::replies(vec![
            Message::assistant_call("", ToolCall::new("call-1", "fetch_horoscope", json!({}))),
            Message::assistant("never reached"),
        ]));

        let result = orchestrator(model.clone(), LoopLimits::default())
            .research("q")
            .await;

        assert!(matches!(result, Err(AnalystError::UnknownTool(name)) if name == "fetch_horoscope"));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_is_fed_back() {
        let model = Arc::new(ScriptedInference::replies(vec![
            Message::assistant_call(
                "",
                ToolCall::new("call-1", "get_stock_performance", json!({"symbol": "NVDA"})),
            ),
            stock_call("call-2", "NVDA"),
            Message::assistant("Recovered."),
        ]));

        let outcome = orchestrator(model, LoopLimits::default())
            .research("q")
            .await
            .unwrap();

        let messages = outcome.conversation.messages();
        assert_eq!(messages.len(), 6);
        assert!(messages[2].content.starts_with("Error: Invalid tool input"));
        assert!(messages[4].content.contains("Latest Close Price: $105.00"));
    }

    #[tokio::test]
    async fn test_step_limit() {
        let model = Arc::new(ScriptedInference::replies(vec![
            stock_call("call-1", "NVDA"),
            stock_call("call-2", "NVDA"),
            stock_call("call-3", "NVDA"),
        ]));
        let limits = LoopLimits {
            max_steps: 2,
            ..LoopLimits::default()
        };

        let err = orchestrator(model.clone(), limits)
            .research("q")
            .await
            .unwrap_err();

        assert!(matches!(err, AnalystError::MaxStepsExceeded { limit: 2, .. }));
        let partial = err.partial_conversation().unwrap();
        assert_eq!(partial.len(), 5);
        assert!(partial.validate().is_ok());
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_inference_times_out_with_partial_context() {
        let model = Arc::new(ScriptedInference::new(vec![
            ScriptedStep::Reply(stock_call("call-1", "NVDA")),
            ScriptedStep::Hang,
        ]));
        let limits = LoopLimits {
            step_timeout: Duration::from_secs(5),
            ..LoopLimits::default()
        };

        let err = orchestrator(model, limits).research("q").await.unwrap_err();

        match &err {
            AnalystError::Timeout { stage, budget, partial } => {
                assert_eq!(*stage, "inference step");
                assert_eq!(*budget, Duration::from_secs(5));
                assert_eq!(partial.len(), 3);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_deadline_clips_step_budget() {
        let model = Arc::new(ScriptedInference::new(vec![ScriptedStep::Hang]));
        let limits = LoopLimits {
            step_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(10),
            ..LoopLimits::default()
        };

        let err = orchestrator(model, limits).research("q").await.unwrap_err();
        assert!(matches!(err, AnalystError::Timeout { stage: "query", .. }));
        assert_eq!(err.partial_conversation().map(|c| c.len()), Some(1));
    }

    #[tokio::test]
    async fn test_consecutive_tool_failures_cap() {
        let bad = |id: &str| {
            Message::assistant_call("", ToolCall::new(id, "get_stock_performance", json!({})))
        };
        let model = Arc::new(ScriptedInference::replies(vec![
            bad("call-1"),
            bad("call-2"),
            Message::assistant("never reached"),
        ]));
        let limits = LoopLimits {
            max_consecutive_tool_failures: 2,
            ..LoopLimits::default()
        };

        let err = orchestrator(model, limits).research("q").await.unwrap_err();
        match err {
            AnalystError::ToolFailuresExceeded { count, partial, .. } => {
                assert_eq!(count, 2);
                assert_eq!(partial.len(), 5);
            }
            other => panic!("expected failure cap, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_inference_failure_propagates() {
        let model = Arc::new(ScriptedInference::new(vec![ScriptedStep::Fail(
            "quota exhausted".to_string(),
        )]));

        let result = orchestrator(model, LoopLimits::default()).research("q").await;
        assert!(matches!(result, Err(AnalystError::InferenceError(msg)) if msg == "quota exhausted"));
    }
}
