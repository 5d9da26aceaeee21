//! Inference client trait and implementations
//!
//! The model receives the full message history and, optionally, the tool
//! catalog. It answers with one assistant message that either requests a
//! tool or carries final content.

use crate::error::AnalystError;
use crate::models::{Message, ToolCall, ToolSpec};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::warn;

pub mod gemini;
pub use gemini::GeminiInference;

/// One inference call
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub messages: &'a [Message],
    pub system_instruction: Option<&'a str>,
    pub tools: Option<&'a [ToolSpec]>,
}

impl<'a> InferenceRequest<'a> {
    pub fn new(messages: &'a [Message]) -> Self {
        Self {
            messages,
            system_instruction: None,
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: &'a [ToolSpec]) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_system_instruction(mut self, instruction: &'a str) -> Self {
        self.system_instruction = Some(instruction);
        self
    }
}

/// Trait for the language-model backend
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, request: InferenceRequest<'_>) -> Result<Message>;
}

/// Only one tool call is acted on per turn: the first one the model listed.
/// The rest are dropped before the message enters the conversation.
pub fn select_tool_call(calls: Vec<ToolCall>) -> Option<ToolCall> {
    if calls.len() > 1 {
        let dropped: Vec<&str> = calls[1..].iter().map(|c| c.name.as_str()).collect();
        warn!(
            selected = %calls[0].name,
            ?dropped,
            "Model requested several tools in one turn; acting on the first"
        );
    }

    calls.into_iter().next()
}

//
// ================= Scripted Inference =================
//

/// What the scripted model does on one call
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Reply(Message),
    Fail(String),
    /// Never completes; exercises timeouts
    Hang,
}

/// Request as seen by the scripted model
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub system_instruction: Option<String>,
    pub tool_names: Option<Vec<String>>,
}

/// Deterministic model for development & testing
/// Keeps the loop runnable without a backend
pub struct ScriptedInference {
    steps: Mutex<VecDeque<ScriptedStep>>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedInference {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Script that only ever replies with the given messages, in order
    pub fn replies(messages: Vec<Message>) -> Self {
        Self::new(messages.into_iter().map(ScriptedStep::Reply).collect())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.recorded.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl InferenceClient for ScriptedInference {
    async fn infer(&self, request: InferenceRequest<'_>) -> Result<Message> {
        let recorded = RecordedRequest {
            messages: request.messages.to_vec(),
            system_instruction: request.system_instruction.map(str::to_string),
            tool_names: request
                .tools
                .map(|tools| tools.iter().map(|t| t.name.clone()).collect()),
        };

        let step = {
            let mut steps = self.steps.lock().map_err(|_| {
                AnalystError::InferenceError("scripted model poisoned".to_string())
            })?;
            if let Ok(mut log) = self.recorded.lock() {
                log.push(recorded);
            }
            steps.pop_front()
        };

        match step {
            Some(ScriptedStep::Reply(message)) => Ok(message),
            Some(ScriptedStep::Fail(reason)) => Err(AnalystError::InferenceError(reason)),
            Some(ScriptedStep::Hang) => std::future::pending().await,
            None => Err(AnalystError::InferenceError(
                "scripted model has no more replies".to_string(),
            )),
        }
    }
}
