//! Core data models for the analyst

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::state::Conversation;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

//
// ================= Messages =================
//

/// A structured request from the model to invoke a named tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    /// Final answer from the model (no action requested)
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: None,
            tool_call_id: None,
        }
    }

    /// Model turn requesting a tool invocation
    pub fn assistant_call(content: impl Into<String>, call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_call: Some(call),
            tool_call_id: None,
        }
    }

    /// Observation fed back to the model for `call_id`
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

//
// ================= Tools =================
//

/// Advertised contract of a tool: name, description, JSON argument schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

//
// ================= Results =================
//

/// Completed research loop
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub conversation: Conversation,
    pub steps: u32,
    pub reasoning_trace: Vec<String>,
}

/// Final output of one analysis
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub report: String,
    pub conversation: Conversation,
    pub reasoning_trace: Vec<String>,
    pub execution_time_ms: u64,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        write!(f, "{}", s)
    }
}
