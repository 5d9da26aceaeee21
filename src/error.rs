//! Error types for the market insights analyst

use crate::state::Conversation;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for analyst operations
pub type Result<T> = std::result::Result<T, AnalystError>;

#[derive(Error, Debug)]
pub enum AnalystError {

    // =============================
    // Orchestration Loop Errors
    // =============================

    #[error("Unknown tool requested by model: {0}")]
    UnknownTool(String),

    #[error("Max steps exceeded: model still requesting tools after {limit} steps")]
    MaxStepsExceeded { limit: u32, partial: Conversation },

    #[error("Timeout: {stage} exceeded budget of {}s", budget.as_secs_f32())]
    Timeout {
        stage: &'static str,
        budget: Duration,
        partial: Conversation,
    },

    #[error("Too many consecutive tool failures ({count}), last: {last_error}")]
    ToolFailuresExceeded {
        count: u32,
        last_error: String,
        partial: Conversation,
    },

    #[error("Invalid conversation: {0}")]
    InvalidConversation(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Inference backend unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Index incompatible: {0}")]
    IndexIncompatible(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AnalystError {
    /// Conversation accumulated before the query was aborted, if any
    pub fn partial_conversation(&self) -> Option<&Conversation> {
        match self {
            AnalystError::MaxStepsExceeded { partial, .. }
            | AnalystError::Timeout { partial, .. }
            | AnalystError::ToolFailuresExceeded { partial, .. } => Some(partial),
            _ => None,
        }
    }

    /// Whether retrying the same inference request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AnalystError::InferenceUnavailable(_) => true,
            AnalystError::HttpError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
