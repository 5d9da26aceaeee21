//! Report synthesis
//!
//! One tool-free inference call over the finished research conversation.

use crate::error::AnalystError;
use crate::inference::{InferenceClient, InferenceRequest};
use crate::state::Conversation;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const WRITER_INSTRUCTION: &str = "You are an expert financial analyst. Your task is to \
synthesize the provided information into a clear, concise, and well-structured report. The \
information includes a user query and the results of tool calls (news articles, stock data). \
Do not add any information that is not present in the context. Base your entire response on \
the provided data. Structure your report with a clear title, a summary, and then detailed \
sections based on the findings.";

pub struct Synthesizer {
    inference: Arc<dyn InferenceClient>,
}

impl Synthesizer {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    /// Write the final report from the whole conversation
    pub async fn synthesize(&self, conversation: &Conversation) -> Result<String> {
        debug!(messages = conversation.len(), "Synthesizing report");

        let request = InferenceRequest::new(conversation.messages())
            .with_system_instruction(WRITER_INSTRUCTION);
        let reply = self.inference.infer(request).await?;

        let report = reply.content.trim();
        if report.is_empty() {
            return Err(AnalystError::InferenceError(
                "writer returned an empty report".to_string(),
            ));
        }

        info!(chars = report.len(), "Report synthesized");
        Ok(report.to_string())
    }
}
