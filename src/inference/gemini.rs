//! Gemini-backed inference with function calling
//!
//! Maps the conversation onto Gemini contents: assistant turns become
//! `model` turns, tool results become `functionResponse` parts.

use crate::error::AnalystError;
use crate::gemini::{
    Content, FunctionCall, FunctionDeclaration, FunctionResponse, GeminiClient,
    GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, ToolDeclarations,
};
use crate::inference::{select_tool_call, InferenceClient, InferenceRequest};
use crate::models::{Message, Role, ToolCall};
use crate::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct GeminiInference {
    client: Arc<GeminiClient>,
    model: String,
    temperature: f32,
}

impl GeminiInference {
    pub fn new(client: Arc<GeminiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.0,
        }
    }
}

#[async_trait]
impl InferenceClient for GeminiInference {
    async fn infer(&self, request: InferenceRequest<'_>) -> Result<Message> {
        let body = build_request(&request, self.temperature)?;

        info!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.map(|t| t.len()).unwrap_or(0),
            "Calling Gemini API"
        );

        let response = self.client.generate_content(&self.model, &body).await?;
        parse_response(response)
    }
}

/// Build the generateContent body for one inference call
fn build_request(
    request: &InferenceRequest<'_>,
    temperature: f32,
) -> Result<GenerateContentRequest> {
    let tools = match request.tools {
        Some(specs) if !specs.is_empty() => vec![ToolDeclarations {
            function_declarations: specs
                .iter()
                .map(|spec| FunctionDeclaration {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    parameters: spec.parameters.clone(),
                })
                .collect(),
        }],
        _ => Vec::new(),
    };

    Ok(GenerateContentRequest {
        contents: to_contents(request.messages)?,
        system_instruction: request.system_instruction.map(|text| Content {
            role: None,
            parts: vec![Part::text(text)],
        }),
        tools,
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens: None,
        },
    })
}

fn to_contents(messages: &[Message]) -> Result<Vec<Content>> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        let content = match message.role {
            Role::User => Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(message.content.clone())],
            },
            Role::Assistant => {
                let mut parts = Vec::with_capacity(2);
                if !message.content.is_empty() {
                    parts.push(Part::text(message.content.clone()));
                }
                if let Some(call) = &message.tool_call {
                    call_names.insert(call.id.as_str(), call.name.as_str());
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            id: None,
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..Default::default()
                    });
                }
                if parts.is_empty() {
                    parts.push(Part::text(""));
                }
                Content {
                    role: Some("model".to_string()),
                    parts,
                }
            }
            Role::Tool => {
                let call_id = message.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(call_id).copied().ok_or_else(|| {
                    AnalystError::InvalidConversation(format!(
                        "tool result '{}' has no originating call",
                        call_id
                    ))
                })?;
                Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse {
                            name: name.to_string(),
                            response: json!({ "content": message.content }),
                        }),
                        ..Default::default()
                    }],
                }
            }
        };
        contents.push(content);
    }

    Ok(contents)
}

/// Turn the first candidate into an assistant message
fn parse_response(response: GenerateContentResponse) -> Result<Message> {
    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        AnalystError::InferenceError(format!(
            "No response from Gemini API (feedback: {})",
            response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string())
        ))
    })?;

    debug!(finish_reason = ?candidate.finish_reason, "Gemini candidate received");

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text = String::new();
    let mut calls = Vec::new();

    for part in parts {
        if part.thought.unwrap_or(false) {
            continue;
        }
        if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
        if let Some(call) = part.function_call {
            let arguments = if call.args.is_null() { json!({}) } else { call.args };
            calls.push(ToolCall {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                name: call.name,
                arguments,
            });
        }
    }

    match select_tool_call(calls) {
        Some(call) => Ok(Message::assistant_call(text, call)),
        None if !text.trim().is_empty() => Ok(Message::assistant(text)),
        None => Err(AnalystError::InferenceError(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))),
    }
}
