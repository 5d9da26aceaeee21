//! Conversation state threaded through the research loop
//!
//! Append-only. Every `tool` message must answer exactly one earlier
//! assistant tool call, and each call is answered at most once.

use crate::error::AnalystError;
use crate::models::{Message, Role, ToolCall};
use crate::Result;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Call ids issued by assistant messages
    issued: HashSet<String>,
    /// Call ids already answered by a tool message
    answered: HashSet<String>,
}

impl Conversation {
    /// Fresh conversation seeded with the user's query
    pub fn seed(query: impl Into<String>) -> Self {
        let mut conversation = Self::default();
        conversation.messages.push(Message::user(query));
        conversation
    }

    /// Append a message, enforcing the call/result pairing
    pub fn push(&mut self, message: Message) -> Result<()> {
        match message.role {
            Role::Assistant => {
                if let Some(call) = &message.tool_call {
                    if self.issued.contains(&call.id) {
                        return Err(AnalystError::InvalidConversation(format!(
                            "duplicate tool call id '{}'",
                            call.id
                        )));
                    }
                    self.issued.insert(call.id.clone());
                }
            }
            Role::Tool => {
                let call_id = message.tool_call_id.as_deref().ok_or_else(|| {
                    AnalystError::InvalidConversation(
                        "tool message without tool_call_id".to_string(),
                    )
                })?;

                if !self.issued.contains(call_id) {
                    return Err(AnalystError::InvalidConversation(format!(
                        "tool result for unknown call id '{}'",
                        call_id
                    )));
                }
                if !self.answered.insert(call_id.to_string()) {
                    return Err(AnalystError::InvalidConversation(format!(
                        "call id '{}' already answered",
                        call_id
                    )));
                }
            }
            Role::User => {}
        }

        self.messages.push(message);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Tool call carried by the most recent message, if it requests one
    pub fn pending_call(&self) -> Option<&ToolCall> {
        self.last()
            .filter(|m| m.role == Role::Assistant)
            .and_then(|m| m.tool_call.as_ref())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Re-check the pairing invariant over the whole sequence
    pub fn validate(&self) -> Result<()> {
        let mut replay = Conversation::default();
        for message in &self.messages {
            replay.push(message.clone())?;
        }
        Ok(())
    }
}
