//! Market Insights Analyst
//!
//! A financial research agent that:
//! - Lets a language model research a question with tools
//!   (news search over a local semantic index, recent stock performance)
//! - Feeds tool observations and failures back into the conversation
//! - Bounds every query by step, time and failure budgets
//! - Writes a final report in a separate, tool-free synthesis pass
//!
//! RESEARCH LOOP:
//! INPUT → REASON → ACT → REASON → ... → COMPLETE → SYNTHESIZE

pub mod agent;
pub mod analyst;
pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod index;
pub mod inference;
pub mod logging;
pub mod models;
pub mod state;
pub mod synthesis;
pub mod tools;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AnalystError, Result};

// Re-export common types
pub use analyst::Analyst;
pub use models::*;
pub use state::Conversation;
