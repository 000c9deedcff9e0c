//! Common types for LLM interactions

use crate::transcript::Role;
use serde_json::Value;

/// Streaming completion request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    /// Fixed directive sent ahead of the transcript
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Message in conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
    pub name: Option<String>,
}

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Structured call emitted by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One incremental unit of model output
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    TextDelta(String),
    /// End of the text channel, with the full accumulated text
    TextDone(String),
    ToolCall(ToolCall),
}
