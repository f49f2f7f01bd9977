//! Provider-agnostic request/response shapes for a single agent call (§4.6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A function the LLM may call mid-turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON Schema for the call's arguments.
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The four constants every agent carries (§4.6): prompt, temperature,
/// response schema, and tool declarations (possibly empty).
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub system_prompt: String,
    pub schema: Value,
    pub tools: Vec<ToolDeclaration>,
    pub temperature: f32,
    /// Top-level key the parse-repair cascade anchors on when extracting
    /// the innermost JSON object from noisy content.
    pub top_level_key: &'static str,
}

/// What a single provider round produced.
pub enum AgentStep {
    /// Final parsed JSON, schema-checked at the boundary.
    Parsed(Value),
    /// The model wants to call tools before answering; carries everything
    /// needed to resume the conversation after the tool dispatcher runs.
    ToolCalls {
        calls: Vec<ToolCall>,
        assistant_message: Value,
        user_message: Value,
    },
}

#[derive(Debug, Clone)]
pub struct RawCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// True when the provider rejected the structured-output constraint
    /// itself (distinct from a parse failure on its output).
    pub schema_refused: bool,
}
