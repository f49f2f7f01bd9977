pub mod gemini;
pub mod openai;

use crate::types::{AgentSpec, RawCompletion, ToolCall};
use async_trait::async_trait;
use domain::Error;
use serde_json::Value;

/// A provider-agnostic chat completion call (§9 "Provider abstraction").
/// `messages` carries any prior turns (used on the tool-call follow-up
/// round); `force_no_tools` disables further tool use for that round.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn call(
        &self,
        spec: &AgentSpec,
        messages: &[Value],
        completion_token_ceiling: u32,
        force_no_tools: bool,
    ) -> Result<RawCompletion, Error>;
}

pub(crate) fn tool_call_from_openai(id: String, name: String, arguments_json: &str) -> ToolCall {
    let arguments = serde_json::from_str(arguments_json).unwrap_or(Value::Null);
    ToolCall { id, name, arguments }
}

#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    async fn call(&self, spec: &AgentSpec, messages: &[Value], completion_token_ceiling: u32, force_no_tools: bool) -> Result<RawCompletion, Error> {
        (**self).call(spec, messages, completion_token_ceiling, force_no_tools).await
    }
}
