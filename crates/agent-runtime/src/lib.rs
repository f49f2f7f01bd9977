//! Provider-agnostic LLM call layer (§4.6): prompt assembly, schema
//! enforcement, the parse-repair cascade, and tool-call rounds.

pub mod parse;
pub mod providers;
pub mod types;

use domain::Error;
use providers::LlmProvider;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};
pub use types::{AgentSpec, AgentStep, RawCompletion, ToolCall, ToolDeclaration};

/// Tiered completion-token ceiling by estimated prompt size (§4.6 step 3).
pub fn completion_token_ceiling(prompt_tokens: usize) -> u32 {
    if prompt_tokens <= 10_000 {
        8_000
    } else if prompt_tokens <= 20_000 {
        12_000
    } else {
        16_000
    }
}

/// Rough chars-per-token estimate used before the real call returns usage.
pub fn estimate_prompt_tokens(system_prompt: &str, user_payload: &Value) -> usize {
    let user_len = serde_json::to_string(user_payload).map(|s| s.len()).unwrap_or(0);
    (system_prompt.len() + user_len) / 4
}

/// Resettable prompt/completion token counters, summarized at pipeline end.
#[derive(Default)]
pub struct TokenCounter {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl TokenCounter {
    pub fn reset(&self) {
        self.prompt.store(0, Ordering::Relaxed);
        self.completion.store(0, Ordering::Relaxed);
    }

    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64) {
        self.prompt.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion.fetch_add(completion_tokens, Ordering::Relaxed);
    }

    pub fn summary(&self) -> (u64, u64) {
        (self.prompt.load(Ordering::Relaxed), self.completion.load(Ordering::Relaxed))
    }
}

pub struct AgentRuntime<P: LlmProvider> {
    provider: P,
    tokens: TokenCounter,
}

impl<P: LlmProvider> AgentRuntime<P> {
    pub fn new(provider: P) -> Self {
        Self { provider, tokens: TokenCounter::default() }
    }

    pub fn tokens(&self) -> &TokenCounter {
        &self.tokens
    }

    /// Steps 1–6 of the call protocol, stopping short of tool execution:
    /// if the model requests tools, the caller runs the tool dispatcher and
    /// resumes with [`AgentRuntime::continue_after_tools`].
    pub async fn call(&self, spec: &AgentSpec, input: &Value) -> Result<AgentStep, Error> {
        let user_message = json!({ "role": "user", "content": canonical_json(input) });
        let messages = vec![system_message(spec), user_message.clone()];

        let prompt_tokens_estimate = estimate_prompt_tokens(&spec.system_prompt, input);
        let ceiling = completion_token_ceiling(prompt_tokens_estimate);

        let mut completion = self.provider.call(spec, &messages, ceiling, false).await?;

        if completion.schema_refused {
            // Step 4: the provider rejected the structured-output constraint
            // itself; retry once without it.
            warn!("provider refused structured output for {}, retrying unconstrained", spec.top_level_key);
            completion = self.provider.call(spec, &messages, ceiling, true).await?;
        }

        self.tokens.record(completion.prompt_tokens, completion.completion_tokens);

        if !completion.tool_calls.is_empty() {
            let assistant_message = json!({
                "role": "assistant",
                "tool_calls": completion.tool_calls.iter().map(|c| json!({
                    "id": c.id, "name": c.name, "arguments": c.arguments
                })).collect::<Vec<_>>(),
            });
            return Ok(AgentStep::ToolCalls {
                calls: completion.tool_calls,
                assistant_message,
                user_message,
            });
        }

        match completion.content {
            Some(content) => match parse::parse_response(&content, spec.top_level_key) {
                Some(value) => Ok(AgentStep::Parsed(value)),
                None => {
                    warn!("total parse failure for {}, returning empty result", spec.top_level_key);
                    Ok(AgentStep::Parsed(Value::Null))
                }
            },
            None => {
                warn!("empty content from provider for {}", spec.top_level_key);
                Ok(AgentStep::Parsed(Value::Null))
            }
        }
    }

    /// Resumes after the tool dispatcher has executed the deduplicated
    /// calls: composes (a) the original user turn, (b) the assistant turn
    /// carrying `tool_calls`, (c) one tool-result message per original call
    /// id, disables further tool use, and re-requests the JSON response
    /// (§4.7).
    pub async fn continue_after_tools(
        &self,
        spec: &AgentSpec,
        user_message: Value,
        assistant_message: Value,
        tool_results: Vec<(String, Value)>,
    ) -> Result<Value, Error> {
        let mut messages = vec![system_message(spec), user_message, assistant_message];
        for (call_id, result) in &tool_results {
            messages.push(json!({ "role": "tool", "tool_call_id": call_id, "content": result }));
        }

        let ceiling = completion_token_ceiling(estimate_prompt_tokens(&spec.system_prompt, &Value::Array(tool_results.iter().map(|(_, r)| r.clone()).collect())));
        let completion = self.provider.call(spec, &messages, ceiling, true).await?;
        self.tokens.record(completion.prompt_tokens, completion.completion_tokens);

        match completion.content {
            Some(content) => {
                let parsed = parse::parse_response(&content, spec.top_level_key).unwrap_or_else(|| {
                    warn!("total parse failure on tool-call follow-up for {}", spec.top_level_key);
                    Value::Null
                });
                Ok(parsed)
            }
            None => {
                warn!("empty content on tool-call follow-up for {}", spec.top_level_key);
                Ok(Value::Null)
            }
        }
    }
}

fn system_message(spec: &AgentSpec) -> Value {
    json!({ "role": "system", "content": spec.system_prompt })
}

/// Canonical serialization: dataclasses/enums/dates are already flattened
/// by `serde` on the domain types; this just fixes the wire shape.
fn canonical_json(input: &Value) -> String {
    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
}

/// Picks a provider by the model name's prefix (§6 "provider auto-detected
/// from model prefix").
pub fn provider_for_model(model: &str, openai_key: &str, gemini_key: &str) -> Box<dyn LlmProvider> {
    if model.starts_with("gemini") {
        info!("routing model {model} to Gemini provider");
        Box::new(providers::gemini::GeminiProvider::new(gemini_key.to_string(), model.to_string()))
    } else {
        info!("routing model {model} to OpenAI provider");
        Box::new(providers::openai::OpenAiProvider::new(openai_key.to_string(), model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_ceiling_tiers() {
        assert_eq!(completion_token_ceiling(5_000), 8_000);
        assert_eq!(completion_token_ceiling(15_000), 12_000);
        assert_eq!(completion_token_ceiling(50_000), 16_000);
    }

    #[test]
    fn token_counter_accumulates_and_resets() {
        let counter = TokenCounter::default();
        counter.record(100, 50);
        counter.record(10, 5);
        assert_eq!(counter.summary(), (110, 55));
        counter.reset();
        assert_eq!(counter.summary(), (0, 0));
    }
}
