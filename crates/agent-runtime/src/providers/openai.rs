//! OpenAI-style chat completions: `tools` for function-calling,
//! `response_format` for the JSON-schema structured-output constraint.

use super::{tool_call_from_openai, LlmProvider};
use crate::types::{AgentSpec, RawCompletion};
use async_trait::async_trait;
use domain::Error;
use serde_json::{json, Value};
use tracing::warn;

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("failed to build reqwest client"),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.openai.com/v1/chat/completions".to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn call(&self, spec: &AgentSpec, messages: &[Value], completion_token_ceiling: u32, force_no_tools: bool) -> Result<RawCompletion, Error> {
        let mut body = json!({
            "model": self.model,
            "temperature": spec.temperature,
            "max_tokens": completion_token_ceiling,
            "messages": messages,
        });

        if !force_no_tools && !spec.tools.is_empty() {
            let tools: Vec<Value> = spec
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": { "name": t.name, "description": t.description, "parameters": t.parameters }
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        } else {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": { "name": spec.top_level_key, "schema": spec.schema, "strict": true }
            });
        }

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 400 && !force_no_tools {
            // Structured-output constraint itself rejected; caller retries once without it.
            let body_text = response.text().await.unwrap_or_default();
            if body_text.contains("response_format") || body_text.contains("json_schema") {
                return Ok(RawCompletion { content: None, tool_calls: Vec::new(), prompt_tokens: 0, completion_tokens: 0, schema_refused: true });
            }
            return Err(Error::OddsApi { status: status.as_u16(), message: body_text });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::OddsApi { status: status.as_u16(), message: body_text });
        }

        let parsed: Value = response.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let choice = parsed["choices"][0].clone();
        let message = choice["message"].clone();

        let prompt_tokens = parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let completion_tokens = parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0);

        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .filter_map(|c| {
                        let id = c["id"].as_str()?.to_string();
                        let name = c["function"]["name"].as_str()?.to_string();
                        let arguments_json = c["function"]["arguments"].as_str().unwrap_or("{}");
                        Some(tool_call_from_openai(id, name, arguments_json))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if tool_calls.is_empty() && message["content"].is_null() {
            warn!("OpenAI response carried neither content nor tool_calls");
        }

        Ok(RawCompletion {
            content: message["content"].as_str().map(String::from),
            tool_calls,
            prompt_tokens,
            completion_tokens,
            schema_refused: false,
        })
    }
}
