//! Gemini-style generateContent: function declarations for tools,
//! `response_schema` in the generation config. Gemini's schema proto
//! differs from JSON Schema (`"type"` → `"type_"`, enums uppercased); we
//! convert rather than hand-maintain a second schema per agent (§9).

use super::{tool_call_from_openai, LlmProvider};
use crate::types::{AgentSpec, RawCompletion};
use async_trait::async_trait;
use domain::Error;
use serde_json::{json, Value};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("failed to build reqwest client"),
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent?key={}", self.base_url, self.model, self.api_key)
    }
}

/// `"type": "object"` → `"type_": "OBJECT"`; enum values uppercased;
/// recurses through `properties`/`items`.
fn to_gemini_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                match k.as_str() {
                    "type" => {
                        if let Some(t) = v.as_str() {
                            out.insert("type_".to_string(), json!(t.to_uppercase()));
                        }
                    }
                    "enum" => {
                        if let Some(values) = v.as_array() {
                            let upper: Vec<Value> = values
                                .iter()
                                .map(|e| e.as_str().map(|s| json!(s.to_uppercase())).unwrap_or_else(|| e.clone()))
                                .collect();
                            out.insert("enum".to_string(), json!(upper));
                        }
                    }
                    "properties" => {
                        if let Some(props) = v.as_object() {
                            let converted: serde_json::Map<String, Value> =
                                props.iter().map(|(pk, pv)| (pk.clone(), to_gemini_schema(pv))).collect();
                            out.insert("properties".to_string(), Value::Object(converted));
                        }
                    }
                    "items" => {
                        out.insert("items".to_string(), to_gemini_schema(v));
                    }
                    _ => {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn call(&self, spec: &AgentSpec, messages: &[Value], completion_token_ceiling: u32, force_no_tools: bool) -> Result<RawCompletion, Error> {
        let contents: Vec<Value> = messages
            .iter()
            .map(|m| {
                let role = if m["role"] == "assistant" { "model" } else { "user" };
                json!({ "role": role, "parts": [{ "text": m["content"] }] })
            })
            .collect();

        let mut body = json!({
            "system_instruction": { "parts": [{ "text": spec.system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "temperature": spec.temperature,
                "maxOutputTokens": completion_token_ceiling,
            },
            // Disabled for this use case: sports/odds content routinely trips
            // Gemini's default safety categories with false positives.
            "safetySettings": [
                { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_NONE" },
                { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_NONE" },
            ],
        });

        if !force_no_tools && !spec.tools.is_empty() {
            let declarations: Vec<Value> = spec
                .tools
                .iter()
                .map(|t| json!({ "name": t.name, "description": t.description, "parameters": to_gemini_schema(&t.parameters) }))
                .collect();
            body["tools"] = json!([{ "function_declarations": declarations }]);
        } else {
            body["generationConfig"]["response_mime_type"] = json!("application/json");
            body["generationConfig"]["response_schema"] = to_gemini_schema(&spec.schema);
        }

        let response = self.client.post(self.url()).json(&body).send().await.map_err(|e| Error::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::OddsApi { status: status.as_u16(), message: body_text });
        }

        let parsed: Value = response.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let candidate = parsed["candidates"][0].clone();
        let parts = candidate["content"]["parts"].as_array().cloned().unwrap_or_default();

        let mut content = None;
        let mut tool_calls = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            if let Some(text) = part["text"].as_str() {
                content = Some(text.to_string());
            }
            if let Some(call) = part.get("functionCall") {
                let name = call["name"].as_str().unwrap_or_default().to_string();
                let args = call["args"].to_string();
                tool_calls.push(tool_call_from_openai(format!("gemini-call-{i}"), name, &args));
            }
        }

        let prompt_tokens = parsed["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0);
        let completion_tokens = parsed["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0);

        Ok(RawCompletion { content, tool_calls, prompt_tokens, completion_tokens, schema_refused: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_conversion_uppercases_type_and_enum() {
        let schema = json!({
            "type": "object",
            "properties": {
                "status": { "type": "string", "enum": ["final", "live"] }
            }
        });
        let converted = to_gemini_schema(&schema);
        assert_eq!(converted["type_"], "OBJECT");
        assert_eq!(converted["properties"]["status"]["type_"], "STRING");
        assert_eq!(converted["properties"]["status"]["enum"][0], "FINAL");
    }
}
