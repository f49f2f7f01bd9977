//! Parallel, deduplicated execution of LLM-requested tool calls (§4.7).

mod trim;

use agent_runtime::ToolCall;
use async_trait::async_trait;
use domain::Error;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

const MAX_CONCURRENT_CALLS: usize = 10;

/// Executes one named tool call. The coordinator implements this by
/// matching `name` against the rankings/web-research capabilities it holds.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, name: &str, arguments: &Value) -> Result<Value, Error>;
}

/// Deduplication key: function name plus canonical argument tuple (§4.7
/// step 1) — team name lowercased for team-level tools, sorted team pair
/// plus date for game-level tools, query for generic web search.
fn dedup_key(call: &ToolCall) -> String {
    let args = &call.arguments;
    match call.name.as_str() {
        "search_team_stats" | "search_advanced_stats" | "get_team_stats" => {
            let team = arg_str(args, "team").to_lowercase();
            format!("{}:{team}", call.name)
        }
        "search_game_predictions" => {
            let mut pair = [arg_str(args, "team_home").to_lowercase(), arg_str(args, "team_away").to_lowercase()];
            pair.sort();
            let date = arg_str(args, "date");
            format!("{}:{}:{}:{date}", call.name, pair[0], pair[1])
        }
        "fetch_url" => format!("{}:{}", call.name, arg_str(args, "url")),
        _ => format!("{}:{}", call.name, arg_str(args, "query").to_lowercase()),
    }
}

fn arg_str(args: &Value, key: &str) -> String {
    args.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

/// Executes the deduplicated set of `calls` concurrently (bounded worker
/// pool), then maps each result back to every original call id (§4.7 steps
/// 1–3), trimming oversized results before they're returned to the LLM
/// (step 4).
pub async fn dispatch(calls: Vec<ToolCall>, handler: &dyn ToolHandler) -> Vec<(String, Value)> {
    let mut group_order: Vec<String> = Vec::new();
    let mut group_ids: HashMap<String, Vec<String>> = HashMap::new();
    let mut representative: HashMap<String, ToolCall> = HashMap::new();

    for call in calls {
        let key = dedup_key(&call);
        if !group_ids.contains_key(&key) {
            group_order.push(key.clone());
            representative.insert(key.clone(), call.clone());
        }
        group_ids.entry(key).or_default().push(call.id.clone());
    }

    let executions = group_order.iter().map(|key| {
        let call = representative[key].clone();
        let key = key.clone();
        async move {
            let result = handler.call(&call.name, &call.arguments).await;
            (key, result)
        }
    });

    let executed: Vec<(String, Result<Value, Error>)> = stream::iter(executions).buffer_unordered(MAX_CONCURRENT_CALLS).collect().await;

    let mut by_key: HashMap<String, Value> = HashMap::new();
    for (key, result) in executed {
        let value = match result {
            Ok(v) => v,
            Err(e) => {
                warn!("tool call failed for key {key}: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        by_key.insert(key, trim::trim_result(value));
    }

    let mut out = Vec::new();
    for key in &group_order {
        let Some(ids) = group_ids.get(key) else { continue };
        let value = by_key.get(key).cloned().unwrap_or(Value::Null);
        for id in ids {
            out.push((id.clone(), value.clone()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for CountingHandler {
        async fn call(&self, _name: &str, _arguments: &Value) -> Result<Value, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    #[tokio::test]
    async fn duplicate_team_calls_execute_once_but_map_to_every_id() {
        let calls = vec![
            ToolCall { id: "c1".into(), name: "search_team_stats".into(), arguments: serde_json::json!({"team": "Duke"}) },
            ToolCall { id: "c2".into(), name: "search_team_stats".into(), arguments: serde_json::json!({"team": "duke"}) },
            ToolCall { id: "c3".into(), name: "search_team_stats".into(), arguments: serde_json::json!({"team": "UNC"}) },
        ];
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler { calls: counter.clone() };

        let results = dispatch(calls, &handler).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 3);
        assert!(results.iter().any(|(id, _)| id == "c1"));
        assert!(results.iter().any(|(id, _)| id == "c2"));
    }

    #[tokio::test]
    async fn game_level_dedup_key_is_orientation_invariant() {
        let a = ToolCall {
            id: "a".into(),
            name: "search_game_predictions".into(),
            arguments: serde_json::json!({"team_home": "Duke", "team_away": "UNC", "date": "2025-11-24"}),
        };
        let b = ToolCall {
            id: "b".into(),
            name: "search_game_predictions".into(),
            arguments: serde_json::json!({"team_home": "UNC", "team_away": "Duke", "date": "2025-11-24"}),
        };
        assert_eq!(dedup_key(&a), dedup_key(&b));
    }
}
