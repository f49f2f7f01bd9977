//! Per-tool result-size trimming before a result is sent back to the LLM
//! (§4.7 step 4): ≈8 kB cap, advanced-stats items preferred, string fields
//! truncated, array items capped, a sentinel appended when anything is cut.

use serde_json::{json, Map, Value};

const MAX_RESULT_BYTES: usize = 8 * 1024;
const MAX_ARRAY_ITEMS: usize = 5;
const CONTENT_FIELD_CAP: usize = 2 * 1024;
const OTHER_FIELD_CAP: usize = 1024;

pub fn trim_result(value: Value) -> Value {
    let serialized_len = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
    if serialized_len <= MAX_RESULT_BYTES {
        return value;
    }
    match value {
        Value::Array(items) => trim_array(items),
        Value::Object(map) => Value::Object(trim_object_fields(map)),
        Value::String(s) => Value::String(truncate_str(&s, OTHER_FIELD_CAP)),
        other => other,
    }
}

fn trim_array(mut items: Vec<Value>) -> Value {
    // Advanced-stats-flagged items survive the cut first.
    items.sort_by_key(|item| !is_advanced_stats(item));

    let truncated = items.len() > MAX_ARRAY_ITEMS;
    let mut kept: Vec<Value> = items
        .into_iter()
        .take(MAX_ARRAY_ITEMS)
        .map(|item| match item {
            Value::Object(map) => Value::Object(trim_object_fields(map)),
            other => other,
        })
        .collect();

    if truncated {
        kept.push(json!({ "_truncated": true, "note": "result truncated to fit the tool-result budget" }));
    }
    Value::Array(kept)
}

fn is_advanced_stats(item: &Value) -> bool {
    item.get("advanced_stats").and_then(|v| v.as_bool()).unwrap_or(false)
}

fn trim_object_fields(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let trimmed = match value {
                Value::String(s) => {
                    let cap = if key == "content" || key == "snippet" { CONTENT_FIELD_CAP } else { OTHER_FIELD_CAP };
                    Value::String(truncate_str(&s, cap))
                }
                other => other,
            };
            (key, trimmed)
        })
        .collect()
}

fn truncate_str(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…[truncated]", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_result_passes_through_untouched() {
        let value = json!({ "a": 1 });
        assert_eq!(trim_result(value.clone()), value);
    }

    #[test]
    fn oversized_array_keeps_advanced_stats_items_and_appends_sentinel() {
        let mut items = Vec::new();
        for i in 0..20 {
            items.push(json!({ "title": "x".repeat(600), "advanced_stats": i == 15 }));
        }
        let trimmed = trim_result(Value::Array(items));
        let arr = trimmed.as_array().unwrap();
        assert!(arr.iter().any(|i| i.get("advanced_stats").and_then(|v| v.as_bool()) == Some(true)));
        assert!(arr.last().unwrap().get("_truncated").is_some());
    }

    #[test]
    fn content_field_truncated_to_two_kb() {
        let mut items = Vec::new();
        for _ in 0..20 {
            items.push(json!({ "content": "y".repeat(5000) }));
        }
        let trimmed = trim_result(Value::Array(items));
        let first = &trimmed.as_array().unwrap()[0];
        let content = first["content"].as_str().unwrap();
        assert!(content.len() <= CONTENT_FIELD_CAP + 20);
    }
}
