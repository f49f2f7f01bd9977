//! Parse-repair cascade for LLM text content (§4.6 step 5): direct parse,
//! innermost-object extraction, fenced-code-block extraction, then a
//! structural repair pass. Returns `None` only after every stage fails.

use serde_json::Value;

pub fn parse_response(content: &str, top_level_key: &str) -> Option<Value> {
    direct_parse(content)
        .or_else(|| innermost_object(content, top_level_key))
        .or_else(|| fenced_code_block(content))
        .or_else(|| structural_repair(content))
}

fn direct_parse(content: &str) -> Option<Value> {
    serde_json::from_str(content.trim()).ok()
}

/// Finds the `{` that opens the object containing `"top_level_key"` and its
/// matching `}`, then parses just that span.
fn innermost_object(content: &str, top_level_key: &str) -> Option<Value> {
    let needle = format!("\"{top_level_key}\"");
    let key_pos = content.find(&needle)?;
    let open = content[..key_pos].rfind('{')?;
    let close = matching_close_brace(content, open)?;
    serde_json::from_str(&content[open..=close]).ok()
}

fn matching_close_brace(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn fenced_code_block(content: &str) -> Option<Value> {
    let start = content.find("```")?;
    let after_fence = &content[start + 3..];
    let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let end = after_fence.find("```")?;
    serde_json::from_str(after_fence[..end].trim()).ok()
}

/// Last resort: strip markdown fences, trim a trailing comma before a
/// closing bracket, and try again.
fn structural_repair(content: &str) -> Option<Value> {
    let stripped = content.replace("```json", "").replace("```", "");
    let trimmed = stripped.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    let mut candidate = trimmed[start..=end].to_string();
    while let Some(pos) = find_trailing_comma(&candidate) {
        candidate.remove(pos);
    }
    serde_json::from_str(&candidate).ok()
}

fn find_trailing_comma(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b',' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            if j < bytes.len() && (bytes[j] == b'}' || bytes[j] == b']') {
                return Some(i);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_parse_succeeds_on_clean_json() {
        let content = r#"{"game_id": "g1", "value": 1}"#;
        assert!(parse_response(content, "game_id").is_some());
    }

    #[test]
    fn innermost_object_extracted_from_chatty_wrapper() {
        let content = r#"Sure, here is the result: {"game_id": "g1", "notes": "ok"} Hope that helps!"#;
        let parsed = parse_response(content, "game_id").unwrap();
        assert_eq!(parsed["game_id"], "g1");
    }

    #[test]
    fn fenced_code_block_is_extracted() {
        let content = "```json\n{\"game_id\": \"g1\"}\n```";
        let parsed = parse_response(content, "game_id").unwrap();
        assert_eq!(parsed["game_id"], "g1");
    }

    #[test]
    fn structural_repair_trims_trailing_comma() {
        let content = r#"{"game_id": "g1", "list": [1, 2,],}"#;
        let parsed = parse_response(content, "game_id").unwrap();
        assert_eq!(parsed["game_id"], "g1");
    }

    #[test]
    fn total_garbage_returns_none() {
        assert!(parse_response("not json at all", "game_id").is_none());
    }
}
