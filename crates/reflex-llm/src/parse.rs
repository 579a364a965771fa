//! Pulling structured JSON out of free-form model output.

use reflex_core::{ReflexError, Result};
use serde::de::DeserializeOwned;

/// Strip markdown code fences and surrounding prose, returning the first
/// JSON object or array found in `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = trimmed.find(['{', '['])?;
    let candidate = &trimmed[start..];
    let end = matching_close(candidate)?;
    Some(&candidate[..=end])
}

/// Index of the bracket closing the one at position 0, honouring strings.
fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON document in a model response.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let json = extract_json(text)
        .ok_or_else(|| ReflexError::Llm("response contains no JSON".into()))?;
    serde_json::from_str(json).map_err(|e| ReflexError::Llm(format!("malformed JSON in response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn bare_object() {
        let v: Value = parse_json(r#"{"query": "rust"}"#).unwrap();
        assert_eq!(v, json!({"query": "rust"}));
    }

    #[test]
    fn fenced_object() {
        let text = "```json\n{\"query\": \"rust\"}\n```";
        assert_eq!(extract_json(text), Some("{\"query\": \"rust\"}"));
    }

    #[test]
    fn object_inside_prose() {
        let text = "Sure! Here you go: {\"a\": {\"b\": [1, 2]}} Hope that helps {x}";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": [1, 2]}}"));
    }

    #[test]
    fn braces_inside_strings() {
        let text = r#"{"expr": "a } b \" {", "n": 1}"#;
        let v: Value = parse_json(text).unwrap();
        assert_eq!(v["n"], 1);
    }

    #[test]
    fn no_json_is_an_error() {
        assert!(extract_json("I cannot help with that.").is_none());
        assert!(parse_json::<Value>("{unterminated").is_err());
    }
}
