//! Tolerant JSON extraction from model output
//!
//! Models wrap JSON in markdown fences, surround it with prose, use single
//! quotes, or leave trailing commas. [`parse_value`] tries, in order: the
//! whole text, the first fenced block, and the first balanced array/object;
//! each candidate is retried once after repair.

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse model output into a JSON value
pub fn parse_value(text: &str) -> anyhow::Result<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty model output"));
    }

    let mut candidates: Vec<&str> = vec![trimmed];
    if let Some(body) = extract_fenced_json(trimmed) {
        candidates.push(body.trim());
    }
    for source in candidates.clone() {
        if let Some(start) = source.find(['[', '{']) {
            if let Some(balanced) = extract_balanced_json(&source[start..]) {
                candidates.push(balanced);
            }
        }
    }

    for candidate in &candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok(value);
        }
        let repaired = repair(candidate);
        if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
            return Ok(value);
        }
    }

    Err(anyhow!("no JSON found in model output"))
}

/// Parse model output into `T`
pub fn parse<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let value = parse_value(text)?;
    serde_json::from_value(value).context("model JSON has unexpected shape")
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing fence.
pub fn extract_fenced_json(content: &str) -> Option<&str> {
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON array or object starting at position 0 of `s`.
///
/// Tracks `[`/`{` nesting with a stack, respecting double-quoted string
/// literals.
pub fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with(['[', '{']) {
        return None;
    }
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => stack.push('}'),
            '[' if !in_string => stack.push(']'),
            '}' | ']' if !in_string => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Convert single-quoted strings to double-quoted and drop trailing commas
///
/// A `'` opens a string only after a structural character (`[ { , :`) and
/// closes it only before one, so apostrophes inside words survive.
fn repair(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut escape_next = false;

    let prev_structural = |out: &str| {
        out.trim_end()
            .chars()
            .last()
            .map_or(true, |c| matches!(c, '[' | '{' | ',' | ':'))
    };
    let next_structural = |idx: usize| {
        chars[idx + 1..]
            .iter()
            .find(|c| !c.is_whitespace())
            .map_or(true, |c| matches!(c, ']' | '}' | ',' | ':'))
    };

    for (i, &ch) in chars.iter().enumerate() {
        if escape_next {
            escape_next = false;
            out.push(ch);
            continue;
        }
        if in_double {
            match ch {
                '\\' => escape_next = true,
                '"' => in_double = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if in_single {
            match ch {
                '\\' => {
                    escape_next = true;
                    out.push(ch);
                }
                '\'' if next_structural(i) => {
                    in_single = false;
                    out.push('"');
                }
                '"' => out.push_str("\\\""),
                _ => out.push(ch),
            }
            continue;
        }
        match ch {
            '"' => {
                in_double = true;
                out.push(ch);
            }
            '\'' if prev_structural(&out) => {
                in_single = true;
                out.push('"');
            }
            ']' | '}' => {
                let trimmed_len = out.trim_end().len();
                if out[..trimmed_len].ends_with(',') {
                    out.truncate(trimmed_len - 1);
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(parse_value(r#"["a", "b"]"#).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_fenced_json_with_trailing_prose() {
        let text = "Here you go:\n```json\n{\"queries\": [\"x\"]}\n```\nHope that helps!";
        assert_eq!(parse_value(text).unwrap(), json!({"queries": ["x"]}));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let text = "Sure! [\"red shoes\", \"blue shoes\"] are good options.";
        assert_eq!(
            parse_value(text).unwrap(),
            json!(["red shoes", "blue shoes"])
        );
    }

    #[test]
    fn test_single_quoted_json() {
        let text = "['hotels in Austin', 'weather in Austin']";
        assert_eq!(
            parse_value(text).unwrap(),
            json!(["hotels in Austin", "weather in Austin"])
        );
    }

    #[test]
    fn test_single_quotes_keep_inner_apostrophes() {
        let text = "{'q': 'men's running shoes'}";
        assert_eq!(
            parse_value(text).unwrap(),
            json!({"q": "men's running shoes"})
        );
    }

    #[test]
    fn test_trailing_commas() {
        let text = r#"{"steps": [{"id": "s1",}, ],}"#;
        assert_eq!(parse_value(text).unwrap(), json!({"steps": [{"id": "s1"}]}));
    }

    #[test]
    fn test_no_json_is_error() {
        assert!(parse_value("I cannot help with that.").is_err());
        assert!(parse_value("   ").is_err());
    }

    #[test]
    fn test_balanced_extraction_mismatched() {
        assert_eq!(extract_balanced_json("[1, 2}"), None);
        assert_eq!(extract_balanced_json("{\"a\": \"}\"} tail"), Some("{\"a\": \"}\"}"));
    }

    #[test]
    fn test_typed_parse() {
        let parsed: Vec<String> = parse("```\n[\"one\"]\n```").unwrap();
        assert_eq!(parsed, vec!["one".to_string()]);
        assert!(parse::<Vec<String>>("{\"a\": 1}").is_err());
    }
}
