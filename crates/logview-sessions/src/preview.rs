//! Short, event-type-specific preview strings for the event list.
//!
//! Rules are tried in order and the first one that produces text wins:
//!
//! 1. `*:debug*` LLM events look inside `data.data`: requests show
//!    `"<model> | <n> messages"`, responses show `"<tokens> tokens"`.
//! 2. `llm:*` shows `"Provider: <provider>"` (direct or one level nested).
//! 3. `tool:*` shows `"Tool: <name>"`.
//! 4. `prompt:*` shows the prompt, cut to 57 chars + `...` past 60 chars.
//! 5. `content_block:*` shows `"Block <index>: <type>"`.
//!
//! Only the fields a rule inspects are decoded; everything else stays raw.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;

const PROMPT_PREVIEW_MAX: usize = 60;
const PROMPT_PREVIEW_KEEP: usize = 57;

type Fields<'a> = BTreeMap<String, &'a RawValue>;

pub fn compute_preview(event_type: &str, data: Option<&RawValue>) -> String {
    let Some(data) = data.and_then(object) else {
        return String::new();
    };
    if data.is_empty() {
        return String::new();
    }

    if event_type.contains(":debug") {
        if let Some(preview) = debug_preview(event_type, &data) {
            return preview;
        }
    }

    if event_type.starts_with("llm:") {
        let nested = match data.get("data") {
            Some(raw) => object(raw),
            None => Some(data.clone()),
        };
        if let Some(provider) = nested.as_ref().and_then(|n| truthy_field(n, "provider")) {
            return format!("Provider: {}", display(&provider));
        }
    }

    if event_type.starts_with("tool:") {
        if let Some(name) = truthy_field(&data, "tool_name").or_else(|| truthy_field(&data, "name"))
        {
            return format!("Tool: {}", display(&name));
        }
    }

    if event_type.starts_with("prompt:") {
        if let Some(Value::String(prompt)) = truthy_field(&data, "prompt") {
            return truncate_prompt(&prompt);
        }
    }

    if event_type.starts_with("content_block:") {
        let block_type = present_field(&data, "block_type");
        let block_index = present_field(&data, "block_index");
        if let (Some(block_type), Some(block_index)) = (block_type, block_index) {
            return format!("Block {}: {}", display(&block_index), display(&block_type));
        }
    }

    String::new()
}

fn debug_preview(event_type: &str, data: &Fields<'_>) -> Option<String> {
    let nested = data.get("data").and_then(|raw| object(raw))?;

    if event_type.starts_with("llm:request") {
        let request: LlmRequest = nested
            .get("request")
            .and_then(|raw| serde_json::from_str(raw.get()).ok())?;
        if let Some(model) = request.model.filter(truthy) {
            if request.messages.0 > 0 {
                return Some(format!("{} | {} messages", display(&model), request.messages.0));
            }
        }
    }

    if event_type.starts_with("llm:response") {
        let usage = nested
            .get("response")
            .and_then(|raw| object(raw))
            .and_then(|response| response.get("usage").and_then(|raw| object(raw)))?;
        let tokens =
            truthy_field(&usage, "total_tokens").or_else(|| truthy_field(&usage, "input_tokens"));
        if let Some(tokens) = tokens {
            return Some(format!("{} tokens", display(&tokens)));
        }
    }

    None
}

fn truncate_prompt(prompt: &str) -> String {
    if prompt.chars().count() > PROMPT_PREVIEW_MAX {
        let kept: String = prompt.chars().take(PROMPT_PREVIEW_KEEP).collect();
        format!("{}...", kept)
    } else {
        prompt.to_string()
    }
}

#[derive(Deserialize)]
struct LlmRequest {
    #[serde(default)]
    model: Option<Value>,
    #[serde(default)]
    messages: ElementCount,
}

/// Number of elements in a JSON array, counted without decoding them.
/// Anything that is not an array counts as zero.
#[derive(Default)]
struct ElementCount(usize);

impl<'de> Deserialize<'de> for ElementCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CountVisitor;

        impl<'de> Visitor<'de> for CountVisitor {
            type Value = ElementCount;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("any JSON value")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ElementCount, A::Error> {
                let mut count = 0;
                while seq.next_element::<IgnoredAny>()?.is_some() {
                    count += 1;
                }
                Ok(ElementCount(count))
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut map: A,
            ) -> Result<ElementCount, A::Error> {
                while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
                Ok(ElementCount(0))
            }

            fn visit_bool<E>(self, _: bool) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
            fn visit_i64<E>(self, _: i64) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
            fn visit_u64<E>(self, _: u64) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
            fn visit_f64<E>(self, _: f64) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
            fn visit_str<E>(self, _: &str) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
            fn visit_unit<E>(self) -> Result<ElementCount, E> {
                Ok(ElementCount(0))
            }
        }

        deserializer.deserialize_any(CountVisitor)
    }
}

/// Decode the top level of a JSON object, leaving values raw.
fn object(raw: &RawValue) -> Option<Fields<'_>> {
    serde_json::from_str(raw.get()).ok()
}

/// A field that is present and not `null`.
fn present_field(fields: &Fields<'_>, key: &str) -> Option<Value> {
    fields
        .get(key)
        .and_then(|raw| serde_json::from_str::<Value>(raw.get()).ok())
        .filter(|v| !v.is_null())
}

/// A field that is present and non-empty / non-zero.
fn truthy_field(fields: &Fields<'_>, key: &str) -> Option<Value> {
    present_field(fields, key).filter(truthy)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(event_type: &str, data: &str) -> String {
        let raw: Box<RawValue> = serde_json::from_str(data).unwrap();
        compute_preview(event_type, Some(&raw))
    }

    #[test]
    fn debug_request_shows_model_and_message_count() {
        assert_eq!(
            preview(
                "llm:request:debug",
                r#"{"data":{"request":{"model":"gpt-4","messages":[1,2,3]}}}"#
            ),
            "gpt-4 | 3 messages"
        );
    }

    #[test]
    fn debug_response_prefers_total_tokens() {
        assert_eq!(
            preview(
                "llm:response:debug",
                r#"{"data":{"response":{"usage":{"total_tokens":1500,"input_tokens":900}}}}"#
            ),
            "1500 tokens"
        );
        assert_eq!(
            preview(
                "llm:response:debug",
                r#"{"data":{"response":{"usage":{"total_tokens":0,"input_tokens":900}}}}"#
            ),
            "900 tokens"
        );
    }

    #[test]
    fn debug_without_usable_fields_falls_through_to_provider() {
        assert_eq!(
            preview(
                "llm:request:debug",
                r#"{"data":{"request":{"model":"gpt-4","messages":[]},"provider":"openai"}}"#
            ),
            "Provider: openai"
        );
    }

    #[test]
    fn provider_found_directly_or_nested() {
        assert_eq!(preview("llm:request", r#"{"provider":"anthropic"}"#), "Provider: anthropic");
        assert_eq!(
            preview("llm:response", r#"{"data":{"provider":"anthropic"}}"#),
            "Provider: anthropic"
        );
        assert_eq!(preview("llm:response", r#"{"data":{"model":"x"},"provider":"p"}"#), "");
    }

    #[test]
    fn tool_name_falls_back_to_name() {
        assert_eq!(preview("tool:pre", r#"{"tool_name":"bash"}"#), "Tool: bash");
        assert_eq!(preview("tool:post", r#"{"tool_name":"","name":"grep"}"#), "Tool: grep");
    }

    #[test]
    fn prompt_is_truncated_past_sixty_chars() {
        let long = "a".repeat(70);
        let result = preview("prompt:user", &format!(r#"{{"prompt":"{}"}}"#, long));
        assert_eq!(result, format!("{}...", "a".repeat(57)));
        assert_eq!(result.len(), 60);

        let exact = "b".repeat(60);
        assert_eq!(preview("prompt:user", &format!(r#"{{"prompt":"{}"}}"#, exact)), exact);
    }

    #[test]
    fn prompt_truncation_counts_characters() {
        let long = "é".repeat(61);
        let result = preview("prompt:user", &format!(r#"{{"prompt":"{}"}}"#, long));
        assert_eq!(result, format!("{}...", "é".repeat(57)));
    }

    #[test]
    fn content_block_needs_both_fields() {
        assert_eq!(
            preview("content_block:start", r#"{"block_index":0,"block_type":"text"}"#),
            "Block 0: text"
        );
        assert_eq!(preview("content_block:start", r#"{"block_type":"text"}"#), "");
    }

    #[test]
    fn missing_or_empty_data_yields_nothing() {
        assert_eq!(compute_preview("tool:pre", None), "");
        assert_eq!(preview("tool:pre", "{}"), "");
        assert_eq!(preview("tool:pre", "[1,2]"), "");
        assert_eq!(preview("session:start", r#"{"name":"x"}"#), "");
    }
}
