//! Non-streamed AI response parsing

use serde_json::Value;

/// Usage and content extracted from a response body (or merged SSE stream).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedAiResponse {
    pub assistant_response: Option<String>,
    pub model: Option<String>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// Parse a buffered (non-streamed) AI response body.
pub fn parse_ai_response(body: &Value) -> ParsedAiResponse {
    let mut parsed = ParsedAiResponse {
        model: body.get("model").and_then(Value::as_str).map(String::from),
        ..Default::default()
    };

    // OpenAI: choices[0].message.content, or choices[0].text for the legacy
    // completions shape.
    if let Some(choice) = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        parsed.assistant_response = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .or_else(|| choice.get("text").and_then(Value::as_str))
            .map(String::from);
    }

    // Anthropic: content[] text blocks joined by newlines.
    if parsed.assistant_response.is_none()
        && let Some(blocks) = body.get("content").and_then(Value::as_array)
    {
        let texts: Vec<&str> = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            parsed.assistant_response = Some(texts.join("\n"));
        }
    }

    if let Some(usage) = body.get("usage") {
        apply_usage(&mut parsed, usage);
    }

    if parsed.total_tokens.is_none()
        && let (Some(prompt), Some(completion)) = (parsed.prompt_tokens, parsed.completion_tokens)
    {
        parsed.total_tokens = Some(prompt + completion);
    }

    parsed
}

/// Fold a `usage` object into the parse result, accepting both the OpenAI
/// and the Anthropic field names.
pub(crate) fn apply_usage(parsed: &mut ParsedAiResponse, usage: &Value) {
    if let Some(prompt) = usage
        .get("prompt_tokens")
        .or_else(|| usage.get("input_tokens"))
        .and_then(Value::as_i64)
    {
        parsed.prompt_tokens = Some(prompt);
    }
    if let Some(completion) = usage
        .get("completion_tokens")
        .or_else(|| usage.get("output_tokens"))
        .and_then(Value::as_i64)
    {
        parsed.completion_tokens = Some(completion);
    }
    if let Some(total) = usage.get("total_tokens").and_then(Value::as_i64) {
        parsed.total_tokens = Some(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_openai_chat_response() {
        let parsed = parse_ai_response(&json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "hello"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }));

        assert_eq!(parsed.assistant_response.as_deref(), Some("hello"));
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(parsed.prompt_tokens, Some(10));
        assert_eq!(parsed.completion_tokens, Some(2));
        assert_eq!(parsed.total_tokens, Some(12));
    }

    #[test]
    fn parses_legacy_completions_text() {
        let parsed = parse_ai_response(&json!({
            "choices": [{"text": "once upon"}]
        }));
        assert_eq!(parsed.assistant_response.as_deref(), Some("once upon"));
    }

    #[test]
    fn parses_anthropic_text_blocks() {
        let parsed = parse_ai_response(&json!({
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "part one"},
                {"type": "tool_use", "id": "t", "name": "n", "input": {}},
                {"type": "text", "text": "part two"}
            ],
            "usage": {"input_tokens": 7, "output_tokens": 3}
        }));

        assert_eq!(
            parsed.assistant_response.as_deref(),
            Some("part one\npart two")
        );
        assert_eq!(parsed.prompt_tokens, Some(7));
        assert_eq!(parsed.completion_tokens, Some(3));
        // Anthropic sends no total; prompt + completion is derived.
        assert_eq!(parsed.total_tokens, Some(10));
    }

    #[test]
    fn upstream_total_wins_over_derived_sum() {
        let parsed = parse_ai_response(&json!({
            "usage": {"prompt_tokens": 5, "completion_tokens": 5, "total_tokens": 11}
        }));
        assert_eq!(parsed.total_tokens, Some(11));
    }

    #[test]
    fn unrecognized_shape_yields_nulls() {
        let parsed = parse_ai_response(&json!({"ok": true}));
        assert_eq!(parsed, ParsedAiResponse::default());
    }
}
