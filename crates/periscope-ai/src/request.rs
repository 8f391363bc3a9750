//! AI request body parsing
//!
//! Walks OpenAI chat and Anthropic messages payloads into an ordered
//! conversation plus tool metadata. Unknown shapes are skipped, never fatal.

use crate::detect::detect_provider;
use periscope_core::{AiProvider, ConversationMessage, MessageRole, ToolCall};
use serde_json::Value;
use std::collections::HashMap;

/// Everything extracted from an AI request body.
#[derive(Debug, Clone)]
pub struct ParsedAiRequest {
    pub provider: AiProvider,
    pub endpoint: String,
    pub model: Option<String>,
    pub streaming: bool,
    pub system_prompt: Option<String>,
    pub conversation: Vec<ConversationMessage>,
    /// Text-only mirror of the user turns.
    pub user_messages: Vec<String>,
    pub has_tool_calls: bool,
    pub tool_call_count: i64,
    pub tool_names: Vec<String>,
    /// The parsed JSON re-encoded, preserved verbatim.
    pub full_request: Value,
}

/// Parse an AI request body. `headers` keys are expected lowercased.
pub fn parse_ai_request(
    body: &Value,
    path: &str,
    target_url: &str,
    headers: &HashMap<String, String>,
) -> ParsedAiRequest {
    let provider = detect_provider(target_url, headers);
    let model = body.get("model").and_then(Value::as_str).map(String::from);
    let streaming = body.get("stream").and_then(Value::as_bool) == Some(true);

    let mut parsed = ParsedAiRequest {
        provider,
        endpoint: path.to_string(),
        model,
        streaming,
        system_prompt: None,
        conversation: Vec::new(),
        user_messages: Vec::new(),
        has_tool_calls: false,
        tool_call_count: 0,
        tool_names: Vec::new(),
        full_request: body.clone(),
    };

    // Anthropic puts the system prompt beside the messages array.
    if let Some(system) = body.get("system") {
        parsed.system_prompt = Some(match system.as_str() {
            Some(s) => s.to_string(),
            None => system.to_string(),
        });
    }

    if let Some(messages) = body.get("messages").and_then(Value::as_array) {
        for message in messages {
            parse_message(message, &mut parsed);
        }
    }

    // Prepend a system turn for Anthropic-style requests that carried one
    // outside the messages array.
    if let Some(prompt) = parsed.system_prompt.clone()
        && !parsed
            .conversation
            .iter()
            .any(|m| m.role == MessageRole::System)
    {
        parsed
            .conversation
            .insert(0, ConversationMessage::text(MessageRole::System, prompt));
    }

    parsed
}

fn parse_message(message: &Value, parsed: &mut ParsedAiRequest) {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("");
    let content = message.get("content");

    match role {
        "system" => {
            let (text, _) = extract_text(content);
            if let Some(text) = &text {
                parsed.system_prompt = Some(text.clone());
            }
            parsed.conversation.push(ConversationMessage {
                role: MessageRole::System,
                content: text,
                tool_calls: None,
                tool_call_id: None,
                tool_name: None,
                has_images: None,
                image_count: None,
            });
        }
        "user" => {
            let (text, images) = extract_text(content);
            if let Some(text) = &text {
                parsed.user_messages.push(text.clone());
            }
            parsed.conversation.push(ConversationMessage {
                role: MessageRole::User,
                content: text,
                tool_calls: None,
                tool_call_id: None,
                tool_name: None,
                has_images: (images > 0).then_some(true),
                image_count: (images > 0).then_some(images),
            });
        }
        "assistant" => {
            let (text, _) = extract_text(content);
            let tool_calls = extract_tool_calls(message, content);
            for call in &tool_calls {
                parsed.tool_call_count += 1;
                if !parsed.tool_names.contains(&call.function_name) {
                    parsed.tool_names.push(call.function_name.clone());
                }
            }
            parsed.has_tool_calls = parsed.tool_call_count > 0;
            parsed.conversation.push(ConversationMessage {
                role: MessageRole::Assistant,
                content: text,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                tool_call_id: None,
                tool_name: None,
                has_images: None,
                image_count: None,
            });
        }
        // Legacy OpenAI `function` role carries the same shape as `tool`.
        "tool" | "function" => {
            let text = content.map(|c| match c.as_str() {
                Some(s) => s.to_string(),
                None => c.to_string(),
            });
            parsed.conversation.push(ConversationMessage {
                role: MessageRole::Tool,
                content: text,
                tool_calls: None,
                tool_call_id: message
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .map(String::from),
                tool_name: message.get("name").and_then(Value::as_str).map(String::from),
                has_images: None,
                image_count: None,
            });
        }
        _ => {}
    }
}

/// Pull the textual part out of a content value and count image parts.
///
/// Strings pass through; arrays keep only `type: "text"` parts joined by
/// newlines.
fn extract_text(content: Option<&Value>) -> (Option<String>, i64) {
    match content {
        Some(Value::String(s)) => (Some(s.clone()), 0),
        Some(Value::Array(parts)) => {
            let mut texts = Vec::new();
            let mut images = 0;
            for part in parts {
                match part.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(text) = part.get("text").and_then(Value::as_str) {
                            texts.push(text);
                        }
                    }
                    Some("image_url") | Some("image") => images += 1,
                    _ => {}
                }
            }
            let text = (!texts.is_empty()).then(|| texts.join("\n"));
            (text, images)
        }
        _ => (None, 0),
    }
}

/// Collect tool invocations from an assistant message: modern `tool_calls`,
/// the legacy `function_call` shape, and Anthropic `tool_use` content blocks.
fn extract_tool_calls(message: &Value, content: Option<&Value>) -> Vec<ToolCall> {
    let mut calls = Vec::new();

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in tool_calls {
            let function = call.get("function");
            let Some(name) = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            calls.push(ToolCall {
                id: call
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                function_name: name.to_string(),
                arguments_json: function
                    .and_then(|f| f.get("arguments"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    } else if let Some(function_call) = message.get("function_call")
        && let Some(name) = function_call.get("name").and_then(Value::as_str)
    {
        calls.push(ToolCall {
            id: "legacy".to_string(),
            function_name: name.to_string(),
            arguments_json: function_call
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }

    if let Some(Value::Array(blocks)) = content {
        for block in blocks {
            if block.get("type").and_then(Value::as_str) == Some("tool_use")
                && let Some(name) = block.get("name").and_then(Value::as_str)
            {
                calls.push(ToolCall {
                    id: block
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    function_name: name.to_string(),
                    arguments_json: block
                        .get("input")
                        .map(|input| input.to_string())
                        .unwrap_or_default(),
                });
            }
        }
    }

    calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> ParsedAiRequest {
        parse_ai_request(
            &body,
            "/v1/chat/completions",
            "https://api.openai.com",
            &HashMap::new(),
        )
    }

    #[test]
    fn parses_basic_openai_chat() {
        let parsed = parse(json!({
            "model": "gpt-4o-mini",
            "stream": true,
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "hi"}
            ]
        }));

        assert_eq!(parsed.provider, AiProvider::OpenAi);
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o-mini"));
        assert!(parsed.streaming);
        assert_eq!(parsed.system_prompt.as_deref(), Some("You are terse."));
        assert_eq!(parsed.user_messages, vec!["hi"]);
        assert_eq!(parsed.conversation.len(), 2);
        assert!(!parsed.has_tool_calls);
    }

    #[test]
    fn multimodal_content_keeps_text_and_counts_images() {
        let parsed = parse(json!({
            "model": "gpt-4o",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "what is"},
                    {"type": "image_url", "image_url": {"url": "data:..."}},
                    {"type": "text", "text": "this?"}
                ]
            }]
        }));

        let user = &parsed.conversation[0];
        assert_eq!(user.content.as_deref(), Some("what is\nthis?"));
        assert_eq!(user.has_images, Some(true));
        assert_eq!(user.image_count, Some(1));
        assert_eq!(parsed.user_messages, vec!["what is\nthis?"]);
    }

    #[test]
    fn collects_modern_tool_calls() {
        let parsed = parse(json!({
            "model": "gpt-4o",
            "messages": [{
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}},
                    {"id": "call_2", "function": {"name": "search", "arguments": "{}"}}
                ]
            }]
        }));

        assert!(parsed.has_tool_calls);
        assert_eq!(parsed.tool_call_count, 2);
        assert_eq!(parsed.tool_names, vec!["get_weather", "search"]);
        let calls = parsed.conversation[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments_json, "{\"city\":\"Oslo\"}");
    }

    #[test]
    fn legacy_function_call_gets_legacy_id() {
        let parsed = parse(json!({
            "model": "gpt-4",
            "messages": [{
                "role": "assistant",
                "function_call": {"name": "lookup", "arguments": "{\"q\":1}"}
            }]
        }));

        assert_eq!(parsed.tool_call_count, 1);
        let calls = parsed.conversation[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "legacy");
        assert_eq!(calls[0].function_name, "lookup");
    }

    #[test]
    fn tool_and_function_roles_normalize_to_tool() {
        let parsed = parse(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "tool", "tool_call_id": "call_1", "name": "get_weather", "content": "sunny"},
                {"role": "function", "name": "lookup", "content": {"hits": 3}}
            ]
        }));

        assert_eq!(parsed.conversation[0].role, MessageRole::Tool);
        assert_eq!(parsed.conversation[0].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(parsed.conversation[0].tool_name.as_deref(), Some("get_weather"));
        assert_eq!(parsed.conversation[1].role, MessageRole::Tool);
        assert_eq!(
            parsed.conversation[1].content.as_deref(),
            Some("{\"hits\":3}")
        );
    }

    #[test]
    fn anthropic_system_field_prepends_a_system_turn() {
        let parsed = parse_ai_request(
            &json!({
                "model": "claude-3-5-sonnet-20241022",
                "system": "Be brief.",
                "messages": [{"role": "user", "content": "hello"}]
            }),
            "/v1/messages",
            "https://api.anthropic.com",
            &HashMap::new(),
        );

        assert_eq!(parsed.provider, AiProvider::Anthropic);
        assert_eq!(parsed.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(parsed.conversation[0].role, MessageRole::System);
        assert_eq!(parsed.conversation[0].content.as_deref(), Some("Be brief."));
        assert_eq!(parsed.conversation[1].role, MessageRole::User);
    }

    #[test]
    fn anthropic_structured_system_is_stringified() {
        let parsed = parse(json!({
            "model": "claude-3-opus",
            "system": [{"type": "text", "text": "rules"}],
            "messages": []
        }));
        let prompt = parsed.system_prompt.unwrap();
        assert!(prompt.contains("rules"));
    }

    #[test]
    fn anthropic_tool_use_blocks_count_as_tool_calls() {
        let parsed = parse(json!({
            "model": "claude-3-5-sonnet",
            "messages": [{
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Checking."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Oslo"}}
                ]
            }]
        }));

        assert!(parsed.has_tool_calls);
        assert_eq!(parsed.tool_call_count, 1);
        assert_eq!(parsed.tool_names, vec!["get_weather"]);
        let calls = parsed.conversation[0].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].arguments_json, "{\"city\":\"Oslo\"}");
        assert_eq!(parsed.conversation[0].content.as_deref(), Some("Checking."));
    }

    #[test]
    fn tool_names_deduplicate_across_turns() {
        let parsed = parse(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "assistant", "tool_calls": [{"id": "a", "function": {"name": "search", "arguments": "{}"}}]},
                {"role": "assistant", "tool_calls": [{"id": "b", "function": {"name": "search", "arguments": "{}"}}]}
            ]
        }));

        assert_eq!(parsed.tool_call_count, 2);
        assert_eq!(parsed.tool_names, vec!["search"]);
    }

    #[test]
    fn reparse_of_full_request_is_stable() {
        let body = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "s"},
                {"role": "user", "content": "u"}
            ]
        });
        let first = parse(body);
        let second = parse(first.full_request.clone());
        assert_eq!(second.system_prompt, first.system_prompt);
        assert_eq!(second.user_messages, first.user_messages);
        assert_eq!(second.full_request, first.full_request);
    }
}
