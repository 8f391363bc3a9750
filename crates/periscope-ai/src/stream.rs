//! Streamed SSE delta merging
//!
//! Chunks are the data-field payloads of SSE events, one string per event,
//! as captured by the proxy's stream collector. Undecodable frames are
//! skipped; the decodable ones are preserved verbatim as the full response.

use crate::response::{ParsedAiResponse, apply_usage};
use serde_json::Value;

/// Result of merging a streamed response.
#[derive(Debug, Clone, Default)]
pub struct ParsedStream {
    pub response: ParsedAiResponse,
    /// Every decodable frame, in arrival order.
    pub frames: Vec<Value>,
}

/// Merge captured SSE data payloads into a single parsed response.
pub fn parse_sse_chunks(chunks: &[String]) -> ParsedStream {
    let mut merged = ParsedStream::default();
    let mut content = String::new();
    let mut saw_content = false;
    let mut upstream_total: Option<i64> = None;

    for chunk in chunks {
        let chunk = chunk.trim();
        if chunk.is_empty() || chunk == "[DONE]" {
            continue;
        }
        let Ok(frame) = serde_json::from_str::<Value>(chunk) else {
            continue;
        };

        if merged.response.model.is_none()
            && let Some(model) = frame.get("model").and_then(Value::as_str)
        {
            merged.response.model = Some(model.to_string());
        }

        // OpenAI delta content lives under choices[0].delta.content; the
        // Anthropic equivalent is a top-level delta.text.
        let delta_text = frame
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            .or_else(|| {
                frame
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(Value::as_str)
            });
        if let Some(text) = delta_text {
            content.push_str(text);
            saw_content = true;
        }

        if let Some(usage) = frame.get("usage") {
            apply_usage(&mut merged.response, usage);
            if let Some(total) = usage.get("total_tokens").and_then(Value::as_i64) {
                upstream_total = Some(total);
            }
        }

        match frame.get("type").and_then(Value::as_str) {
            Some("message_start") => {
                if let Some(input) = frame
                    .get("message")
                    .and_then(|m| m.get("usage"))
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(Value::as_i64)
                {
                    merged.response.prompt_tokens = Some(input);
                }
                if merged.response.model.is_none()
                    && let Some(model) = frame
                        .get("message")
                        .and_then(|m| m.get("model"))
                        .and_then(Value::as_str)
                {
                    merged.response.model = Some(model.to_string());
                }
            }
            Some("message_delta") => {
                if let Some(output) = frame
                    .get("usage")
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(Value::as_i64)
                {
                    merged.response.completion_tokens = Some(output);
                }
            }
            _ => {}
        }

        merged.frames.push(frame);
    }

    if saw_content {
        merged.response.assistant_response = Some(content);
    }

    merged.response.total_tokens = upstream_total.or_else(|| {
        match (
            merged.response.prompt_tokens,
            merged.response.completion_tokens,
        ) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        }
    });

    merged
}

/// OpenRouter generation id from a non-streamed response body.
pub fn find_generation_id(body: &Value) -> Option<String> {
    body.get("id").and_then(Value::as_str).map(String::from)
}

/// OpenRouter generation id from streamed frames; first seen wins.
pub fn find_generation_id_in_frames(frames: &[Value]) -> Option<String> {
    frames.iter().find_map(find_generation_id)
}
