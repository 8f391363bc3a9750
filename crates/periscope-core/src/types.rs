//! Shared record, routing, and configuration types
//!
//! `RequestRecord` is the owning side of the request/AI relation: it carries a
//! nullable `ai_record_id`, while `AiRecord` never points back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generate a new record id, time-ordered so ids sort by creation time.
pub fn new_record_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// How the target origin for a request was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    QueryParam,
    Header,
    ConfigRule,
    Default,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueryParam => "query_param",
            Self::Header => "header",
            Self::ConfigRule => "config_rule",
            Self::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "query_param" => Some(Self::QueryParam),
            "header" => Some(Self::Header),
            "config_rule" => Some(Self::ConfigRule),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

/// Upstream AI provider inferred from the target host (or forced via the
/// `x-ai-provider` request header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Anthropic,
    Azure,
    OpenRouter,
    Custom,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Azure => "azure",
            Self::OpenRouter => "openrouter",
            Self::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::OpenAi),
            "anthropic" => Some(Self::Anthropic),
            "azure" => Some(Self::Azure),
            "openrouter" => Some(Self::OpenRouter),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Routing rule match predicate kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    PathPrefix,
    PathRegex,
    HeaderRegex,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PathPrefix => "path_prefix",
            Self::PathRegex => "path_regex",
            Self::HeaderRegex => "header_regex",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path_prefix" => Some(Self::PathPrefix),
            "path_regex" => Some(Self::PathRegex),
            "header_regex" => Some(Self::HeaderRegex),
            _ => None,
        }
    }
}

/// A stored routing rule. Higher `priority` wins; ties break on ascending id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRule {
    pub id: i64,
    pub name: String,
    pub priority: i64,
    pub enabled: bool,
    pub match_type: MatchType,
    pub match_pattern: String,
    /// Header name examined by `header_regex` rules.
    pub match_header: Option<String>,
    pub target_url: String,
}

/// Singleton proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub default_target_url: Option<String>,
    pub log_enabled: bool,
    pub max_body_size: i64,
    pub ai_detection_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            default_target_url: None,
            log_enabled: true,
            max_body_size: 1_048_576,
            ai_detection_enabled: true,
            updated_at: Utc::now(),
        }
    }
}

/// One pricing row: prices are integer micro-dollars per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingEntry {
    pub provider: String,
    pub model_pattern: String,
    pub input_price_per_million: i64,
    pub output_price_per_million: i64,
}

/// One record per accepted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: String,
    pub method: String,
    pub url: String,
    pub path: String,
    /// Canonicalized query object with the reserved routing key removed.
    pub query: Value,
    pub headers: Value,
    pub body: Option<String>,
    pub body_truncated: bool,
    pub body_size: i64,
    /// Empty only when routing failed (then `error` is set).
    pub target_url: String,
    /// None only when routing failed.
    pub route_source: Option<RouteSource>,
    pub matched_rule_id: Option<i64>,
    pub status_code: Option<i64>,
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub response_truncated: bool,
    pub response_size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub is_ai_request: bool,
    pub ai_record_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Terminal-state fields applied to a `RequestRecord` exactly once, when the
/// response completes or the upstream call fails.
#[derive(Debug, Clone, Default)]
pub struct RequestCompletion {
    pub status_code: Option<i64>,
    pub response_headers: Option<Value>,
    pub response_body: Option<String>,
    pub response_truncated: bool,
    pub response_size: Option<i64>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub ai_record_id: Option<String>,
}

/// Conversation turn role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function_name: String,
    pub arguments_json: String,
}

/// One parsed conversation turn. `content` holds the textual part of
/// multimodal content; images are only counted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_count: Option<i64>,
}

impl ConversationMessage {
    pub fn text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            tool_name: None,
            has_images: None,
            image_count: None,
        }
    }
}

/// OpenRouter telemetry attached to an [`AiRecord`] by the enricher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenRouterMeta {
    pub generation_id: Option<String>,
    pub enriched: bool,
    pub enriched_at: Option<DateTime<Utc>>,
    pub provider_name: Option<String>,
    pub upstream_id: Option<String>,
    /// Total cost in USD as reported by OpenRouter.
    pub total_cost: Option<f64>,
    pub cache_discount: Option<f64>,
    pub latency_ms: Option<i64>,
    pub generation_time_ms: Option<i64>,
    pub moderation_latency_ms: Option<i64>,
    pub native_prompt_tokens: Option<i64>,
    pub native_completion_tokens: Option<i64>,
    pub native_reasoning_tokens: Option<i64>,
    pub native_cached_tokens: Option<i64>,
    pub finish_reason: Option<String>,
    pub is_byok: Option<bool>,
    pub raw_generation: Option<Value>,
}

/// At most one per `RequestRecord`, created when the request was detected as
/// AI and its body parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiRecord {
    pub id: String,
    pub provider: AiProvider,
    pub endpoint: String,
    pub model: Option<String>,
    pub streaming: bool,
    pub conversation: Vec<ConversationMessage>,
    // Legacy scalar mirrors kept for consumers that predate `conversation`.
    pub system_prompt: Option<String>,
    pub user_messages: Vec<String>,
    pub assistant_response: Option<String>,
    pub has_tool_calls: bool,
    pub tool_call_count: i64,
    pub tool_names: Vec<String>,
    pub full_request: Option<Value>,
    /// The parsed response object, or the list of parsed SSE frames.
    pub full_response: Option<Value>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    pub input_cost_micros: i64,
    pub output_cost_micros: i64,
    pub total_cost_micros: i64,
    pub time_to_first_token_ms: Option<i64>,
    pub total_duration_ms: Option<i64>,
    pub openrouter: OpenRouterMeta,
    pub created_at: DateTime<Utc>,
}

/// Telemetry fetched from the OpenRouter generation endpoint, applied to an
/// `AiRecord` at most once.
#[derive(Debug, Clone, Default)]
pub struct GenerationEnrichment {
    pub provider_name: Option<String>,
    pub upstream_id: Option<String>,
    pub total_cost: Option<f64>,
    pub cache_discount: Option<f64>,
    pub latency_ms: Option<i64>,
    pub generation_time_ms: Option<i64>,
    pub moderation_latency_ms: Option<i64>,
    pub native_prompt_tokens: Option<i64>,
    pub native_completion_tokens: Option<i64>,
    pub native_reasoning_tokens: Option<i64>,
    pub native_cached_tokens: Option<i64>,
    pub finish_reason: Option<String>,
    pub is_byok: Option<bool>,
    pub raw_generation: Option<Value>,
}

impl GenerationEnrichment {
    /// Total cost converted to integer micro-dollars.
    pub fn total_cost_micros(&self) -> Option<i64> {
        self.total_cost.map(|c| (c * 1_000_000.0).round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_sort_by_creation() {
        let a = new_record_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_record_id();
        assert!(a < b);
    }

    #[test]
    fn route_source_round_trips() {
        for src in [
            RouteSource::QueryParam,
            RouteSource::Header,
            RouteSource::ConfigRule,
            RouteSource::Default,
        ] {
            assert_eq!(RouteSource::parse(src.as_str()), Some(src));
        }
        assert_eq!(RouteSource::parse("bogus"), None);
    }

    #[test]
    fn provider_serializes_lowercase() {
        let json = serde_json::to_string(&AiProvider::OpenRouter).unwrap();
        assert_eq!(json, "\"openrouter\"");
        assert_eq!(AiProvider::parse("openai"), Some(AiProvider::OpenAi));
    }

    #[test]
    fn default_config_enables_logging() {
        let config = ProxyConfig::default();
        assert!(config.log_enabled);
        assert!(config.ai_detection_enabled);
        assert_eq!(config.max_body_size, 1_048_576);
        assert!(config.default_target_url.is_none());
    }

    #[test]
    fn enrichment_cost_converts_to_micros() {
        let enrichment = GenerationEnrichment {
            total_cost: Some(0.00042),
            ..Default::default()
        };
        assert_eq!(enrichment.total_cost_micros(), Some(420));
        assert_eq!(GenerationEnrichment::default().total_cost_micros(), None);
    }
}
