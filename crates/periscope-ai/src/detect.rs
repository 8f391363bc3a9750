//! AI endpoint recognition and provider inference

use periscope_core::AiProvider;
use std::collections::HashMap;
use url::Url;

/// Path suffixes recognized as AI API endpoints, with and without the `/v1`
/// prefix.
const AI_ENDPOINT_SUFFIXES: &[&str] = &[
    "/v1/chat/completions",
    "/v1/completions",
    "/v1/embeddings",
    "/v1/images/generations",
    "/v1/audio/transcriptions",
    "/v1/audio/speech",
    "/v1/moderations",
    "/v1/messages",
    "/chat/completions",
    "/completions",
    "/embeddings",
    "/messages",
];

/// True when the request path targets a recognized AI endpoint.
pub fn is_ai_endpoint(path: &str) -> bool {
    AI_ENDPOINT_SUFFIXES
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

/// Infer the upstream provider from the target URL's host, falling back to
/// the `x-ai-provider` request header when the host is unknown.
///
/// Header keys are expected lowercased (the proxy normalizes them).
pub fn detect_provider(target_url: &str, headers: &HashMap<String, String>) -> AiProvider {
    let host = Url::parse(target_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| target_url.to_string());

    if host.contains("openrouter.ai") {
        return AiProvider::OpenRouter;
    }
    if host.contains("api.openai.com") {
        return AiProvider::OpenAi;
    }
    if host.contains("openai.azure.com") {
        return AiProvider::Azure;
    }
    if host.contains("api.anthropic.com") {
        return AiProvider::Anthropic;
    }

    headers
        .get("x-ai-provider")
        .and_then(|name| AiProvider::parse(name))
        .unwrap_or(AiProvider::Custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_versioned_endpoints() {
        assert!(is_ai_endpoint("/v1/chat/completions"));
        assert!(is_ai_endpoint("/v1/messages"));
        assert!(is_ai_endpoint("/v1/audio/speech"));
        assert!(is_ai_endpoint("/openai/deployments/gpt/v1/chat/completions"));
    }

    #[test]
    fn recognizes_bare_endpoints() {
        assert!(is_ai_endpoint("/chat/completions"));
        assert!(is_ai_endpoint("/api/messages"));
        assert!(!is_ai_endpoint("/v1/models"));
        assert!(!is_ai_endpoint("/index.html"));
    }

    #[test]
    fn detects_provider_by_host() {
        let none = HashMap::new();
        assert_eq!(
            detect_provider("https://api.openai.com", &none),
            AiProvider::OpenAi
        );
        assert_eq!(
            detect_provider("https://api.anthropic.com/v1", &none),
            AiProvider::Anthropic
        );
        assert_eq!(
            detect_provider("https://openrouter.ai/api/v1", &none),
            AiProvider::OpenRouter
        );
        assert_eq!(
            detect_provider("https://my-rg.openai.azure.com", &none),
            AiProvider::Azure
        );
        assert_eq!(
            detect_provider("https://llm.internal:8000", &none),
            AiProvider::Custom
        );
    }

    #[test]
    fn provider_header_overrides_unknown_host() {
        let mut headers = HashMap::new();
        headers.insert("x-ai-provider".to_string(), "anthropic".to_string());
        assert_eq!(
            detect_provider("https://llm.internal", &headers),
            AiProvider::Anthropic
        );

        headers.insert("x-ai-provider".to_string(), "not-a-provider".to_string());
        assert_eq!(
            detect_provider("https://llm.internal", &headers),
            AiProvider::Custom
        );
    }

    #[test]
    fn known_host_wins_over_header() {
        let mut headers = HashMap::new();
        headers.insert("x-ai-provider".to_string(), "anthropic".to_string());
        assert_eq!(
            detect_provider("https://api.openai.com", &headers),
            AiProvider::OpenAi
        );
    }
}
