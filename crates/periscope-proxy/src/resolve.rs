//! Target resolution
//!
//! A strict precedence chain decides where a request goes: the reserved
//! `__target` query key, then the `X-Target-URL` header, then enabled
//! routing rules by descending priority, then the configured default.

use periscope_core::{MatchType, ProxyConfig, RouteSource, RoutingRule};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

/// Reserved query key naming the target origin; stripped before forwarding.
pub const TARGET_QUERY_KEY: &str = "__target";
/// Reserved header naming the target origin; stripped before forwarding.
pub const TARGET_HEADER: &str = "x-target-url";

/// A successfully resolved target.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub target_url: String,
    pub source: RouteSource,
    pub rule_id: Option<i64>,
}

/// Routing failure, reported to the client as a 400.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("No target URL could be determined for this request")]
    NoTarget,

    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoTarget => "NO_TARGET",
            Self::InvalidUrl(_) => "INVALID_URL",
        }
    }
}

/// Resolve the target origin for a request. `headers` keys are lowercased;
/// `query_pairs` preserve the original order and duplicates.
pub fn resolve_target(
    path: &str,
    query_pairs: &[(String, String)],
    headers: &HashMap<String, String>,
    rules: &[RoutingRule],
    config: &ProxyConfig,
) -> Result<ResolvedTarget, RoutingError> {
    if let Some((_, target)) = query_pairs.iter().find(|(key, _)| key == TARGET_QUERY_KEY) {
        return Ok(ResolvedTarget {
            target_url: validate_target(target)?,
            source: RouteSource::QueryParam,
            rule_id: None,
        });
    }

    if let Some(target) = headers.get(TARGET_HEADER) {
        return Ok(ResolvedTarget {
            target_url: validate_target(target)?,
            source: RouteSource::Header,
            rule_id: None,
        });
    }

    // Rules arrive pre-ordered (priority desc, id asc); first match wins.
    for rule in rules {
        if rule_matches(rule, path, headers) {
            return Ok(ResolvedTarget {
                target_url: rule.target_url.clone(),
                source: RouteSource::ConfigRule,
                rule_id: Some(rule.id),
            });
        }
    }

    if let Some(default) = config
        .default_target_url
        .as_deref()
        .filter(|url| !url.is_empty())
    {
        return Ok(ResolvedTarget {
            target_url: default.to_string(),
            source: RouteSource::Default,
            rule_id: None,
        });
    }

    Err(RoutingError::NoTarget)
}

/// Accept only absolute http/https URLs with a host.
fn validate_target(raw: &str) -> Result<String, RoutingError> {
    let parsed = Url::parse(raw).map_err(|_| RoutingError::InvalidUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(RoutingError::InvalidUrl(raw.to_string()));
    }
    Ok(raw.to_string())
}

/// Rule predicate. A pattern that fails to compile simply does not match.
fn rule_matches(rule: &RoutingRule, path: &str, headers: &HashMap<String, String>) -> bool {
    match rule.match_type {
        MatchType::PathPrefix => path.starts_with(&rule.match_pattern),
        MatchType::PathRegex => match Regex::new(&rule.match_pattern) {
            Ok(pattern) => pattern.is_match(path),
            Err(_) => false,
        },
        MatchType::HeaderRegex => {
            let Some(name) = &rule.match_header else {
                return false;
            };
            let Some(value) = headers.get(&name.to_lowercase()) else {
                return false;
            };
            match Regex::new(&rule.match_pattern) {
                Ok(pattern) => pattern.is_match(value),
                Err(_) => false,
            }
        }
    }
}

/// The original query minus the reserved routing key.
pub fn clean_query(query_pairs: &[(String, String)]) -> Vec<(String, String)> {
    query_pairs
        .iter()
        .filter(|(key, _)| key != TARGET_QUERY_KEY)
        .cloned()
        .collect()
}

/// Canonical JSON form of a query for the request record: repeated keys
/// collapse into arrays, order preserved.
pub fn query_to_json(query_pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in query_pairs {
        match map.get_mut(key) {
            None => {
                map.insert(key.clone(), Value::String(value.clone()));
            }
            Some(Value::Array(existing)) => existing.push(Value::String(value.clone())),
            Some(existing) => {
                let first = existing.clone();
                *existing = Value::Array(vec![first, Value::String(value.clone())]);
            }
        }
    }
    Value::Object(map)
}

/// Resolve `path` against the target origin and re-append the remaining
/// query pairs in their original order.
pub fn build_target_url(
    base: &str,
    path: &str,
    clean_pairs: &[(String, String)],
) -> Result<String, RoutingError> {
    let base_url = Url::parse(base).map_err(|_| RoutingError::InvalidUrl(base.to_string()))?;
    let mut full = base_url
        .join(path)
        .map_err(|_| RoutingError::InvalidUrl(base.to_string()))?;

    if !clean_pairs.is_empty() {
        let mut query = full.query_pairs_mut();
        for (key, value) in clean_pairs {
            query.append_pair(key, value);
        }
    }

    Ok(full.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn rule(id: i64, match_type: MatchType, pattern: &str, target: &str) -> RoutingRule {
        RoutingRule {
            id,
            name: format!("rule-{id}"),
            priority: 0,
            enabled: true,
            match_type,
            match_pattern: pattern.to_string(),
            match_header: None,
            target_url: target.to_string(),
        }
    }

    #[test]
    fn query_key_wins_over_everything() {
        let mut headers = HashMap::new();
        headers.insert(TARGET_HEADER.to_string(), "https://header.example".to_string());
        let rules = vec![rule(1, MatchType::PathPrefix, "/", "https://rule.example")];
        let config = ProxyConfig {
            default_target_url: Some("https://default.example".to_string()),
            ..Default::default()
        };

        let resolved = resolve_target(
            "/anything",
            &pairs(&[("foo", "1"), ("__target", "https://api.openai.com")]),
            &headers,
            &rules,
            &config,
        )
        .unwrap();

        assert_eq!(resolved.target_url, "https://api.openai.com");
        assert_eq!(resolved.source, RouteSource::QueryParam);
    }

    #[test]
    fn invalid_query_target_is_an_error_not_a_fallthrough() {
        let err = resolve_target(
            "/x",
            &pairs(&[("__target", "not-a-url")]),
            &HashMap::new(),
            &[],
            &ProxyConfig {
                default_target_url: Some("https://default.example".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();

        assert_eq!(err.code(), "INVALID_URL");
        assert_eq!(err.to_string(), "Invalid target URL: not-a-url");
    }

    #[test]
    fn header_beats_rules_and_default() {
        let mut headers = HashMap::new();
        headers.insert(TARGET_HEADER.to_string(), "http://header.example".to_string());
        let rules = vec![rule(1, MatchType::PathPrefix, "/", "https://rule.example")];

        let resolved =
            resolve_target("/x", &[], &headers, &rules, &ProxyConfig::default()).unwrap();
        assert_eq!(resolved.source, RouteSource::Header);
        assert_eq!(resolved.target_url, "http://header.example");
    }

    #[test]
    fn first_rule_in_order_wins() {
        // Caller supplies rules already ordered by priority desc.
        let rules = vec![
            rule(2, MatchType::PathRegex, "^/v1/messages$", "https://api.anthropic.com"),
            rule(1, MatchType::PathPrefix, "/v1/", "https://api.openai.com"),
        ];

        let resolved = resolve_target(
            "/v1/messages",
            &[],
            &HashMap::new(),
            &rules,
            &ProxyConfig::default(),
        )
        .unwrap();
        assert_eq!(resolved.target_url, "https://api.anthropic.com");
        assert_eq!(resolved.rule_id, Some(2));

        let other = resolve_target(
            "/v1/chat/completions",
            &[],
            &HashMap::new(),
            &rules,
            &ProxyConfig::default(),
        )
        .unwrap();
        assert_eq!(other.target_url, "https://api.openai.com");
    }

    #[test]
    fn header_regex_rule_reads_named_header() {
        let mut matching = rule(1, MatchType::HeaderRegex, "^internal-", "https://internal.example");
        matching.match_header = Some("X-Team".to_string());

        let mut headers = HashMap::new();
        headers.insert("x-team".to_string(), "internal-platform".to_string());

        let resolved = resolve_target(
            "/x",
            &[],
            &headers,
            &[matching.clone()],
            &ProxyConfig::default(),
        )
        .unwrap();
        assert_eq!(resolved.source, RouteSource::ConfigRule);

        let err = resolve_target(
            "/x",
            &[],
            &HashMap::new(),
            &[matching],
            &ProxyConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, RoutingError::NoTarget);
    }

    #[test]
    fn bad_rule_regex_never_matches_and_never_fails() {
        let broken = rule(1, MatchType::PathRegex, "(unclosed", "https://broken.example");
        let err = resolve_target("/x", &[], &HashMap::new(), &[broken], &ProxyConfig::default())
            .unwrap_err();
        assert_eq!(err, RoutingError::NoTarget);
    }

    #[test]
    fn default_applies_last() {
        let config = ProxyConfig {
            default_target_url: Some("https://default.example".to_string()),
            ..Default::default()
        };
        let resolved = resolve_target("/x", &[], &HashMap::new(), &[], &config).unwrap();
        assert_eq!(resolved.source, RouteSource::Default);

        let empty = ProxyConfig {
            default_target_url: Some(String::new()),
            ..Default::default()
        };
        let err = resolve_target("/x", &[], &HashMap::new(), &[], &empty).unwrap_err();
        assert_eq!(err, RoutingError::NoTarget);
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let err = resolve_target(
            "/x",
            &pairs(&[("__target", "ftp://files.example")]),
            &HashMap::new(),
            &[],
            &ProxyConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_URL");
    }

    #[test]
    fn clean_query_strips_only_the_reserved_key() {
        let cleaned = clean_query(&pairs(&[
            ("foo", "1"),
            ("__target", "https://api.openai.com"),
            ("foo", "2"),
        ]));
        assert_eq!(cleaned, pairs(&[("foo", "1"), ("foo", "2")]));
    }

    #[test]
    fn query_json_collapses_repeats_into_arrays() {
        let json = query_to_json(&pairs(&[("a", "1"), ("b", "x"), ("a", "2"), ("a", "3")]));
        assert_eq!(json["a"], serde_json::json!(["1", "2", "3"]));
        assert_eq!(json["b"], "x");
    }

    #[test]
    fn builds_full_target_url() {
        let url = build_target_url(
            "https://api.openai.com",
            "/anything",
            &pairs(&[("foo", "1")]),
        )
        .unwrap();
        assert_eq!(url, "https://api.openai.com/anything?foo=1");

        let bare = build_target_url("https://api.openai.com", "/v1/models", &[]).unwrap();
        assert_eq!(bare, "https://api.openai.com/v1/models");
    }

    #[test]
    fn target_url_preserves_repeated_query_keys_in_order() {
        let url = build_target_url(
            "https://api.example.com",
            "/search",
            &pairs(&[("tag", "a"), ("tag", "b"), ("q", "x y")]),
        )
        .unwrap();
        assert_eq!(url, "https://api.example.com/search?tag=a&tag=b&q=x+y");
    }
}
