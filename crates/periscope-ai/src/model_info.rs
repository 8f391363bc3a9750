//! Model metadata cache
//!
//! Two-tier lookup used for context-window display: a per-origin cache
//! populated by probing the upstream's models endpoint, with an OpenRouter
//! catalog fallback. Nothing here sits on the proxy hot path; every failure
//! degrades to `None`.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const ORIGIN_TTL: Duration = Duration::from_secs(60 * 60);
const CATALOG_TTL: Duration = Duration::from_secs(60 * 60);
const FAILURE_BACKOFF: Duration = Duration::from_secs(5 * 60);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Vendor prefixes tried against the OpenRouter catalog when the bare model
/// name misses.
const VENDOR_PREFIXES: &[&str] = &[
    "openai/",
    "anthropic/",
    "google/",
    "mistralai/",
    "meta-llama/",
    "deepseek/",
];

/// Metadata for one model as reported by a models endpoint.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_length: Option<i64>,
    pub input_price: Option<f64>,
    pub output_price: Option<f64>,
}

struct CachedModels {
    models: HashMap<String, ModelInfo>,
    fetched_at: Instant,
}

/// Process-wide model metadata cache. Internally synchronized; cheap to
/// share behind an `Arc`.
pub struct ModelInfoCache {
    client: reqwest::Client,
    origins: DashMap<String, CachedModels>,
    failed_origins: DashMap<String, Instant>,
    catalog: Mutex<Option<CachedModels>>,
    openrouter_base: String,
}

impl ModelInfoCache {
    pub fn new() -> Self {
        Self::with_openrouter_base("https://openrouter.ai")
    }

    /// The OpenRouter base URL is injectable for tests.
    pub fn with_openrouter_base(base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .build()
                .unwrap_or_default(),
            origins: DashMap::new(),
            failed_origins: DashMap::new(),
            catalog: Mutex::new(None),
            openrouter_base: base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Look up model metadata, probing the origin on a cold cache and
    /// falling back to the OpenRouter catalog.
    pub async fn lookup(&self, origin: &str, model: &str) -> Option<ModelInfo> {
        let origin = origin.trim_end_matches('/');

        if let Some(info) = self.origin_lookup(origin, model).await {
            return Some(info);
        }
        self.catalog_lookup(model).await
    }

    async fn origin_lookup(&self, origin: &str, model: &str) -> Option<ModelInfo> {
        let fresh = self
            .origins
            .get(origin)
            .is_some_and(|entry| entry.fetched_at.elapsed() < ORIGIN_TTL);

        if !fresh {
            if let Some(failed_at) = self.failed_origins.get(origin).map(|t| *t)
                && failed_at.elapsed() < FAILURE_BACKOFF
            {
                return None;
            }

            match self.probe_origin(origin).await {
                Some(models) => {
                    self.failed_origins.remove(origin);
                    self.origins.insert(
                        origin.to_string(),
                        CachedModels {
                            models,
                            fetched_at: Instant::now(),
                        },
                    );
                }
                None => {
                    debug!(origin, "models probe failed, backing off");
                    self.failed_origins
                        .insert(origin.to_string(), Instant::now());
                    return None;
                }
            }
        }

        self.origins
            .get(origin)
            .and_then(|entry| entry.models.get(model).cloned())
    }

    /// Probe `{origin}/v1/models`, then `{origin}/models`.
    async fn probe_origin(&self, origin: &str) -> Option<HashMap<String, ModelInfo>> {
        for path in ["/v1/models", "/models"] {
            let url = format!("{origin}{path}");
            let Ok(response) = self.client.get(&url).send().await else {
                continue;
            };
            if !response.status().is_success() {
                continue;
            }
            let Ok(body) = response.json::<Value>().await else {
                continue;
            };
            if let Some(models) = parse_models_payload(&body) {
                return Some(models);
            }
        }
        None
    }

    async fn catalog_lookup(&self, model: &str) -> Option<ModelInfo> {
        let mut catalog = self.catalog.lock().await;

        let stale = catalog
            .as_ref()
            .is_none_or(|entry| entry.fetched_at.elapsed() >= CATALOG_TTL);
        if stale {
            let url = format!("{}/api/v1/models", self.openrouter_base);
            let models = match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|body| parse_models_payload(&body)),
                _ => None,
            };
            match models {
                Some(models) => {
                    *catalog = Some(CachedModels {
                        models,
                        fetched_at: Instant::now(),
                    });
                }
                None => {
                    debug!("openrouter catalog fetch failed");
                    return None;
                }
            }
        }

        let entry = catalog.as_ref()?;
        if let Some(info) = entry.models.get(model) {
            return Some(info.clone());
        }
        VENDOR_PREFIXES
            .iter()
            .find_map(|prefix| entry.models.get(&format!("{prefix}{model}")).cloned())
    }
}

impl Default for ModelInfoCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept `data[]`, `models[]`, or a bare array whose elements carry an `id`
/// (or `name`). Anything else is not a models payload.
fn parse_models_payload(body: &Value) -> Option<HashMap<String, ModelInfo>> {
    let elements = body
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| body.get("models").and_then(Value::as_array))
        .or_else(|| body.as_array())?;

    let mut models = HashMap::new();
    for element in elements {
        let Some(id) = element
            .get("id")
            .or_else(|| element.get("name"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        models.insert(
            id.to_string(),
            ModelInfo {
                id: id.to_string(),
                context_length: element
                    .get("context_length")
                    .or_else(|| element.get("context_window"))
                    .or_else(|| element.get("max_tokens"))
                    .and_then(Value::as_i64),
                input_price: price_field(element, "prompt"),
                output_price: price_field(element, "completion"),
            },
        );
    }

    (!models.is_empty()).then_some(models)
}

/// OpenRouter reports prices as decimal strings; others use numbers.
fn price_field(element: &Value, field: &str) -> Option<f64> {
    let price = element.get("pricing")?.get(field)?;
    price
        .as_f64()
        .or_else(|| price.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_data_wrapped_payload() {
        let models = parse_models_payload(&json!({
            "data": [
                {"id": "gpt-4o", "context_length": 128000},
                {"id": "gpt-4o-mini", "context_window": 128000},
                {"no_id": true}
            ]
        }))
        .unwrap();

        assert_eq!(models.len(), 2);
        assert_eq!(models["gpt-4o"].context_length, Some(128000));
        assert_eq!(models["gpt-4o-mini"].context_length, Some(128000));
    }

    #[test]
    fn parses_bare_array_with_name_field() {
        let models =
            parse_models_payload(&json!([{"name": "local-model", "max_tokens": 4096}])).unwrap();
        assert_eq!(models["local-model"].context_length, Some(4096));
    }

    #[test]
    fn rejects_non_model_payloads() {
        assert!(parse_models_payload(&json!({"error": "nope"})).is_none());
        assert!(parse_models_payload(&json!({"data": [{"x": 1}]})).is_none());
    }

    #[test]
    fn parses_string_prices() {
        let models = parse_models_payload(&json!({
            "data": [{"id": "m", "pricing": {"prompt": "0.000003", "completion": 0.000015}}]
        }))
        .unwrap();
        assert_eq!(models["m"].input_price, Some(0.000003));
        assert_eq!(models["m"].output_price, Some(0.000015));
    }

    #[tokio::test]
    async fn probes_origin_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "gpt-4o", "context_length": 128000}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cache = ModelInfoCache::with_openrouter_base(server.uri());
        let info = cache.lookup(&server.uri(), "gpt-4o").await.unwrap();
        assert_eq!(info.context_length, Some(128000));

        // Second lookup is served from cache (the mock expects one call).
        let again = cache.lookup(&server.uri(), "gpt-4o").await.unwrap();
        assert_eq!(again.id, "gpt-4o");
    }

    #[tokio::test]
    async fn failed_origin_backs_off_and_catalog_answers() {
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&origin)
            .await;

        let catalog = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "anthropic/claude-3-haiku", "context_length": 200000}]
            })))
            .expect(1)
            .mount(&catalog)
            .await;

        let cache = ModelInfoCache::with_openrouter_base(catalog.uri());
        let info = cache.lookup(&origin.uri(), "claude-3-haiku").await.unwrap();
        assert_eq!(info.context_length, Some(200000));
        assert!(cache.failed_origins.contains_key(origin.uri().trim_end_matches('/')));

        // The failed origin is not re-probed inside the backoff window and
        // the catalog cache answers without a second fetch.
        let again = cache.lookup(&origin.uri(), "claude-3-haiku").await;
        assert!(again.is_some());
    }

    #[tokio::test]
    async fn unknown_model_returns_none() {
        let catalog = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "openai/gpt-4o"}]
            })))
            .mount(&catalog)
            .await;

        let cache = ModelInfoCache::with_openrouter_base(catalog.uri());
        assert!(cache.lookup(&catalog.uri(), "nope").await.is_none());
    }
}
