//! OpenRouter enrichment
//!
//! Out-of-band telemetry fetch: a short while after an OpenRouter exchange
//! completes, its generation record is pulled with the caller's own
//! Authorization and folded into the AI record. Best-effort only; failures
//! are logged and never retried.

use axum::http::header::AUTHORIZATION;
use periscope_core::{EventBus, GenerationEnrichment, ProxyEvent};
use periscope_store::SqliteStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai";
const DEFAULT_DELAY: Duration = Duration::from_millis(1000);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Enricher {
    client: reqwest::Client,
    base_url: String,
    delay: Duration,
    store: Arc<SqliteStore>,
    bus: EventBus,
}

impl Enricher {
    pub fn new(store: Arc<SqliteStore>, bus: EventBus) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, DEFAULT_DELAY, store, bus)
    }

    /// Base URL and delay are injectable for tests.
    pub fn with_base_url(
        base_url: impl Into<String>,
        delay: Duration,
        store: Arc<SqliteStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            delay,
            store,
            bus,
        }
    }

    /// Schedule an enrichment fetch after the configured delay.
    pub fn schedule(
        self: &Arc<Self>,
        ai_record_id: String,
        generation_id: String,
        authorization: String,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            if let Err(e) = this
                .fetch_and_apply(&ai_record_id, &generation_id, &authorization)
                .await
            {
                warn!(ai_record_id, generation_id, "openrouter enrichment failed: {e}");
            }
        });
    }

    async fn fetch_and_apply(
        &self,
        ai_record_id: &str,
        generation_id: &str,
        authorization: &str,
    ) -> Result<(), String> {
        let url = format!("{}/api/v1/generation", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("id", generation_id)])
            .header(AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("generation endpoint returned {}", response.status()));
        }

        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        let data = body
            .get("data")
            .ok_or_else(|| "generation payload has no data field".to_string())?;

        let enrichment = parse_generation(data, generation_id);
        let applied = self
            .store
            .apply_enrichment(ai_record_id, &enrichment)
            .await
            .map_err(|e| e.to_string())?;

        if applied {
            debug!(ai_record_id, "openrouter enrichment applied");
            self.bus.publish(ProxyEvent::OpenRouterEnriched {
                ai_record_id: ai_record_id.to_string(),
                provider_name: enrichment.provider_name.clone(),
                total_cost: enrichment.total_cost,
                cache_discount: enrichment.cache_discount,
            });
        } else {
            debug!(ai_record_id, "record already enriched, skipping");
        }
        Ok(())
    }
}

fn parse_generation(data: &Value, generation_id: &str) -> GenerationEnrichment {
    GenerationEnrichment {
        provider_name: string_field(data, "provider_name"),
        upstream_id: string_field(data, "upstream_id")
            .or_else(|| Some(generation_id.to_string())),
        total_cost: data.get("total_cost").and_then(Value::as_f64),
        cache_discount: data.get("cache_discount").and_then(Value::as_f64),
        latency_ms: int_field(data, "latency"),
        generation_time_ms: int_field(data, "generation_time"),
        moderation_latency_ms: int_field(data, "moderation_latency"),
        native_prompt_tokens: int_field(data, "native_tokens_prompt")
            .or_else(|| int_field(data, "tokens_prompt")),
        native_completion_tokens: int_field(data, "native_tokens_completion")
            .or_else(|| int_field(data, "tokens_completion")),
        native_reasoning_tokens: int_field(data, "native_tokens_reasoning"),
        native_cached_tokens: int_field(data, "native_tokens_cached"),
        finish_reason: string_field(data, "finish_reason"),
        is_byok: data.get("is_byok").and_then(Value::as_bool),
        raw_generation: Some(data.clone()),
    }
}

fn string_field(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(String::from)
}

fn int_field(data: &Value, field: &str) -> Option<i64> {
    let value = data.get(field)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
}
