//! The forwarder
//!
//! One pipeline per incoming request: resolve the target, relay the request,
//! stream the response back, and capture the exchange on the side. The
//! client path is never blocked by observation work; record writes happen in
//! background tasks after the relevant bytes have been forwarded.

use crate::body::{is_binary_content_type, process_body, safe_json_parse};
use crate::botfilter::is_blocked_user_agent;
use crate::collector::{
    body_starts_like_sse, collect_bytes, collect_sse, declares_event_stream, is_chunked_transfer,
    tee,
};
use crate::enrich::Enricher;
use crate::resolve::{
    RoutingError, TARGET_HEADER, build_target_url, clean_query, query_to_json, resolve_target,
};
use axum::{Json, Router};
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING,
    USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use periscope_ai::request::ParsedAiRequest;
use periscope_ai::{
    estimate_cost, find_generation_id, find_generation_id_in_frames, is_ai_endpoint,
    parse_ai_request, parse_ai_response, parse_sse_chunks,
};
use periscope_core::{
    AiProvider, AiRecord, EventBus, OpenRouterMeta, ProxyConfig, ProxyEvent, RequestCompletion,
    RequestRecord, new_record_id,
};
use periscope_store::SqliteStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::{debug, warn};
use url::form_urlencoded;

/// Absolute ceiling on a raw request body; anything over is rejected at the
/// framing layer.
pub const MAX_RAW_BODY_BYTES: usize = 50 * 1024 * 1024;

const STREAM_BODY_PLACEHOLDER: &str = "[Streaming response - see AI request details]";

/// Path suffixes that skip logging entirely.
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    ".js", ".mjs", ".cjs", ".css", ".map", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".png",
    ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".avif",
];

/// Shared state behind every proxied request.
pub struct ProxyState {
    pub client: reqwest::Client,
    pub store: Arc<SqliteStore>,
    pub bus: EventBus,
    pub enricher: Arc<Enricher>,
}

impl ProxyState {
    pub fn new(store: Arc<SqliteStore>, bus: EventBus) -> periscope_core::Result<Self> {
        let enricher = Arc::new(Enricher::new(store.clone(), bus.clone()));
        Self::with_enricher(store, bus, enricher)
    }

    /// Variant with an injectable enricher, used by tests to point at a mock
    /// OpenRouter.
    pub fn with_enricher(
        store: Arc<SqliteStore>,
        bus: EventBus,
        enricher: Arc<Enricher>,
    ) -> periscope_core::Result<Self> {
        Ok(Self {
            client: build_forwarding_client()?,
            store,
            bus,
            enricher,
        })
    }
}

/// The forwarding client. Automatic decompression is disabled so upstream
/// bytes pass through untouched, redirects are surfaced to the caller, and
/// idle pooled connections expire before upstreams close them.
fn build_forwarding_client() -> periscope_core::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(600))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::none())
        .use_rustls_tls()
        .no_gzip()
        .no_brotli()
        .no_deflate()
        .build()
        .map_err(|e| {
            periscope_core::Error::Config(format!("failed to build forwarding client: {e}"))
        })
}

/// The proxy listener: any method, any path.
pub fn proxy_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .fallback(move |req: Request| {
            let state = state.clone();
            async move { handle(state, req).await }
        })
        .layer(CatchPanicLayer::custom(|_: Box<dyn std::any::Any + Send>| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal proxy error",
                "The proxy failed to process this request",
            )
        }))
}

type UpstreamBytes = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Context carried from the handler into the background completion task.
struct CompletionContext {
    record_id: String,
    started: Instant,
    max_body_size: i64,
    authorization: Option<String>,
}

async fn handle(state: Arc<ProxyState>, req: Request) -> Response {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let config = match state.store.load_config().await {
        Ok(config) => config,
        Err(e) => {
            warn!("config load failed, using defaults: {e}");
            ProxyConfig::default()
        }
    };

    let body_bytes = match axum::body::to_bytes(body, MAX_RAW_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    // Blocked crawlers are refused outright and never logged.
    if let Some(user_agent) = parts.headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
        && is_blocked_user_agent(user_agent)
    {
        return error_response(
            StatusCode::FORBIDDEN,
            "Forbidden",
            "Automated clients are not allowed through this proxy",
        );
    }

    let path = parts.uri.path().to_string();
    let original_url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| path.clone());
    let query_pairs: Vec<(String, String)> =
        form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();
    let lower_headers: HashMap<String, String> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let log_this = config.log_enabled && !is_static_asset(&path);

    let rules = match state.store.enabled_rules().await {
        Ok(rules) => rules,
        Err(e) => {
            warn!("rule load failed: {e}");
            Vec::new()
        }
    };

    let resolved = match resolve_target(&path, &query_pairs, &lower_headers, &rules, &config) {
        Ok(resolved) => resolved,
        Err(routing_err) => {
            return routing_failure(
                &state,
                routing_err,
                log_this,
                &parts,
                &original_url,
                &path,
                &query_pairs,
                &body_bytes,
                &config,
                started,
            )
            .await;
        }
    };

    let clean_pairs = clean_query(&query_pairs);
    let full_target = match build_target_url(&resolved.target_url, &path, &clean_pairs) {
        Ok(url) => url,
        Err(routing_err) => {
            return routing_failure(
                &state,
                routing_err,
                log_this,
                &parts,
                &original_url,
                &path,
                &query_pairs,
                &body_bytes,
                &config,
                started,
            )
            .await;
        }
    };

    // AI classification. A body that fails to parse as JSON silently
    // downgrades the exchange to a plain request.
    let mut parsed_ai: Option<ParsedAiRequest> = None;
    if config.ai_detection_enabled && is_ai_endpoint(&path) {
        let content_type = lower_headers
            .get("content-type")
            .map(String::as_str)
            .unwrap_or("");
        if !is_binary_content_type(content_type) {
            match safe_json_parse(&body_bytes) {
                Some(json) => {
                    parsed_ai = Some(parse_ai_request(
                        &json,
                        &path,
                        &resolved.target_url,
                        &lower_headers,
                    ));
                }
                None => debug!(path, "non-JSON body on AI endpoint, treating as plain request"),
            }
        }
    }

    let record_id = new_record_id();
    if log_this {
        let created_at = Utc::now();
        let processed = process_body(&body_bytes, config.max_body_size);
        let record = RequestRecord {
            id: record_id.clone(),
            method: parts.method.to_string(),
            url: original_url.clone(),
            path: path.clone(),
            query: query_to_json(&clean_pairs),
            headers: headers_to_json(&parts.headers),
            body: processed.body,
            body_truncated: processed.truncated,
            body_size: processed.size,
            target_url: resolved.target_url.clone(),
            route_source: Some(resolved.source),
            matched_rule_id: resolved.rule_id,
            status_code: None,
            response_headers: None,
            response_body: None,
            response_truncated: false,
            response_size: None,
            duration_ms: None,
            is_ai_request: parsed_ai.is_some(),
            ai_record_id: None,
            error: None,
            created_at,
        };
        if let Err(e) = state.store.insert_request(&record).await {
            warn!(record_id, "request record insert failed: {e}");
        }
        state.bus.publish(ProxyEvent::RequestStart {
            id: record_id.clone(),
            method: parts.method.to_string(),
            url: original_url.clone(),
            path: path.clone(),
            target_url: resolved.target_url.clone(),
            route_source: Some(resolved.source),
            is_ai_request: parsed_ai.is_some(),
            created_at,
        });
    }

    // Outbound request: headers copied verbatim except Connection and
    // Content-Length (Host and Content-Length are re-derived from the
    // target URL and body) plus the reserved routing header.
    let mut outbound = state.client.request(parts.method.clone(), &full_target);
    for (name, value) in parts.headers.iter() {
        if is_excluded_request_header(name) {
            continue;
        }
        outbound = outbound.header(name.clone(), value.clone());
    }
    if !body_bytes.is_empty() {
        outbound = outbound.body(body_bytes.to_vec());
    }

    let upstream = match outbound.send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            let message = e.to_string();
            warn!(upstream = %full_target, "upstream request failed: {message}");
            if log_this {
                let completion = RequestCompletion {
                    status_code: Some(502),
                    duration_ms: Some(started.elapsed().as_millis() as i64),
                    error: Some(message.clone()),
                    ..Default::default()
                };
                finish_record(&state, &record_id, completion, None, None).await;
            }
            return error_response(StatusCode::BAD_GATEWAY, "Proxy error", &message);
        }
    };

    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();
    let ctx = CompletionContext {
        record_id,
        started,
        max_body_size: config.max_body_size,
        authorization: lower_headers.get("authorization").cloned(),
    };

    let mut byte_stream: UpstreamBytes = upstream.bytes_stream().boxed();

    // Streaming only when the request asked for it AND the response looks
    // like SSE: either declared via Content-Type, or chunked with an
    // SSE-like body start. Anything else takes the buffered path.
    let wants_stream = parsed_ai.as_ref().is_some_and(|p| p.streaming);
    let streaming = if !wants_stream {
        false
    } else if declares_event_stream(&upstream_headers) {
        true
    } else if is_chunked_transfer(&upstream_headers) {
        // Sniff the first chunk, then put it back in front of the stream.
        match byte_stream.next().await {
            Some(Ok(first)) => {
                let sse_like = body_starts_like_sse(&first);
                byte_stream = futures::stream::iter([Ok(first)]).chain(byte_stream).boxed();
                sse_like
            }
            Some(Err(e)) => {
                byte_stream = futures::stream::iter([Err(e)]).chain(byte_stream).boxed();
                false
            }
            None => {
                byte_stream = futures::stream::empty().boxed();
                false
            }
        }
    } else {
        false
    };

    if streaming {
        relay_streamed(state, ctx, byte_stream, status, upstream_headers, parsed_ai, log_this)
    } else {
        relay_buffered(state, ctx, byte_stream, status, upstream_headers, parsed_ai, log_this)
    }
}

/// Streaming path: raw SSE bytes to the client, a chunk tally on the side.
fn relay_streamed(
    state: Arc<ProxyState>,
    ctx: CompletionContext,
    byte_stream: UpstreamBytes,
    status: StatusCode,
    upstream_headers: HeaderMap,
    parsed_ai: Option<ParsedAiRequest>,
    log_this: bool,
) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream_headers.iter() {
        if name == TRANSFER_ENCODING {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));

    let body = if log_this {
        let (tee_stream, observer) = tee(byte_stream);
        tokio::spawn(finish_streamed(
            state,
            ctx,
            observer,
            status,
            upstream_headers,
            parsed_ai,
        ));
        Body::from_stream(tee_stream)
    } else {
        Body::from_stream(byte_stream)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn finish_streamed(
    state: Arc<ProxyState>,
    ctx: CompletionContext,
    observer: mpsc::UnboundedReceiver<Bytes>,
    status: StatusCode,
    upstream_headers: HeaderMap,
    parsed_ai: Option<ParsedAiRequest>,
) {
    let tally = collect_sse(observer, ctx.started).await;
    let duration_ms = ctx.started.elapsed().as_millis() as i64;
    let merged = parse_sse_chunks(&tally.chunks);

    // This path is only taken for classified AI requests.
    let Some(parsed) = parsed_ai else { return };

    let model = merged
        .response
        .model
        .clone()
        .or_else(|| parsed.model.clone());
    let cost = {
        let rows = state
            .store
            .pricing_for_provider(parsed.provider.as_str())
            .await
            .unwrap_or_default();
        estimate_cost(
            model.as_deref(),
            merged.response.prompt_tokens,
            merged.response.completion_tokens,
            &rows,
        )
    };

    let generation_id = (parsed.provider == AiProvider::OpenRouter)
        .then(|| find_generation_id_in_frames(&merged.frames))
        .flatten();

    let ai = AiRecord {
        id: new_record_id(),
        provider: parsed.provider,
        endpoint: parsed.endpoint,
        model,
        streaming: true,
        conversation: parsed.conversation,
        system_prompt: parsed.system_prompt,
        user_messages: parsed.user_messages,
        assistant_response: merged.response.assistant_response.clone(),
        has_tool_calls: parsed.has_tool_calls,
        tool_call_count: parsed.tool_call_count,
        tool_names: parsed.tool_names,
        full_request: Some(parsed.full_request),
        full_response: Some(Value::Array(merged.frames)),
        prompt_tokens: merged.response.prompt_tokens,
        completion_tokens: merged.response.completion_tokens,
        total_tokens: merged.response.total_tokens,
        input_cost_micros: cost.input_micros,
        output_cost_micros: cost.output_micros,
        total_cost_micros: cost.total_micros,
        time_to_first_token_ms: tally.time_to_first_token_ms,
        total_duration_ms: Some(duration_ms),
        openrouter: OpenRouterMeta {
            generation_id: generation_id.clone(),
            ..Default::default()
        },
        created_at: Utc::now(),
    };

    let completion = RequestCompletion {
        status_code: Some(status.as_u16() as i64),
        response_headers: Some(headers_to_json(&upstream_headers)),
        response_body: Some(STREAM_BODY_PLACEHOLDER.to_string()),
        response_truncated: false,
        response_size: Some(tally.content_bytes),
        duration_ms: Some(duration_ms),
        error: None,
        ai_record_id: Some(ai.id.clone()),
    };

    let event = ProxyEvent::RequestComplete {
        id: ctx.record_id.clone(),
        status_code: completion.status_code,
        response_time_ms: completion.duration_ms,
        response_size: completion.response_size,
        error: None,
        ai_record_id: Some(ai.id.clone()),
        model: ai.model.clone(),
        total_tokens: ai.total_tokens,
        total_cost_micros: Some(ai.total_cost_micros),
    };

    let ai_id = ai.id.clone();
    finish_record(&state, &ctx.record_id, completion, Some(ai), Some(event)).await;

    if let (Some(generation_id), Some(authorization)) = (generation_id, ctx.authorization) {
        state.enricher.schedule(ai_id, generation_id, authorization);
    }
}

/// Buffered path: upstream bytes stream straight to the client while a raw
/// copy accumulates for the log.
fn relay_buffered(
    state: Arc<ProxyState>,
    ctx: CompletionContext,
    byte_stream: UpstreamBytes,
    status: StatusCode,
    upstream_headers: HeaderMap,
    parsed_ai: Option<ParsedAiRequest>,
    log_this: bool,
) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream_headers.iter() {
        if name == TRANSFER_ENCODING {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    let body = if log_this {
        let (tee_stream, observer) = tee(byte_stream);
        tokio::spawn(finish_buffered(
            state,
            ctx,
            observer,
            status,
            upstream_headers,
            parsed_ai,
        ));
        Body::from_stream(tee_stream)
    } else {
        Body::from_stream(byte_stream)
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn finish_buffered(
    state: Arc<ProxyState>,
    ctx: CompletionContext,
    observer: mpsc::UnboundedReceiver<Bytes>,
    status: StatusCode,
    upstream_headers: HeaderMap,
    parsed_ai: Option<ParsedAiRequest>,
) {
    let raw = collect_bytes(observer, MAX_RAW_BODY_BYTES).await;
    let duration_ms = ctx.started.elapsed().as_millis() as i64;

    let content_encoding = upstream_headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok());
    let decoded = crate::body::decompress(&raw, content_encoding).await;
    let processed = process_body(&decoded, ctx.max_body_size);

    let mut ai_record = None;
    let mut generation_id = None;
    if let Some(parsed) = parsed_ai {
        let response_json = safe_json_parse(&decoded);
        let parsed_response = response_json
            .as_ref()
            .map(parse_ai_response)
            .unwrap_or_default();

        let model = parsed_response.model.clone().or_else(|| parsed.model.clone());
        let cost = {
            let rows = state
                .store
                .pricing_for_provider(parsed.provider.as_str())
                .await
                .unwrap_or_default();
            estimate_cost(
                model.as_deref(),
                parsed_response.prompt_tokens,
                parsed_response.completion_tokens,
                &rows,
            )
        };

        generation_id = (parsed.provider == AiProvider::OpenRouter)
            .then(|| response_json.as_ref().and_then(find_generation_id))
            .flatten();

        ai_record = Some(AiRecord {
            id: new_record_id(),
            provider: parsed.provider,
            endpoint: parsed.endpoint,
            model,
            streaming: parsed.streaming,
            conversation: parsed.conversation,
            system_prompt: parsed.system_prompt,
            user_messages: parsed.user_messages,
            assistant_response: parsed_response.assistant_response.clone(),
            has_tool_calls: parsed.has_tool_calls,
            tool_call_count: parsed.tool_call_count,
            tool_names: parsed.tool_names,
            full_request: Some(parsed.full_request),
            full_response: response_json,
            prompt_tokens: parsed_response.prompt_tokens,
            completion_tokens: parsed_response.completion_tokens,
            total_tokens: parsed_response.total_tokens,
            input_cost_micros: cost.input_micros,
            output_cost_micros: cost.output_micros,
            total_cost_micros: cost.total_micros,
            time_to_first_token_ms: None,
            total_duration_ms: Some(duration_ms),
            openrouter: OpenRouterMeta {
                generation_id: generation_id.clone(),
                ..Default::default()
            },
            created_at: Utc::now(),
        });
    }

    let completion = RequestCompletion {
        status_code: Some(status.as_u16() as i64),
        response_headers: Some(headers_to_json(&upstream_headers)),
        response_body: processed.body,
        response_truncated: processed.truncated,
        response_size: Some(processed.size),
        duration_ms: Some(duration_ms),
        error: None,
        ai_record_id: ai_record.as_ref().map(|ai| ai.id.clone()),
    };

    let event = ProxyEvent::RequestComplete {
        id: ctx.record_id.clone(),
        status_code: completion.status_code,
        response_time_ms: completion.duration_ms,
        response_size: completion.response_size,
        error: None,
        ai_record_id: completion.ai_record_id.clone(),
        model: ai_record.as_ref().and_then(|ai| ai.model.clone()),
        total_tokens: ai_record.as_ref().and_then(|ai| ai.total_tokens),
        total_cost_micros: ai_record.as_ref().map(|ai| ai.total_cost_micros),
    };

    let ai_id = ai_record.as_ref().map(|ai| ai.id.clone());
    finish_record(&state, &ctx.record_id, completion, ai_record, Some(event)).await;

    if let (Some(ai_id), Some(generation_id), Some(authorization)) =
        (ai_id, generation_id, ctx.authorization)
    {
        state.enricher.schedule(ai_id, generation_id, authorization);
    }
}

/// Apply a completion update, falling back to a minimal update carrying an
/// error note when the full one fails, then emit `request:complete`.
async fn finish_record(
    state: &Arc<ProxyState>,
    record_id: &str,
    completion: RequestCompletion,
    ai_record: Option<AiRecord>,
    event: Option<ProxyEvent>,
) {
    if let Err(e) = state
        .store
        .complete_request(record_id, &completion, ai_record.as_ref())
        .await
    {
        warn!(record_id, "record update failed: {e}");
        let fallback = RequestCompletion {
            status_code: completion.status_code,
            duration_ms: completion.duration_ms,
            error: Some(format!("record update failed: {e}")),
            ..Default::default()
        };
        if let Err(e) = state.store.complete_request(record_id, &fallback, None).await {
            warn!(record_id, "fallback record update failed: {e}");
        }
    }

    let event = event.unwrap_or_else(|| ProxyEvent::RequestComplete {
        id: record_id.to_string(),
        status_code: completion.status_code,
        response_time_ms: completion.duration_ms,
        response_size: completion.response_size,
        error: completion.error.clone(),
        ai_record_id: None,
        model: None,
        total_tokens: None,
        total_cost_micros: None,
    });
    state.bus.publish(event);
}

/// Record and answer a routing failure as a 400.
#[allow(clippy::too_many_arguments)]
async fn routing_failure(
    state: &Arc<ProxyState>,
    routing_err: RoutingError,
    log_this: bool,
    parts: &axum::http::request::Parts,
    original_url: &str,
    path: &str,
    query_pairs: &[(String, String)],
    body_bytes: &Bytes,
    config: &ProxyConfig,
    started: Instant,
) -> Response {
    let message = routing_err.to_string();

    if log_this {
        let created_at = Utc::now();
        let record_id = new_record_id();
        let processed = process_body(body_bytes, config.max_body_size);
        let record = RequestRecord {
            id: record_id.clone(),
            method: parts.method.to_string(),
            url: original_url.to_string(),
            path: path.to_string(),
            query: query_to_json(&clean_query(query_pairs)),
            headers: headers_to_json(&parts.headers),
            body: processed.body,
            body_truncated: processed.truncated,
            body_size: processed.size,
            target_url: String::new(),
            route_source: None,
            matched_rule_id: None,
            status_code: Some(400),
            response_headers: None,
            response_body: None,
            response_truncated: false,
            response_size: None,
            duration_ms: Some(started.elapsed().as_millis() as i64),
            is_ai_request: false,
            ai_record_id: None,
            error: Some(message.clone()),
            created_at,
        };
        if let Err(e) = state.store.insert_request(&record).await {
            warn!("routing-failure record insert failed: {e}");
        }
        state.bus.publish(ProxyEvent::RequestStart {
            id: record_id.clone(),
            method: parts.method.to_string(),
            url: original_url.to_string(),
            path: path.to_string(),
            target_url: String::new(),
            route_source: None,
            is_ai_request: false,
            created_at,
        });
        state.bus.publish(ProxyEvent::RequestComplete {
            id: record_id,
            status_code: Some(400),
            response_time_ms: record.duration_ms,
            response_size: None,
            error: Some(message.clone()),
            ai_record_id: None,
            model: None,
            total_tokens: None,
            total_cost_micros: None,
        });
    }

    error_response(StatusCode::BAD_REQUEST, routing_err.code(), &message)
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"error": code, "message": message})),
    )
        .into_response()
}

fn is_static_asset(path: &str) -> bool {
    let path = path.to_lowercase();
    STATIC_ASSET_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// The only inbound headers not copied onto the upstream request: Host and
/// Content-Length are re-derived, Connection is connection-local, and the
/// reserved routing header is stripped. Everything else passes through
/// verbatim.
fn is_excluded_request_header(name: &axum::http::HeaderName) -> bool {
    *name == CONNECTION
        || *name == CONTENT_LENGTH
        || *name == axum::http::header::HOST
        || name.as_str().eq_ignore_ascii_case(TARGET_HEADER)
}

/// Headers as a JSON object; repeated names join with `, `.
fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            None => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            Some(_) => {}
        }
    }
    Value::Object(map)
}
