//! SqliteStore - the persistence adapter behind the proxy
//!
//! One WAL-mode pool, schema created at startup. Record rows are written
//! before upstream bytes flow and completed exactly once; the AI row insert
//! and its linkage onto the request row share a transaction.

use chrono::{DateTime, Utc};
use periscope_core::{
    AiProvider, AiRecord, Error, GenerationEnrichment, MatchType, OpenRouterMeta, PricingEntry,
    ProxyConfig, RequestCompletion, RequestRecord, Result, RouteSource, RoutingRule,
};
use sqlx::Row;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use std::path::Path;

/// Header names whose values the retention worker replaces with
/// `[REDACTED]` once a record is old enough.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "api-key",
    "x-auth-token",
    "cookie",
    "set-cookie",
];

const REDACTED: &str = "[REDACTED]";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal),
            )
            .await
            .map_err(db_err)?;

        Self::initialize_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory store for tests. Pinned to one connection so every query
    /// sees the same database.
    pub async fn new_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await
            .map_err(db_err)?;

        Self::initialize_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS requests (
                id TEXT PRIMARY KEY,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                path TEXT NOT NULL,
                query TEXT NOT NULL DEFAULT '{}',
                headers TEXT NOT NULL DEFAULT '{}',
                body TEXT,
                body_truncated INTEGER NOT NULL DEFAULT 0,
                body_size INTEGER NOT NULL DEFAULT 0,
                target_url TEXT NOT NULL DEFAULT '',
                route_source TEXT,
                matched_rule_id INTEGER,
                status_code INTEGER,
                response_headers TEXT,
                response_body TEXT,
                response_truncated INTEGER NOT NULL DEFAULT 0,
                response_size INTEGER,
                duration_ms INTEGER,
                is_ai_request INTEGER NOT NULL DEFAULT 0,
                ai_request_id TEXT,
                error TEXT,
                created_at TIMESTAMP NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_requests_created ON requests(created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_requests_ai ON requests(is_ai_request, created_at DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS ai_requests (
                id TEXT PRIMARY KEY,
                provider TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                model TEXT,
                streaming INTEGER NOT NULL DEFAULT 0,
                conversation TEXT NOT NULL DEFAULT '[]',
                system_prompt TEXT,
                user_messages TEXT NOT NULL DEFAULT '[]',
                assistant_response TEXT,
                has_tool_calls INTEGER NOT NULL DEFAULT 0,
                tool_call_count INTEGER NOT NULL DEFAULT 0,
                tool_names TEXT NOT NULL DEFAULT '[]',
                full_request TEXT,
                full_response TEXT,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER,
                input_cost_micros INTEGER NOT NULL DEFAULT 0,
                output_cost_micros INTEGER NOT NULL DEFAULT 0,
                total_cost_micros INTEGER NOT NULL DEFAULT 0,
                time_to_first_token_ms INTEGER,
                total_duration_ms INTEGER,
                openrouter_generation_id TEXT,
                openrouter_enriched INTEGER NOT NULL DEFAULT 0,
                openrouter_enriched_at TIMESTAMP,
                openrouter_provider_name TEXT,
                openrouter_upstream_id TEXT,
                openrouter_total_cost REAL,
                openrouter_cache_discount REAL,
                openrouter_latency_ms INTEGER,
                openrouter_generation_time_ms INTEGER,
                openrouter_moderation_latency_ms INTEGER,
                openrouter_native_prompt_tokens INTEGER,
                openrouter_native_completion_tokens INTEGER,
                openrouter_native_reasoning_tokens INTEGER,
                openrouter_native_cached_tokens INTEGER,
                openrouter_finish_reason TEXT,
                openrouter_is_byok INTEGER,
                openrouter_raw_generation TEXT,
                created_at TIMESTAMP NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_ai_requests_created ON ai_requests(created_at DESC)",
            r#"
            CREATE TABLE IF NOT EXISTS routing_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1,
                match_type TEXT NOT NULL,
                match_pattern TEXT NOT NULL,
                match_header TEXT,
                target_url TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS proxy_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                default_target_url TEXT,
                log_enabled INTEGER NOT NULL DEFAULT 1,
                max_body_size INTEGER NOT NULL DEFAULT 1048576,
                ai_detection_enabled INTEGER NOT NULL DEFAULT 1,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS model_pricing (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                provider TEXT NOT NULL,
                model_pattern TEXT NOT NULL,
                input_price_per_million INTEGER NOT NULL,
                output_price_per_million INTEGER NOT NULL,
                UNIQUE(provider, model_pattern)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await.map_err(db_err)?;
        }
        Ok(())
    }

    /// Insert the initial record, before any upstream bytes flow.
    pub async fn insert_request(&self, record: &RequestRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO requests (
                id, method, url, path, query, headers, body, body_truncated,
                body_size, target_url, route_source, matched_rule_id,
                status_code, response_headers, response_body, response_truncated,
                response_size, duration_ms, is_ai_request, ai_request_id,
                error, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.method)
        .bind(&record.url)
        .bind(&record.path)
        .bind(record.query.to_string())
        .bind(record.headers.to_string())
        .bind(&record.body)
        .bind(record.body_truncated)
        .bind(record.body_size)
        .bind(&record.target_url)
        .bind(record.route_source.map(|s| s.as_str()))
        .bind(record.matched_rule_id)
        .bind(record.status_code)
        .bind(record.response_headers.as_ref().map(|h| h.to_string()))
        .bind(&record.response_body)
        .bind(record.response_truncated)
        .bind(record.response_size)
        .bind(record.duration_ms)
        .bind(record.is_ai_request)
        .bind(&record.ai_record_id)
        .bind(&record.error)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Fill the response fields of a record, optionally inserting the linked
    /// AI row in the same transaction.
    pub async fn complete_request(
        &self,
        id: &str,
        completion: &RequestCompletion,
        ai_record: Option<&AiRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(ai) = ai_record {
            insert_ai_row(&mut tx, ai).await?;
        }

        sqlx::query(
            r#"
            UPDATE requests SET
                status_code = ?,
                response_headers = COALESCE(?, response_headers),
                response_body = COALESCE(?, response_body),
                response_truncated = ?,
                response_size = COALESCE(?, response_size),
                duration_ms = COALESCE(?, duration_ms),
                error = COALESCE(?, error),
                ai_request_id = COALESCE(?, ai_request_id),
                is_ai_request = CASE WHEN ? IS NOT NULL THEN 1 ELSE is_ai_request END
            WHERE id = ?
            "#,
        )
        .bind(completion.status_code)
        .bind(completion.response_headers.as_ref().map(|h| h.to_string()))
        .bind(&completion.response_body)
        .bind(completion.response_truncated)
        .bind(completion.response_size)
        .bind(completion.duration_ms)
        .bind(&completion.error)
        .bind(&completion.ai_record_id)
        .bind(&completion.ai_record_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn get_request(&self, id: &str) -> Result<RequestRecord> {
        let row = sqlx::query("SELECT * FROM requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
        row_to_request(&row)
    }

    pub async fn get_ai_record(&self, id: &str) -> Result<AiRecord> {
        let row = sqlx::query("SELECT * FROM ai_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| Error::NotFound(format!("ai record {id}")))?;
        row_to_ai_record(&row)
    }

    /// Apply OpenRouter telemetry to an AI record. Idempotent: a record that
    /// is already enriched is left untouched and `false` is returned.
    pub async fn apply_enrichment(
        &self,
        ai_id: &str,
        enrichment: &GenerationEnrichment,
    ) -> Result<bool> {
        let native_total = match (
            enrichment.native_prompt_tokens,
            enrichment.native_completion_tokens,
        ) {
            (Some(prompt), Some(completion)) => Some(prompt + completion),
            _ => None,
        };

        let result = sqlx::query(
            r#"
            UPDATE ai_requests SET
                openrouter_enriched = 1,
                openrouter_enriched_at = ?,
                openrouter_provider_name = ?,
                openrouter_upstream_id = ?,
                openrouter_total_cost = ?,
                openrouter_cache_discount = ?,
                openrouter_latency_ms = ?,
                openrouter_generation_time_ms = ?,
                openrouter_moderation_latency_ms = ?,
                openrouter_native_prompt_tokens = ?,
                openrouter_native_completion_tokens = ?,
                openrouter_native_reasoning_tokens = ?,
                openrouter_native_cached_tokens = ?,
                openrouter_finish_reason = ?,
                openrouter_is_byok = ?,
                openrouter_raw_generation = ?,
                total_cost_micros = COALESCE(?, total_cost_micros),
                prompt_tokens = COALESCE(?, prompt_tokens),
                completion_tokens = COALESCE(?, completion_tokens),
                total_tokens = COALESCE(?, total_tokens)
            WHERE id = ? AND openrouter_enriched = 0
            "#,
        )
        .bind(Utc::now())
        .bind(&enrichment.provider_name)
        .bind(&enrichment.upstream_id)
        .bind(enrichment.total_cost)
        .bind(enrichment.cache_discount)
        .bind(enrichment.latency_ms)
        .bind(enrichment.generation_time_ms)
        .bind(enrichment.moderation_latency_ms)
        .bind(enrichment.native_prompt_tokens)
        .bind(enrichment.native_completion_tokens)
        .bind(enrichment.native_reasoning_tokens)
        .bind(enrichment.native_cached_tokens)
        .bind(&enrichment.finish_reason)
        .bind(enrichment.is_byok)
        .bind(enrichment.raw_generation.as_ref().map(|r| r.to_string()))
        .bind(enrichment.total_cost_micros())
        .bind(enrichment.native_prompt_tokens)
        .bind(enrichment.native_completion_tokens)
        .bind(native_total)
        .bind(ai_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    /// Enabled rules, highest priority first; ties break on ascending id.
    pub async fn enabled_rules(&self) -> Result<Vec<RoutingRule>> {
        let rows = sqlx::query(
            "SELECT * FROM routing_rules WHERE enabled = 1 ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_rule).collect()
    }

    pub async fn insert_rule(&self, rule: &RoutingRule) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO routing_rules
                (name, priority, enabled, match_type, match_pattern, match_header, target_url)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&rule.name)
        .bind(rule.priority)
        .bind(rule.enabled)
        .bind(rule.match_type.as_str())
        .bind(&rule.match_pattern)
        .bind(&rule.match_header)
        .bind(&rule.target_url)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.last_insert_rowid())
    }

    /// Load the config singleton, creating it with defaults on first read.
    pub async fn load_config(&self) -> Result<ProxyConfig> {
        if let Some(row) = sqlx::query("SELECT * FROM proxy_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
        {
            return Ok(ProxyConfig {
                default_target_url: row.try_get("default_target_url").map_err(db_err)?,
                log_enabled: row.try_get("log_enabled").map_err(db_err)?,
                max_body_size: row.try_get("max_body_size").map_err(db_err)?,
                ai_detection_enabled: row.try_get("ai_detection_enabled").map_err(db_err)?,
                updated_at: row.try_get("updated_at").map_err(db_err)?,
            });
        }

        let config = ProxyConfig::default();
        self.write_config(&config).await?;
        Ok(config)
    }

    /// Seed the default target on first boot. Never overwrites an existing
    /// singleton.
    pub async fn seed_default_target(&self, target_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proxy_config (id, default_target_url, log_enabled, max_body_size,
                                      ai_detection_enabled, updated_at)
            VALUES (1, ?, 1, 1048576, 1, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(target_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn write_config(&self, config: &ProxyConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO proxy_config (id, default_target_url, log_enabled, max_body_size,
                                      ai_detection_enabled, updated_at)
            VALUES (1, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                default_target_url = excluded.default_target_url,
                log_enabled = excluded.log_enabled,
                max_body_size = excluded.max_body_size,
                ai_detection_enabled = excluded.ai_detection_enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.default_target_url)
        .bind(config.log_enabled)
        .bind(config.max_body_size)
        .bind(config.ai_detection_enabled)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Pricing rows for a provider, in stored order.
    pub async fn pricing_for_provider(&self, provider: &str) -> Result<Vec<PricingEntry>> {
        let rows = sqlx::query("SELECT * FROM model_pricing WHERE provider = ? ORDER BY id ASC")
            .bind(provider)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(PricingEntry {
                    provider: row.try_get("provider").map_err(db_err)?,
                    model_pattern: row.try_get("model_pattern").map_err(db_err)?,
                    input_price_per_million: row.try_get("input_price_per_million").map_err(db_err)?,
                    output_price_per_million: row
                        .try_get("output_price_per_million")
                        .map_err(db_err)?,
                })
            })
            .collect()
    }

    pub async fn insert_pricing(&self, entry: &PricingEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO model_pricing
                (provider, model_pattern, input_price_per_million, output_price_per_million)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (provider, model_pattern) DO UPDATE SET
                input_price_per_million = excluded.input_price_per_million,
                output_price_per_million = excluded.output_price_per_million
            "#,
        )
        .bind(&entry.provider)
        .bind(&entry.model_pattern)
        .bind(entry.input_price_per_million)
        .bind(entry.output_price_per_million)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Delete requests older than the cutoff along with their linked AI
    /// rows. Returns (requests deleted, AI rows deleted).
    pub async fn delete_requests_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let ai_deleted = sqlx::query(
            r#"
            DELETE FROM ai_requests WHERE id IN (
                SELECT ai_request_id FROM requests
                WHERE created_at < ? AND ai_request_id IS NOT NULL
            )
            "#,
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        let requests_deleted = sqlx::query("DELETE FROM requests WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        tx.commit().await.map_err(db_err)?;
        Ok((requests_deleted, ai_deleted))
    }

    /// Replace sensitive header values with `[REDACTED]` on requests older
    /// than the cutoff. Rows whose headers fail to parse are skipped.
    /// Returns the number of rows rewritten.
    pub async fn redact_sensitive_headers(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let rows = sqlx::query("SELECT id, headers FROM requests WHERE created_at < ?")
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut redacted = 0u64;
        for row in rows {
            let id: String = row.try_get("id").map_err(db_err)?;
            let headers_json: String = row.try_get("headers").map_err(db_err)?;
            let Ok(mut headers) = serde_json::from_str::<serde_json::Value>(&headers_json) else {
                continue;
            };
            let Some(map) = headers.as_object_mut() else {
                continue;
            };

            let mut changed = false;
            for (name, value) in map.iter_mut() {
                let lowered = name.to_lowercase();
                if SENSITIVE_HEADERS.contains(&lowered.as_str())
                    && value.as_str() != Some(REDACTED)
                {
                    *value = serde_json::Value::String(REDACTED.to_string());
                    changed = true;
                }
            }

            if changed {
                sqlx::query("UPDATE requests SET headers = ? WHERE id = ?")
                    .bind(headers.to_string())
                    .bind(&id)
                    .execute(&self.pool)
                    .await
                    .map_err(db_err)?;
                redacted += 1;
            }
        }

        Ok(redacted)
    }

    /// Count of request rows, used by health reporting and tests.
    pub async fn request_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM requests")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }
}

async fn insert_ai_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    ai: &AiRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ai_requests (
            id, provider, endpoint, model, streaming, conversation,
            system_prompt, user_messages, assistant_response, has_tool_calls,
            tool_call_count, tool_names, full_request, full_response,
            prompt_tokens, completion_tokens, total_tokens, input_cost_micros,
            output_cost_micros, total_cost_micros, time_to_first_token_ms,
            total_duration_ms, openrouter_generation_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&ai.id)
    .bind(ai.provider.as_str())
    .bind(&ai.endpoint)
    .bind(&ai.model)
    .bind(ai.streaming)
    .bind(serde_json::to_string(&ai.conversation)?)
    .bind(&ai.system_prompt)
    .bind(serde_json::to_string(&ai.user_messages)?)
    .bind(&ai.assistant_response)
    .bind(ai.has_tool_calls)
    .bind(ai.tool_call_count)
    .bind(serde_json::to_string(&ai.tool_names)?)
    .bind(ai.full_request.as_ref().map(|v| v.to_string()))
    .bind(ai.full_response.as_ref().map(|v| v.to_string()))
    .bind(ai.prompt_tokens)
    .bind(ai.completion_tokens)
    .bind(ai.total_tokens)
    .bind(ai.input_cost_micros)
    .bind(ai.output_cost_micros)
    .bind(ai.total_cost_micros)
    .bind(ai.time_to_first_token_ms)
    .bind(ai.total_duration_ms)
    .bind(&ai.openrouter.generation_id)
    .bind(ai.created_at)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn row_to_request(row: &SqliteRow) -> Result<RequestRecord> {
    let route_source: Option<String> = row.try_get("route_source").map_err(db_err)?;
    let query: String = row.try_get("query").map_err(db_err)?;
    let headers: String = row.try_get("headers").map_err(db_err)?;
    let response_headers: Option<String> = row.try_get("response_headers").map_err(db_err)?;

    Ok(RequestRecord {
        id: row.try_get("id").map_err(db_err)?,
        method: row.try_get("method").map_err(db_err)?,
        url: row.try_get("url").map_err(db_err)?,
        path: row.try_get("path").map_err(db_err)?,
        query: serde_json::from_str(&query)?,
        headers: serde_json::from_str(&headers)?,
        body: row.try_get("body").map_err(db_err)?,
        body_truncated: row.try_get("body_truncated").map_err(db_err)?,
        body_size: row.try_get("body_size").map_err(db_err)?,
        target_url: row.try_get("target_url").map_err(db_err)?,
        route_source: route_source.as_deref().and_then(RouteSource::parse),
        matched_rule_id: row.try_get("matched_rule_id").map_err(db_err)?,
        status_code: row.try_get("status_code").map_err(db_err)?,
        response_headers: match response_headers {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        },
        response_body: row.try_get("response_body").map_err(db_err)?,
        response_truncated: row.try_get("response_truncated").map_err(db_err)?,
        response_size: row.try_get("response_size").map_err(db_err)?,
        duration_ms: row.try_get("duration_ms").map_err(db_err)?,
        is_ai_request: row.try_get("is_ai_request").map_err(db_err)?,
        ai_record_id: row.try_get("ai_request_id").map_err(db_err)?,
        error: row.try_get("error").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_ai_record(row: &SqliteRow) -> Result<AiRecord> {
    let provider: String = row.try_get("provider").map_err(db_err)?;
    let conversation: String = row.try_get("conversation").map_err(db_err)?;
    let user_messages: String = row.try_get("user_messages").map_err(db_err)?;
    let tool_names: String = row.try_get("tool_names").map_err(db_err)?;
    let full_request: Option<String> = row.try_get("full_request").map_err(db_err)?;
    let full_response: Option<String> = row.try_get("full_response").map_err(db_err)?;
    let raw_generation: Option<String> =
        row.try_get("openrouter_raw_generation").map_err(db_err)?;

    Ok(AiRecord {
        id: row.try_get("id").map_err(db_err)?,
        provider: AiProvider::parse(&provider)
            .ok_or_else(|| Error::Database(format!("bad provider: {provider}")))?,
        endpoint: row.try_get("endpoint").map_err(db_err)?,
        model: row.try_get("model").map_err(db_err)?,
        streaming: row.try_get("streaming").map_err(db_err)?,
        conversation: serde_json::from_str(&conversation)?,
        system_prompt: row.try_get("system_prompt").map_err(db_err)?,
        user_messages: serde_json::from_str(&user_messages)?,
        assistant_response: row.try_get("assistant_response").map_err(db_err)?,
        has_tool_calls: row.try_get("has_tool_calls").map_err(db_err)?,
        tool_call_count: row.try_get("tool_call_count").map_err(db_err)?,
        tool_names: serde_json::from_str(&tool_names)?,
        full_request: match full_request {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        },
        full_response: match full_response {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        },
        prompt_tokens: row.try_get("prompt_tokens").map_err(db_err)?,
        completion_tokens: row.try_get("completion_tokens").map_err(db_err)?,
        total_tokens: row.try_get("total_tokens").map_err(db_err)?,
        input_cost_micros: row.try_get("input_cost_micros").map_err(db_err)?,
        output_cost_micros: row.try_get("output_cost_micros").map_err(db_err)?,
        total_cost_micros: row.try_get("total_cost_micros").map_err(db_err)?,
        time_to_first_token_ms: row.try_get("time_to_first_token_ms").map_err(db_err)?,
        total_duration_ms: row.try_get("total_duration_ms").map_err(db_err)?,
        openrouter: OpenRouterMeta {
            generation_id: row.try_get("openrouter_generation_id").map_err(db_err)?,
            enriched: row.try_get("openrouter_enriched").map_err(db_err)?,
            enriched_at: row.try_get("openrouter_enriched_at").map_err(db_err)?,
            provider_name: row.try_get("openrouter_provider_name").map_err(db_err)?,
            upstream_id: row.try_get("openrouter_upstream_id").map_err(db_err)?,
            total_cost: row.try_get("openrouter_total_cost").map_err(db_err)?,
            cache_discount: row.try_get("openrouter_cache_discount").map_err(db_err)?,
            latency_ms: row.try_get("openrouter_latency_ms").map_err(db_err)?,
            generation_time_ms: row
                .try_get("openrouter_generation_time_ms")
                .map_err(db_err)?,
            moderation_latency_ms: row
                .try_get("openrouter_moderation_latency_ms")
                .map_err(db_err)?,
            native_prompt_tokens: row
                .try_get("openrouter_native_prompt_tokens")
                .map_err(db_err)?,
            native_completion_tokens: row
                .try_get("openrouter_native_completion_tokens")
                .map_err(db_err)?,
            native_reasoning_tokens: row
                .try_get("openrouter_native_reasoning_tokens")
                .map_err(db_err)?,
            native_cached_tokens: row
                .try_get("openrouter_native_cached_tokens")
                .map_err(db_err)?,
            finish_reason: row.try_get("openrouter_finish_reason").map_err(db_err)?,
            is_byok: row.try_get("openrouter_is_byok").map_err(db_err)?,
            raw_generation: match raw_generation {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            },
        },
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn row_to_rule(row: &SqliteRow) -> Result<RoutingRule> {
    let match_type: String = row.try_get("match_type").map_err(db_err)?;
    Ok(RoutingRule {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        priority: row.try_get("priority").map_err(db_err)?,
        enabled: row.try_get("enabled").map_err(db_err)?,
        match_type: MatchType::parse(&match_type)
            .ok_or_else(|| Error::Database(format!("bad match_type: {match_type}")))?,
        match_pattern: row.try_get("match_pattern").map_err(db_err)?,
        match_header: row.try_get("match_header").map_err(db_err)?,
        target_url: row.try_get("target_url").map_err(db_err)?,
    })
}

fn db_err(e: sqlx::Error) -> Error {
    Error::Database(e.to_string())
}
