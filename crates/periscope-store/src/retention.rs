//! Retention worker
//!
//! Deletes request records past the retention window and redacts sensitive
//! headers on records old enough to no longer need them. Runs once at
//! startup, then on a fixed interval. Store errors are logged and the loop
//! keeps going.

use crate::sqlite::SqliteStore;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Requests older than this are deleted.
    pub delete_after_days: i64,
    /// Requests older than this get sensitive headers redacted.
    pub redact_after_days: i64,
    /// Pause between passes.
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            delete_after_days: 30,
            redact_after_days: 3,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Run one delete + redact pass. Returns (requests deleted, rows redacted).
pub async fn run_retention_pass(store: &SqliteStore, policy: &RetentionPolicy) -> (u64, u64) {
    let now = Utc::now();

    let deleted = match store
        .delete_requests_older_than(now - ChronoDuration::days(policy.delete_after_days))
        .await
    {
        Ok((requests, ai_rows)) => {
            if requests > 0 {
                info!(requests, ai_rows, "retention: deleted expired records");
            }
            requests
        }
        Err(e) => {
            error!("retention: delete pass failed: {e}");
            0
        }
    };

    let redacted = match store
        .redact_sensitive_headers(now - ChronoDuration::days(policy.redact_after_days))
        .await
    {
        Ok(count) => {
            if count > 0 {
                info!(count, "retention: redacted sensitive headers");
            }
            count
        }
        Err(e) => {
            error!("retention: redaction pass failed: {e}");
            0
        }
    };

    (deleted, redacted)
}

/// Spawn the periodic retention loop.
pub fn spawn_retention_worker(store: Arc<SqliteStore>, policy: RetentionPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(policy.interval);
        loop {
            // First tick fires immediately, giving the startup pass.
            ticker.tick().await;
            run_retention_pass(&store, &policy).await;
        }
    })
}
