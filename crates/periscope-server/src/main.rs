//! Periscope server
//!
//! Two listeners share one process: the proxy listener accepts any request
//! and relays it to a resolved upstream while recording the exchange, and
//! the admin listener exposes the live event WebSocket plus health.
//!
//! Usage:
//! ```bash
//! # First boot, seeding a default target:
//! TARGET_URL=https://api.openai.com periscope-server
//!
//! # Explicit ports and database path:
//! periscope-server --proxy-port 8080 --admin-port 8081 --db ~/.periscope/periscope.db
//! ```
//!
//! Route a request through the proxy with the reserved query key:
//! ```bash
//! curl 'http://localhost:8080/v1/chat/completions?__target=https://api.openai.com' \
//!   -H "Authorization: Bearer $OPENAI_API_KEY" \
//!   -H "Content-Type: application/json" \
//!   -d '{"model": "gpt-4o-mini", "messages": [{"role": "user", "content": "hi"}]}'
//! ```

mod admin;
mod config;

use admin::{AdminState, admin_router};
use clap::Parser;
use config::Cli;
use periscope_ai::ModelInfoCache;
use periscope_core::EventBus;
use periscope_proxy::{ProxyState, proxy_router};
use periscope_store::{RetentionPolicy, SqliteStore, spawn_retention_worker};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("starting periscope v{}", env!("CARGO_PKG_VERSION"));

    let store = Arc::new(SqliteStore::new(&cli.db).await?);
    if let Some(target_url) = &cli.target_url {
        store.seed_default_target(target_url).await?;
    }

    let bus = EventBus::new();
    let model_info = Arc::new(ModelInfoCache::new());

    let _retention = spawn_retention_worker(store.clone(), RetentionPolicy::default());

    let proxy_state = Arc::new(ProxyState::new(store.clone(), bus.clone())?);
    let proxy = proxy_router(proxy_state);
    let admin = admin_router(AdminState {
        bus,
        store,
        model_info,
    });

    let proxy_listener = TcpListener::bind((cli.host.as_str(), cli.proxy_port)).await?;
    let admin_listener = TcpListener::bind((cli.host.as_str(), cli.admin_port)).await?;
    info!(
        "proxy listening on {}:{}, admin on {}:{}",
        cli.host, cli.proxy_port, cli.host, cli.admin_port
    );

    tokio::try_join!(
        axum::serve(proxy_listener, proxy).into_future(),
        axum::serve(admin_listener, admin).into_future(),
    )?;

    Ok(())
}
